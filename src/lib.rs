//! onair - unattended internet radio
//!
//! This library crate exposes the station engine, the manifest sync, the
//! HTTP surface and configuration loading for the binary and for
//! integration testing.

pub mod config;
pub mod server;
pub mod station;
pub mod sync;
