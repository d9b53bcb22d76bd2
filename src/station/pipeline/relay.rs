//! Relay stage: drains the run's bounded buffer into the shared broadcast
//! sink.
//!
//! The relay is where a run lets go of the shared feed. When its input
//! closes it simply stops writing; it never closes the sink.

use bytes::Bytes;
use oa_core::StationError;
use tokio::sync::{mpsc, oneshot};

use crate::station::sink::BroadcastSink;

/// Move chunks from `input` into `sink` until `input` closes.
///
/// `on_first_write` fires once, after the sink has accepted the first chunk.
pub(crate) async fn pump(
    mut input: mpsc::Receiver<Bytes>,
    sink: &BroadcastSink,
    mut on_first_write: Option<oneshot::Sender<()>>,
) -> Result<u64, StationError> {
    let mut relayed = 0u64;

    while let Some(chunk) = input.recv().await {
        let len = chunk.len() as u64;
        sink.write(chunk)
            .await
            .map_err(|e| StationError::Relay(e.to_string()))?;
        relayed += len;

        if let Some(tx) = on_first_write.take() {
            let _ = tx.send(());
        }
    }

    Ok(relayed)
}
