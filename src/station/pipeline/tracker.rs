//! Join state for the three completion signals of one run.

use oa_core::StationError;

/// A pipeline stage that reports completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Source,
    Transcode,
    Relay,
}

/// Records which stages have finished and enforces that the relay finishes
/// last.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompletionTracker {
    source_done: bool,
    transcode_done: bool,
    relay_done: bool,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `stage` finished.
    ///
    /// Recording the relay before both upstream stages is an
    /// [`StationError::OrderingViolation`]; the tracker is left unchanged in
    /// that case.
    pub fn record(&mut self, stage: Stage) -> Result<(), StationError> {
        match stage {
            Stage::Source => self.source_done = true,
            Stage::Transcode => self.transcode_done = true,
            Stage::Relay => {
                if !(self.source_done && self.transcode_done) {
                    return Err(StationError::OrderingViolation {
                        source_done: self.source_done,
                        transcode_done: self.transcode_done,
                    });
                }
                self.relay_done = true;
            }
        }
        Ok(())
    }

    pub fn is_done(&self, stage: Stage) -> bool {
        match stage {
            Stage::Source => self.source_done,
            Stage::Transcode => self.transcode_done,
            Stage::Relay => self.relay_done,
        }
    }

    /// All three stages finished.
    pub fn is_complete(&self) -> bool {
        self.source_done && self.transcode_done && self.relay_done
    }
}
