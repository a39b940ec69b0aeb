//! Per-call options for reads and subscriptions.

use crate::error::{ClientError, Result};
use crate::subscriptions::Checkpointer;
use crate::types::{Direction, StartPosition, StreamTarget};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Credit window used by a streaming call.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackPressure {
    /// Maximum number of frames the server may send before more credit is
    /// granted. Default: 512
    pub batch_size: usize,

    /// Fraction of the batch that must be consumed before the window is
    /// refilled without explicit demand. Default: 0.25
    pub threshold_ratio: f32,
}

impl Default for BackPressure {
    fn default() -> Self {
        Self {
            batch_size: 512,
            threshold_ratio: 0.25,
        }
    }
}

impl BackPressure {
    pub fn new(batch_size: usize, threshold_ratio: f32) -> Self {
        Self {
            batch_size,
            threshold_ratio,
        }
    }

    /// Number of consumed frames that triggers an unconditional refill.
    pub fn request_threshold(&self) -> usize {
        (self.batch_size as f64 * self.threshold_ratio as f64).floor() as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ClientError::InvalidOptions(
                "batch size must be at least 1".into(),
            ));
        }
        if !self.threshold_ratio.is_finite() || !(0.0..=1.0).contains(&self.threshold_ratio) {
            return Err(ClientError::InvalidOptions(format!(
                "threshold ratio must be within [0, 1], got {}",
                self.threshold_ratio
            )));
        }
        Ok(())
    }
}

/// Check that a start position makes sense for the target.
pub(crate) fn validate_start(target: &StreamTarget, start: StartPosition) -> Result<()> {
    match (target, start) {
        (StreamTarget::All, StartPosition::Revision(revision)) => Err(ClientError::InvalidOptions(
            format!("revision {revision} cannot be used to read $all"),
        )),
        (StreamTarget::Stream(name), StartPosition::Position(position)) => {
            Err(ClientError::InvalidOptions(format!(
                "log position {position:?} cannot be used to read stream '{name}'"
            )))
        }
        _ => Ok(()),
    }
}

/// Options for a bounded, one-shot read.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadOptions {
    pub direction: Direction,
    pub start: StartPosition,
    pub resolve_link_tos: bool,
    /// Maximum number of events to return. Default: unbounded
    pub max_count: u64,
    /// Overrides the client-wide credit window.
    pub back_pressure: Option<BackPressure>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Forwards,
            start: StartPosition::Start,
            resolve_link_tos: false,
            max_count: u64::MAX,
            back_pressure: None,
        }
    }
}

impl ReadOptions {
    pub fn forwards(mut self) -> Self {
        self.direction = Direction::Forwards;
        self
    }

    pub fn backwards(mut self) -> Self {
        self.direction = Direction::Backwards;
        self
    }

    pub fn from_start(mut self) -> Self {
        self.start = StartPosition::Start;
        self
    }

    pub fn from_end(mut self) -> Self {
        self.start = StartPosition::End;
        self
    }

    pub fn from(mut self, start: StartPosition) -> Self {
        self.start = start;
        self
    }

    pub fn max_count(mut self, max_count: u64) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn resolve_link_tos(mut self) -> Self {
        self.resolve_link_tos = true;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.back_pressure.get_or_insert_with(BackPressure::default).batch_size = batch_size;
        self
    }

    pub fn threshold_ratio(mut self, ratio: f32) -> Self {
        self.back_pressure.get_or_insert_with(BackPressure::default).threshold_ratio = ratio;
        self
    }
}

/// Options for a live catch-up subscription.
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    pub start: StartPosition,
    pub resolve_link_tos: bool,
    /// Overrides the client-wide credit window.
    pub back_pressure: Option<BackPressure>,
    /// Receives checkpoint positions emitted by the server.
    pub checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("start", &self.start)
            .field("resolve_link_tos", &self.resolve_link_tos)
            .field("back_pressure", &self.back_pressure)
            .field("checkpointer", &self.checkpointer.is_some())
            .finish()
    }
}

impl SubscribeOptions {
    pub fn from_start(mut self) -> Self {
        self.start = StartPosition::Start;
        self
    }

    pub fn from_end(mut self) -> Self {
        self.start = StartPosition::End;
        self
    }

    pub fn from(mut self, start: StartPosition) -> Self {
        self.start = start;
        self
    }

    pub fn resolve_link_tos(mut self) -> Self {
        self.resolve_link_tos = true;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.back_pressure.get_or_insert_with(BackPressure::default).batch_size = batch_size;
        self
    }

    pub fn threshold_ratio(mut self, ratio: f32) -> Self {
        self.back_pressure.get_or_insert_with(BackPressure::default).threshold_ratio = ratio;
        self
    }

    pub fn checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }
}
