//! Stream-related type definitions
//!
//! Supporting types for stream play state and stop notifications.

use serde::{Deserialize, Serialize};

/// Per-stream playback state
///
/// `WasPlaying` only exists between a device teardown and the matching
/// restore; it is never advanced directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamPlayState {
    /// No voice held, nothing queued
    #[default]
    Standby,
    /// Voice held and buffers rotating
    Playing,
    /// End of the play region reached, draining the queued buffers
    Finishing,
    /// Was playing when the audio context was torn down
    WasPlaying,
}

impl std::fmt::Display for StreamPlayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamPlayState::Standby => write!(f, "standby"),
            StreamPlayState::Playing => write!(f, "playing"),
            StreamPlayState::Finishing => write!(f, "finishing"),
            StreamPlayState::WasPlaying => write!(f, "was_playing"),
        }
    }
}

/// Why a stream stopped
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Owner called stop
    Requested,
    /// Finished naturally, voice already drained
    NoUnqueueNeeded,
    /// Finished naturally, processed buffers unqueued first
    UnqueueNeeded,
    /// Underrun recovery could not refill any buffer
    RebufferFailed,
    /// Loop restart produced no audio
    LoopRebufferFailed,
    /// Stream released by its owner
    Released,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::Requested => "requested",
            StopReason::NoUnqueueNeeded => "no_unqueue_needed",
            StopReason::UnqueueNeeded => "unqueue_needed",
            StopReason::RebufferFailed => "rebuffer_failed",
            StopReason::LoopRebufferFailed => "loop_rebuffer_failed",
            StopReason::Released => "released",
        };
        write!(f, "{}", s)
    }
}

/// Volume category a stream belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SoundCategory {
    #[default]
    Music,
    Effects,
}
