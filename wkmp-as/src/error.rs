//! Error types for wkmp-as
//!
//! One variant per failure class of the streaming engine, using thiserror
//! for clear error propagation.

use thiserror::Error;

/// Main error type for the wkmp-as crate
#[derive(Error, Debug)]
pub enum Error {
    /// Container could not be opened or has an unsupported configuration
    #[error("Decode init error: {0}")]
    DecodeInit(String),

    /// Channel count outside {1, 2}
    #[error("Unsupported format: {channels} channels (only mono and stereo streams are supported)")]
    UnsupportedFormat { channels: u16 },

    /// Decoder failed mid-stream
    #[error("Decode error: {0}")]
    Decode(String),

    /// Stream has nothing playable, even after seeking to the loop start
    #[error("Rebuffer exhausted: nothing left to play in [{loop_begin}, {loop_end})")]
    RebufferExhausted { loop_begin: u64, loop_end: u64 },

    /// Voice pool has no free voices
    #[error("Voice pool exhausted")]
    VoiceExhausted,

    /// Device list query failed after all retries
    #[error("Device enumeration failed after {attempts} attempt(s): {message}")]
    DeviceEnumeration { attempts: u32, message: String },

    /// No playback device could be opened
    #[error("Device open failed: {0}")]
    DeviceOpen(String),

    /// Loop region violates `0 <= begin <= end <= total`
    #[error("Invalid loop region [{begin}, {end}) for stream of {total} samples")]
    InvalidLoopRegion { begin: u64, end: u64, total: u64 },

    /// Seek target beyond the end of the stream
    #[error("Invalid seek to sample {position} (stream has {total} samples)")]
    InvalidSeek { position: u64, total: u64 },

    /// Loop count below the infinite sentinel
    #[error("Invalid loop count {0} (use -1 for infinite)")]
    InvalidLoopCount(i32),

    /// No stream registered under this id
    #[error("Stream not found: {0}")]
    StreamNotFound(uuid::Uuid),

    /// Stream exists but its asynchronous load has not completed
    #[error("Stream not ready: {0}")]
    NotReady(String),

    /// Audio backend rejected an operation
    #[error("Audio backend error: {0}")]
    Backend(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<wkmp_common::Error> for Error {
    fn from(err: wkmp_common::Error) -> Self {
        match err {
            wkmp_common::Error::Io(e) => Error::Io(e),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Convenience Result type using wkmp-as Error
pub type Result<T> = std::result::Result<T, Error>;
