//! # WKMP Audio Streaming (wkmp-as)
//!
//! Streaming audio engine: decodes audio incrementally into a small ring of
//! hardware buffers per stream, drives voice playback with loop regions and
//! seeking, and keeps everything consistent while a monitor thread watches
//! the audio devices and triggers a full rebuild when they change.
//!
//! **Layout:**
//! - `audio`: PCM types and decoders (symphonia, in-memory)
//! - `backend`: voice pool and device backend traits, cpal and simulated
//!   backends
//! - `stream`: per-stream engine, registry, load lifecycle, owner handles
//! - `device`: device enumeration, change detection, monitor thread
//! - `subsystem`: the owning `AudioSubsystem` and the reinit protocol

pub mod audio;
pub mod backend;
pub mod device;
pub mod error;
pub mod stream;
pub mod subsystem;

pub use error::{Error, Result};
pub use stream::{StreamHandle, StreamId};
pub use subsystem::AudioSubsystem;
