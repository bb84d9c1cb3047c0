//! Streams: engine, registry, lifecycle and owner handles

pub mod engine;
pub mod handle;
pub mod lifecycle;
pub mod registry;

pub use engine::{LoopRegion, StreamEngine, StreamStats, LOOP_INFINITE};
pub use handle::StreamHandle;
pub use lifecycle::{AsyncLoad, LoadState, Lifecycle};
pub use registry::{DeviceLists, RegistryState, StreamRegistry};

/// Identifier of a registered stream
pub type StreamId = uuid::Uuid;
