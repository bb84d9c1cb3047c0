//! Audio data types and decoders

pub mod decoder;
pub mod types;

pub use decoder::{Decoder, MemoryDecoder, SymphoniaDecoder};
pub use types::{FormatInfo, PcmBuffer, PcmSlice, SampleFormat, StreamInfo};
