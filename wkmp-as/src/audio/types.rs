//! Core audio data types
//!
//! PCM formats and the scratch buffers decoded audio passes through on its
//! way to a hardware buffer.

/// Native sample format uploaded to hardware buffers
///
/// Chosen once at stream open: Float32 when the backend accepts it,
/// Int16 otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Int16,
    Float32,
}

impl SampleFormat {
    /// Bits per sample
    pub fn bit_depth(self) -> u16 {
        match self {
            SampleFormat::Int16 => 16,
            SampleFormat::Float32 => 32,
        }
    }
}

/// What a decoder reports once its container header has been parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub channels: u16,
    pub sample_rate: u32,
    /// Length in frames (samples per channel)
    pub total_samples: u64,
}

/// Immutable format of an open stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    pub total_samples: u64,
}

impl FormatInfo {
    /// Stream duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_samples as f64 / self.sample_rate as f64
    }

    /// Convert a time offset to a sample position (truncating)
    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64) as u64
    }
}

/// Interleaved PCM scratch memory in the stream's native format
#[derive(Debug, Clone)]
pub enum PcmBuffer {
    Int16(Vec<i16>),
    Float32(Vec<f32>),
}

/// Borrowed view of decoded frames, ready for upload
#[derive(Debug, Clone, Copy)]
pub enum PcmSlice<'a> {
    Int16(&'a [i16]),
    Float32(&'a [f32]),
}

impl PcmBuffer {
    /// Allocate a zeroed buffer holding `frames` frames of `channels` channels
    pub fn new(format: SampleFormat, frames: usize, channels: u16) -> Self {
        let len = frames * channels as usize;
        match format {
            SampleFormat::Int16 => PcmBuffer::Int16(vec![0; len]),
            SampleFormat::Float32 => PcmBuffer::Float32(vec![0.0; len]),
        }
    }

    pub fn format(&self) -> SampleFormat {
        match self {
            PcmBuffer::Int16(_) => SampleFormat::Int16,
            PcmBuffer::Float32(_) => SampleFormat::Float32,
        }
    }

    /// Capacity in interleaved samples
    pub fn len(&self) -> usize {
        match self {
            PcmBuffer::Int16(v) => v.len(),
            PcmBuffer::Float32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write interleaved f32 samples starting at interleaved index `at`,
    /// converting to the buffer's format. Returns the number written.
    pub fn write_f32(&mut self, at: usize, src: &[f32]) -> usize {
        match self {
            PcmBuffer::Float32(dst) => {
                let n = src.len().min(dst.len().saturating_sub(at));
                dst[at..at + n].copy_from_slice(&src[..n]);
                n
            }
            PcmBuffer::Int16(dst) => {
                let n = src.len().min(dst.len().saturating_sub(at));
                for (d, s) in dst[at..at + n].iter_mut().zip(src) {
                    *d = f32_to_i16(*s);
                }
                n
            }
        }
    }

    /// First `samples` interleaved samples as an upload slice
    pub fn slice(&self, samples: usize) -> PcmSlice<'_> {
        match self {
            PcmBuffer::Int16(v) => PcmSlice::Int16(&v[..samples.min(v.len())]),
            PcmBuffer::Float32(v) => PcmSlice::Float32(&v[..samples.min(v.len())]),
        }
    }
}

impl PcmSlice<'_> {
    /// Interleaved sample count
    pub fn len(&self) -> usize {
        match self {
            PcmSlice::Int16(v) => v.len(),
            PcmSlice::Float32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn format(&self) -> SampleFormat {
        match self {
            PcmSlice::Int16(_) => SampleFormat::Int16,
            PcmSlice::Float32(_) => SampleFormat::Float32,
        }
    }

    /// Copy out as f32 regardless of storage format
    pub fn to_f32(&self) -> Vec<f32> {
        match self {
            PcmSlice::Float32(v) => v.to_vec(),
            PcmSlice::Int16(v) => v.iter().map(|s| i16_to_f32(*s)).collect(),
        }
    }
}

/// Convert a float sample to 16-bit, clamping out-of-range input
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}
