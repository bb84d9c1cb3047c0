//! Pull-based decoders
//!
//! `Decoder` is the seam between the stream engine and whatever turns a
//! compressed container into PCM. Two implementations live here:
//! - `SymphoniaDecoder`: MP3, FLAC, AAC/MP4, Vorbis and WAV files via symphonia
//! - `MemoryDecoder`: interleaved samples already in RAM (generated tones, tests)

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision};
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::types::{PcmBuffer, StreamInfo};
use crate::error::{Error, Result};

/// Incremental PCM producer with seek support
///
/// Positions are in frames (one sample per channel). `decode_into` writes
/// interleaved frames to the front of `out` and returns how many frames it
/// produced; zero means the end of the stream.
pub trait Decoder: Send {
    /// Channels, sample rate and length, known once the header is parsed
    fn info(&self) -> StreamInfo;

    /// Decode up to `max_frames` frames into `out`
    fn decode_into(&mut self, out: &mut PcmBuffer, max_frames: usize) -> Result<usize>;

    /// Position the decoder so the next frame produced is `sample`
    fn seek_to_sample(&mut self, sample: u64) -> Result<()>;

    /// Seek by time offset
    fn seek_to_time(&mut self, seconds: f64) -> Result<()> {
        let rate = self.info().sample_rate as f64;
        self.seek_to_sample((seconds.max(0.0) * rate) as u64)
    }

    /// Frame the next `decode_into` call starts at
    fn tell_samples(&self) -> u64;

    /// Tags parsed from the container (title, artist, ...)
    fn metadata_tags(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Streaming decoder over a file, using symphonia.
///
/// Decodes one packet at a time; samples beyond what the caller asked for
/// are kept in `pending` for the next call.
pub struct SymphoniaDecoder {
    path: PathBuf,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    info: StreamInfo,
    tags: BTreeMap<String, String>,
    sample_buf: Option<SampleBuffer<f32>>,
    pending: Vec<f32>,
    pending_offset: usize,
    position: u64,
    exhausted: bool,
}

impl SymphoniaDecoder {
    /// Open a file and parse its container header.
    ///
    /// # Errors
    /// - `DecodeInit` if the file cannot be read, probed, has no audio track,
    ///   or does not declare its length and rate
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening decoder for {}", path.display());

        let file = File::open(path).map_err(|e| {
            Error::DecodeInit(format!("Failed to open file {}: {}", path.display(), e))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mut probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::DecodeInit(format!("Failed to probe format: {}", e)))?;

        let mut tags = BTreeMap::new();
        if let Some(metadata) = probed.metadata.get() {
            if let Some(revision) = metadata.current() {
                collect_tags(revision, &mut tags);
            }
        }

        let mut format = probed.format;
        if let Some(revision) = format.metadata().current() {
            collect_tags(revision, &mut tags);
        }

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::DecodeInit("No audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::DecodeInit("Sample rate not found".to_string()))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::DecodeInit("Channel count not found".to_string()))?;
        let total_samples = params
            .n_frames
            .ok_or_else(|| Error::DecodeInit("Stream length unknown".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::DecodeInit(format!("Failed to create decoder: {}", e)))?;

        debug!(
            "Audio format: sample_rate={}, channels={}, frames={}, tags={}",
            sample_rate,
            channels,
            total_samples,
            tags.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            decoder,
            track_id,
            info: StreamInfo {
                channels,
                sample_rate,
                total_samples,
            },
            tags,
            sample_buf: None,
            pending: Vec::new(),
            pending_offset: 0,
            position: 0,
            exhausted: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn pending_frames(&self) -> usize {
        (self.pending.len() - self.pending_offset) / self.info.channels.max(1) as usize
    }

    /// Decode the next packet of our track into `pending`.
    ///
    /// Returns false at end of stream.
    fn decode_next_packet(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of {}", self.path.display());
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Decoder reset required mid-stream, treating as end of stream");
                    return Ok(false);
                }
                Err(e) => return Err(Error::Decode(format!("Error reading packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let capacity = decoded.capacity() as u64;
                    let needs_alloc = self
                        .sample_buf
                        .as_ref()
                        .map_or(true, |buf| (buf.capacity() as u64) < capacity);
                    if needs_alloc {
                        self.sample_buf = Some(SampleBuffer::new(capacity, spec));
                    }
                    if let Some(buf) = self.sample_buf.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        self.pending.clear();
                        self.pending.extend_from_slice(buf.samples());
                        self.pending_offset = 0;
                    }
                    return Ok(true);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt packet: skip it, keep the stream alive
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Decode failed: {}", e))),
            }
        }
    }

    /// Drop `frames` frames from the front of the decoded stream
    fn discard_frames(&mut self, mut frames: u64) -> Result<()> {
        let channels = self.info.channels.max(1) as usize;
        while frames > 0 {
            if self.pending_frames() == 0 && !self.decode_next_packet()? {
                break;
            }
            let take = (self.pending_frames() as u64).min(frames) as usize;
            self.pending_offset += take * channels;
            frames -= take as u64;
        }
        Ok(())
    }
}

impl Decoder for SymphoniaDecoder {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn decode_into(&mut self, out: &mut PcmBuffer, max_frames: usize) -> Result<usize> {
        if self.exhausted {
            return Ok(0);
        }

        let channels = self.info.channels.max(1) as usize;
        let max_frames = max_frames.min(out.len() / channels);
        let mut written = 0;

        while written < max_frames {
            if self.pending_frames() == 0 {
                if !self.decode_next_packet()? {
                    self.exhausted = true;
                    break;
                }
                continue;
            }

            let take = self.pending_frames().min(max_frames - written);
            let start = self.pending_offset;
            let end = start + take * channels;
            out.write_f32(written * channels, &self.pending[start..end]);
            self.pending_offset = end;
            written += take;
        }

        self.position += written as u64;
        Ok(written)
    }

    fn seek_to_sample(&mut self, sample: u64) -> Result<()> {
        self.pending.clear();
        self.pending_offset = 0;

        if sample >= self.info.total_samples {
            self.position = sample;
            self.exhausted = true;
            return Ok(());
        }

        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: sample,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| Error::Decode(format!("Seek to sample {} failed: {}", sample, e)))?;
        self.decoder.reset();
        self.exhausted = false;

        // Seeking lands on a packet boundary at or before the target
        self.discard_frames(sample.saturating_sub(seeked.actual_ts))?;
        self.position = sample;
        Ok(())
    }

    fn tell_samples(&self) -> u64 {
        self.position
    }

    fn metadata_tags(&self) -> BTreeMap<String, String> {
        self.tags.clone()
    }
}

fn collect_tags(revision: &MetadataRevision, tags: &mut BTreeMap<String, String>) {
    for tag in revision.tags() {
        let key = match tag.std_key {
            Some(std_key) => format!("{:?}", std_key).to_lowercase(),
            None => tag.key.to_lowercase(),
        };
        tags.insert(key, tag.value.to_string());
    }
}

/// Decoder over interleaved f32 samples held in memory
pub struct MemoryDecoder {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    position: u64,
    tags: BTreeMap<String, String>,
}

impl MemoryDecoder {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
            position: 0,
            tags: BTreeMap::new(),
        }
    }

    /// Sine tone, handy for diagnostics without an audio file
    pub fn sine(frequency_hz: f32, seconds: f32, channels: u16, sample_rate: u32) -> Self {
        let frames = (seconds.max(0.0) * sample_rate as f32) as usize;
        let mut samples = Vec::with_capacity(frames * channels as usize);
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let value = (t * frequency_hz * std::f32::consts::TAU).sin() * 0.5;
            for _ in 0..channels {
                samples.push(value);
            }
        }
        Self::new(samples, channels, sample_rate)
            .with_tag("title", &format!("{} Hz sine", frequency_hz))
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    fn total_frames(&self) -> u64 {
        (self.samples.len() / self.channels.max(1) as usize) as u64
    }
}

impl Decoder for MemoryDecoder {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            channels: self.channels,
            sample_rate: self.sample_rate,
            total_samples: self.total_frames(),
        }
    }

    fn decode_into(&mut self, out: &mut PcmBuffer, max_frames: usize) -> Result<usize> {
        let channels = self.channels.max(1) as usize;
        let remaining = self.total_frames().saturating_sub(self.position) as usize;
        let frames = max_frames.min(remaining).min(out.len() / channels);

        let start = self.position as usize * channels;
        out.write_f32(0, &self.samples[start..start + frames * channels]);
        self.position += frames as u64;
        Ok(frames)
    }

    fn seek_to_sample(&mut self, sample: u64) -> Result<()> {
        self.position = sample.min(self.total_frames());
        Ok(())
    }

    fn tell_samples(&self) -> u64 {
        self.position
    }

    fn metadata_tags(&self) -> BTreeMap<String, String> {
        self.tags.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::SampleFormat;

    #[test]
    fn test_memory_decoder_produces_frames_then_ends() {
        let mut decoder = MemoryDecoder::new(vec![0.1; 10], 2, 8000);
        let mut buf = PcmBuffer::new(SampleFormat::Float32, 4, 2);

        assert_eq!(decoder.info().total_samples, 5);
        assert_eq!(decoder.decode_into(&mut buf, 4).unwrap(), 4);
        assert_eq!(decoder.decode_into(&mut buf, 4).unwrap(), 1);
        assert_eq!(decoder.decode_into(&mut buf, 4).unwrap(), 0);
        assert_eq!(decoder.tell_samples(), 5);
    }

    #[test]
    fn test_memory_decoder_seek_by_time() {
        let mut decoder = MemoryDecoder::sine(440.0, 1.0, 1, 8000);
        decoder.seek_to_time(0.5).unwrap();
        assert_eq!(decoder.tell_samples(), 4000);

        // Seeks past the end clamp to the end
        decoder.seek_to_sample(1_000_000).unwrap();
        assert_eq!(decoder.tell_samples(), 8000);
    }

    #[test]
    fn test_sine_has_title_tag() {
        let decoder = MemoryDecoder::sine(220.0, 0.1, 2, 8000);
        assert_eq!(
            decoder.metadata_tags().get("title").map(String::as_str),
            Some("220 Hz sine")
        );
    }

    #[test]
    fn test_symphonia_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = SymphoniaDecoder::open(&dir.path().join("missing.flac"));
        assert!(matches!(result, Err(Error::DecodeInit(_))));
    }
}
