//! PCM audio framing
//!
//! All audio on the bridge is raw linear PCM, 16-bit little-endian, mono.
//! Incoming buffers of arbitrary length are cut into fixed-duration frames;
//! a trailing remainder shorter than one frame is dropped, never carried over
//! to the next buffer.

/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Default frame duration in milliseconds
pub const DEFAULT_FRAME_MS: u32 = 20;

/// Default barge-in threshold on the int16 amplitude scale
pub const DEFAULT_ACTIVITY_THRESHOLD: f64 = 500.0;

const BYTES_PER_SAMPLE: usize = 2;

/// One fixed-size frame of PCM audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    bytes: Vec<u8>,
}

impl AudioFrame {
    /// Wrap raw PCM bytes as a frame
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Raw PCM bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Frame length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Is the frame empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Mean absolute sample value
    pub fn mean_amplitude(&self) -> f64 {
        mean_amplitude(&self.bytes)
    }
}

/// Re-chunks raw PCM into fixed-duration frames and classifies activity
#[derive(Debug, Clone, Copy)]
pub struct AudioFramer {
    sample_rate: u32,
    frame_ms: u32,
    activity_threshold: f64,
}

impl AudioFramer {
    /// Create a framer for the given sample rate and frame duration
    pub fn new(sample_rate: u32, frame_ms: u32) -> Self {
        Self {
            sample_rate,
            frame_ms,
            activity_threshold: DEFAULT_ACTIVITY_THRESHOLD,
        }
    }

    /// Override the activity threshold
    pub fn with_activity_threshold(mut self, threshold: f64) -> Self {
        self.activity_threshold = threshold;
        self
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frame duration in milliseconds
    pub fn frame_ms(&self) -> u32 {
        self.frame_ms
    }

    /// Activity threshold on the int16 scale
    pub fn activity_threshold(&self) -> f64 {
        self.activity_threshold
    }

    /// Frame size in bytes: `sample_rate * frame_ms / 1000 * 2`
    pub fn frame_bytes(&self) -> usize {
        let samples = self.sample_rate as usize * self.frame_ms as usize / 1000;
        samples * BYTES_PER_SAMPLE
    }

    /// Split a buffer into whole frames, discarding any partial tail
    pub fn frame(&self, buffer: &[u8]) -> Vec<AudioFrame> {
        let size = self.frame_bytes();
        if size == 0 {
            return Vec::new();
        }

        buffer
            .chunks_exact(size)
            .map(|chunk| AudioFrame::new(chunk.to_vec()))
            .collect()
    }

    /// Is this frame loud enough to count as user speech
    pub fn is_active(&self, frame: &AudioFrame) -> bool {
        detect_activity(frame.as_bytes(), self.activity_threshold)
    }
}

impl Default for AudioFramer {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, DEFAULT_FRAME_MS)
    }
}

/// Mean of `|sample|` over all complete 16-bit samples; 0.0 for no samples
pub fn mean_amplitude(pcm: &[u8]) -> f64 {
    let mut sum: u64 = 0;
    let mut count: u64 = 0;

    for pair in pcm.chunks_exact(BYTES_PER_SAMPLE) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        sum += (sample as i32).unsigned_abs() as u64;
        count += 1;
    }

    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

/// Amplitude activity check: strictly greater than the threshold
pub fn detect_activity(pcm: &[u8], threshold: f64) -> bool {
    mean_amplitude(pcm) > threshold
}

/// Nearest-sample resampling: duplicates or skips samples by ratio.
///
/// No anti-aliasing is applied; output length is `floor(n * to / from)`.
pub fn resample_nearest(pcm: &[u8], from_rate: u32, to_rate: u32) -> Vec<u8> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return pcm.to_vec();
    }

    let input_len = pcm.len() / BYTES_PER_SAMPLE;
    let ratio = to_rate as f64 / from_rate as f64;
    let output_len = (input_len as f64 * ratio).floor() as usize;

    let mut output = Vec::with_capacity(output_len * BYTES_PER_SAMPLE);
    for i in 0..output_len {
        let src = ((i as f64 / ratio).floor() as usize).min(input_len.saturating_sub(1));
        let offset = src * BYTES_PER_SAMPLE;
        output.extend_from_slice(&pcm[offset..offset + BYTES_PER_SAMPLE]);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_default_frame_is_960_bytes() {
        let framer = AudioFramer::new(24_000, 20);
        assert_eq!(framer.frame_bytes(), 960);
    }

    #[test]
    fn test_frame_drops_partial_tail() {
        let framer = AudioFramer::default();
        let buffer = vec![1u8; 960 * 3 + 500];

        let frames = framer.frame(&buffer);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() == 960));
    }

    #[test]
    fn test_frame_short_buffer_yields_nothing() {
        let framer = AudioFramer::default();
        assert!(framer.frame(&[0u8; 959]).is_empty());
        assert!(framer.frame(&[]).is_empty());
    }

    #[test]
    fn test_frame_preserves_order() {
        let framer = AudioFramer::new(1000, 2); // 2 samples, 4 bytes
        let frames = framer.frame(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(frames[1].as_bytes(), &[5, 6, 7, 8]);
    }

    #[test]
    fn test_activity_threshold_is_strict() {
        assert!(!detect_activity(&pcm(&[500; 480]), 500.0));
        assert!(detect_activity(&pcm(&[501; 480]), 500.0));
        assert!(detect_activity(&pcm(&[-800; 480]), 500.0));
    }

    #[test]
    fn test_mean_amplitude_mixed_signs() {
        assert_eq!(mean_amplitude(&pcm(&[100, -300])), 200.0);
        assert_eq!(mean_amplitude(&pcm(&[i16::MIN])), 32768.0);
        assert_eq!(mean_amplitude(&[]), 0.0);
    }

    #[test]
    fn test_framer_is_active() {
        let framer = AudioFramer::default();
        let loud = AudioFrame::new(pcm(&[800; 480]));
        let silent = AudioFrame::new(pcm(&[0; 480]));
        assert!(framer.is_active(&loud));
        assert!(!framer.is_active(&silent));
    }

    #[test]
    fn test_resample_upsample_duplicates() {
        let out = resample_nearest(&pcm(&[1, 2, 3]), 12_000, 24_000);
        assert_eq!(out, pcm(&[1, 1, 2, 2, 3, 3]));
    }

    #[test]
    fn test_resample_downsample_skips() {
        let out = resample_nearest(&pcm(&[1, 2, 3, 4, 5, 6]), 48_000, 24_000);
        assert_eq!(out, pcm(&[1, 3, 5]));
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let input = pcm(&[7, 8, 9]);
        assert_eq!(resample_nearest(&input, 24_000, 24_000), input);
    }
}
