mod default_loader;
mod load_options;
mod loader;
mod resampler;

use crate::error::{BounceSonicError, Result};
pub use default_loader::DefaultAudioLoader;
pub use load_options::{ConvertToMono, LoadOptions};
pub use loader::AudioDataLoader;
pub use resampler::AudioResampler;
use std::sync::Arc;
use std::time::Duration;

/// Widest sample asset a cue may use. Collision cues are spatialised from mono;
/// the launch cue may be stereo.
pub const MAX_CUE_CHANNELS: u16 = 2;

/// Immutable decoded PCM shared by every player that uses it.
///
/// # Data Format
/// Samples are stored **INTERLEAVED**: stereo is `[L0, R0, L1, R1, ...]`,
/// mono is `[M0, M1, ...]`. `total_frames = samples.len() / channels`.
#[derive(Debug, Clone)]
pub struct BounceSonicAudioData {
    inner: Arc<AudioDataInner>,
}

#[derive(Debug)]
pub(crate) struct AudioDataInner {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Duration,
    pub total_frames: usize,
}

impl BounceSonicAudioData {
    pub(crate) fn new(
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
        duration: Duration,
    ) -> Self {
        let total_frames = samples.len() / channels.max(1) as usize;
        Self {
            inner: Arc::new(AudioDataInner {
                samples,
                sample_rate,
                channels,
                duration,
                total_frames,
            }),
        }
    }

    /// Wrap already decoded interleaved samples.
    ///
    /// # Errors
    ///
    /// Returns `AudioFormat` if the sample rate or channel count is zero, or the
    /// sample count is not a whole number of frames.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(BounceSonicError::AudioFormat(format!(
                "Invalid format: {} Hz, {} channels",
                sample_rate, channels
            )));
        }
        if samples.len() % channels as usize != 0 {
            return Err(BounceSonicError::AudioFormat(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }

        let duration =
            Duration::from_secs_f64(samples.len() as f64 / (sample_rate * channels as u32) as f64);
        Ok(Self::new(samples, sample_rate, channels, duration))
    }

    /// Load audio data from a file path using the default loader.
    pub fn from_path(path: &str) -> Result<Arc<Self>> {
        DefaultAudioLoader.load(path, &LoadOptions::default())
    }

    /// Load audio data from a file path with custom loading options.
    pub fn from_path_with_options(path: &str, options: &LoadOptions) -> Result<Arc<Self>> {
        DefaultAudioLoader.load(path, options)
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    pub fn duration(&self) -> Duration {
        self.inner.duration
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn total_frames(&self) -> usize {
        self.inner.total_frames
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.samples.len()
    }

    /// Sample `channel` of `frame`, or silence past the end.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.inner.channels as usize;
        self.inner
            .samples
            .get(frame * channels + channel.min(channels - 1))
            .copied()
            .unwrap_or(0.0)
    }

    /// Check that the buffer is usable as a cue: non-empty, 1..=2 channels.
    pub fn validate(&self) -> Result<()> {
        if self.inner.total_frames == 0 {
            return Err(BounceSonicError::AudioFormat("zero length buffer".into()));
        }
        if self.inner.channels == 0 || self.inner.channels > MAX_CUE_CHANNELS {
            return Err(BounceSonicError::AudioFormat(format!(
                "unsupported channel count {} (max {})",
                self.inner.channels, MAX_CUE_CHANNELS
            )));
        }
        Ok(())
    }

    /// Get samples for a specific channel (0-indexed)
    pub fn channel_samples(&self, channel: usize) -> Result<Vec<f32>> {
        if channel >= self.inner.channels as usize {
            return Err(BounceSonicError::AudioFormat(format!(
                "Channel {} out of range (max: {})",
                channel,
                self.inner.channels.saturating_sub(1)
            )));
        }

        Ok(self
            .inner
            .samples
            .chunks(self.inner.channels as usize)
            .map(|frame| frame[channel])
            .collect())
    }

    /// Convert to mono by downmixing all channels
    pub fn to_mono(&self) -> Result<Self> {
        if self.inner.channels == 1 {
            return Ok(self.clone());
        }

        let mono_samples: Vec<f32> = self
            .inner
            .samples
            .chunks(self.inner.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / self.inner.channels as f32)
            .collect();

        let mono_duration =
            Duration::from_secs_f64(mono_samples.len() as f64 / self.inner.sample_rate as f64);

        Ok(Self::new(
            mono_samples,
            self.inner.sample_rate,
            1,
            mono_duration,
        ))
    }

    /// Apply channel handling and target rate from `options`.
    ///
    /// Returns a cheap clone when nothing needs to change.
    pub fn conform(&self, options: &LoadOptions) -> Result<Self> {
        let shaped = match options.convert_to_mono {
            ConvertToMono::ForceMono => self.to_mono()?,
            ConvertToMono::Original => self.clone(),
        };
        match options.target_sample_rate {
            Some(rate) => shaped.resample(rate),
            None => Ok(shaped),
        }
    }

    /// Resample to a different sample rate using rubato, returns a new instance
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.inner.sample_rate {
            return Ok(self.clone());
        }

        let resampler = AudioResampler::new(
            self.inner.sample_rate,
            target_sample_rate,
            self.inner.channels,
            Some(1024),
        )?;

        let resampled_samples = resampler.resample_interleaved(&self.inner.samples)?;

        let new_duration = Duration::from_secs_f64(
            resampled_samples.len() as f64
                / (target_sample_rate * self.inner.channels as u32) as f64,
        );

        Ok(Self::new(
            resampled_samples,
            target_sample_rate,
            self.inner.channels,
            new_duration,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_samples_rejects_partial_frames() {
        assert!(BounceSonicAudioData::from_samples(vec![0.0; 3], 48000, 2).is_err());
        assert!(BounceSonicAudioData::from_samples(vec![0.0; 4], 0, 2).is_err());
        let data = BounceSonicAudioData::from_samples(vec![0.0; 4], 48000, 2).unwrap();
        assert_eq!(data.total_frames(), 2);
    }

    #[test]
    fn test_validate_rejects_empty_and_wide_buffers() {
        let empty = BounceSonicAudioData::from_samples(Vec::new(), 48000, 1).unwrap();
        assert!(empty.validate().is_err());

        let surround = BounceSonicAudioData::from_samples(vec![0.0; 12], 48000, 6).unwrap();
        assert!(surround.validate().is_err());

        let stereo = BounceSonicAudioData::from_samples(vec![0.0; 12], 48000, 2).unwrap();
        assert!(stereo.validate().is_ok());
    }

    #[test]
    fn test_to_mono_averages_frames() {
        let data =
            BounceSonicAudioData::from_samples(vec![1.0, 0.0, 0.5, 0.5], 48000, 2).unwrap();
        let mono = data.to_mono().unwrap();
        assert_eq!(mono.channels(), 1);
        assert_eq!(mono.samples(), &[0.5, 0.5]);
    }

    #[test]
    fn test_conform_applies_mono_and_keeps_rate() {
        let data =
            BounceSonicAudioData::from_samples(vec![0.2, 0.4, 0.6, 0.8], 48000, 2).unwrap();
        let options = LoadOptions::new()
            .convert_to_mono(ConvertToMono::ForceMono)
            .target_sample_rate(48000);
        let conformed = data.conform(&options).unwrap();
        assert_eq!(conformed.channels(), 1);
        assert_eq!(conformed.sample_rate(), 48000);
        assert_eq!(conformed.total_frames(), 2);
    }

    #[test]
    fn test_sample_reads_silence_past_end() {
        let data = BounceSonicAudioData::from_samples(vec![0.1, 0.2, 0.3, 0.4], 48000, 2).unwrap();
        assert_eq!(data.sample(1, 1), 0.4);
        assert_eq!(data.sample(2, 0), 0.0);
        // Out-of-range channels read the last channel.
        assert_eq!(data.sample(0, 5), 0.2);
    }
}
