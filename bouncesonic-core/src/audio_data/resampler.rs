use crate::error::{BounceSonicError, Result};
use rubato::{FftFixedIn, Resampler};

/// Offline resampler used when cue assets are loaded at a rate other than the engine's.
pub struct AudioResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
    chunk_size: usize,
}

impl AudioResampler {
    /// `chunk_size` is the input frames per FFT block (default 1024).
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(BounceSonicError::AudioFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }
        if channels == 0 {
            return Err(BounceSonicError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size: chunk_size.unwrap_or(1024).max(1),
        })
    }

    /// Resample interleaved audio, returning interleaved audio at the target rate.
    ///
    /// The resampler's group delay is trimmed, so the output starts where the
    /// input starts and holds `ceil(frames * ratio)` frames.
    pub fn resample_interleaved(&self, interleaved: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate || interleaved.is_empty() {
            return Ok(interleaved.to_vec());
        }

        let channels = self.channels as usize;
        let planar: Vec<Vec<f32>> = (0..channels)
            .map(|ch| {
                interleaved
                    .chunks(channels)
                    .map(|frame| frame.get(ch).copied().unwrap_or(0.0))
                    .collect()
            })
            .collect();
        let input_frames = planar[0].len();
        let expected_frames = (input_frames as f64 * self.resample_ratio()).ceil() as usize;

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2,
            channels,
        )
        .map_err(|e| BounceSonicError::AudioLoading(format!("Failed to create resampler: {}", e)))?;

        let delay = resampler.output_delay();
        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected_frames + delay); channels];

        let mut position = 0;
        while input_frames - position >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let chunk: Vec<&[f32]> = planar
                .iter()
                .map(|ch| &ch[position..position + needed])
                .collect();
            append(
                &mut output,
                resampler
                    .process(&chunk, None)
                    .map_err(|e| BounceSonicError::AudioLoading(format!("Resampling error: {}", e)))?,
            );
            position += needed;
        }

        if position < input_frames {
            let tail: Vec<&[f32]> = planar.iter().map(|ch| &ch[position..]).collect();
            append(
                &mut output,
                resampler
                    .process_partial(Some(&tail), None)
                    .map_err(|e| BounceSonicError::AudioLoading(format!("Resampling error: {}", e)))?,
            );
        }

        // Flush until the delayed signal has fully come out.
        while output[0].len() < expected_frames + delay {
            append(
                &mut output,
                resampler
                    .process_partial::<&[f32]>(None, None)
                    .map_err(|e| BounceSonicError::AudioLoading(format!("Resampling error: {}", e)))?,
            );
        }

        let mut result = Vec::with_capacity(expected_frames * channels);
        for frame in delay..delay + expected_frames {
            for ch in &output {
                result.push(ch[frame]);
            }
        }
        Ok(result)
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    /// Target over source. Above 1.0 is upsampling.
    pub fn resample_ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }
}

fn append(output: &mut [Vec<f32>], block: Vec<Vec<f32>>) {
    for (out, produced) in output.iter_mut().zip(block) {
        out.extend_from_slice(&produced);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, rate: u32, freq: f32) -> Vec<f32> {
        (0..frames)
            .map(|i| (i as f32 * freq * std::f32::consts::TAU / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_rejects_zero_rates() {
        assert!(AudioResampler::new(0, 48000, 1, None).is_err());
        assert!(AudioResampler::new(44100, 48000, 0, None).is_err());
    }

    #[test]
    fn test_same_rate_is_passthrough() {
        let resampler = AudioResampler::new(48000, 48000, 2, None).unwrap();
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resampler.resample_interleaved(&input).unwrap(), input);
    }

    #[test]
    fn test_upsample_length_follows_ratio() {
        let resampler = AudioResampler::new(44100, 48000, 1, None).unwrap();
        let input = sine(4410, 44100, 440.0);
        let output = resampler.resample_interleaved(&input).unwrap();
        assert_eq!(output.len(), 4800);
    }

    #[test]
    fn test_stereo_keeps_channels_apart() {
        let resampler = AudioResampler::new(24000, 48000, 2, Some(256)).unwrap();
        let frames = 2400;
        let mut input = Vec::with_capacity(frames * 2);
        for s in sine(frames, 24000, 300.0) {
            input.push(s);
            input.push(0.0);
        }
        let output = resampler.resample_interleaved(&input).unwrap();
        assert_eq!(output.len(), frames * 2 * 2);

        let left: f32 = output.iter().step_by(2).map(|s| s.abs()).sum();
        let right: f32 = output.iter().skip(1).step_by(2).map(|s| s.abs()).sum();
        assert!(left > 100.0);
        assert!(right < left * 0.01, "right channel leaked: {}", right);
    }
}
