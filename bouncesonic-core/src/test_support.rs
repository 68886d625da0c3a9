//! In-memory fixtures for engine tests.

use crate::audio_data::{AudioDataLoader, BounceSonicAudioData, LoadOptions};
use crate::error::{BounceSonicError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serves synthetic buffers by path and counts how often it was asked.
pub(crate) struct MemoryLoader {
    assets: HashMap<String, (Vec<f32>, u32, u16)>,
    loads: AtomicUsize,
}

impl MemoryLoader {
    pub(crate) fn new() -> Self {
        Self {
            assets: HashMap::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// 10 ms mono collision cue and 50 ms stereo launch cue at 48 kHz, at the
    /// paths the engine tests register.
    pub(crate) fn with_default_cues() -> Self {
        Self::new()
            .with_mono("bounce.wav", 480, 48000)
            .with_stereo("launch.wav", 2400, 48000)
    }

    pub(crate) fn with_mono(self, path: &str, frames: usize, rate: u32) -> Self {
        self.with_channels(path, 1, frames, rate)
    }

    pub(crate) fn with_stereo(self, path: &str, frames: usize, rate: u32) -> Self {
        self.with_channels(path, 2, frames, rate)
    }

    pub(crate) fn with_channels(
        mut self,
        path: &str,
        channels: u16,
        frames: usize,
        rate: u32,
    ) -> Self {
        let samples = (0..frames * channels as usize)
            .map(|i| ((i / channels as usize) as f32 * 0.05).sin() * 0.5)
            .collect();
        self.assets
            .insert(path.to_string(), (samples, rate, channels));
        self
    }

    pub(crate) fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl AudioDataLoader for MemoryLoader {
    fn load(&self, path: &str, _options: &LoadOptions) -> Result<Arc<BounceSonicAudioData>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let (samples, rate, channels) = self.assets.get(path).ok_or_else(|| {
            BounceSonicError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path),
            ))
        })?;
        Ok(Arc::new(BounceSonicAudioData::from_samples(
            samples.clone(),
            *rate,
            *channels,
        )?))
    }
}
