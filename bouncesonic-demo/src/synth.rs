//! Cue loader that synthesises the demo sounds when the asset files are absent.

use bouncesonic_core::audio_data::{
    AudioDataLoader, BounceSonicAudioData, DefaultAudioLoader, LoadOptions,
};
use bouncesonic_core::error::{BounceSonicError, Result};
use rand::Rng;
use std::f32::consts::TAU;
use std::path::Path;
use std::sync::Arc;

const SYNTH_RATE: u32 = 48000;

#[derive(Default)]
pub struct SynthLoader {
    files: DefaultAudioLoader,
}

impl AudioDataLoader for SynthLoader {
    fn load(&self, path: &str, options: &LoadOptions) -> Result<Arc<BounceSonicAudioData>> {
        if Path::new(path).exists() {
            return self.files.load(path, options);
        }

        let name = Path::new(path)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let data = if name.contains("bounce") {
            log::info!("{} not found, synthesising a bounce", path);
            bounce()?
        } else if name.contains("launch") {
            log::info!("{} not found, synthesising a launch sweep", path);
            launch()?
        } else {
            return Err(BounceSonicError::AudioLoading(format!(
                "{} not found and no synthetic stand-in exists",
                path
            )));
        };
        Ok(Arc::new(data))
    }
}

/// 120 ms damped thump with a noisy attack.
fn bounce() -> Result<BounceSonicAudioData> {
    let mut rng = rand::thread_rng();
    let frames = (SYNTH_RATE as f32 * 0.12) as usize;
    let samples = (0..frames)
        .map(|i| {
            let t = i as f32 / SYNTH_RATE as f32;
            let body = (TAU * 180.0 * t).sin() * (-t * 35.0).exp();
            let click = rng.gen_range(-1.0..1.0) * (-t * 400.0).exp();
            (body * 0.8 + click * 0.3) * 0.9
        })
        .collect();
    BounceSonicAudioData::from_samples(samples, SYNTH_RATE, 1)
}

/// 600 ms rising stereo sweep, left and right slightly detuned.
fn launch() -> Result<BounceSonicAudioData> {
    let frames = (SYNTH_RATE as f32 * 0.6) as usize;
    let mut samples = Vec::with_capacity(frames * 2);
    let (mut phase_l, mut phase_r) = (0.0f32, 0.0f32);
    for i in 0..frames {
        let progress = i as f32 / frames as f32;
        let freq = 200.0 + 600.0 * progress * progress;
        phase_l = (phase_l + freq / SYNTH_RATE as f32).fract();
        phase_r = (phase_r + freq * 1.01 / SYNTH_RATE as f32).fract();
        let envelope = (progress * 20.0).min(1.0) * (1.0 - progress);
        samples.push((TAU * phase_l).sin() * envelope * 0.6);
        samples.push((TAU * phase_r).sin() * envelope * 0.6);
    }
    BounceSonicAudioData::from_samples(samples, SYNTH_RATE, 2)
}
