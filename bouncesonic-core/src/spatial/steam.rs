//! Binaural rendering through Steam Audio.
//!
//! Each player slot owns a `DirectEffect` and an `AmbisonicsEncodeEffect`; the
//! encoded blocks are summed and decoded once per block to binaural stereo with a
//! shared `AmbisonicsDecodeEffect`. Distance attenuation comes from the
//! environment's [`DistanceModel`] so the binaural and panned paths agree.

use crate::error::{BounceSonicError, Result};
use crate::math::{Pose, Vec3};
use crate::spatial::DistanceModel;
use audionimbus::{
    AmbisonicsDecodeEffect, AmbisonicsDecodeEffectParams, AmbisonicsDecodeEffectSettings,
    AmbisonicsEncodeEffect, AmbisonicsEncodeEffectParams, AmbisonicsEncodeEffectSettings,
    AudioBufferSettings, AudioSettings, Context, CoordinateSystem, DirectEffect,
    DirectEffectParams, DirectEffectSettings, Direction, Hrtf, HrtfSettings, Sofa, SpeakerLayout,
    Vector3, VolumeNormalization, audio_buffer::AudioBuffer,
};

const AMBISONICS_ORDER: u32 = 2;
const AMBISONICS_CHANNELS: usize = 9;

fn spatial_error(what: &str, e: impl std::fmt::Display) -> BounceSonicError {
    BounceSonicError::SpatialAudio(format!("{}: {}", what, e))
}

/// Steam Audio's built-in HRTF, or one read from a SOFA file.
fn load_hrtf(context: &Context, settings: &AudioSettings, sofa_path: Option<&str>) -> Result<Hrtf> {
    let sofa_information = match sofa_path {
        Some(path) => {
            let data = std::fs::read(path)
                .map_err(|e| spatial_error(&format!("Failed to read HRTF file {}", path), e))?;
            Some(Sofa::Buffer(data))
        }
        None => None,
    };

    let hrtf = Hrtf::try_new(
        context,
        settings,
        &HrtfSettings {
            volume_normalization: VolumeNormalization::None,
            sofa_information,
            ..Default::default()
        },
    )
    .map_err(|e| spatial_error("Failed to create HRTF", e))?;

    log::info!("Created HRTF ({})", sofa_path.unwrap_or("default"));
    Ok(hrtf)
}

struct SlotEffects {
    direct: DirectEffect,
    encode: AmbisonicsEncodeEffect,
}

/// Stereo-only binaural renderer used in place of the panner.
pub struct SteamAudioRenderer {
    context: Context,
    hrtf: Hrtf,
    decode: AmbisonicsDecodeEffect,
    slots: Vec<SlotEffects>,
    distance_model: DistanceModel,
    frame_size: usize,

    input: Vec<f32>,
    direct: Vec<f32>,
    encoded: Vec<f32>,
    summed: Vec<f32>,
    decoded: Vec<f32>,
    interleaved: Vec<f32>,
    sources: usize,
}

impl SteamAudioRenderer {
    /// Create effects for `capacity` player slots. All allocation happens here.
    pub fn new(
        sample_rate: u32,
        frame_size: usize,
        capacity: usize,
        distance_model: DistanceModel,
        hrtf_path: Option<&str>,
    ) -> Result<Self> {
        let context = Context::try_new(&audionimbus::ContextSettings::default())
            .map_err(|e| spatial_error("Failed to create Steam Audio context", e))?;

        let settings = AudioSettings {
            sampling_rate: sample_rate,
            frame_size: frame_size as u32,
        };
        let hrtf = load_hrtf(&context, &settings, hrtf_path)?;

        let decode = AmbisonicsDecodeEffect::try_new(
            &context,
            &settings,
            &AmbisonicsDecodeEffectSettings {
                max_order: AMBISONICS_ORDER,
                speaker_layout: SpeakerLayout::Stereo,
                hrtf: &hrtf,
            },
        )
        .map_err(|e| spatial_error("Failed to create AmbisonicsDecodeEffect", e))?;

        let slots = (0..capacity)
            .map(|_| {
                let direct = DirectEffect::try_new(
                    &context,
                    &settings,
                    &DirectEffectSettings { num_channels: 1 },
                )
                .map_err(|e| spatial_error("Failed to create DirectEffect", e))?;
                let encode = AmbisonicsEncodeEffect::try_new(
                    &context,
                    &settings,
                    &AmbisonicsEncodeEffectSettings {
                        max_order: AMBISONICS_ORDER,
                    },
                )
                .map_err(|e| spatial_error("Failed to create AmbisonicsEncodeEffect", e))?;
                Ok(SlotEffects { direct, encode })
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "Steam Audio renderer ready ({} Hz, {} frames, {} slots)",
            sample_rate,
            frame_size,
            capacity
        );

        Ok(Self {
            context,
            hrtf,
            decode,
            slots,
            distance_model,
            frame_size,
            input: vec![0.0; frame_size],
            direct: vec![0.0; frame_size],
            encoded: vec![0.0; frame_size * AMBISONICS_CHANNELS],
            summed: vec![0.0; frame_size * AMBISONICS_CHANNELS],
            decoded: vec![0.0; frame_size * 2],
            interleaved: vec![0.0; frame_size * 2],
            sources: 0,
        })
    }

    pub(crate) fn begin_block(&mut self) {
        self.summed.fill(0.0);
        self.sources = 0;
    }

    /// Attenuate and encode one player's mono block into the ambisonic sum.
    pub(crate) fn add_source(
        &mut self,
        slot: usize,
        listener: &Pose,
        position: Vec3,
        mono: &[f32],
    ) -> Result<()> {
        let Some(effects) = self.slots.get_mut(slot) else {
            return Err(BounceSonicError::SpatialAudio(format!(
                "No effects for slot {}",
                slot
            )));
        };

        let frames = mono.len().min(self.frame_size);
        self.input[..frames].copy_from_slice(&mono[..frames]);
        self.input[frames..].fill(0.0);

        let local = listener.to_local(position);
        let attenuation = self.distance_model.gain(local.length());
        // Steam Audio looks down -Z; the local frame has forward as +Z.
        let direction = Vec3::new(local.x, local.y, -local.z).normalize_or_zero();
        let direction = if direction == Vec3::ZERO {
            Vec3::new(0.0, 0.0, -1.0)
        } else {
            direction
        };

        let input = AudioBuffer::try_with_data_and_settings(
            &self.input,
            AudioBufferSettings {
                num_channels: Some(1),
                ..Default::default()
            },
        )
        .map_err(|e| spatial_error("Failed to wrap input buffer", e))?;
        let direct = AudioBuffer::try_with_data_and_settings(
            &mut self.direct,
            AudioBufferSettings {
                num_channels: Some(1),
                ..Default::default()
            },
        )
        .map_err(|e| spatial_error("Failed to wrap direct buffer", e))?;

        effects.direct.apply(
            &DirectEffectParams {
                distance_attenuation: Some(attenuation),
                air_absorption: None,
                directivity: None,
                occlusion: None,
                transmission: None,
            },
            &input,
            &direct,
        );

        let direct = AudioBuffer::try_with_data_and_settings(
            &self.direct,
            AudioBufferSettings {
                num_channels: Some(1),
                ..Default::default()
            },
        )
        .map_err(|e| spatial_error("Failed to wrap direct buffer", e))?;
        let encoded = AudioBuffer::try_with_data_and_settings(
            &mut self.encoded,
            AudioBufferSettings {
                num_channels: Some(AMBISONICS_CHANNELS as u32),
                ..Default::default()
            },
        )
        .map_err(|e| spatial_error("Failed to wrap encode buffer", e))?;

        effects.encode.apply(
            &AmbisonicsEncodeEffectParams {
                direction: Direction::new(direction.x, direction.y, direction.z),
                order: AMBISONICS_ORDER,
            },
            &direct,
            &encoded,
        );

        for (sum, sample) in self.summed.iter_mut().zip(&self.encoded) {
            *sum += sample;
        }
        self.sources += 1;
        Ok(())
    }

    /// Decode the ambisonic sum to binaural stereo and add it to `block`
    /// (interleaved stereo, `frames` frames).
    pub(crate) fn finish_block(&mut self, block: &mut [f32], frames: usize) -> Result<()> {
        if self.sources == 0 {
            return Ok(());
        }

        let summed = AudioBuffer::try_with_data_and_settings(
            &self.summed,
            AudioBufferSettings {
                num_channels: Some(AMBISONICS_CHANNELS as u32),
                ..Default::default()
            },
        )
        .map_err(|e| spatial_error("Failed to wrap ambisonics buffer", e))?;
        let decoded = AudioBuffer::try_with_data_and_settings(
            &mut self.decoded,
            AudioBufferSettings {
                num_channels: Some(2),
                ..Default::default()
            },
        )
        .map_err(|e| spatial_error("Failed to wrap decode buffer", e))?;

        self.decode.apply(
            &AmbisonicsDecodeEffectParams {
                order: AMBISONICS_ORDER,
                hrtf: &self.hrtf,
                orientation: CoordinateSystem {
                    ahead: Vector3::new(0.0, 0.0, -1.0),
                    ..Default::default()
                },
                binaural: true,
            },
            &summed,
            &decoded,
        );
        decoded.interleave(&self.context, &mut self.interleaved);

        let frames = frames.min(self.frame_size);
        for (out, sample) in block[..frames * 2].iter_mut().zip(&self.interleaved) {
            *out += sample;
        }
        Ok(())
    }
}
