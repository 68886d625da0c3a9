use crate::math::{Pose, Vec3};
use crate::spatial::{DistanceModel, OutputLayout, RenderingAlgorithm};
use std::f32::consts::FRAC_PI_2;

/// Widest layout the environment renders to.
pub const MAX_OUTPUT_CHANNELS: usize = 8;

/// Computes per-speaker gains for a positioned source.
///
/// Built once per layout change; `gains` is allocation free and safe to call on
/// the render thread.
#[derive(Debug, Clone)]
pub struct Panner {
    layout: OutputLayout,
    algorithm: RenderingAlgorithm,
    distance_model: DistanceModel,
    // Speakers ordered by azimuth (radians), with their channel index
    ring: [(f32, usize); MAX_OUTPUT_CHANNELS],
    ring_len: usize,
}

impl Panner {
    pub fn new(layout: OutputLayout, distance_model: DistanceModel) -> Self {
        let azimuths = layout.speaker_azimuths();
        let mut ring = [(0.0f32, 0usize); MAX_OUTPUT_CHANNELS];
        for (channel, azimuth) in azimuths.iter().enumerate() {
            ring[channel] = (azimuth.to_radians(), channel);
        }
        let ring_len = azimuths.len();
        ring[..ring_len].sort_by(|a, b| a.0.total_cmp(&b.0));

        Self {
            layout,
            algorithm: RenderingAlgorithm::for_layout(layout),
            distance_model,
            ring,
            ring_len,
        }
    }

    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    pub fn algorithm(&self) -> RenderingAlgorithm {
        self.algorithm
    }

    pub fn channels(&self) -> usize {
        self.ring_len
    }

    /// Write the gain of every output channel for a source at `position` into `out`.
    ///
    /// Gains include distance attenuation. Channels beyond the layout are zeroed.
    pub fn gains(&self, listener: &Pose, position: Vec3, out: &mut [f32; MAX_OUTPUT_CHANNELS]) {
        out.fill(0.0);

        let local = listener.to_local(position);
        let distance = local.length();
        let attenuation = self.distance_model.gain(distance);

        if self.ring_len == 1 {
            out[0] = attenuation;
            return;
        }

        if distance < f32::EPSILON {
            // Source sits on the listener: spread evenly at constant power.
            let share = attenuation / (self.ring_len as f32).sqrt();
            out[..self.ring_len].fill(share);
            return;
        }

        match self.algorithm {
            RenderingAlgorithm::EqualPowerPanning => {
                let pan = (local.x / distance).clamp(-1.0, 1.0);
                let angle = (pan + 1.0) * FRAC_PI_2 * 0.5;
                out[0] = angle.cos() * attenuation;
                out[1] = angle.sin() * attenuation;
            }
            RenderingAlgorithm::SoundField => {
                let azimuth = local.x.atan2(local.z);
                let (first, second, fraction) = self.bracket(azimuth);
                out[first] = (fraction * FRAC_PI_2).cos() * attenuation;
                out[second] = (fraction * FRAC_PI_2).sin() * attenuation;
            }
        }
    }

    /// Find the adjacent speaker pair around `azimuth` and the position between them.
    fn bracket(&self, azimuth: f32) -> (usize, usize, f32) {
        let ring = &self.ring[..self.ring_len];
        let full_turn = std::f32::consts::TAU;

        for pair in ring.windows(2) {
            let (start, end) = (pair[0].0, pair[1].0);
            if azimuth >= start && azimuth <= end {
                return (pair[0].1, pair[1].1, (azimuth - start) / (end - start));
            }
        }

        // Wraps from the last speaker back around to the first.
        let (last_az, last_ch) = ring[ring.len() - 1];
        let (first_az, first_ch) = ring[0];
        let span = first_az + full_turn - last_az;
        let offset = if azimuth >= last_az {
            azimuth - last_az
        } else {
            azimuth + full_turn - last_az
        };
        (last_ch, first_ch, (offset / span).clamp(0.0, 1.0))
    }
}
