// Spatial audio module
//
// The environment is the single 3D rendering stage every collision player routes
// through. It owns the listener pose, the output layout and the global reverb.
// The control-plane side lives in `environment`, the render-side DSP in `panner`
// and `reverb`. The Steam Audio renderer is an optional drop-in for the panner.

mod environment;
mod panner;
mod reverb;
#[cfg(feature = "steam-audio")]
mod steam;

pub use environment::{EnvironmentState, SpatialMixer};
pub use panner::{MAX_OUTPUT_CHANNELS, Panner};
pub use reverb::Reverb;
#[cfg(feature = "steam-audio")]
pub use steam::SteamAudioRenderer;

/// Speaker layout of the environment's output connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputLayout {
    Mono,
    #[default]
    Stereo,
    /// L R Ls Rs
    Quad,
    /// L R Ls Rs C
    Surround5_0,
    /// L R Ls Rs C Cs
    Surround6_0,
    /// L R Ls Rs C Rls Rrs
    Surround7_0,
    /// L R Ls Rs C Cs Lw Rw
    Octagonal,
}

impl OutputLayout {
    pub fn channel_count(&self) -> u16 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Quad => 4,
            Self::Surround5_0 => 5,
            Self::Surround6_0 => 6,
            Self::Surround7_0 => 7,
            Self::Octagonal => 8,
        }
    }

    /// Pick the layout the environment can render for a device with `channels` outputs.
    ///
    /// Devices with 4 to 8 outputs get the matching multichannel layout. Three-channel
    /// devices and anything wider than eight fall back to stereo, as do mono devices:
    /// the stereo mix is folded down by the output stage.
    pub fn from_hardware_channels(channels: u16) -> Self {
        match channels {
            4 => Self::Quad,
            5 => Self::Surround5_0,
            6 => Self::Surround6_0,
            7 => Self::Surround7_0,
            8 => Self::Octagonal,
            _ => Self::Stereo,
        }
    }

    pub fn is_multichannel(&self) -> bool {
        self.channel_count() > 2
    }

    /// Speaker azimuths in degrees, in channel order. 0 is straight ahead, positive is right.
    pub fn speaker_azimuths(&self) -> &'static [f32] {
        match self {
            Self::Mono => &[0.0],
            Self::Stereo => &[-30.0, 30.0],
            Self::Quad => &[-45.0, 45.0, -135.0, 135.0],
            Self::Surround5_0 => &[-30.0, 30.0, -110.0, 110.0, 0.0],
            Self::Surround6_0 => &[-30.0, 30.0, -110.0, 110.0, 0.0, 180.0],
            Self::Surround7_0 => &[-30.0, 30.0, -110.0, 110.0, 0.0, -150.0, 150.0],
            Self::Octagonal => &[-45.0, 45.0, -135.0, 135.0, 0.0, 180.0, -90.0, 90.0],
        }
    }
}

/// How a positioned player is spread across the output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingAlgorithm {
    /// Constant-power left/right pan
    EqualPowerPanning,
    /// Pairwise constant-power pan around the speaker ring
    SoundField,
}

impl RenderingAlgorithm {
    pub fn for_layout(layout: OutputLayout) -> Self {
        if layout.is_multichannel() {
            Self::SoundField
        } else {
            Self::EqualPowerPanning
        }
    }
}

/// Inverse-distance attenuation, clamped to `[reference_distance, max_distance]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceModel {
    pub reference_distance: f32,
    pub max_distance: f32,
    pub rolloff_factor: f32,
}

impl Default for DistanceModel {
    fn default() -> Self {
        Self {
            reference_distance: 1.0,
            max_distance: 100.0,
            rolloff_factor: 1.0,
        }
    }
}

impl DistanceModel {
    pub fn gain(&self, distance: f32) -> f32 {
        let clamped = distance.clamp(self.reference_distance, self.max_distance);
        self.reference_distance
            / (self.reference_distance + self.rolloff_factor * (clamped - self.reference_distance))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverbPreset {
    SmallRoom,
    MediumHall,
    LargeHall,
}

/// Global reverb of the environment. Players feed it through their reverb blend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbParams {
    pub enabled: bool,
    pub preset: ReverbPreset,
    /// Wet level in dB
    pub level_db: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            enabled: true,
            preset: ReverbPreset::LargeHall,
            level_db: -20.0,
        }
    }
}

impl ReverbParams {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn level(&self) -> f32 {
        if self.enabled {
            10f32.powf(self.level_db / 20.0)
        } else {
            0.0
        }
    }
}
