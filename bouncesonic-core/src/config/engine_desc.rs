use crate::config::ImpulseCurve;
use crate::error::{BounceSonicError, Result};
use crate::math::Pose;
use crate::pool::CollisionPolicy;
use crate::spatial::{DistanceModel, EnvironmentState, OutputLayout, ReverbParams};

/// Configuration descriptor for a BounceSonic engine
#[derive(Debug, Clone)]
pub struct BounceSonicEngineDesc {
    /// Sample rate the graph renders at. Cue assets are resampled to it on load.
    pub sample_rate: u32,
    /// Frames rendered per block on the render thread
    pub block_size: usize,
    /// Most game objects that can own a collision player at once
    pub max_players: usize,
    /// Fixed output layout, or `None` to follow the device's channel count
    pub output_layout: Option<OutputLayout>,
    /// Path of the collision cue asset (folded to mono on load)
    pub collision_asset: String,
    /// Path of the launch cue asset
    pub launch_asset: String,
    pub impulse_curve: ImpulseCurve,
    pub collision_policy: CollisionPolicy,
    pub distance_model: DistanceModel,
    pub reverb: ReverbParams,
    /// Share of every collision player sent to the environment reverb
    pub reverb_blend: f32,
    /// Linear gain of the launch cue
    pub launch_volume: f32,
    /// Initial listener pose
    pub listener: Pose,
    /// Optional path to a custom HRTF SOFA file for the Steam Audio renderer
    /// (None uses Steam Audio's default HRTF)
    pub hrtf_path: Option<String>,
}

impl Default for BounceSonicEngineDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            max_players: 64,
            output_layout: None,
            collision_asset: "assets/bounce.wav".to_string(),
            launch_asset: "assets/launchSound.wav".to_string(),
            impulse_curve: ImpulseCurve::default(),
            collision_policy: CollisionPolicy::default(),
            distance_model: DistanceModel::default(),
            reverb: ReverbParams::default(),
            reverb_blend: 0.3,
            launch_volume: 0.35,
            listener: Pose::identity(),
            hrtf_path: None,
        }
    }
}

impl BounceSonicEngineDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn max_players(mut self, max_players: usize) -> Self {
        self.max_players = max_players;
        self
    }

    pub fn output_layout(mut self, layout: OutputLayout) -> Self {
        self.output_layout = Some(layout);
        self
    }

    pub fn assets(mut self, collision: impl Into<String>, launch: impl Into<String>) -> Self {
        self.collision_asset = collision.into();
        self.launch_asset = launch.into();
        self
    }

    pub fn impulse_curve(mut self, curve: ImpulseCurve) -> Self {
        self.impulse_curve = curve;
        self
    }

    pub fn collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn distance_model(mut self, model: DistanceModel) -> Self {
        self.distance_model = model;
        self
    }

    pub fn reverb(mut self, reverb: ReverbParams) -> Self {
        self.reverb = reverb;
        self
    }

    pub fn reverb_blend(mut self, blend: f32) -> Self {
        self.reverb_blend = blend;
        self
    }

    pub fn launch_volume(mut self, volume: f32) -> Self {
        self.launch_volume = volume;
        self
    }

    pub fn listener(mut self, pose: Pose) -> Self {
        self.listener = pose;
        self
    }

    pub fn hrtf_path(mut self, path: impl Into<String>) -> Self {
        self.hrtf_path = Some(path.into());
        self
    }

    /// Initial environment for this configuration, before the layout is resolved.
    pub fn environment(&self) -> EnvironmentState {
        EnvironmentState {
            listener: self.listener,
            layout: self.output_layout.unwrap_or_default(),
            reverb: self.reverb,
            distance_model: self.distance_model,
            reverb_blend: self.reverb_blend,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(BounceSonicError::Configuration(reason));

        if self.sample_rate == 0 {
            return invalid("sample_rate must be greater than 0".into());
        }
        if self.block_size == 0 {
            return invalid("block_size must be greater than 0".into());
        }
        if self.max_players == 0 {
            return invalid(format!("max_players out of range: {}", self.max_players));
        }
        if !(0.0..=1.0).contains(&self.reverb_blend) {
            return invalid(format!("reverb_blend must be within 0..=1, got {}", self.reverb_blend));
        }
        if !(self.launch_volume.is_finite() && self.launch_volume >= 0.0) {
            return invalid(format!("launch_volume must be >= 0, got {}", self.launch_volume));
        }
        let distance = &self.distance_model;
        if !(distance.reference_distance > 0.0
            && distance.max_distance >= distance.reference_distance
            && distance.rolloff_factor >= 0.0)
        {
            return invalid(format!("invalid distance model: {:?}", distance));
        }
        self.impulse_curve
            .validate()
            .map_err(BounceSonicError::Configuration)
    }
}
