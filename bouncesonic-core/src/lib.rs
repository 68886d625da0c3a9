pub mod audio_data;
pub mod buffer_store;
pub mod config;
mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod launch;
pub mod math;
pub mod mixer;
pub mod output;
pub mod playback;
pub mod pool;
pub mod spatial;

#[cfg(test)]
mod test_support;

pub use audio_data::{AudioDataLoader, BounceSonicAudioData, DefaultAudioLoader, LoadOptions};
pub use buffer_store::{BufferStore, COLLISION_CUE, LAUNCH_CUE};
pub use config::{BounceSonicEngineDesc, ImpulseCurve};
pub use engine::{BounceSonicEngine, EVENT_QUEUE_CAPACITY, EngineState};
pub use error::{BounceSonicError, Result};
pub use events::BounceSonicEvent;
pub use launch::{LaunchCompletion, LaunchCuePlayer, LaunchOutcome};
pub use math::{Pose, Quat, Vec3};
pub use mixer::RenderGraph;
pub use output::{AudioOutput, CpalOutput, ManualOutput, ManualOutputHandle};
pub use playback::{PlayState, PlaybackInfo, PlaybackInstance};
pub use pool::{Attachment, CollisionPolicy, GameObjectHandle, PlayerPool, PlayerSlot, SlotKey};
pub use spatial::{
    DistanceModel, EnvironmentState, OutputLayout, RenderingAlgorithm, ReverbParams,
    ReverbPreset, SpatialMixer,
};
