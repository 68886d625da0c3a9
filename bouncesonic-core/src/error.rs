//! Error types for BounceSonic

use crate::engine::EngineState;
use crate::pool::GameObjectHandle;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BounceSonicError {
    /// A cue asset is missing, unreadable or malformed. Fatal to `start()`.
    #[error("Failed to load cue '{name}': {reason}")]
    AssetLoad { name: String, reason: String },

    /// A playback or pool call was made outside the `Running` state.
    #[error("Engine is not running (state: {state:?})")]
    EngineNotReady { state: EngineState },

    #[error("A player already exists for {0}")]
    DuplicateHandle(GameObjectHandle),

    #[error("No player exists for {0}")]
    UnknownHandle(GameObjectHandle),

    /// The launch cue is still sounding.
    #[error("Launch cue is already playing")]
    Busy,

    #[error("Player pool is full (capacity: {capacity})")]
    PoolExhausted { capacity: usize },

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Spatial audio error: {0}")]
    SpatialAudio(String),
}

impl BounceSonicError {
    /// Whether the engine stays usable after this error.
    ///
    /// Pool misuse, busy launches and calls made before `start()` leave all state
    /// untouched; everything else points at the device, the assets or the config.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EngineNotReady { .. }
                | Self::DuplicateHandle(_)
                | Self::UnknownHandle(_)
                | Self::Busy
                | Self::PoolExhausted { .. }
        )
    }

    pub(crate) fn asset_load(name: &str, reason: impl Into<String>) -> Self {
        Self::AssetLoad {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BounceSonicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_taxonomy() {
        assert!(BounceSonicError::Busy.is_recoverable());
        assert!(BounceSonicError::UnknownHandle(GameObjectHandle::new(3)).is_recoverable());
        assert!(
            BounceSonicError::EngineNotReady {
                state: EngineState::Stopped
            }
            .is_recoverable()
        );
        assert!(!BounceSonicError::asset_load("collision", "missing").is_recoverable());
        assert!(!BounceSonicError::AudioDevice("gone".into()).is_recoverable());
    }

    #[test]
    fn test_asset_load_message_names_the_cue() {
        let err = BounceSonicError::asset_load("launch", "zero length");
        assert_eq!(err.to_string(), "Failed to load cue 'launch': zero length");
    }
}
