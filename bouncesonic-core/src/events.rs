//! Events published by the engine

use crate::engine::EngineState;
use crate::launch::LaunchOutcome;
use crate::pool::GameObjectHandle;
use crate::spatial::OutputLayout;

#[derive(Debug, Clone, PartialEq)]
pub enum BounceSonicEvent {
    /// An object's collision cue played out.
    CollisionFinished {
        handle: GameObjectHandle,
    },
    LaunchFinished {
        outcome: LaunchOutcome,
    },
    /// A voice produced invalid samples and was silenced.
    VoiceSilenced {
        handle: Option<GameObjectHandle>,
    },
    StateChanged {
        state: EngineState,
    },
    OutputReconfigured {
        layout: OutputLayout,
    },
    DeviceError {
        error: String,
    },
}

impl BounceSonicEvent {
    pub fn handle(&self) -> Option<GameObjectHandle> {
        match self {
            Self::CollisionFinished { handle } => Some(*handle),
            Self::VoiceSilenced { handle } => *handle,
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::VoiceSilenced { .. } | Self::DeviceError { .. })
    }
}
