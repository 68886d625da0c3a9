use crate::math::Pose;
use crate::mixer::GraphCommand;
use crate::pool::SlotKey;
use crate::spatial::{DistanceModel, OutputLayout, RenderingAlgorithm, ReverbParams};
use crossbeam_channel::Sender;
use std::collections::HashSet;

/// Global rendering parameters shared by every player.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentState {
    pub listener: Pose,
    pub layout: OutputLayout,
    pub reverb: ReverbParams,
    pub distance_model: DistanceModel,
    /// Share of each collision player sent to the reverb (0.0 to 1.0)
    pub reverb_blend: f32,
}

impl Default for EnvironmentState {
    fn default() -> Self {
        Self {
            listener: Pose::identity(),
            layout: OutputLayout::Stereo,
            reverb: ReverbParams::default(),
            distance_model: DistanceModel::default(),
            reverb_blend: 0.3,
        }
    }
}

impl EnvironmentState {
    pub fn rendering_algorithm(&self) -> RenderingAlgorithm {
        RenderingAlgorithm::for_layout(self.layout)
    }
}

/// Control-plane handle on the environment.
///
/// Tracks which players are wired in and forwards every change to the render
/// graph over a lock-free channel. Without a link (engine not running) changes
/// only update the bookkeeping and are picked up when the next graph is built.
pub struct SpatialMixer {
    state: EnvironmentState,
    attached: HashSet<SlotKey>,
    link: Option<Sender<GraphCommand>>,
}

impl SpatialMixer {
    pub fn new(state: EnvironmentState) -> Self {
        Self {
            state,
            attached: HashSet::new(),
            link: None,
        }
    }

    pub fn state(&self) -> &EnvironmentState {
        &self.state
    }

    /// Wire a player into the environment. Attaching twice is a no-op.
    ///
    /// Returns true if the player was newly attached.
    pub fn attach(&mut self, key: SlotKey) -> bool {
        if !self.attached.insert(key) {
            log::debug!("Player {} already attached", key);
            return false;
        }
        self.send(GraphCommand::Attach(key));
        true
    }

    /// Disconnect a player. Detaching an unattached player is a no-op.
    ///
    /// Returns true if the player was attached.
    pub fn detach(&mut self, key: SlotKey) -> bool {
        if !self.attached.remove(&key) {
            log::debug!("Player {} was not attached", key);
            return false;
        }
        self.send(GraphCommand::Detach(key));
        true
    }

    pub fn is_attached(&self, key: SlotKey) -> bool {
        self.attached.contains(&key)
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }

    pub fn set_listener_pose(&mut self, pose: Pose) {
        self.state.listener = pose;
        self.send(GraphCommand::SetListenerPose(pose));
    }

    pub fn set_reverb(&mut self, reverb: ReverbParams) {
        self.state.reverb = reverb;
        self.send(GraphCommand::SetReverb(reverb));
    }

    /// Record a new output layout.
    ///
    /// Returns true if the layout changed. The render graph cannot switch channel
    /// count mid-stream, so the caller restarts the transport to apply it.
    pub fn set_output_configuration(&mut self, layout: OutputLayout) -> bool {
        if self.state.layout == layout {
            return false;
        }
        log::info!(
            "Environment output {:?} -> {:?} ({:?})",
            self.state.layout,
            layout,
            RenderingAlgorithm::for_layout(layout)
        );
        self.state.layout = layout;
        true
    }

    pub(crate) fn connect(&mut self, link: Sender<GraphCommand>) {
        self.link = Some(link);
    }

    pub(crate) fn disconnect(&mut self) {
        self.link = None;
    }

    /// Whether changes currently reach a render graph.
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Forward a command to the render graph. Returns false if it was not delivered.
    pub(crate) fn send(&self, command: GraphCommand) -> bool {
        let Some(link) = &self.link else {
            return false;
        };
        match link.send(command) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Render graph is gone, dropping command {:?}", e.0);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    fn key(index: u32) -> SlotKey {
        SlotKey {
            index,
            generation: 0,
        }
    }

    #[test]
    fn test_attach_is_idempotent() {
        let mut mixer = SpatialMixer::new(EnvironmentState::default());
        assert!(mixer.attach(key(0)));
        assert!(!mixer.attach(key(0)));
        assert_eq!(mixer.attached_count(), 1);
    }

    #[test]
    fn test_detach_unattached_is_noop() {
        let mut mixer = SpatialMixer::new(EnvironmentState::default());
        assert!(!mixer.detach(key(3)));
        mixer.attach(key(3));
        assert!(mixer.detach(key(3)));
        assert!(!mixer.is_attached(key(3)));
    }

    #[test]
    fn test_commands_are_forwarded_when_connected() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut mixer = SpatialMixer::new(EnvironmentState::default());
        mixer.connect(tx);
        assert!(mixer.is_connected());

        mixer.attach(key(1));
        mixer.attach(key(1));
        mixer.set_listener_pose(Pose::from_position(Vec3::new(0.0, -2.0, 2.5)));
        mixer.detach(key(1));

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 3);
        assert!(matches!(received[0], GraphCommand::Attach(k) if k == key(1)));
        assert!(matches!(received[1], GraphCommand::SetListenerPose(_)));
        assert!(matches!(received[2], GraphCommand::Detach(k) if k == key(1)));
    }

    #[test]
    fn test_output_configuration_reports_changes() {
        let mut mixer = SpatialMixer::new(EnvironmentState::default());
        assert!(!mixer.set_output_configuration(OutputLayout::Stereo));
        assert!(mixer.set_output_configuration(OutputLayout::Surround5_0));
        assert_eq!(
            mixer.state().rendering_algorithm(),
            RenderingAlgorithm::SoundField
        );
    }
}
