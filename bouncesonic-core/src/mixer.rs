//! Render graph: everything that runs on the real-time context.
//!
//! The graph owns one preallocated voice per pool slot plus the launch voice.
//! Control-plane changes arrive as [`GraphCommand`]s and are drained with
//! `try_recv` at the top of every render call; completions leave as
//! [`RenderEvent`]s through `try_send`. The launch cue reports on its own
//! channel and keeps retrying until the report is accepted. Nothing here locks,
//! allocates or fails: a voice that produces garbage is silenced and reported.

use crate::audio_data::BounceSonicAudioData;
use crate::math::{Pose, Vec3};
use crate::playback::PlaybackInstance;
use crate::pool::{GameObjectHandle, SlotActivity, SlotKey};
use crate::spatial::{
    EnvironmentState, MAX_OUTPUT_CHANNELS, OutputLayout, Panner, Reverb, ReverbParams,
};
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::f32::consts::FRAC_1_SQRT_2;
use std::sync::Arc;

#[cfg(feature = "steam-audio")]
use crate::spatial::SteamAudioRenderer;

/// Control plane to render graph.
#[derive(Debug)]
pub(crate) enum GraphCommand {
    Attach(SlotKey),
    Detach(SlotKey),
    TriggerCollision {
        handle: GameObjectHandle,
        key: SlotKey,
        sequence: u32,
        position: Vec3,
        gain: f32,
        rate: f32,
    },
    PlayLaunch {
        ticket: u64,
        gain: f32,
    },
    StopLaunch,
    SetListenerPose(Pose),
    SetReverb(ReverbParams),
}

/// Render graph (and output stream) to dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RenderEvent {
    CollisionFinished {
        handle: GameObjectHandle,
        key: SlotKey,
        sequence: u32,
    },
    /// A voice produced non-finite samples and was silenced.
    VoiceFault {
        handle: Option<GameObjectHandle>,
    },
    StreamError(String),
}

/// Everything needed to build a graph for one run of the engine.
pub(crate) struct GraphSetup {
    pub sample_rate: u32,
    pub block_size: usize,
    pub environment: EnvironmentState,
    pub collision: Arc<BounceSonicAudioData>,
    pub launch: Arc<BounceSonicAudioData>,
    pub activity: Arc<SlotActivity>,
    pub capacity: usize,
    pub commands: Receiver<GraphCommand>,
    pub events: Sender<RenderEvent>,
    /// Ticket of each launch cue that played to the end
    pub launch_done: Sender<u64>,
    #[cfg(feature = "steam-audio")]
    pub steam: Option<SteamAudioRenderer>,
}

struct CollisionVoice {
    key: Option<SlotKey>,
    handle: GameObjectHandle,
    sequence: u32,
    position: Vec3,
    instance: PlaybackInstance,
}

struct LaunchVoice {
    ticket: Option<u64>,
    /// Finished ticket the dispatcher has not accepted yet
    unreported: Option<u64>,
    instance: PlaybackInstance,
}

pub struct RenderGraph {
    sample_rate: u32,
    block_size: usize,
    environment: EnvironmentState,
    panner: Panner,
    reverb: Reverb,
    voices: Vec<CollisionVoice>,
    launch: LaunchVoice,
    activity: Arc<SlotActivity>,
    commands: Receiver<GraphCommand>,
    events: Sender<RenderEvent>,
    launch_done: Sender<u64>,
    mono: Vec<f32>,
    send: Vec<f32>,
    #[cfg(feature = "steam-audio")]
    steam: Option<SteamAudioRenderer>,
}

impl RenderGraph {
    pub(crate) fn new(setup: GraphSetup) -> Self {
        let block_size = setup.block_size.max(1);
        let voices = (0..setup.capacity)
            .map(|_| CollisionVoice {
                key: None,
                handle: GameObjectHandle::new(0),
                sequence: 0,
                position: Vec3::ZERO,
                instance: PlaybackInstance::new(setup.collision.clone()),
            })
            .collect();

        log::debug!(
            "Building render graph: {} Hz, {} frame blocks, {} voices, {:?}",
            setup.sample_rate,
            block_size,
            setup.capacity,
            setup.environment.layout
        );

        Self {
            sample_rate: setup.sample_rate,
            block_size,
            panner: Panner::new(setup.environment.layout, setup.environment.distance_model),
            reverb: Reverb::new(setup.sample_rate, &setup.environment.reverb),
            environment: setup.environment,
            voices,
            launch: LaunchVoice {
                ticket: None,
                unreported: None,
                instance: PlaybackInstance::new(setup.launch),
            },
            activity: setup.activity,
            commands: setup.commands,
            events: setup.events,
            launch_done: setup.launch_done,
            mono: vec![0.0; block_size],
            send: vec![0.0; block_size],
            #[cfg(feature = "steam-audio")]
            steam: setup.steam,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn layout(&self) -> OutputLayout {
        self.environment.layout
    }

    pub fn channels(&self) -> usize {
        self.environment.layout.channel_count() as usize
    }

    /// Switch the rendering algorithm for a new speaker layout.
    ///
    /// Only called while the transport is stopped. Voices, attachments and the
    /// launch cue carry over; the reverb tail does not.
    pub(crate) fn set_layout(&mut self, layout: OutputLayout) {
        if layout == self.environment.layout {
            return;
        }
        self.environment.layout = layout;
        self.panner = Panner::new(layout, self.environment.distance_model);
        self.reverb.reset();
        log::debug!(
            "Render graph now {:?} ({:?})",
            layout,
            self.panner.algorithm()
        );
    }

    pub(crate) fn event_sender(&self) -> Sender<RenderEvent> {
        self.events.clone()
    }

    /// Number of voices currently sounding, launch cue included.
    pub fn active_voices(&self) -> usize {
        self.voices
            .iter()
            .filter(|voice| voice.instance.is_playing())
            .count()
            + usize::from(self.launch.instance.is_playing())
    }

    /// Render interleaved frames for the current layout into `output`.
    ///
    /// `output.len()` should be a multiple of `channels()`; a trailing partial
    /// frame is left silent.
    pub fn render(&mut self, output: &mut [f32]) {
        self.drain_commands();
        output.fill(0.0);

        let channels = self.channels();
        let block_len = self.block_size * channels;
        for block in output.chunks_mut(block_len) {
            let frames = block.len() / channels;
            if frames == 0 {
                continue;
            }
            self.mix_block(&mut block[..frames * channels], frames, channels);
        }

        for sample in output.iter_mut() {
            if !sample.is_finite() {
                *sample = 0.0;
            }
        }

        self.report_launch();
    }

    fn report_launch(&mut self) {
        let Some(ticket) = self.launch.unreported else {
            return;
        };
        match self.launch_done.try_send(ticket) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => self.launch.unreported = None,
            Err(TrySendError::Full(_)) => {}
        }
    }

    fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn apply(&mut self, command: GraphCommand) {
        match command {
            GraphCommand::Attach(key) => {
                if let Some(voice) = self.voices.get_mut(key.index()) {
                    voice.instance.stop();
                    voice.key = Some(key);
                }
            }
            GraphCommand::Detach(key) => {
                if let Some(voice) = self.voices.get_mut(key.index()) {
                    if voice.key == Some(key) {
                        voice.instance.stop();
                        voice.key = None;
                    }
                }
            }
            GraphCommand::TriggerCollision {
                handle,
                key,
                sequence,
                position,
                gain,
                rate,
            } => {
                let Some(voice) = self.voices.get_mut(key.index()) else {
                    return;
                };
                if voice.key != Some(key) {
                    // The slot was released before the trigger arrived.
                    return;
                }
                voice.handle = handle;
                voice.sequence = sequence;
                voice.position = position;
                if position.is_finite() {
                    voice.instance.trigger(gain, rate);
                } else {
                    voice.instance.stop();
                }
                if !voice.instance.is_playing() {
                    self.activity.finish(key.index(), sequence);
                    let _ = self.events.try_send(RenderEvent::VoiceFault {
                        handle: Some(handle),
                    });
                }
            }
            GraphCommand::PlayLaunch { ticket, gain } => {
                self.launch.ticket = Some(ticket);
                self.launch.instance.trigger(gain, 1.0);
            }
            GraphCommand::StopLaunch => {
                self.launch.instance.stop();
                self.launch.ticket = None;
            }
            GraphCommand::SetListenerPose(pose) => {
                self.environment.listener = pose;
            }
            GraphCommand::SetReverb(params) => {
                self.environment.reverb = params;
                self.reverb.set_params(self.sample_rate, &params);
            }
        }
    }

    fn mix_block(&mut self, block: &mut [f32], frames: usize, channels: usize) {
        self.send[..frames].fill(0.0);
        let blend = self.environment.reverb_blend;
        let listener = self.environment.listener;

        #[cfg(feature = "steam-audio")]
        let use_steam = self.steam.is_some() && self.environment.layout == OutputLayout::Stereo;
        #[cfg(feature = "steam-audio")]
        if use_steam {
            if let Some(steam) = self.steam.as_mut() {
                steam.begin_block();
            }
        }

        for (index, voice) in self.voices.iter_mut().enumerate() {
            if !voice.instance.is_playing() {
                continue;
            }

            let mut gains = [0.0f32; MAX_OUTPUT_CHANNELS];
            self.panner.gains(&listener, voice.position, &mut gains);
            let mut faulted = gains.iter().any(|gain| !gain.is_finite());

            let mut frame = [0.0f32; 2];
            let mut rendered = 0;
            let mut finished = false;
            if !faulted {
                for slot in self.mono[..frames].iter_mut() {
                    if !voice.instance.next_frame(&mut frame) {
                        finished = true;
                        break;
                    }
                    if !frame[0].is_finite() {
                        faulted = true;
                        break;
                    }
                    *slot = frame[0];
                    rendered += 1;
                }
            }
            self.mono[rendered..frames].fill(0.0);

            if faulted {
                voice.instance.stop();
                self.activity.finish(index, voice.sequence);
                let _ = self.events.try_send(RenderEvent::VoiceFault {
                    handle: Some(voice.handle),
                });
                continue;
            }

            #[cfg(feature = "steam-audio")]
            let spatialised = use_steam
                && self.steam.as_mut().is_some_and(|steam| {
                    steam
                        .add_source(index, &listener, voice.position, &self.mono[..frames])
                        .is_ok()
                });
            #[cfg(not(feature = "steam-audio"))]
            let spatialised = false;

            if !spatialised {
                for (out_frame, &sample) in block.chunks_mut(channels).zip(&self.mono[..frames]) {
                    for (out, gain) in out_frame.iter_mut().zip(gains) {
                        *out += sample * gain;
                    }
                }
            }

            for (send, &sample) in self.send[..frames].iter_mut().zip(&self.mono[..frames]) {
                *send += sample * blend;
            }

            if finished {
                self.activity.finish(index, voice.sequence);
                if let Some(key) = voice.key {
                    let _ = self.events.try_send(RenderEvent::CollisionFinished {
                        handle: voice.handle,
                        key,
                        sequence: voice.sequence,
                    });
                }
            }
        }

        #[cfg(feature = "steam-audio")]
        if use_steam {
            if let Some(steam) = self.steam.as_mut() {
                if steam.finish_block(block, frames).is_err() {
                    let _ = self.events.try_send(RenderEvent::VoiceFault { handle: None });
                }
            }
        }

        self.reverb.process(&self.send[..frames], block, channels);
        self.mix_launch(block, frames, channels);
    }

    /// The launch cue bypasses the panner and the reverb.
    fn mix_launch(&mut self, block: &mut [f32], frames: usize, channels: usize) {
        if !self.launch.instance.is_playing() {
            return;
        }

        let stereo_cue = self.launch.instance.audio_data.channels() == 2;
        let mut frame = [0.0f32; 2];
        let mut finished = false;
        for out_frame in block.chunks_mut(channels).take(frames) {
            if !self.launch.instance.next_frame(&mut frame) {
                finished = true;
                break;
            }
            let (left, right) = if stereo_cue {
                (frame[0], frame[1])
            } else {
                (frame[0] * FRAC_1_SQRT_2, frame[0] * FRAC_1_SQRT_2)
            };
            if channels == 1 {
                out_frame[0] += (left + right) * FRAC_1_SQRT_2;
            } else {
                out_frame[0] += left;
                out_frame[1] += right;
            }
        }

        // A cue that ends exactly on a block boundary reports on the next call.
        if finished {
            if let Some(ticket) = self.launch.ticket.take() {
                self.launch.unreported = Some(ticket);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::EnvironmentState;
    use crossbeam_channel::{bounded, unbounded};

    struct Harness {
        graph: RenderGraph,
        commands: Sender<GraphCommand>,
        events: Receiver<RenderEvent>,
        launch_done: Receiver<u64>,
        activity: Arc<SlotActivity>,
    }

    fn cue(frames: usize, channels: u16) -> Arc<BounceSonicAudioData> {
        Arc::new(
            BounceSonicAudioData::from_samples(vec![0.5; frames * channels as usize], 48000, channels)
                .unwrap(),
        )
    }

    fn harness(layout: OutputLayout) -> Harness {
        let (commands, command_rx) = unbounded();
        let (event_tx, events) = bounded(64);
        let (launch_tx, launch_done) = bounded(1);
        let activity = Arc::new(SlotActivity::new(4));
        let environment = EnvironmentState {
            layout,
            reverb: ReverbParams::disabled(),
            ..Default::default()
        };
        let graph = RenderGraph::new(GraphSetup {
            sample_rate: 48000,
            block_size: 64,
            environment,
            collision: cue(100, 1),
            launch: cue(200, 2),
            activity: activity.clone(),
            capacity: 4,
            commands: command_rx,
            events: event_tx,
            launch_done: launch_tx,
            #[cfg(feature = "steam-audio")]
            steam: None,
        });
        Harness {
            graph,
            commands,
            events,
            launch_done,
            activity,
        }
    }

    fn key(index: u32) -> SlotKey {
        SlotKey {
            index,
            generation: 0,
        }
    }

    fn trigger(h: &Harness, index: u32, sequence: u32, position: Vec3) {
        h.commands
            .send(GraphCommand::TriggerCollision {
                handle: GameObjectHandle::new(index as u64 + 100),
                key: key(index),
                sequence,
                position,
                gain: 1.0,
                rate: 1.0,
            })
            .unwrap();
    }

    #[test]
    fn test_collision_pans_and_reports_completion() {
        let mut h = harness(OutputLayout::Stereo);
        h.commands.send(GraphCommand::Attach(key(1))).unwrap();
        let sequence = h.activity.begin(1);
        trigger(&h, 1, sequence, Vec3::new(1.0, 0.0, 0.0));

        let mut out = vec![0.0f32; 64 * 2];
        h.graph.render(&mut out);
        let left: f32 = out.iter().step_by(2).map(|s| s.abs()).sum();
        let right: f32 = out.iter().skip(1).step_by(2).map(|s| s.abs()).sum();
        assert!(right > left * 10.0);
        assert_eq!(h.graph.active_voices(), 1);
        assert!(h.activity.is_active(1));
        assert!(h.events.try_recv().is_err());

        h.graph.render(&mut out);
        assert_eq!(h.graph.active_voices(), 0);
        assert_eq!(
            h.events.try_recv().unwrap(),
            RenderEvent::CollisionFinished {
                handle: GameObjectHandle::new(101),
                key: key(1),
                sequence: 1
            }
        );
        assert!(!h.activity.is_active(1));
    }

    #[test]
    fn test_trigger_for_detached_slot_is_ignored() {
        let mut h = harness(OutputLayout::Stereo);
        trigger(&h, 2, 1, Vec3::new(0.0, 0.0, -1.0));
        let mut out = vec![0.0f32; 64 * 2];
        h.graph.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_detach_silences_voice_without_completion() {
        let mut h = harness(OutputLayout::Stereo);
        h.commands.send(GraphCommand::Attach(key(0))).unwrap();
        trigger(&h, 0, 1, Vec3::new(0.0, 0.0, -1.0));
        let mut out = vec![0.0f32; 32 * 2];
        h.graph.render(&mut out);
        assert!(out.iter().any(|&s| s != 0.0));

        h.commands.send(GraphCommand::Detach(key(0))).unwrap();
        h.graph.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn test_stale_generation_cannot_detach_successor() {
        let mut h = harness(OutputLayout::Stereo);
        let successor = SlotKey {
            index: 0,
            generation: 1,
        };
        h.commands.send(GraphCommand::Attach(successor)).unwrap();
        h.commands.send(GraphCommand::Detach(key(0))).unwrap();
        h.commands
            .send(GraphCommand::TriggerCollision {
                handle: GameObjectHandle::new(7),
                key: successor,
                sequence: 1,
                position: Vec3::new(0.0, 0.0, -1.0),
                gain: 1.0,
                rate: 1.0,
            })
            .unwrap();
        let mut out = vec![0.0f32; 32 * 2];
        h.graph.render(&mut out);
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_launch_cue_completes_once() {
        let mut h = harness(OutputLayout::Stereo);
        h.commands
            .send(GraphCommand::PlayLaunch {
                ticket: 9,
                gain: 0.35,
            })
            .unwrap();
        let mut out = vec![0.0f32; 150 * 2];
        h.graph.render(&mut out);
        assert!((out[0] - 0.5 * 0.35).abs() < 1e-6);
        assert!(h.launch_done.try_recv().is_err());

        h.graph.render(&mut out);
        h.graph.render(&mut out);
        assert_eq!(h.launch_done.try_iter().collect::<Vec<_>>(), vec![9]);
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn test_launch_report_survives_backed_up_event_queue() {
        let mut h = harness(OutputLayout::Stereo);
        while h.graph.events.try_send(RenderEvent::VoiceFault { handle: None }).is_ok() {}

        h.commands
            .send(GraphCommand::PlayLaunch { ticket: 3, gain: 1.0 })
            .unwrap();
        let mut out = vec![0.0f32; 256 * 2];
        h.graph.render(&mut out);
        assert_eq!(h.launch_done.try_recv(), Ok(3));
    }

    #[test]
    fn test_launch_report_retries_until_accepted() {
        let mut h = harness(OutputLayout::Stereo);
        h.graph.launch_done.try_send(1).unwrap();

        h.commands
            .send(GraphCommand::PlayLaunch { ticket: 2, gain: 1.0 })
            .unwrap();
        let mut out = vec![0.0f32; 256 * 2];
        h.graph.render(&mut out);
        h.graph.render(&mut out);
        assert_eq!(h.launch_done.try_recv(), Ok(1));
        assert!(h.launch_done.try_recv().is_err());

        h.graph.render(&mut out);
        assert_eq!(h.launch_done.try_recv(), Ok(2));
        h.graph.render(&mut out);
        assert!(h.launch_done.try_recv().is_err());
    }

    #[test]
    fn test_stopped_launch_never_reports() {
        let mut h = harness(OutputLayout::Stereo);
        h.commands
            .send(GraphCommand::PlayLaunch { ticket: 1, gain: 1.0 })
            .unwrap();
        h.commands.send(GraphCommand::StopLaunch).unwrap();
        let mut out = vec![0.0f32; 512 * 2];
        h.graph.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(h.events.try_recv().is_err());
        assert!(h.launch_done.try_recv().is_err());
    }

    #[test]
    fn test_layout_switch_keeps_attachments() {
        let mut h = harness(OutputLayout::Stereo);
        h.commands.send(GraphCommand::Attach(key(3))).unwrap();
        let mut out = vec![0.0f32; 16 * 2];
        h.graph.render(&mut out);

        h.graph.set_layout(OutputLayout::Quad);
        assert_eq!(h.graph.channels(), 4);
        // Behind the listener: only the rear pair sounds.
        trigger(&h, 3, 1, Vec3::new(0.0, 0.0, 2.0));
        let mut out = vec![0.0f32; 16 * 4];
        h.graph.render(&mut out);
        let front: f32 = out.chunks(4).map(|f| f[0].abs() + f[1].abs()).sum();
        let rear: f32 = out.chunks(4).map(|f| f[2].abs() + f[3].abs()).sum();
        assert!(rear > 0.0);
        assert!(front < 1e-4);
    }

    #[test]
    fn test_invalid_rate_degrades_to_silence() {
        let mut h = harness(OutputLayout::Stereo);
        h.commands.send(GraphCommand::Attach(key(0))).unwrap();
        h.commands
            .send(GraphCommand::TriggerCollision {
                handle: GameObjectHandle::new(1),
                key: key(0),
                sequence: 1,
                position: Vec3::ZERO,
                gain: 1.0,
                rate: f32::INFINITY,
            })
            .unwrap();
        let mut out = vec![0.0f32; 64 * 2];
        h.graph.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(
            h.events.try_recv().unwrap(),
            RenderEvent::VoiceFault {
                handle: Some(GameObjectHandle::new(1))
            }
        );
    }

    #[test]
    fn test_non_finite_position_silences_only_that_voice() {
        let energy = |h: &mut Harness| {
            let mut out = vec![0.0f32; 64 * 2];
            h.graph.render(&mut out);
            out.iter().map(|s| s * s).sum::<f32>()
        };

        let mut healthy = harness(OutputLayout::Stereo);
        healthy.commands.send(GraphCommand::Attach(key(0))).unwrap();
        trigger(&healthy, 0, 1, Vec3::new(1.0, 0.0, 0.0));
        let expected = energy(&mut healthy);
        assert!(expected > 0.0);

        let mut h = harness(OutputLayout::Stereo);
        h.commands.send(GraphCommand::Attach(key(0))).unwrap();
        h.commands.send(GraphCommand::Attach(key(1))).unwrap();
        trigger(&h, 0, 1, Vec3::new(1.0, 0.0, 0.0));
        trigger(&h, 1, 1, Vec3::new(f32::NAN, 0.0, 0.0));
        let mixed = energy(&mut h);
        assert!((mixed - expected).abs() < 1e-4);
        assert!(!h.activity.is_active(1));
        assert_eq!(
            h.events.try_recv().unwrap(),
            RenderEvent::VoiceFault {
                handle: Some(GameObjectHandle::new(101))
            }
        );
    }

    #[test]
    fn test_non_finite_listener_faults_voices_instead_of_mix() {
        let mut h = harness(OutputLayout::Quad);
        h.commands.send(GraphCommand::Attach(key(2))).unwrap();
        h.commands
            .send(GraphCommand::SetListenerPose(Pose::from_position(Vec3::new(
                f32::NAN,
                0.0,
                0.0,
            ))))
            .unwrap();
        trigger(&h, 2, 1, Vec3::new(0.0, 0.0, -1.0));
        h.commands
            .send(GraphCommand::PlayLaunch { ticket: 5, gain: 1.0 })
            .unwrap();

        let mut out = vec![0.0f32; 32 * 4];
        h.graph.render(&mut out);
        // The launch cue bypasses spatialisation and keeps playing.
        assert!(out.iter().all(|s| s.is_finite()));
        assert!(out.iter().any(|&s| s != 0.0));
        assert!(!h.activity.is_active(2));
        assert!(matches!(
            h.events.try_recv().unwrap(),
            RenderEvent::VoiceFault { handle: Some(_) }
        ));
    }
}
