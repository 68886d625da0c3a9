//! Graph lifecycle: the engine object the scene talks to.

use crate::audio_data::{AudioDataLoader, BounceSonicAudioData, DefaultAudioLoader};
use crate::buffer_store::{BufferStore, COLLISION_CUE, LAUNCH_CUE};
use crate::config::BounceSonicEngineDesc;
use crate::dispatcher::{self, Dispatcher};
use crate::error::{BounceSonicError, Result};
use crate::events::BounceSonicEvent;
use crate::launch::{LaunchCuePlayer, LaunchOutcome, PendingLaunch};
use crate::math::{Pose, Vec3};
use crate::mixer::{GraphCommand, GraphSetup, RenderGraph};
use crate::output::{AudioOutput, CpalOutput};
use crate::pool::{GameObjectHandle, PlayerPool};
use crate::spatial::{EnvironmentState, OutputLayout, ReverbParams, SpatialMixer};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

#[cfg(feature = "steam-audio")]
use crate::spatial::SteamAudioRenderer;

/// Render events buffered between the render context and the dispatcher
const RENDER_EVENT_CAPACITY: usize = 1024;

/// Public events kept for `poll_events`; newer events are dropped once full
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Lifecycle of a [`BounceSonicEngine`].
///
/// `Uninitialized -> Running -> Stopped`, and `Stopped -> Running` again on a
/// new `start()`. Playback and pool calls only succeed while `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Running,
    Stopped,
}

struct Control {
    state: EngineState,
    store: BufferStore,
    pool: PlayerPool,
    mixer: SpatialMixer,
    launch: LaunchCuePlayer,
    output: Box<dyn AudioOutput>,
    dispatcher: Option<Dispatcher>,
    /// Layout requested by the host; `None` follows the device
    layout_override: Option<OutputLayout>,
}

impl Control {
    fn require_running(&self) -> Result<()> {
        if self.state == EngineState::Running {
            Ok(())
        } else {
            Err(BounceSonicError::EngineNotReady { state: self.state })
        }
    }

    fn resolve_layout(&self) -> Result<OutputLayout> {
        match self.layout_override {
            Some(layout) => Ok(layout),
            None => Ok(OutputLayout::from_hardware_channels(
                self.output.hardware_channels()?,
            )),
        }
    }
}

/// Audio controller for one scene.
///
/// Owns the cue buffers, the collision player pool, the environment and the
/// launch cue, and drives a render graph through an [`AudioOutput`]. Every
/// method takes `&self`; the engine is `Send + Sync` and can be shared with the
/// physics thread.
///
/// Completion callbacks run on the engine's dispatcher thread, or inside
/// `stop()` for cancellations. They may call playback methods but must not call
/// `start`, `stop` or the output configuration methods.
pub struct BounceSonicEngine {
    desc: BounceSonicEngineDesc,
    /// Serialises start, stop and transport restarts
    lifecycle: Mutex<()>,
    control: Mutex<Control>,
    events_tx: Sender<BounceSonicEvent>,
    events_rx: Receiver<BounceSonicEvent>,
}

impl BounceSonicEngine {
    /// Engine on the default cpal device, decoding cues with symphonia.
    pub fn new(desc: BounceSonicEngineDesc) -> Result<Self> {
        let output = CpalOutput::new(desc.sample_rate, desc.block_size);
        Self::with_output_and_loader(desc, Box::new(output), Arc::new(DefaultAudioLoader))
    }

    pub fn with_output_and_loader(
        desc: BounceSonicEngineDesc,
        output: Box<dyn AudioOutput>,
        loader: Arc<dyn AudioDataLoader>,
    ) -> Result<Self> {
        desc.validate()?;
        if output.sample_rate() != desc.sample_rate {
            return Err(BounceSonicError::Configuration(format!(
                "output runs at {} Hz but the engine is configured for {} Hz",
                output.sample_rate(),
                desc.sample_rate
            )));
        }

        let mut store = BufferStore::new(loader, desc.sample_rate);
        store.register_cues(&desc.collision_asset, &desc.launch_asset);

        let control = Control {
            state: EngineState::Uninitialized,
            store,
            pool: PlayerPool::new(desc.max_players),
            mixer: SpatialMixer::new(desc.environment()),
            launch: LaunchCuePlayer::new(desc.launch_volume),
            output,
            dispatcher: None,
            layout_override: desc.output_layout,
        };
        let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_QUEUE_CAPACITY);

        Ok(Self {
            desc,
            lifecycle: Mutex::new(()),
            control: Mutex::new(control),
            events_tx,
            events_rx,
        })
    }

    pub fn desc(&self) -> &BounceSonicEngineDesc {
        &self.desc
    }

    pub fn state(&self) -> EngineState {
        self.control.lock().state
    }

    /// Load the cues, configure the environment and start the transport.
    ///
    /// Blocks on asset I/O. Calling it while running is a no-op. On failure the
    /// engine keeps its previous state and holds no buffers.
    pub fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        let mut guard = self.control.lock();
        let control = &mut *guard;

        if control.state == EngineState::Running {
            log::debug!("Engine already running");
            return Ok(());
        }

        if let Err(e) = self.bring_up(control) {
            log::error!("Engine failed to start: {}", e);
            let _ = control.output.stop();
            control.store.clear();
            return Err(e);
        }

        control.state = EngineState::Running;
        log::info!(
            "Engine running: {} Hz, {:?} ({:?})",
            self.desc.sample_rate,
            control.mixer.state().layout,
            control.mixer.state().rendering_algorithm()
        );
        self.publish(BounceSonicEvent::StateChanged {
            state: EngineState::Running,
        });
        Ok(())
    }

    fn bring_up(&self, control: &mut Control) -> Result<()> {
        let collision = control.store.load(COLLISION_CUE)?;
        let launch = control.store.load(LAUNCH_CUE)?;

        let layout = control.resolve_layout()?;
        control.mixer.set_output_configuration(layout);

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (render_tx, render_rx) = crossbeam_channel::bounded(RENDER_EVENT_CAPACITY);
        // One launch cue in flight at a time, so one slot is enough.
        let (launch_tx, launch_rx) = crossbeam_channel::bounded(1);
        let graph = RenderGraph::new(GraphSetup {
            sample_rate: self.desc.sample_rate,
            block_size: self.desc.block_size,
            environment: control.mixer.state().clone(),
            collision,
            launch,
            activity: control.pool.activity(),
            capacity: control.pool.capacity(),
            commands: command_rx,
            events: render_tx,
            launch_done: launch_tx,
            #[cfg(feature = "steam-audio")]
            steam: self.build_steam(layout),
        });

        let dispatcher = Dispatcher::spawn(
            render_rx,
            launch_rx,
            control.launch.pending(),
            self.events_tx.clone(),
        )?;
        control.output.start(graph)?;
        control.mixer.connect(command_tx);
        control.dispatcher = Some(dispatcher);
        Ok(())
    }

    #[cfg(feature = "steam-audio")]
    fn build_steam(&self, layout: OutputLayout) -> Option<SteamAudioRenderer> {
        if layout != OutputLayout::Stereo {
            return None;
        }
        match SteamAudioRenderer::new(
            self.desc.sample_rate,
            self.desc.block_size,
            self.desc.max_players,
            self.desc.distance_model,
            self.desc.hrtf_path.as_deref(),
        ) {
            Ok(renderer) => Some(renderer),
            Err(e) => {
                log::warn!("Steam Audio unavailable, using the built-in panner: {}", e);
                None
            }
        }
    }

    /// Detach every player, release the buffers and halt the transport.
    ///
    /// A launch cue still in flight has its completion fired with
    /// [`LaunchOutcome::Cancelled`] before this returns; no completion fires
    /// afterwards. Idempotent.
    pub fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        let (dispatcher, pending) = {
            let mut guard = self.control.lock();
            if guard.state != EngineState::Running {
                return Ok(());
            }
            Self::tear_down(&mut guard)
        };
        self.finish_tear_down(dispatcher, pending);
        Ok(())
    }

    fn tear_down(control: &mut Control) -> (Option<Dispatcher>, PendingLaunch) {
        control.state = EngineState::Stopped;
        control.mixer.send(GraphCommand::StopLaunch);
        control.mixer.disconnect();
        drop(control.output.stop());
        let released = control.pool.clear(&mut control.mixer);
        control.store.clear();
        log::info!("Engine stopped, released {} players", released);
        (control.dispatcher.take(), control.launch.pending())
    }

    /// Runs without the control lock so completions can call back into the engine.
    fn finish_tear_down(&self, dispatcher: Option<Dispatcher>, pending: PendingLaunch) {
        if let Some(mut dispatcher) = dispatcher {
            dispatcher.shutdown();
        }
        if pending.cancel().is_some() {
            self.publish(BounceSonicEvent::LaunchFinished {
                outcome: LaunchOutcome::Cancelled,
            });
        }
        self.publish(BounceSonicEvent::StateChanged {
            state: EngineState::Stopped,
        });
    }

    /// Allocate a collision player for `handle` and wire it into the environment.
    ///
    /// # Errors
    ///
    /// `DuplicateHandle` if the object already has a player (the existing one is
    /// kept), `PoolExhausted` at capacity, `EngineNotReady` outside `Running`.
    pub fn create_player(&self, handle: GameObjectHandle) -> Result<()> {
        let mut guard = self.control.lock();
        let control = &mut *guard;
        control.require_running()?;
        control.pool.create_player(handle, &mut control.mixer)?;
        Ok(())
    }

    /// Stop, detach and release the player of `handle`.
    ///
    /// `UnknownHandle` if it has none, including a second destroy.
    pub fn destroy_player(&self, handle: GameObjectHandle) -> Result<()> {
        let mut guard = self.control.lock();
        let control = &mut *guard;
        control.require_running()?;
        control.pool.destroy_player(handle, &mut control.mixer)
    }

    /// Play the collision cue for `handle` at `position`, loudness and pitch
    /// following `impulse`.
    ///
    /// Restarts the cue if the object's previous hit is still sounding. Objects
    /// without a player get one unless the collision policy says otherwise.
    pub fn play_collision(
        &self,
        handle: GameObjectHandle,
        position: Vec3,
        impulse: f32,
    ) -> Result<()> {
        let mut guard = self.control.lock();
        let control = &mut *guard;
        control.require_running()?;
        control.pool.play_collision(
            handle,
            position,
            impulse,
            &self.desc.impulse_curve,
            self.desc.collision_policy,
            &mut control.mixer,
        )?;
        Ok(())
    }

    /// Play the launch cue and call `on_complete` exactly once when it ends.
    ///
    /// # Errors
    ///
    /// `Busy` while a previous launch cue has not completed, `EngineNotReady`
    /// outside `Running`. A rejected `on_complete` is dropped without being called.
    pub fn play_launch_sound<F>(&self, on_complete: F) -> Result<()>
    where
        F: FnOnce(LaunchOutcome) + Send + 'static,
    {
        let mut guard = self.control.lock();
        let control = &mut *guard;
        control.require_running()?;
        let ticket = control.launch.begin(Box::new(on_complete))?;
        control.mixer.send(GraphCommand::PlayLaunch {
            ticket,
            gain: control.launch.volume(),
        });
        log::debug!("Launch cue {} started", ticket);
        Ok(())
    }

    /// Render to `layout` from now on.
    ///
    /// While running, the transport is stopped, the graph switched and the
    /// transport restarted; every player, its attachment and any sounding cue
    /// carry over. Otherwise the layout is used by the next `start()`.
    pub fn set_output_configuration(&self, layout: OutputLayout) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        let mut guard = self.control.lock();
        let control = &mut *guard;

        control.layout_override = Some(layout);
        let changed = control.mixer.set_output_configuration(layout);
        if control.state != EngineState::Running || !changed {
            return Ok(());
        }

        match self.rewire(control, layout) {
            Ok(()) => Ok(()),
            Err(e) => {
                let (dispatcher, pending) = Self::tear_down(control);
                drop(guard);
                self.finish_tear_down(dispatcher, pending);
                Err(e)
            }
        }
    }

    /// React to the output device changing: pick the layout again from the
    /// hardware (unless one was set explicitly) and restart the transport.
    pub fn handle_configuration_change(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        let mut guard = self.control.lock();
        let control = &mut *guard;

        let layout = control.resolve_layout()?;
        control.mixer.set_output_configuration(layout);
        if control.state != EngineState::Running {
            return Ok(());
        }

        log::info!("Output configuration changed, rewiring to {:?}", layout);
        match self.rewire(control, layout) {
            Ok(()) => Ok(()),
            Err(e) => {
                let (dispatcher, pending) = Self::tear_down(control);
                drop(guard);
                self.finish_tear_down(dispatcher, pending);
                Err(e)
            }
        }
    }

    fn rewire(&self, control: &mut Control, layout: OutputLayout) -> Result<()> {
        let mut graph = control
            .output
            .stop()
            .ok_or_else(|| BounceSonicError::Engine("transport returned no render graph".into()))?;
        graph.set_layout(layout);
        control.output.start(graph)?;
        log::info!(
            "Rewired {} players to {:?} ({:?})",
            control.mixer.attached_count(),
            layout,
            control.mixer.state().rendering_algorithm()
        );
        self.publish(BounceSonicEvent::OutputReconfigured { layout });
        Ok(())
    }

    /// Move the listener. Accepted in every state.
    pub fn set_listener_pose(&self, pose: Pose) {
        self.control.lock().mixer.set_listener_pose(pose);
    }

    pub fn set_reverb(&self, reverb: ReverbParams) {
        self.control.lock().mixer.set_reverb(reverb);
    }

    pub fn environment(&self) -> EnvironmentState {
        self.control.lock().mixer.state().clone()
    }

    pub fn output_layout(&self) -> OutputLayout {
        self.control.lock().mixer.state().layout
    }

    pub fn player_count(&self) -> usize {
        self.control.lock().pool.len()
    }

    pub fn has_player(&self, handle: GameObjectHandle) -> bool {
        self.control.lock().pool.contains(handle)
    }

    /// Handles whose player is wired into the environment, ascending.
    pub fn attached_handles(&self) -> Vec<GameObjectHandle> {
        self.control.lock().pool.attached_handles()
    }

    /// Whether the collision cue of `handle` is currently sounding.
    pub fn is_playing(&self, handle: GameObjectHandle) -> bool {
        self.control.lock().pool.is_active(handle)
    }

    pub fn is_launch_busy(&self) -> bool {
        self.control.lock().launch.is_busy()
    }

    pub fn loaded_buffer_count(&self) -> usize {
        self.control.lock().store.loaded_count()
    }

    /// Cached cue buffer by logical name, if loaded.
    pub fn buffer(&self, name: &str) -> Option<Arc<BounceSonicAudioData>> {
        self.control.lock().store.get(name)
    }

    /// Drain events published since the last call.
    ///
    /// At most [`EVENT_QUEUE_CAPACITY`] events are kept between calls; a host
    /// that never polls loses the newest ones.
    pub fn poll_events(&self) -> Vec<BounceSonicEvent> {
        self.events_rx.try_iter().collect()
    }

    fn publish(&self, event: BounceSonicEvent) {
        dispatcher::publish(&self.events_tx, event);
    }
}

impl Drop for BounceSonicEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
