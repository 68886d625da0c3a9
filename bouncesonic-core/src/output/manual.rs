use crate::error::Result;
use crate::mixer::RenderGraph;
use crate::output::AudioOutput;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

struct Shared {
    graph: Mutex<Option<RenderGraph>>,
    hardware_channels: AtomicU16,
}

/// Transport rendered on demand through a [`ManualOutputHandle`].
///
/// For headless hosts that own their own audio clock, offline checks and tests.
pub struct ManualOutput {
    shared: Arc<Shared>,
    sample_rate: u32,
}

/// Host side of a [`ManualOutput`]. Cheap to clone.
#[derive(Clone)]
pub struct ManualOutputHandle {
    shared: Arc<Shared>,
}

impl ManualOutput {
    pub fn new(hardware_channels: u16, sample_rate: u32) -> (Self, ManualOutputHandle) {
        let shared = Arc::new(Shared {
            graph: Mutex::new(None),
            hardware_channels: AtomicU16::new(hardware_channels),
        });
        (
            Self {
                shared: shared.clone(),
                sample_rate,
            },
            ManualOutputHandle { shared },
        )
    }
}

impl AudioOutput for ManualOutput {
    fn hardware_channels(&self) -> Result<u16> {
        Ok(self.shared.hardware_channels.load(Ordering::Acquire))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, graph: RenderGraph) -> Result<()> {
        *self.shared.graph.lock() = Some(graph);
        Ok(())
    }

    fn stop(&mut self) -> Option<RenderGraph> {
        self.shared.graph.lock().take()
    }

    fn is_running(&self) -> bool {
        self.shared.graph.lock().is_some()
    }
}

impl ManualOutputHandle {
    /// Render `frames` frames, interleaved at the graph's channel count.
    ///
    /// Returns an empty buffer while the transport is stopped.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut graph = self.shared.graph.lock();
        let Some(graph) = graph.as_mut() else {
            return Vec::new();
        };
        let mut buffer = vec![0.0; frames * graph.channels()];
        graph.render(&mut buffer);
        buffer
    }

    /// Channels of the running graph.
    pub fn channels(&self) -> Option<usize> {
        self.shared.graph.lock().as_ref().map(RenderGraph::channels)
    }

    /// Simulate the device changing under the engine.
    pub fn set_hardware_channels(&self, channels: u16) {
        self.shared
            .hardware_channels
            .store(channels, Ordering::Release);
    }
}
