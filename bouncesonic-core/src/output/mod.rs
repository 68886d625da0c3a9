//! Audio transports.
//!
//! A transport drives a [`RenderGraph`]: it decides when blocks are rendered and
//! where the samples go. The engine starts a transport with a graph and gets the
//! graph back on stop, which is how layout changes keep every voice and
//! attachment across a restart.

mod cpal_output;
mod manual;

pub use cpal_output::CpalOutput;
pub use manual::{ManualOutput, ManualOutputHandle};

use crate::error::Result;
use crate::mixer::RenderGraph;

pub trait AudioOutput: Send {
    /// Output channels of the device the transport will play on.
    fn hardware_channels(&self) -> Result<u16>;

    fn sample_rate(&self) -> u32;

    /// Start rendering `graph`. On failure the graph is kept and handed back by
    /// the next `stop()`.
    fn start(&mut self, graph: RenderGraph) -> Result<()>;

    /// Halt rendering and return the graph. Returns `None` if nothing was started.
    fn stop(&mut self) -> Option<RenderGraph>;

    fn is_running(&self) -> bool;
}

/// Copy interleaved `source` frames into `target` frames with a different channel count.
///
/// Mono sources are spread to the first two target channels, wider sources
/// are folded down to mono by averaging. Otherwise channels map one to one and
/// the rest are silent.
pub fn fold_channels(source: &[f32], source_channels: usize, target: &mut [f32], target_channels: usize) {
    if source_channels == 0 || target_channels == 0 {
        target.fill(0.0);
        return;
    }
    if source_channels == target_channels {
        let len = source.len().min(target.len());
        target[..len].copy_from_slice(&source[..len]);
        target[len..].fill(0.0);
        return;
    }

    for (src, dst) in source
        .chunks(source_channels)
        .zip(target.chunks_mut(target_channels))
    {
        dst.fill(0.0);
        if target_channels == 1 {
            dst[0] = src.iter().sum::<f32>() / source_channels as f32;
        } else if source_channels == 1 {
            dst[0] = src[0];
            dst[1] = src[0];
        } else {
            let shared = source_channels.min(target_channels);
            dst[..shared].copy_from_slice(&src[..shared]);
        }
    }
}
