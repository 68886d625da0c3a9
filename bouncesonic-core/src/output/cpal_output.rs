use crate::error::{BounceSonicError, Result};
use crate::mixer::{RenderEvent, RenderGraph};
use crate::output::{AudioOutput, fold_channels};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::Sender;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, Thread};
use std::time::Duration;

/// Blocks of headroom kept in the ring between the render thread and the device
const RING_BLOCKS: usize = 4;

/// Plays the graph on the default cpal output device.
///
/// Three contexts are involved: the control plane calls `start`/`stop`, a
/// dedicated render thread owns the graph and the cpal stream and renders fixed
/// blocks into a ring buffer, and the device callback only pops from the ring
/// and wakes the render thread. The device callback never locks or renders.
pub struct CpalOutput {
    sample_rate: u32,
    block_size: usize,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<RenderGraph>>,
    parked: Option<RenderGraph>,
}

impl CpalOutput {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size: block_size.max(1),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            parked: None,
        }
    }

    fn default_device() -> Result<cpal::Device> {
        cpal::default_host()
            .default_output_device()
            .ok_or_else(|| BounceSonicError::AudioDevice("No default output device available".into()))
    }
}

impl AudioOutput for CpalOutput {
    fn hardware_channels(&self) -> Result<u16> {
        let config = Self::default_device()?
            .default_output_config()
            .map_err(|e| BounceSonicError::AudioDevice(format!("Failed to get default config: {}", e)))?;
        Ok(config.channels())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, graph: RenderGraph) -> Result<()> {
        if self.thread.is_some() {
            self.parked = Some(graph);
            return Err(BounceSonicError::Engine("Output is already running".into()));
        }

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u16>>(1);
        let running = self.running.clone();
        running.store(true, Ordering::Release);
        let sample_rate = self.sample_rate;
        let block_size = self.block_size;

        let spawned = std::thread::Builder::new()
            .name("bouncesonic-render".into())
            .spawn(move || render_thread(graph, sample_rate, block_size, running, ready_tx));
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(BounceSonicError::Engine(format!(
                    "Failed to spawn render thread: {}",
                    e
                )));
            }
        };

        let outcome = ready_rx.recv().unwrap_or_else(|_| {
            Err(BounceSonicError::Engine("Render thread exited during startup".into()))
        });
        match outcome {
            Ok(device_channels) => {
                log::info!(
                    "Output stream started: {} Hz, {} device channels, {} frame blocks",
                    self.sample_rate,
                    device_channels,
                    self.block_size
                );
                self.thread = Some(thread);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                match thread.join() {
                    Ok(graph) => self.parked = Some(graph),
                    Err(_) => log::error!("Render thread panicked during startup"),
                }
                Err(e)
            }
        }
    }

    fn stop(&mut self) -> Option<RenderGraph> {
        self.running.store(false, Ordering::Release);
        let Some(thread) = self.thread.take() else {
            return self.parked.take();
        };
        thread.thread().unpark();
        match thread.join() {
            Ok(graph) => {
                log::info!("Output stream stopped");
                Some(graph)
            }
            Err(_) => {
                log::error!("Render thread panicked");
                None
            }
        }
    }

    fn is_running(&self) -> bool {
        self.thread.is_some() && self.running.load(Ordering::Acquire)
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Owns the graph and the stream for one run. Returns the graph when stopped.
fn render_thread(
    mut graph: RenderGraph,
    sample_rate: u32,
    block_size: usize,
    running: Arc<AtomicBool>,
    ready: Sender<Result<u16>>,
) -> RenderGraph {
    let graph_channels = graph.channels();
    let errors = graph.event_sender();

    let (device_channels, mut producer, stream) =
        match open_stream(sample_rate, block_size, std::thread::current(), errors) {
            Ok(opened) => opened,
            Err(e) => {
                let _ = ready.send(Err(e));
                return graph;
            }
        };
    let _ = ready.send(Ok(device_channels));
    let device_channels = device_channels as usize;

    let mut block = vec![0.0f32; block_size * graph_channels];
    let mut device_block = vec![0.0f32; block_size * device_channels];
    let mut pending = 0..0;

    while running.load(Ordering::Acquire) {
        if pending.is_empty() {
            graph.render(&mut block);
            fold_channels(&block, graph_channels, &mut device_block, device_channels);
            pending = 0..device_block.len();
        }

        let pushed = producer.push_slice(&device_block[pending.clone()]);
        pending.start += pushed;

        if !pending.is_empty() || producer.vacant_len() < device_block.len() {
            std::thread::park_timeout(Duration::from_millis(5));
        }
    }

    drop(stream);
    graph
}

type StreamParts = (u16, ringbuf::HeapProd<f32>, cpal::Stream);

fn open_stream(
    sample_rate: u32,
    block_size: usize,
    render_thread: Thread,
    errors: Sender<RenderEvent>,
) -> Result<StreamParts> {
    let device = CpalOutput::default_device()?;
    let default_config = device
        .default_output_config()
        .map_err(|e| BounceSonicError::AudioDevice(format!("Failed to get default config: {}", e)))?;

    let channels = default_config.channels();
    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let ring = HeapRb::<f32>::new(block_size * channels as usize * RING_BLOCKS);
    let (producer, consumer) = ring.split();

    let stream = match default_config.sample_format() {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &config, consumer, render_thread, errors)?
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(&device, &config, consumer, render_thread, errors)?
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(&device, &config, consumer, render_thread, errors)?
        }
        other => {
            return Err(BounceSonicError::AudioFormat(format!(
                "Unsupported sample format: {:?}",
                other
            )));
        }
    };

    stream
        .play()
        .map_err(|e| BounceSonicError::AudioDevice(format!("Failed to start stream: {}", e)))?;

    Ok((channels, producer, stream))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<f32>,
    render_thread: Thread,
    errors: Sender<RenderEvent>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    // Sized for the common callback lengths; grows once if the device asks for more.
    let mut scratch = vec![0.0f32; 4096];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let popped = consumer.pop_slice(&mut scratch[..data.len()]);
                scratch[popped..data.len()].fill(0.0);
                let len = data.len();
                for (sample, &value) in data.iter_mut().zip(&scratch[..len]) {
                    *sample = T::from_sample(value);
                }
                render_thread.unpark();
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
                let _ = errors.try_send(RenderEvent::StreamError(err.to_string()));
            },
            None,
        )
        .map_err(|e| BounceSonicError::AudioDevice(format!("Failed to build stream: {}", e)))
}
