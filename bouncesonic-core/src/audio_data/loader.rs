use crate::audio_data::{BounceSonicAudioData, LoadOptions};
use crate::error::Result;
use std::sync::Arc;

/// Trait for loading cue assets from a path.
///
/// The engine decodes through [`DefaultAudioLoader`](super::DefaultAudioLoader)
/// unless a host supplies its own, e.g. to read from an archive or to synthesise
/// cues. Loaders are shared with the engine, hence `Send + Sync`.
///
/// Loaders should honour `options`, but the buffer store conforms whatever comes
/// back to the requested channel handling and sample rate regardless.
///
/// # Example
///
/// ```ignore
/// use bouncesonic_core::audio_data::{AudioDataLoader, BounceSonicAudioData, LoadOptions};
/// use bouncesonic_core::error::Result;
/// use std::sync::Arc;
///
/// struct Silence;
///
/// impl AudioDataLoader for Silence {
///     fn load(&self, _path: &str, _options: &LoadOptions) -> Result<Arc<BounceSonicAudioData>> {
///         Ok(Arc::new(BounceSonicAudioData::from_samples(vec![0.0; 480], 48000, 1)?))
///     }
/// }
/// ```
pub trait AudioDataLoader: Send + Sync {
    /// # Errors
    ///
    /// Returns a `BounceSonicError` if the asset cannot be found or decoded.
    fn load(&self, path: &str, options: &LoadOptions) -> Result<Arc<BounceSonicAudioData>>;
}
