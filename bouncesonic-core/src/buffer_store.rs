//! Cue buffer cache.
//!
//! Cues are registered by logical name, decoded once, conformed to the engine
//! sample rate and then shared read-only by every player.

use crate::audio_data::{AudioDataLoader, BounceSonicAudioData, ConvertToMono, LoadOptions};
use crate::error::{BounceSonicError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Logical name of the collision cue
pub const COLLISION_CUE: &str = "collision";
/// Logical name of the launch cue
pub const LAUNCH_CUE: &str = "launch";

#[derive(Debug, Clone)]
struct CueAsset {
    path: String,
    options: LoadOptions,
}

pub struct BufferStore {
    loader: Arc<dyn AudioDataLoader>,
    sample_rate: u32,
    assets: HashMap<String, CueAsset>,
    cache: HashMap<String, Arc<BounceSonicAudioData>>,
}

impl BufferStore {
    pub fn new(loader: Arc<dyn AudioDataLoader>, sample_rate: u32) -> Self {
        Self {
            loader,
            sample_rate,
            assets: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Register `path` under `name`, keeping the file's channels.
    pub fn register(&mut self, name: &str, path: &str) {
        self.register_with_options(name, path, LoadOptions::default());
    }

    /// Register `path` under `name`. Re-registering drops any cached buffer for the name.
    pub fn register_with_options(&mut self, name: &str, path: &str, options: LoadOptions) {
        let options = options.target_sample_rate(self.sample_rate);
        self.assets.insert(
            name.to_string(),
            CueAsset {
                path: path.to_string(),
                options,
            },
        );
        if self.cache.remove(name).is_some() {
            log::debug!("Cue '{}' re-registered, cached buffer dropped", name);
        }
    }

    /// Register the engine's two cues. The collision cue is folded to mono since
    /// it is positioned by the environment.
    pub fn register_cues(&mut self, collision_path: &str, launch_path: &str) {
        self.register_with_options(
            COLLISION_CUE,
            collision_path,
            LoadOptions::new().convert_to_mono(ConvertToMono::ForceMono),
        );
        self.register(LAUNCH_CUE, launch_path);
    }

    /// Decode the cue registered as `name`, or return the cached buffer.
    ///
    /// # Errors
    ///
    /// `AssetLoad` if the name is unknown, the loader fails, or the decoded buffer
    /// is empty or has an unsupported channel count.
    pub fn load(&mut self, name: &str) -> Result<Arc<BounceSonicAudioData>> {
        if let Some(buffer) = self.cache.get(name) {
            return Ok(buffer.clone());
        }

        let asset = self
            .assets
            .get(name)
            .ok_or_else(|| BounceSonicError::asset_load(name, "no asset registered"))?;

        let loaded = self
            .loader
            .load(&asset.path, &asset.options)
            .map_err(|e| BounceSonicError::asset_load(name, e.to_string()))?;
        let buffer = loaded
            .conform(&asset.options)
            .map_err(|e| BounceSonicError::asset_load(name, e.to_string()))?;
        buffer
            .validate()
            .map_err(|e| BounceSonicError::asset_load(name, e.to_string()))?;

        log::info!(
            "Loaded cue '{}' from {} ({} frames, {} ch, {} Hz)",
            name,
            asset.path,
            buffer.total_frames(),
            buffer.channels(),
            buffer.sample_rate()
        );

        let buffer = Arc::new(buffer);
        self.cache.insert(name.to_string(), buffer.clone());
        Ok(buffer)
    }

    pub fn get(&self, name: &str) -> Option<Arc<BounceSonicAudioData>> {
        self.cache.get(name).cloned()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    pub fn loaded_count(&self) -> usize {
        self.cache.len()
    }

    /// Drop every cached buffer. Registrations stay, so the next `load` decodes again.
    pub fn clear(&mut self) {
        if !self.cache.is_empty() {
            log::debug!("Releasing {} cue buffers", self.cache.len());
        }
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryLoader;

    fn store_with(loader: Arc<MemoryLoader>) -> BufferStore {
        let mut store = BufferStore::new(loader, 48000);
        store.register_cues("bounce.wav", "launch.wav");
        store
    }

    #[test]
    fn test_second_load_is_cached() {
        let loader = Arc::new(MemoryLoader::with_default_cues());
        let mut store = store_with(loader.clone());

        let first = store.load(COLLISION_CUE).unwrap();
        let second = store.load(COLLISION_CUE).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.load_count(), 1);
    }

    #[test]
    fn test_collision_cue_is_mono() {
        let loader = Arc::new(MemoryLoader::new().with_stereo("bounce.wav", 480, 48000));
        let mut store = store_with(loader);
        let buffer = store.load(COLLISION_CUE).unwrap();
        assert_eq!(buffer.channels(), 1);
        assert_eq!(buffer.total_frames(), 480);
    }

    #[test]
    fn test_buffers_are_brought_to_engine_rate() {
        let loader = Arc::new(MemoryLoader::new().with_mono("launch.wav", 2400, 24000));
        let mut store = store_with(loader);
        let buffer = store.load(LAUNCH_CUE).unwrap();
        assert_eq!(buffer.sample_rate(), 48000);
        assert_eq!(buffer.total_frames(), 4800);
    }

    #[test]
    fn test_missing_asset_is_asset_load_error() {
        let loader = Arc::new(MemoryLoader::new());
        let mut store = store_with(loader);
        let err = store.load(LAUNCH_CUE).unwrap_err();
        assert!(matches!(err, BounceSonicError::AssetLoad { ref name, .. } if name == LAUNCH_CUE));
        assert!(!store.is_loaded(LAUNCH_CUE));
    }

    #[test]
    fn test_unregistered_name_is_asset_load_error() {
        let mut store = BufferStore::new(Arc::new(MemoryLoader::new()), 48000);
        assert!(matches!(
            store.load("thunder"),
            Err(BounceSonicError::AssetLoad { .. })
        ));
    }

    #[test]
    fn test_malformed_buffers_are_rejected() {
        let loader = Arc::new(
            MemoryLoader::new()
                .with_mono("bounce.wav", 0, 48000)
                .with_channels("launch.wav", 6, 480, 48000),
        );
        let mut store = store_with(loader);
        assert!(matches!(
            store.load(COLLISION_CUE),
            Err(BounceSonicError::AssetLoad { .. })
        ));
        assert!(matches!(
            store.load(LAUNCH_CUE),
            Err(BounceSonicError::AssetLoad { .. })
        ));
        assert_eq!(store.loaded_count(), 0);
    }

    #[test]
    fn test_clear_releases_buffers() {
        let loader = Arc::new(MemoryLoader::with_default_cues());
        let mut store = store_with(loader.clone());
        let weak = Arc::downgrade(&store.load(LAUNCH_CUE).unwrap());
        assert_eq!(store.loaded_count(), 1);

        store.clear();
        assert_eq!(store.loaded_count(), 0);
        assert!(weak.upgrade().is_none());

        // Registration survives, so the cue decodes again.
        store.load(LAUNCH_CUE).unwrap();
        assert_eq!(loader.load_count(), 2);
    }
}
