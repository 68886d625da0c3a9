/// Channel handling applied after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertToMono {
    /// Keep the file's channels
    Original,
    /// Average every frame down to one channel. Used for cues that get spatialised.
    ForceMono,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub convert_to_mono: ConvertToMono,
    /// Resample to this rate after decoding. `None` keeps the file's rate.
    pub target_sample_rate: Option<u32>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            convert_to_mono: ConvertToMono::Original,
            target_sample_rate: None,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert_to_mono(mut self, convert: ConvertToMono) -> Self {
        self.convert_to_mono = convert;
        self
    }

    pub fn target_sample_rate(mut self, sample_rate: u32) -> Self {
        self.target_sample_rate = Some(sample_rate);
        self
    }
}
