use crate::spatial::{ReverbParams, ReverbPreset};

const COMB_COUNT: usize = 4;
const ALLPASS_COUNT: usize = 2;
const ALLPASS_GAIN: f32 = 0.5;
const ALLPASS_DELAYS_MS: [f32; ALLPASS_COUNT] = [5.0, 1.7];
// Longest comb of any preset; lines are sized for it so presets switch without allocating.
const MAX_COMB_DELAY_MS: f32 = 60.0;

struct PresetShape {
    comb_delays_ms: [f32; COMB_COUNT],
    feedback: f32,
    damping: f32,
}

fn shape(preset: ReverbPreset) -> PresetShape {
    match preset {
        ReverbPreset::SmallRoom => PresetShape {
            comb_delays_ms: [23.1, 26.9, 31.3, 34.7],
            feedback: 0.62,
            damping: 0.35,
        },
        ReverbPreset::MediumHall => PresetShape {
            comb_delays_ms: [29.7, 37.1, 41.1, 43.7],
            feedback: 0.76,
            damping: 0.25,
        },
        ReverbPreset::LargeHall => PresetShape {
            comb_delays_ms: [35.3, 41.9, 47.7, 53.1],
            feedback: 0.84,
            damping: 0.2,
        },
    }
}

struct Comb {
    line: Vec<f32>,
    len: usize,
    cursor: usize,
    filter_state: f32,
}

impl Comb {
    fn process(&mut self, input: f32, feedback: f32, damping: f32) -> f32 {
        let output = self.line[self.cursor];
        self.filter_state = output * (1.0 - damping) + self.filter_state * damping;
        self.line[self.cursor] = input + self.filter_state * feedback;
        self.cursor = (self.cursor + 1) % self.len;
        output
    }
}

struct Allpass {
    line: Vec<f32>,
    cursor: usize,
}

impl Allpass {
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.line[self.cursor];
        let output = delayed - input;
        self.line[self.cursor] = input + delayed * ALLPASS_GAIN;
        self.cursor = (self.cursor + 1) % self.line.len();
        output
    }
}

/// Global environment reverb: parallel damped combs into series allpasses.
///
/// Input is the mono sum of every player's reverb send. Each comb feeds one output
/// channel (round robin) so wide layouts get a decorrelated tail.
pub struct Reverb {
    combs: [Comb; COMB_COUNT],
    allpasses: [Allpass; ALLPASS_COUNT],
    feedback: f32,
    damping: f32,
    level: f32,
}

impl Reverb {
    pub fn new(sample_rate: u32, params: &ReverbParams) -> Self {
        let samples_for = |ms: f32| ((ms / 1000.0) * sample_rate as f32).ceil().max(1.0) as usize;
        let max_len = samples_for(MAX_COMB_DELAY_MS);

        let combs = std::array::from_fn(|_| Comb {
            line: vec![0.0; max_len],
            len: max_len,
            cursor: 0,
            filter_state: 0.0,
        });
        let allpasses = std::array::from_fn(|i| Allpass {
            line: vec![0.0; samples_for(ALLPASS_DELAYS_MS[i])],
            cursor: 0,
        });

        let mut reverb = Self {
            combs,
            allpasses,
            feedback: 0.0,
            damping: 0.0,
            level: 0.0,
        };
        reverb.set_params(sample_rate, params);
        reverb
    }

    /// Switch preset and level. Only resizes the active window of each delay line.
    pub fn set_params(&mut self, sample_rate: u32, params: &ReverbParams) {
        let preset = shape(params.preset);
        for (comb, delay_ms) in self.combs.iter_mut().zip(preset.comb_delays_ms) {
            let len = ((delay_ms / 1000.0) * sample_rate as f32) as usize;
            comb.len = len.clamp(1, comb.line.len());
            comb.cursor %= comb.len;
        }
        self.feedback = preset.feedback;
        self.damping = preset.damping;
        self.level = params.level();
    }

    pub fn is_active(&self) -> bool {
        self.level > 0.0
    }

    /// Mix the tail for `send` (mono, one sample per frame) into interleaved `output`.
    pub fn process(&mut self, send: &[f32], output: &mut [f32], channels: usize) {
        if !self.is_active() || channels == 0 {
            return;
        }

        for (frame, &input) in output.chunks_mut(channels).zip(send) {
            let mut taps = [0.0f32; COMB_COUNT];
            for (tap, comb) in taps.iter_mut().zip(self.combs.iter_mut()) {
                *tap = comb.process(input, self.feedback, self.damping);
            }

            let mut sum: f32 = taps.iter().sum::<f32>() / COMB_COUNT as f32;
            for allpass in self.allpasses.iter_mut() {
                sum = allpass.process(sum);
            }

            for (channel, sample) in frame.iter_mut().enumerate() {
                // Blend the diffused sum with one comb per channel for width.
                let colour = taps[channel % COMB_COUNT];
                *sample += (sum * 0.7 + colour * 0.3) * self.level;
            }
        }
    }

    /// Silence all delay lines.
    pub fn reset(&mut self) {
        for comb in self.combs.iter_mut() {
            comb.line.fill(0.0);
            comb.filter_state = 0.0;
        }
        for allpass in self.allpasses.iter_mut() {
            allpass.line.fill(0.0);
        }
    }
}
