use crate::audio_data::BounceSonicAudioData;
use std::sync::Arc;

/// Playback state of a one-shot voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Stopped,
}

/// Where a voice is within its buffer
#[derive(Debug, Clone)]
pub struct PlaybackInfo {
    /// Fractional read position in source frames
    pub cursor: f64,
    pub total_frames: usize,
    pub play_state: PlayState,
}

impl PlaybackInfo {
    pub fn new(total_frames: usize) -> Self {
        Self {
            cursor: 0.0,
            total_frames,
            play_state: PlayState::Stopped,
        }
    }

    pub fn current_frame(&self) -> usize {
        self.cursor as usize
    }

    pub fn is_finished(&self) -> bool {
        self.current_frame() >= self.total_frames
    }
}

/// One-shot player over a shared cue buffer.
///
/// Reads at a fractional `rate` with linear interpolation. Triggering a voice
/// that is still playing restarts it from the first frame.
#[derive(Debug)]
pub struct PlaybackInstance {
    pub audio_data: Arc<BounceSonicAudioData>,
    pub info: PlaybackInfo,
    gain: f32,
    rate: f64,
}

impl PlaybackInstance {
    pub fn new(audio_data: Arc<BounceSonicAudioData>) -> Self {
        let info = PlaybackInfo::new(audio_data.total_frames());
        Self {
            audio_data,
            info,
            gain: 1.0,
            rate: 1.0,
        }
    }

    /// Start from frame 0 with the given gain and rate.
    ///
    /// A non-finite or non-positive rate leaves the voice stopped.
    pub fn trigger(&mut self, gain: f32, rate: f32) {
        self.info.cursor = 0.0;
        if !(rate.is_finite() && rate > 0.0 && gain.is_finite()) {
            self.info.play_state = PlayState::Stopped;
            return;
        }
        self.gain = gain;
        self.rate = rate as f64;
        self.info.play_state = PlayState::Playing;
    }

    pub fn stop(&mut self) {
        self.info.play_state = PlayState::Stopped;
    }

    pub fn is_playing(&self) -> bool {
        self.info.play_state == PlayState::Playing
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn rate(&self) -> f32 {
        self.rate as f32
    }

    /// Read the next frame into `out`, one value per buffer channel, with gain applied.
    ///
    /// Returns false once the buffer runs dry; the voice is then stopped and
    /// `out` is left silent.
    #[inline]
    pub fn next_frame(&mut self, out: &mut [f32]) -> bool {
        out.fill(0.0);
        if !self.is_playing() {
            return false;
        }
        if self.info.is_finished() {
            self.stop();
            return false;
        }

        let frame = self.info.current_frame();
        let frac = (self.info.cursor - frame as f64) as f32;
        let channels = self.audio_data.channels() as usize;
        for (channel, sample) in out.iter_mut().enumerate().take(channels) {
            let a = self.audio_data.sample(frame, channel);
            let b = self.audio_data.sample(frame + 1, channel);
            *sample = (a + (b - a) * frac) * self.gain;
        }

        self.info.cursor += self.rate;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> Arc<BounceSonicAudioData> {
        let samples = (0..frames).map(|i| i as f32).collect();
        Arc::new(BounceSonicAudioData::from_samples(samples, 48000, 1).unwrap())
    }

    fn drain(voice: &mut PlaybackInstance) -> Vec<f32> {
        let mut out = [0.0f32; 2];
        let mut rendered = Vec::new();
        while voice.next_frame(&mut out) {
            rendered.push(out[0]);
        }
        rendered
    }

    #[test]
    fn test_unit_rate_reads_every_frame() {
        let mut voice = PlaybackInstance::new(ramp(8));
        voice.trigger(1.0, 1.0);
        assert_eq!(drain(&mut voice), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert!(!voice.is_playing());
    }

    #[test]
    fn test_fractional_rate_interpolates() {
        let mut voice = PlaybackInstance::new(ramp(4));
        voice.trigger(1.0, 0.5);
        let rendered = drain(&mut voice);
        assert_eq!(rendered.len(), 8);
        assert!((rendered[1] - 0.5).abs() < 1e-6);
        assert!((rendered[3] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_faster_rate_finishes_sooner() {
        let mut voice = PlaybackInstance::new(ramp(120));
        voice.trigger(1.0, 1.5);
        assert_eq!(drain(&mut voice).len(), 80);
    }

    #[test]
    fn test_retrigger_restarts_from_first_frame() {
        let mut voice = PlaybackInstance::new(ramp(16));
        voice.trigger(1.0, 1.0);
        let mut out = [0.0f32; 2];
        for _ in 0..10 {
            voice.next_frame(&mut out);
        }
        voice.trigger(0.5, 1.0);
        voice.next_frame(&mut out);
        assert_eq!(out[0], 0.0);
        voice.next_frame(&mut out);
        assert_eq!(out[0], 0.5);
        assert_eq!(voice.info.current_frame(), 2);
    }

    #[test]
    fn test_invalid_rate_is_silent() {
        let mut voice = PlaybackInstance::new(ramp(16));
        voice.trigger(1.0, f32::NAN);
        assert!(!voice.is_playing());
        assert!(drain(&mut voice).is_empty());
    }
}
