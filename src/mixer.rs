use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use crate::{
    constants::{BUFFER_COUNT, BUFFER_DURATION_US, CHANNELS, DEFAULT_MASTER_VOLUME, SAMPLE_RATE},
    sound::{Playhead, Sound},
    wave_ring::WaveRing,
};

/// Output rate and ring layout of the mixer. The mix is always interleaved stereo.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MixerConfig {
    pub sample_rate: u32,
    pub buffer_count: usize,
    pub buffer_duration_us: u64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            buffer_count: BUFFER_COUNT,
            buffer_duration_us: BUFFER_DURATION_US,
        }
    }
}

impl MixerConfig {
    pub fn samples_per_channel(&self) -> usize {
        (u64::from(self.sample_rate) * self.buffer_duration_us / 1_000_000) as usize
    }

    pub fn samples_total(&self) -> usize {
        self.samples_per_channel() * CHANNELS as usize
    }
}

/// A playing instance of a sound. `next_position` counts frames of the sound itself, so it
/// only matches output frames when the rates agree.
struct SoundBuffer {
    sound: Sound,
    volume: f32,
    next_position: Playhead,
}

struct MixerState {
    master_volume: f32,
    sample_rate: u32,
    buffers: Vec<SoundBuffer>,
}

pub struct Mixer {
    state: Mutex<MixerState>,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(DEFAULT_MASTER_VOLUME)
    }
}

impl Mixer {
    pub fn new(master_volume: f32) -> Self {
        Self::with_sample_rate(master_volume, SAMPLE_RATE)
    }

    /// A mixer producing `sample_rate` frames per second. Sounds recorded at another rate are
    /// resampled while mixing.
    pub fn with_sample_rate(master_volume: f32, sample_rate: u32) -> Self {
        Self {
            state: Mutex::new(MixerState {
                master_volume: clamp_volume(master_volume),
                sample_rate,
                buffers: Vec::new(),
            }),
        }
    }

    pub fn start(&self, sound: &Sound, volume: f32) {
        let buffer = SoundBuffer {
            sound: sound.clone(),
            volume: clamp_volume(volume),
            next_position: Playhead::default(),
        };
        sound.inc_playing();
        self.lock().buffers.push(buffer);
    }

    /// Stops every playing instance of `sound`. Does nothing if it isn't playing.
    pub fn stop(&self, sound: &Sound) {
        let mut state = self.lock();
        let mut idx = 0;
        while idx < state.buffers.len() {
            if state.buffers[idx].sound.same_asset(sound) {
                let stopped = state.buffers.swap_remove(idx);
                stopped.sound.dec_playing();
            } else {
                idx += 1;
            }
        }
    }

    pub fn set_volume(&self, sound: &Sound, volume: f32) {
        let volume = clamp_volume(volume);
        let mut state = self.lock();
        for buffer in state.buffers.iter_mut() {
            if buffer.sound.same_asset(sound) {
                buffer.volume = volume;
            }
        }
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.lock().master_volume = clamp_volume(volume);
    }

    pub fn master_volume(&self) -> f32 {
        self.lock().master_volume
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    /// Changes the output rate, for when the device can't run at the configured one.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.lock().sample_rate = sample_rate;
    }

    pub fn active_count(&self) -> usize {
        self.lock().buffers.len()
    }

    /// Runs one mixer cycle: blends every active buffer into `out` (interleaved stereo) and drops
    /// the buffers that ran out of samples.
    pub fn mix(&self, buffers: &mut MixBuffers, out: &mut [i16]) {
        let MixBuffers {
            mix,
            scratch,
            samples_per_channel,
        } = buffers;
        for acc in mix.iter_mut() {
            *acc = 0;
        }

        let master_volume = {
            let mut state = self.lock();
            let state = &mut *state;
            let output_rate = state.sample_rate;
            let mut idx = 0;
            while idx < state.buffers.len() {
                let buffer = &mut state.buffers[idx];
                let sound_rate = buffer.sound.sample_rate();
                let produced = if sound_rate == output_rate || sound_rate == 0 || output_rate == 0 {
                    let produced = buffer.sound.stream_out(
                        buffer.next_position.position,
                        *samples_per_channel,
                        scratch,
                    );
                    buffer.next_position.position += produced;
                    produced
                } else {
                    let step = sound_rate as f32 / output_rate as f32;
                    buffer.sound.stream_out_resampled(
                        &mut buffer.next_position,
                        step,
                        *samples_per_channel,
                        scratch,
                    )
                };
                for (acc, sample) in mix.iter_mut().zip(&scratch[..produced * 2]) {
                    *acc = acc.saturating_add((f32::from(*sample) * buffer.volume) as i32);
                }

                if produced == 0
                    || buffer.next_position.position >= buffer.sound.duration_samples()
                {
                    // the swapped-in buffer is examined on the next pass at the same index
                    let finished = state.buffers.swap_remove(idx);
                    finished.sound.dec_playing();
                } else {
                    idx += 1;
                }
            }
            state.master_volume
        };

        for (i, sample) in out.iter_mut().enumerate() {
            *sample = match mix.get(i) {
                Some(acc) => (*acc as f32 * master_volume).max(-32767.).min(32767.) as i16,
                None => 0,
            };
        }
    }

    fn lock(&self) -> MutexGuard<'_, MixerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scratch space owned by the mixer thread, reused every cycle.
pub struct MixBuffers {
    mix: Vec<i32>,
    scratch: Vec<i16>,
    samples_per_channel: usize,
}

impl MixBuffers {
    pub fn new(samples_per_channel: usize) -> Self {
        Self {
            mix: vec![0; samples_per_channel * CHANNELS as usize],
            scratch: vec![0; samples_per_channel * CHANNELS as usize],
            samples_per_channel,
        }
    }
}

/// Starts the mixer thread. It fills the ring's slots in order, waiting for each to be played
/// before refilling it, until the ring is closed.
pub fn spawn_mixer_thread(
    mixer: Arc<Mixer>,
    ring: Arc<WaveRing>,
    samples_per_channel: usize,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("sound-mixer".into())
        .spawn(move || {
            log::debug!("Sound mixer thread started");
            let slot_count = ring.len();
            let mut buffers = MixBuffers::new(samples_per_channel);
            let mut idx = 0;
            while let Some(mut samples) = ring.claim(idx) {
                mixer.mix(&mut buffers, &mut samples);
                ring.submit(idx, samples);
                idx = (idx + 1) % slot_count;
            }
            log::debug!("Sound mixer thread finished");
        })
}

fn clamp_volume(volume: f32) -> f32 {
    volume.max(0.).min(1.)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn constant(value: i16, frames: usize) -> Sound {
        Sound::from_stereo(vec![value; frames * 2], SAMPLE_RATE)
    }

    fn cycle(mixer: &Mixer, buffers: &mut MixBuffers, frames: usize) -> Vec<i16> {
        let mut out = vec![0; frames * 2];
        mixer.mix(buffers, &mut out);
        out
    }

    #[test]
    fn default_config_matches_ten_millisecond_buffers() {
        let config = MixerConfig::default();
        assert_eq!(config.samples_per_channel(), 441);
        assert_eq!(config.samples_total(), 882);
        assert_eq!(config.buffer_count, 10);
        assert_eq!(Mixer::default().master_volume(), DEFAULT_MASTER_VOLUME);
    }

    #[test]
    fn start_and_stop_track_active_buffers() {
        let mixer = Mixer::new(1.);
        let a = constant(10, 100);
        let b = constant(20, 100);

        mixer.start(&a, 1.);
        mixer.start(&a, 0.5);
        mixer.start(&b, 1.);
        assert_eq!(mixer.active_count(), 3);
        assert_eq!(a.playing_count(), 2);

        mixer.stop(&a);
        assert_eq!(mixer.active_count(), 1);
        assert!(!a.is_playing());
        assert!(b.is_playing());

        mixer.stop(&b);
        mixer.stop(&b);
        assert_eq!(mixer.active_count(), 0);
        assert_eq!(b.playing_count(), 0);
    }

    #[test]
    fn stopping_an_idle_sound_is_a_no_op() {
        let mixer = Mixer::new(1.);
        let playing = constant(10, 100);
        let idle = constant(10, 100);
        mixer.start(&playing, 1.);

        mixer.stop(&idle);
        assert_eq!(mixer.active_count(), 1);
        assert_eq!(idle.playing_count(), 0);

        let mut buffers = MixBuffers::new(2);
        assert_eq!(cycle(&mixer, &mut buffers, 2), vec![10; 4]);
    }

    #[test]
    fn zero_master_volume_is_silent() {
        let mixer = Mixer::new(0.);
        mixer.start(&constant(i16::max_value(), 10), 1.);
        mixer.start(&constant(i16::min_value(), 10), 0.3);
        mixer.start(&constant(1234, 10), 0.8);

        let mut buffers = MixBuffers::new(4);
        assert!(cycle(&mixer, &mut buffers, 4).iter().all(|s| *s == 0));
    }

    #[test]
    fn output_is_clamped() {
        let mixer = Mixer::new(1.);
        for _ in 0..8 {
            mixer.start(&constant(30000, 10), 1.);
            mixer.start(&constant(-30000, 4), 1.);
            mixer.start(&constant(-30000, 4), 1.);
        }

        let mut buffers = MixBuffers::new(2);
        let out = cycle(&mixer, &mut buffers, 2);
        assert!(out.iter().all(|s| *s == -32767));

        mixer.set_master_volume(2.);
        assert_eq!(mixer.master_volume(), 1.);
        cycle(&mixer, &mut buffers, 2);
        let out = cycle(&mixer, &mut buffers, 2);
        assert!(out.iter().all(|s| *s == 32767));
    }

    #[test]
    fn buffer_is_removed_once_its_sound_ends() {
        let mixer = Mixer::new(1.);
        let sound = Sound::from_mono(&[100, -200, 300], SAMPLE_RATE);
        mixer.start(&sound, 1.);

        let mut buffers = MixBuffers::new(1);
        assert_eq!(cycle(&mixer, &mut buffers, 1), vec![100, 100]);
        assert_eq!(mixer.active_count(), 1);
        assert_eq!(cycle(&mixer, &mut buffers, 1), vec![-200, -200]);
        assert_eq!(mixer.active_count(), 1);
        assert_eq!(cycle(&mixer, &mut buffers, 1), vec![300, 300]);
        assert_eq!(mixer.active_count(), 0);
        assert!(!sound.is_playing());

        assert_eq!(cycle(&mixer, &mut buffers, 1), vec![0, 0]);
    }

    #[test]
    fn half_volume_buffers_sum() {
        let mixer = Mixer::new(1.);
        mixer.start(&constant(1000, 10), 0.5);
        mixer.start(&constant(1000, 10), 0.5);

        let mut buffers = MixBuffers::new(3);
        assert_eq!(cycle(&mixer, &mut buffers, 3), vec![1000; 6]);

        mixer.set_master_volume(0.5);
        assert_eq!(cycle(&mixer, &mut buffers, 3), vec![500; 6]);
    }

    #[test]
    fn empty_sound_is_dropped_on_first_cycle() {
        let mixer = Mixer::new(1.);
        let empty = Sound::from_stereo(Vec::new(), SAMPLE_RATE);
        mixer.start(&empty, 1.);
        mixer.start(&constant(5, 10), 1.);

        let mut buffers = MixBuffers::new(2);
        assert_eq!(cycle(&mixer, &mut buffers, 2), vec![5; 4]);
        assert_eq!(mixer.active_count(), 1);
        assert!(!empty.is_playing());
    }

    #[test]
    fn removal_does_not_skip_swapped_buffer() {
        let mixer = Mixer::new(1.);
        mixer.start(&constant(1, 1), 1.);
        mixer.start(&constant(10, 5), 1.);
        mixer.start(&constant(100, 1), 1.);

        let mut buffers = MixBuffers::new(1);
        assert_eq!(cycle(&mixer, &mut buffers, 1), vec![111, 111]);
        assert_eq!(mixer.active_count(), 1);
        assert_eq!(cycle(&mixer, &mut buffers, 1), vec![10, 10]);
    }

    #[test]
    fn sound_at_half_rate_lasts_its_full_duration() {
        let mixer = Mixer::new(1.);
        let sound = Sound::from_stereo(vec![1000; 220 * 2], 22050);
        mixer.start(&sound, 1.);

        let mut buffers = MixBuffers::new(441);
        let out = cycle(&mixer, &mut buffers, 441);
        assert!(out[..880].iter().all(|s| *s == 1000));
        assert_eq!(&out[880..], &[0, 0]);
        assert_eq!(mixer.active_count(), 0);
        assert!(!sound.is_playing());
    }

    #[test]
    fn output_rate_can_follow_the_device() {
        let mixer = Mixer::with_sample_rate(1., 48000);
        assert_eq!(mixer.sample_rate(), 48000);
        let sound = Sound::from_stereo(vec![10; 8 * 2], 24000);
        mixer.start(&sound, 1.);

        let mut buffers = MixBuffers::new(8);
        assert_eq!(cycle(&mixer, &mut buffers, 8), vec![10; 16]);
        assert_eq!(mixer.active_count(), 1);

        mixer.set_sample_rate(24000);
        let out = cycle(&mixer, &mut buffers, 8);
        assert_eq!(&out[..8], &[10; 8]);
        assert_eq!(&out[8..], &[0; 8]);
        assert_eq!(mixer.active_count(), 0);
    }

    #[test]
    fn set_volume_applies_to_every_instance() {
        let mixer = Mixer::new(1.);
        let sound = constant(1000, 10);
        mixer.start(&sound, 1.);
        mixer.start(&sound, 1.);
        mixer.set_volume(&sound, 0.25);

        let mut buffers = MixBuffers::new(1);
        assert_eq!(cycle(&mixer, &mut buffers, 1), vec![500, 500]);
    }

    #[test]
    fn mixer_thread_feeds_the_ring() {
        let mixer = Arc::new(Mixer::new(1.));
        mixer.start(&constant(1000, 6), 1.);
        let ring = Arc::new(WaveRing::new(3, 8));
        let handle = spawn_mixer_thread(Arc::clone(&mixer), Arc::clone(&ring), 4).unwrap();

        let mut heard = 0;
        let mut out = [0i16; 8];
        for _ in 0..500 {
            ring.play(&mut out);
            heard += out.iter().filter(|s| **s == 1000).count();
            assert!(out.iter().all(|s| *s == 0 || *s == 1000));
            if heard == 12 && mixer.active_count() == 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(heard, 12);
        assert_eq!(mixer.active_count(), 0);

        ring.close();
        handle.join().unwrap();
    }
}
