use std::{path::Path, sync::Arc};

use anyhow::{Context, Error};
use euclid::{default::Point2D, point2};
use rand::{rngs::SmallRng, SeedableRng};

use arctic::{
    constants::WHEEL_DELTA,
    fs::{directory_entries, does_directory_exist, Trivalent},
    input::{InputMessage, Key, KeyState},
    mixer::Mixer,
    sound::Sound,
};

const TONE_BASE_HZ: f32 = 220.;
const TONE_DURATION: f32 = 0.4;
const TONE_AMPLITUDE: f32 = 0.25;
const CLICK_DURATION: f32 = 0.08;
const CLICK_AMPLITUDE: f32 = 0.4;
const VOLUME_STEP: f32 = 0.05;
const MAX_SAMPLES: usize = 9;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PadAction {
    ToggleFullscreen,
    Quit,
}

/// Letters play tones a semitone apart, digits play the samples found in the data directory,
/// clicks play a noise burst louder towards the right edge.
pub struct SoundPad {
    mixer: Arc<Mixer>,
    tones: Vec<Sound>,
    samples: Vec<Sound>,
    click: Sound,
    cursor: Point2D<f32>,
}

impl SoundPad {
    pub fn new(mixer: Arc<Mixer>, sample_rate: u32) -> Self {
        let tones = (0..Key::LETTERS.len())
            .map(|i| {
                let frequency = TONE_BASE_HZ * 2f32.powf(i as f32 / 12.);
                Sound::tone(frequency, TONE_DURATION, TONE_AMPLITUDE, sample_rate)
            })
            .collect();
        let mut rng = SmallRng::from_entropy();
        let click = Sound::noise(&mut rng, CLICK_DURATION, CLICK_AMPLITUDE, sample_rate);

        Self {
            mixer,
            tones,
            samples: Vec::new(),
            click,
            cursor: point2(0.5, 0.5),
        }
    }

    /// Loads up to nine `.ogg` files from `dir` in name order. Files that fail to decode are
    /// skipped. A missing directory is not an error.
    pub fn load_samples(&mut self, dir: &Path) -> Result<usize, Error> {
        if does_directory_exist(dir) != Trivalent::True {
            log::info!("No sample directory at {}", dir.display());
            return Ok(0);
        }
        for entry in directory_entries(dir)? {
            if self.samples.len() == MAX_SAMPLES {
                break;
            }
            if entry.is_file != Trivalent::True || !entry.title.ends_with(".ogg") {
                continue;
            }
            let path = dir.join(&entry.title);
            let loaded = std::fs::read(&path)
                .map_err(Error::from)
                .and_then(|bytes| Sound::from_ogg(&bytes))
                .with_context(|| format!("Can't load {}", path.display()));
            match loaded {
                Ok(sound) => {
                    log::info!("Loaded {} as sample {}", entry.title, self.samples.len() + 1);
                    self.samples.push(sound);
                }
                Err(e) => log::warn!("{:#}", e),
            }
        }
        Ok(self.samples.len())
    }

    pub fn update(&mut self, inputs: &[InputMessage]) -> Vec<PadAction> {
        let mut actions = Vec::new();
        for input in inputs {
            match *input {
                InputMessage::Keyboard {
                    key: Key::Escape,
                    state: KeyState::Down,
                } => actions.push(PadAction::Quit),
                InputMessage::Keyboard {
                    key: Key::F11,
                    state: KeyState::Down,
                } => actions.push(PadAction::ToggleFullscreen),
                InputMessage::Keyboard {
                    key: Key::Space,
                    state: KeyState::Down,
                } => {
                    for sound in self.tones.iter().chain(&self.samples) {
                        self.mixer.stop(sound);
                    }
                }
                InputMessage::Keyboard {
                    key,
                    state: KeyState::Down,
                } => self.play_key(key),
                InputMessage::Mouse {
                    key,
                    state,
                    position,
                    wheel_delta,
                } => {
                    self.cursor = position;
                    if key == Some(Key::MouseLeft) && state == KeyState::Down {
                        self.mixer.start(&self.click, position.x);
                    }
                    if wheel_delta != 0 {
                        let volume = self.mixer.master_volume()
                            + wheel_delta as f32 / WHEEL_DELTA * VOLUME_STEP;
                        self.mixer.set_master_volume(volume);
                        log::debug!("Master volume {:.2}", self.mixer.master_volume());
                    }
                }
                _ => {}
            }
        }
        actions
    }

    /// Clear color following the cursor, brighter with more sounds playing.
    pub fn background(&self) -> [f32; 4] {
        let activity = (self.mixer.active_count() as f32 * 0.1).min(0.5);
        [
            0.2 + self.cursor.x * 0.5,
            0.2 + activity,
            0.2 + self.cursor.y * 0.5,
            1.0,
        ]
    }

    fn play_key(&self, key: Key) {
        if let Some(i) = key.letter_index() {
            self.mixer.start(&self.tones[i], 1.);
        } else if let Some(sample) = key
            .digit_index()
            .and_then(|d| d.checked_sub(1))
            .and_then(|i| self.samples.get(i))
        {
            self.mixer.start(sample, 1.);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad() -> (SoundPad, Arc<Mixer>) {
        let mixer = Arc::new(Mixer::new(0.5));
        (SoundPad::new(Arc::clone(&mixer), 8000), mixer)
    }

    fn mouse(key: Option<Key>, state: KeyState, x: f32, wheel_delta: i32) -> InputMessage {
        InputMessage::Mouse {
            key,
            state,
            position: point2(x, 0.5),
            wheel_delta,
        }
    }

    #[test]
    fn letters_start_tones_and_space_stops_them() {
        let (mut pad, mixer) = pad();
        let actions = pad.update(&[
            InputMessage::keyboard(Key::A, KeyState::Down),
            InputMessage::keyboard(Key::A, KeyState::Up),
            InputMessage::keyboard(Key::Z, KeyState::Down),
            InputMessage::keyboard(Key::Key1, KeyState::Down),
        ]);
        assert!(actions.is_empty());
        assert_eq!(mixer.active_count(), 2);

        pad.update(&[InputMessage::keyboard(Key::Space, KeyState::Down)]);
        assert_eq!(mixer.active_count(), 0);
    }

    #[test]
    fn clicks_and_wheel_drive_the_mixer() {
        let (mut pad, mixer) = pad();
        pad.update(&[
            mouse(None, KeyState::Up, 0.9, 0),
            mouse(Some(Key::MouseLeft), KeyState::Down, 0.9, 0),
            mouse(Some(Key::MouseLeft), KeyState::Up, 0.9, 0),
            mouse(None, KeyState::Up, 0.9, 240),
        ]);
        assert_eq!(mixer.active_count(), 1);
        assert!((mixer.master_volume() - 0.6).abs() < 1e-6);
        assert!(pad.background()[0] > 0.6);

        pad.update(&[mouse(None, KeyState::Up, 0.9, -120 * 40)]);
        assert_eq!(mixer.master_volume(), 0.);
    }

    #[test]
    fn escape_and_f11_become_actions() {
        let (mut pad, _) = pad();
        let actions = pad.update(&[
            InputMessage::keyboard(Key::F11, KeyState::Down),
            InputMessage::keyboard(Key::F11, KeyState::Up),
            InputMessage::keyboard(Key::Escape, KeyState::Down),
        ]);
        assert_eq!(actions, vec![PadAction::ToggleFullscreen, PadAction::Quit]);
    }

    #[test]
    fn broken_samples_are_skipped() {
        let (mut pad, mixer) = pad();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1-broken.ogg"), b"not vorbis").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"").unwrap();

        assert_eq!(pad.load_samples(dir.path()).unwrap(), 0);
        assert_eq!(pad.load_samples(&dir.path().join("missing")).unwrap(), 0);

        pad.update(&[InputMessage::keyboard(Key::Key1, KeyState::Down)]);
        assert_eq!(mixer.active_count(), 0);
    }
}
