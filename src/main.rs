mod pad;

use std::{path::Path, sync::Arc};

use arctic::{
    constants::{DATA_DIRECTORY, WINDOW_SIZE, WINDOW_TITLE},
    input::InputMessage,
    mixer::{Mixer, MixerConfig},
    platform::{self, WindowControl},
    renderer::Renderer,
};
use pad::{PadAction, SoundPad};

fn main() {
    platform::run(
        WINDOW_TITLE,
        WINDOW_SIZE,
        |_renderer: &mut Renderer, window: WindowControl| {
            let config = MixerConfig::default();
            let mixer = Arc::new(Mixer::default());
            let audio = match platform::start_audio_playback(Arc::clone(&mixer), &config) {
                Ok(audio) => audio,
                Err(e) => platform::fatal(&e.into()),
            };

            let mut pad = SoundPad::new(mixer, audio.config().sample_rate);
            if let Err(e) = pad.load_samples(Path::new(DATA_DIRECTORY)) {
                log::warn!("{:#}", e);
            }

            move |_dt: f32, inputs: &[InputMessage], renderer: &mut Renderer| {
                for action in pad.update(inputs) {
                    match action {
                        PadAction::ToggleFullscreen => window.toggle_fullscreen(),
                        PadAction::Quit => {
                            log::info!("Audio underruns: {}", audio.underruns());
                            return false;
                        }
                    }
                }

                unsafe { renderer.clear(pad.background()) };
                true
            }
        },
    )
}
