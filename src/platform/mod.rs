mod native;

pub use native::{run, start_audio_playback, AudioError, AudioOutput, WindowControl};

use crate::constants::WINDOW_TITLE;

/// Reports an unrecoverable error and terminates the process.
pub fn fatal(error: &anyhow::Error) -> ! {
    log::error!("{:#}", error);
    eprintln!("{}: {:#}", WINDOW_TITLE, error);
    std::process::exit(1)
}
