use std::{sync::Arc, thread::JoinHandle};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Sample, SampleFormat,
};
use thiserror::Error;

use crate::{
    constants::CHANNELS,
    mixer::{spawn_mixer_thread, Mixer, MixerConfig},
    wave_ring::WaveRing,
};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoOutputDevice,
    #[error("could not query output formats: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),
    #[error("could not query the default output format: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("could not open the output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("could not start the output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("could not start the sound mixer thread: {0}")]
    MixerThread(#[from] std::io::Error),
}

/// A running output stream fed by the mixer thread. Dropping it stops the mixer thread.
pub struct AudioOutput {
    config: MixerConfig,
    stream: cpal::Stream,
    ring: Arc<WaveRing>,
    mixer_thread: Option<JoinHandle<()>>,
}

impl AudioOutput {
    /// The format the mixer runs at, which follows the device when it can't play the requested
    /// rate.
    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn underruns(&self) -> u64 {
        self.ring.underruns()
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.ring.close();
        if let Some(handle) = self.mixer_thread.take() {
            if handle.join().is_err() {
                log::error!("Sound mixer thread panicked");
            }
        }
    }
}

pub fn start_audio_playback(
    mixer: Arc<Mixer>,
    config: &MixerConfig,
) -> Result<AudioOutput, AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(AudioError::NoOutputDevice)?;

    let rate = cpal::SampleRate(config.sample_rate);
    let preferred = device.supported_output_configs()?.find(|c| {
        c.channels() == CHANNELS && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
    });
    let supported_output_config = match preferred {
        Some(c) => c.with_sample_rate(rate),
        None => {
            let fallback = device.default_output_config()?;
            log::warn!(
                "Output device does not support {} channels at {} Hz, using {:?}",
                CHANNELS,
                config.sample_rate,
                fallback
            );
            fallback
        }
    };
    log::info!(
        "Audio output: {} channels at {} Hz, {:?}",
        supported_output_config.channels(),
        supported_output_config.sample_rate().0,
        supported_output_config.sample_format()
    );

    let sample_format = supported_output_config.sample_format();
    let output_config: cpal::StreamConfig = supported_output_config.config();

    let config = MixerConfig {
        sample_rate: output_config.sample_rate.0,
        ..*config
    };
    if config.sample_rate != mixer.sample_rate() {
        log::info!("Mixing at {} Hz", config.sample_rate);
        mixer.set_sample_rate(config.sample_rate);
    }

    let ring = Arc::new(WaveRing::new(config.buffer_count, config.samples_total()));
    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &output_config, Arc::clone(&ring))?,
        SampleFormat::I16 => build_stream::<i16>(&device, &output_config, Arc::clone(&ring))?,
        SampleFormat::U16 => build_stream::<u16>(&device, &output_config, Arc::clone(&ring))?,
    };

    let mixer_thread = spawn_mixer_thread(mixer, Arc::clone(&ring), config.samples_per_channel())?;
    let output = AudioOutput {
        config,
        stream,
        ring,
        mixer_thread: Some(mixer_thread),
    };
    output.stream.play()?;
    Ok(output)
}

fn build_stream<T: Sample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: Arc<WaveRing>,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = config.channels as usize;
    let mut intermediate_buffer: Vec<i16> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            intermediate_buffer.clear();
            intermediate_buffer.resize(frames * CHANNELS as usize, 0);
            ring.play(&mut intermediate_buffer);
            for (out, stereo) in data
                .chunks_mut(channels)
                .zip(intermediate_buffer.chunks(CHANNELS as usize))
            {
                write_frame(out, stereo[0], stereo[1]);
            }
        },
        |e| log::error!("Stream error: {}", e),
    )
}

/// Spreads one stereo frame over the device's channels.
fn write_frame<T: Sample>(out: &mut [T], left: i16, right: i16) {
    match out {
        [mono] => {
            let mid = ((i32::from(left) + i32::from(right)) / 2) as i16;
            *mono = <T as Sample>::from(&mid);
        }
        [l, r, rest @ ..] => {
            *l = <T as Sample>::from(&left);
            *r = <T as Sample>::from(&right);
            for sample in rest {
                *sample = <T as Sample>::from(&0i16);
            }
        }
        [] => {}
    }
}
