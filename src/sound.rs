use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use anyhow::{format_err, Error};
use lewton::inside_ogg::OggStreamReader;
use rand::Rng;

/// A decoded sound asset. Cloning is cheap and every clone refers to the same asset, which is
/// what `Mixer::stop` matches against.
///
/// Samples are interleaved stereo `i16`; positions and durations are counted in frames (one
/// sample per channel).
#[derive(Clone)]
pub struct Sound {
    instance: Arc<SoundInstance>,
}

struct SoundInstance {
    samples: Vec<i16>,
    sample_rate: u32,
    playing: AtomicUsize,
}

impl Sound {
    pub fn from_stereo(mut samples: Vec<i16>, sample_rate: u32) -> Self {
        let frames = samples.len() / 2;
        samples.truncate(frames * 2);
        Self {
            instance: Arc::new(SoundInstance {
                samples,
                sample_rate,
                playing: AtomicUsize::new(0),
            }),
        }
    }

    pub fn from_mono(samples: &[i16], sample_rate: u32) -> Self {
        let mut stereo = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            stereo.push(*sample);
            stereo.push(*sample);
        }
        Self::from_stereo(stereo, sample_rate)
    }

    pub fn from_ogg(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = OggStreamReader::new(std::io::Cursor::new(bytes))?;
        let channels = reader.ident_hdr.audio_channels as usize;
        let sample_rate = reader.ident_hdr.audio_sample_rate;
        if channels == 0 {
            return Err(format_err!("Ogg stream has no audio channels"));
        }

        let mut buffer = Vec::new();
        while let Some(pck_samples) = reader.read_dec_packet_itl()? {
            for frame in pck_samples.chunks(channels) {
                match frame {
                    [mono] => {
                        buffer.push(*mono);
                        buffer.push(*mono);
                    }
                    [left, right, ..] => {
                        buffer.push(*left);
                        buffer.push(*right);
                    }
                    [] => {}
                }
            }
        }

        Ok(Self::from_stereo(buffer, sample_rate))
    }

    /// A sine tone with a short fade-out so it ends without a click.
    pub fn tone(frequency: f32, duration: f32, amplitude: f32, sample_rate: u32) -> Self {
        let frames = (duration * sample_rate as f32) as usize;
        let fade_frames = (sample_rate as usize / 100).min(frames).max(1);
        let samples: Vec<i16> = (0..frames)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                let fade = ((frames - i) as f32 / fade_frames as f32).min(1.);
                let value = (t * frequency * std::f32::consts::PI * 2.).sin() * amplitude * fade;
                (value * i16::max_value() as f32) as i16
            })
            .collect();
        Self::from_mono(&samples, sample_rate)
    }

    /// White noise. A zero amplitude gives silence of the requested length.
    pub fn noise<R: Rng>(rng: &mut R, duration: f32, amplitude: f32, sample_rate: u32) -> Self {
        let frames = (duration * sample_rate as f32) as usize;
        let amplitude = amplitude.abs();
        if amplitude == 0. {
            return Self::from_stereo(vec![0; frames * 2], sample_rate);
        }
        let samples: Vec<i16> = (0..frames * 2)
            .map(|_| (rng.gen_range(-amplitude, amplitude) * i16::max_value() as f32) as i16)
            .collect();
        Self::from_stereo(samples, sample_rate)
    }

    /// Length of the asset in frames.
    pub fn duration_samples(&self) -> usize {
        self.instance.samples.len() / 2
    }

    pub fn sample_rate(&self) -> u32 {
        self.instance.sample_rate
    }

    /// Copies up to `requested` frames starting at frame `position` into `out` and returns how
    /// many frames were written. Zero means the stream has ended.
    pub fn stream_out(&self, position: usize, requested: usize, out: &mut [i16]) -> usize {
        let remaining = self.duration_samples().saturating_sub(position);
        let frames = requested.min(remaining).min(out.len() / 2);
        if frames == 0 {
            return 0;
        }
        let start = position * 2;
        out[..frames * 2].copy_from_slice(&self.instance.samples[start..start + frames * 2]);
        frames
    }

    /// Like `stream_out`, but walks the asset `step` frames per output frame, interpolating
    /// linearly between neighbouring frames. `playhead` is left on the next frame to read.
    pub fn stream_out_resampled(
        &self,
        playhead: &mut Playhead,
        step: f32,
        requested: usize,
        out: &mut [i16],
    ) -> usize {
        let samples = &self.instance.samples;
        let frames = self.duration_samples();
        let capacity = requested.min(out.len() / 2);
        let mut produced = 0;
        while produced < capacity && playhead.position < frames {
            let current = playhead.position * 2;
            let next = if playhead.position + 1 < frames {
                current + 2
            } else {
                current
            };
            for channel in 0..2 {
                let a = f32::from(samples[current + channel]);
                let b = f32::from(samples[next + channel]);
                out[produced * 2 + channel] = (a + (b - a) * playhead.phase) as i16;
            }
            produced += 1;

            let advanced = playhead.phase + step;
            playhead.position += advanced.trunc() as usize;
            playhead.phase = advanced.fract();
        }
        produced
    }

    pub fn same_asset(&self, other: &Sound) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }

    /// Number of mixer buffers currently playing this asset.
    pub fn playing_count(&self) -> usize {
        self.instance.playing.load(Ordering::Acquire)
    }

    pub fn is_playing(&self) -> bool {
        self.playing_count() > 0
    }

    pub(crate) fn inc_playing(&self) {
        self.instance.playing.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dec_playing(&self) {
        let _ = self
            .instance
            .playing
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Read position inside a sound played at a rate other than its own: a whole frame index plus
/// the fraction of the way to the next frame.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Playhead {
    pub position: usize,
    pub phase: f32,
}

impl std::fmt::Debug for Sound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sound")
            .field("frames", &self.duration_samples())
            .field("sample_rate", &self.sample_rate())
            .field("playing", &self.playing_count())
            .finish()
    }
}
