use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use log::info;

use tempo_emu_core::apu::SAMPLE_RATE_HZ;
use tempo_emu_core::audio_queue::{AudioConsumer, StereoFrame, SAMPLE_BUFFER_LEN};

/// Pulls ready sample buffers from the emulator and resamples them to the
/// output device rate with a simple phase accumulator.
struct Resampler {
    consumer: AudioConsumer,
    buffer: Box<[StereoFrame; SAMPLE_BUFFER_LEN]>,
    position: usize,
    /// Emulator frames consumed per output frame.
    step: f64,
    phase: f64,
    /// Whether `buffer` currently holds real samples; silence otherwise.
    primed: bool,
}

impl Resampler {
    fn new(consumer: AudioConsumer, output_rate: u32) -> Self {
        Self {
            consumer,
            buffer: Box::new([[0; 2]; SAMPLE_BUFFER_LEN]),
            position: 0,
            step: SAMPLE_RATE_HZ as f64 / output_rate as f64,
            phase: 0.0,
            primed: false,
        }
    }

    fn next_frame(&mut self) -> StereoFrame {
        if !self.primed {
            if !self.consumer.pop(&mut self.buffer) {
                return [0, 0];
            }
            self.primed = true;
            self.position = 0;
        }

        let frame = self.buffer[self.position];

        self.phase += self.step;
        while self.phase >= 1.0 {
            self.phase -= 1.0;
            self.position += 1;
            if self.position == SAMPLE_BUFFER_LEN {
                self.primed = self.consumer.pop(&mut self.buffer);
                self.position = 0;
            }
        }

        frame
    }
}

/// Opens the default output device and plays the emulator's sample stream
/// until the returned stream is dropped.
pub fn start_stream(consumer: AudioConsumer) -> Result<Stream, Box<dyn std::error::Error>> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("no audio output device")?;
    let config = device.default_output_config()?;

    info!(
        "audio output: {} Hz, {} channels, {:?}",
        config.sample_rate().0,
        config.channels(),
        config.sample_format()
    );

    let channels = config.channels() as usize;
    let mut resampler = Resampler::new(consumer, config.sample_rate().0);

    let stream = match config.sample_format() {
        SampleFormat::I16 => device.build_output_stream(
            &config.into(),
            move |data: &mut [i16], _| {
                for out in data.chunks_mut(channels) {
                    let [left, right] = resampler.next_frame();
                    write_frame(out, left, right);
                }
            },
            |e| log::error!("audio stream error: {e}"),
            None,
        )?,
        _ => device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _| {
                for out in data.chunks_mut(channels) {
                    let [left, right] = resampler.next_frame();
                    let left = left as f32 / 32768.0;
                    let right = right as f32 / 32768.0;
                    write_frame(out, left, right);
                }
            },
            |e| log::error!("audio stream error: {e}"),
            None,
        )?,
    };

    stream.play()?;
    Ok(stream)
}

fn write_frame<T: Copy>(out: &mut [T], left: T, right: T) {
    for (i, sample) in out.iter_mut().enumerate() {
        *sample = if i % 2 == 0 { left } else { right };
    }
}
