//! CPAL output driver pulling a [`RenderHead`].

use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use legato_synth::RenderHead;
use tracing::debug;

/// Frames rendered per callback slice. Larger device requests are rendered
/// in slices of this size so the callback never allocates.
const MAX_CHUNK: usize = 4096;

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
///
/// `cpal::Stream` is `!Send` due to platform internals. The stream is
/// created, held untouched, and dropped by the thread that owns the
/// binding; it is never accessed from anywhere else.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

// SAFETY: the stream is only ever touched (created/dropped) by the binding's
// owning thread; no method on it is called after construction.
unsafe impl Send for StreamHandle {}

pub struct AudioOutput {
    sample_rate: u32,
    channels: usize,
    device_index: Option<usize>,
    stream: Option<StreamHandle>,
}

impl AudioOutput {
    /// Probes the output device (default device if `device_index` is None)
    /// without opening a stream.
    pub fn new(device_index: Option<usize>) -> Result<Self> {
        let device = Self::device(device_index)?;
        let config = device.default_output_config().map_err(stream_err)?;
        Ok(Self {
            sample_rate: config.sample_rate().0,
            channels: config.channels() as usize,
            device_index,
            stream: None,
        })
    }

    /// The device's native sample rate; the render head must match it.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Opens the stream and starts pulling `head`. Dropping `self` stops the
    /// stream and reclaims the head with it.
    pub fn start(&mut self, head: RenderHead) -> Result<()> {
        let device = Self::device(self.device_index)?;
        let config = device.default_output_config().map_err(stream_err)?;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => self.open_stream::<f32>(&device, &config.into(), head)?,
            cpal::SampleFormat::I16 => self.open_stream::<i16>(&device, &config.into(), head)?,
            cpal::SampleFormat::U16 => self.open_stream::<u16>(&device, &config.into(), head)?,
            format => {
                return Err(Error::EngineInstantiation(format!(
                    "unsupported sample format: {:?}",
                    format
                )));
            }
        };

        stream.play().map_err(stream_err)?;
        self.stream = Some(StreamHandle(stream));
        debug!(
            sample_rate = self.sample_rate,
            channels = self.channels,
            "audio output started"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    fn open_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut head: RenderHead,
    ) -> Result<cpal::Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels = config.channels as usize;
        let mut left = vec![0.0f32; MAX_CHUNK];
        let mut right = vec![0.0f32; MAX_CHUNK];

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let guarded = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        let frames = data.len() / channels;
                        let mut done = 0;
                        while done < frames {
                            let chunk = (frames - done).min(MAX_CHUNK);
                            head.render(&mut left[..chunk], &mut right[..chunk]);
                            for frame in 0..chunk {
                                let base = (done + frame) * channels;
                                for channel in 0..channels {
                                    let value = match channel {
                                        0 => left[frame],
                                        1 => right[frame],
                                        _ => 0.0,
                                    };
                                    data[base + channel] = T::from_sample(value);
                                }
                            }
                            done += chunk;
                        }
                    }));

                    if guarded.is_err() {
                        // A panicking unit must not take the stream down.
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(0.0);
                        }
                    }
                },
                |_err| {
                    // Stream errors cannot be logged from the audio thread.
                },
                None,
            )
            .map_err(stream_err)?;

        Ok(stream)
    }

    fn device(index: Option<usize>) -> Result<cpal::Device> {
        let host = cpal::default_host();
        if let Some(index) = index {
            let devices: Vec<_> = host.output_devices().map_err(stream_err)?.collect();
            let count = devices.len();
            devices.into_iter().nth(index).ok_or_else(|| {
                Error::EngineInstantiation(format!(
                    "output device index {} out of range (available: {})",
                    index, count
                ))
            })
        } else {
            host.default_output_device().ok_or_else(|| {
                Error::EngineInstantiation("no audio output device available".into())
            })
        }
    }

    /// Lists available output devices as "index: name".
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        host.output_devices()
            .map_err(stream_err)?
            .enumerate()
            .map(|(index, device)| {
                Ok(format!(
                    "{}: {}",
                    index,
                    device.name().map_err(stream_err)?
                ))
            })
            .collect()
    }
}

impl std::fmt::Debug for AudioOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioOutput")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("running", &self.stream.is_some())
            .finish()
    }
}

fn stream_err(e: impl std::fmt::Display) -> Error {
    Error::EngineInstantiation(e.to_string())
}
