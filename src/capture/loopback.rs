//! cpal-backed capture source
//!
//! Captures from a system input endpoint and feeds raw PCM bytes to the
//! broadcast fan-out. System-audio loopback endpoints surface as input
//! devices on every platform this runs on (e.g. PulseAudio/PipeWire
//! "monitor" sources), so capture is expressed purely in terms of input
//! streams.
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated capture
//! thread that parks until the source is stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::broadcast::Broadcaster;
use crate::capture::{AudioFormat, SampleEncoding};
use crate::error::{Error, Result};

/// Capture endpoint and format overrides
///
/// `None`/zero fields fall back to the device defaults, mirroring the
/// CLI's `default` arguments.
#[derive(Debug, Clone, Default)]
pub struct CaptureConfig {
    /// Endpoint name; `None` selects the default input device
    pub device: Option<String>,
    pub encoding: Option<SampleEncoding>,
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
}

/// One enumerable capture endpoint
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// List the capture endpoints of the default host
pub fn list_capture_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| Error::Capture(e.to_string()))?;

    Ok(devices
        .filter_map(|device| device.name().ok())
        .map(|name| DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
        })
        .collect())
}

/// Loopback capture source backed by cpal
pub struct LoopbackCapture {
    device_name: String,
    format: AudioFormat,
    stream_config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackCapture {
    /// Resolve the capture device and stream layout
    ///
    /// The format is fixed here so the server can hand it to clients
    /// before the first captured block arrives.
    pub fn new(config: &CaptureConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = match &config.device {
            Some(name) => host
                .input_devices()
                .map_err(|e| Error::Capture(e.to_string()))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| Error::Capture(format!("no capture device named '{name}'")))?,
            None => host.default_input_device().ok_or(Error::NoCaptureDevice)?,
        };
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());

        let default_config = device
            .default_input_config()
            .map_err(|e| Error::Capture(e.to_string()))?;

        let encoding = match config.encoding {
            Some(encoding) => encoding,
            None => sample_format_to_encoding(default_config.sample_format())
                .unwrap_or(SampleEncoding::S16),
        };
        let sample_format = encoding_to_sample_format(encoding)?;

        let channels = config.channels.unwrap_or(default_config.channels());
        let sample_rate = config
            .sample_rate
            .unwrap_or(default_config.sample_rate().0);

        let format = AudioFormat {
            encoding,
            channels,
            sample_rate,
        };
        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        tracing::info!(device = %device_name, %format, "capture endpoint resolved");

        Ok(Self {
            device_name,
            format,
            stream_config,
            sample_format,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        })
    }

    /// Name of the resolved capture endpoint
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl super::AudioSource for LoopbackCapture {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn start(&self, broadcaster: Arc<Broadcaster>) -> Result<()> {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return Ok(());
        }

        let device_name = self.device_name.clone();
        let stream_config = self.stream_config.clone();
        let sample_format = self.sample_format;
        let block_align = self.format.block_align();
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let data_running = Arc::clone(&self.running);
        let handle = thread::Builder::new()
            .name("audioshare-capture".into())
            .spawn(move || {
                let host = cpal::default_host();
                let Some(device) = host
                    .input_devices()
                    .ok()
                    .and_then(|mut devices| {
                        devices.find(|d| d.name().map(|n| n == device_name).unwrap_or(false))
                    })
                else {
                    tracing::error!(device = %device_name, "capture device disappeared");
                    return;
                };

                let stream = device.build_input_stream_raw(
                    &stream_config,
                    sample_format,
                    move |data: &cpal::Data, _: &cpal::InputCallbackInfo| {
                        if data_running.load(Ordering::Relaxed) {
                            broadcaster.broadcast(data.bytes(), block_align);
                        }
                    },
                    |err| tracing::error!(error = %err, "capture stream error"),
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            tracing::error!(error = %e, "failed to start capture stream");
                            return;
                        }
                        while running.load(Ordering::Relaxed) {
                            thread::sleep(std::time::Duration::from_millis(10));
                        }
                        // Dropping the stream stops capture.
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to build capture stream");
                    }
                }
            })
            .map_err(|e| Error::Capture(e.to_string()))?;

        *worker = Some(handle);
        tracing::info!(device = %self.device_name, "capture started");
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
            tracing::info!(device = %self.device_name, "capture stopped");
        }
    }
}

impl Drop for LoopbackCapture {
    fn drop(&mut self) {
        super::AudioSource::stop(self);
    }
}

fn encoding_to_sample_format(encoding: SampleEncoding) -> Result<cpal::SampleFormat> {
    match encoding {
        SampleEncoding::F32 => Ok(cpal::SampleFormat::F32),
        SampleEncoding::S8 => Ok(cpal::SampleFormat::I8),
        SampleEncoding::S16 => Ok(cpal::SampleFormat::I16),
        SampleEncoding::S32 => Ok(cpal::SampleFormat::I32),
        // cpal has no packed 24-bit input format
        SampleEncoding::S24 => Err(Error::UnsupportedEncoding(encoding)),
    }
}

fn sample_format_to_encoding(format: cpal::SampleFormat) -> Option<SampleEncoding> {
    match format {
        cpal::SampleFormat::F32 => Some(SampleEncoding::F32),
        cpal::SampleFormat::I8 => Some(SampleEncoding::S8),
        cpal::SampleFormat::I16 => Some(SampleEncoding::S16),
        cpal::SampleFormat::I32 => Some(SampleEncoding::S32),
        _ => None,
    }
}
