//! Audio device access.
//!
//! Capture and playback code talks to devices through the [`CaptureDevice`],
//! [`InputStream`] and [`OutputStream`] traits. The cpal implementations here
//! open a device by name or index, downmix capture to mono `i32`, and hand
//! out fixed-size blocks.

use crate::session::{SessionError, SessionResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig, SupportedStreamConfigRange};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// How long a blocked read or write waits before re-checking for device errors and stop requests.
const DEVICE_POLL: Duration = Duration::from_millis(100);

/// Blocks of playback audio allowed to queue ahead of the device.
const OUTPUT_BLOCKS_AHEAD: usize = 4;

/// Source of fixed-size capture blocks.
pub trait InputStream {
    /// Blocks until the next block is available.
    ///
    /// Returns `Ok(None)` when the stream has ended cleanly or once `stop` is
    /// set, even if the device has gone silent.
    fn read(&mut self, stop: &AtomicBool) -> SessionResult<Option<Vec<i32>>>;
}

/// Opens capture streams. Implementations are moved onto the capture thread.
pub trait CaptureDevice: Send + 'static {
    fn open_input_stream(
        &self,
        channels: u16,
        sample_rate: u32,
        block_size: usize,
    ) -> SessionResult<Box<dyn InputStream>>;
}

/// Sink for playback blocks.
pub trait OutputStream {
    /// Queues a block, blocking while the device is behind.
    fn write(&mut self, block: &[i32]) -> SessionResult<()>;

    /// Blocks until everything written has been played.
    fn drain(&mut self) -> SessionResult<()> {
        Ok(())
    }
}

/// Samples exchanged with the cpal callback, plus the last stream error it reported.
#[derive(Default)]
struct SharedSamples {
    queue: VecDeque<i32>,
    error: Option<String>,
}

type SampleExchange = Arc<(Mutex<SharedSamples>, Condvar)>;

fn new_exchange() -> SampleExchange {
    Arc::new((Mutex::new(SharedSamples::default()), Condvar::new()))
}

/// cpal device selected by name, index, or `"default"`.
pub struct CpalDevice {
    device_name: String,
}

impl CpalDevice {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }

    /// Opens a playback stream on the configured output device.
    pub fn open_output_stream(
        &self,
        sample_rate: u32,
        block_size: usize,
    ) -> SessionResult<CpalOutputStream> {
        let device = suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            if self.device_name == "default" {
                host.default_output_device()
                    .ok_or_else(|| SessionError::Device("No audio output device available".to_string()))
            } else {
                find_device_by_name(&host, &self.device_name, false)
            }
        })?;
        let ranges: Vec<_> = device
            .supported_output_configs()
            .map_err(device_error)?
            .collect();
        let range = pick_config(&ranges, 1, sample_rate)?;
        let config = StreamConfig {
            channels: range.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let exchange = new_exchange();

        let stream = match range.sample_format() {
            SampleFormat::F32 => build_output::<f32>(&device, &config, exchange.clone()),
            SampleFormat::I16 => build_output::<i16>(&device, &config, exchange.clone()),
            SampleFormat::I32 => build_output::<i32>(&device, &config, exchange.clone()),
            SampleFormat::U16 => build_output::<u16>(&device, &config, exchange.clone()),
            other => Err(SessionError::Device(format!("Unsupported sample format: {other:?}"))),
        }?;
        stream.play().map_err(device_error)?;
        tracing::debug!("Playback stream opened: {}Hz, {} channels", sample_rate, config.channels);

        Ok(CpalOutputStream {
            _stream: stream,
            exchange,
            high_water: block_size * OUTPUT_BLOCKS_AHEAD,
        })
    }
}

impl CaptureDevice for CpalDevice {
    fn open_input_stream(
        &self,
        channels: u16,
        sample_rate: u32,
        block_size: usize,
    ) -> SessionResult<Box<dyn InputStream>> {
        let device = suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            if self.device_name == "default" {
                host.default_input_device()
                    .ok_or_else(|| SessionError::Device("No audio input device available".to_string()))
            } else {
                find_device_by_name(&host, &self.device_name, true)
            }
        })?;

        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        tracing::info!("Recording device: {}", device_name);

        let ranges: Vec<_> = device
            .supported_input_configs()
            .map_err(device_error)?
            .collect();
        let range = pick_config(&ranges, channels, sample_rate)?;
        let device_channels = range.channels();
        if device_channels != channels {
            tracing::warn!(
                "Device has no {}-channel mode at {}Hz; downmixing {} channels",
                channels,
                sample_rate,
                device_channels
            );
        }
        let config = StreamConfig {
            channels: device_channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let exchange = new_exchange();

        let stream = match range.sample_format() {
            SampleFormat::F32 => build_input::<f32>(&device, &config, exchange.clone()),
            SampleFormat::I16 => build_input::<i16>(&device, &config, exchange.clone()),
            SampleFormat::I32 => build_input::<i32>(&device, &config, exchange.clone()),
            SampleFormat::U16 => build_input::<u16>(&device, &config, exchange.clone()),
            other => Err(SessionError::Device(format!("Unsupported sample format: {other:?}"))),
        }?;
        stream.play().map_err(device_error)?;

        tracing::debug!(
            "Capture stream started: {}Hz, {} channels, {:?}, block {}",
            sample_rate,
            device_channels,
            range.sample_format(),
            block_size
        );

        Ok(Box::new(CpalInputStream {
            _stream: stream,
            exchange,
            block_size,
        }))
    }
}

/// Capture stream fed by a cpal callback.
struct CpalInputStream {
    _stream: cpal::Stream,
    exchange: SampleExchange,
    block_size: usize,
}

impl InputStream for CpalInputStream {
    fn read(&mut self, stop: &AtomicBool) -> SessionResult<Option<Vec<i32>>> {
        next_block(&self.exchange, self.block_size, stop)
    }
}

/// Waits for `block_size` samples from the callback, a stream error, or `stop`.
fn next_block(
    exchange: &SampleExchange,
    block_size: usize,
    stop: &AtomicBool,
) -> SessionResult<Option<Vec<i32>>> {
    let (lock, ready) = &**exchange;
    let mut shared = lock.lock().unwrap_or_else(PoisonError::into_inner);
    loop {
        if let Some(err) = shared.error.take() {
            return Err(SessionError::Device(err));
        }
        if shared.queue.len() >= block_size {
            return Ok(Some(shared.queue.drain(..block_size).collect()));
        }
        if stop.load(Ordering::Acquire) {
            return Ok(None);
        }
        shared = ready
            .wait_timeout(shared, DEVICE_POLL)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
    }
}

/// Playback stream drained by a cpal callback.
pub struct CpalOutputStream {
    _stream: cpal::Stream,
    exchange: SampleExchange,
    high_water: usize,
}

impl CpalOutputStream {
    fn wait_until(&self, done: impl Fn(&SharedSamples) -> bool) -> SessionResult<()> {
        let (lock, ready) = &*self.exchange;
        let mut shared = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(err) = shared.error.take() {
                return Err(SessionError::Device(err));
            }
            if done(&shared) {
                return Ok(());
            }
            shared = ready
                .wait_timeout(shared, DEVICE_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl OutputStream for CpalOutputStream {
    fn write(&mut self, block: &[i32]) -> SessionResult<()> {
        let high_water = self.high_water;
        self.wait_until(|s| s.queue.len() < high_water)?;
        let (lock, _) = &*self.exchange;
        lock.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .extend(block.iter().copied());
        Ok(())
    }

    fn drain(&mut self) -> SessionResult<()> {
        self.wait_until(|s| s.queue.is_empty())
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    exchange: SampleExchange,
) -> SessionResult<cpal::Stream>
where
    T: SizedSample,
    i32: FromSample<T>,
{
    let channels = config.channels as usize;
    let error_exchange = exchange.clone();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let (lock, ready) = &*exchange;
                let mut shared = lock.lock().unwrap_or_else(PoisonError::into_inner);
                shared.queue.extend(downmix(data, channels));
                ready.notify_one();
            },
            move |err| {
                tracing::error!("Audio stream error: {}", err);
                let (lock, ready) = &*error_exchange;
                lock.lock().unwrap_or_else(PoisonError::into_inner).error = Some(err.to_string());
                ready.notify_all();
            },
            None,
        )
        .map_err(device_error)
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    exchange: SampleExchange,
) -> SessionResult<cpal::Stream>
where
    T: SizedSample + FromSample<i32>,
{
    let channels = config.channels as usize;
    let error_exchange = exchange.clone();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let (lock, ready) = &*exchange;
                let mut shared = lock.lock().unwrap_or_else(PoisonError::into_inner);
                for frame in data.chunks_mut(channels) {
                    let sample = T::from_sample_(shared.queue.pop_front().unwrap_or(0));
                    frame.fill(sample);
                }
                ready.notify_all();
            },
            move |err| {
                tracing::error!("Playback stream error: {}", err);
                let (lock, ready) = &*error_exchange;
                lock.lock().unwrap_or_else(PoisonError::into_inner).error = Some(err.to_string());
                ready.notify_all();
            },
            None,
        )
        .map_err(device_error)
}

/// Averages interleaved frames down to mono `i32`.
fn downmix<T>(data: &[T], channels: usize) -> impl Iterator<Item = i32> + '_
where
    T: SizedSample,
    i32: FromSample<T>,
{
    data.chunks_exact(channels.max(1)).map(|frame| {
        let sum: i64 = frame.iter().map(|&s| i32::from_sample_(s) as i64).sum();
        (sum / frame.len() as i64) as i32
    })
}

/// Chooses a supported config running at `sample_rate`, preferring `channels`.
fn pick_config(
    ranges: &[SupportedStreamConfigRange],
    channels: u16,
    sample_rate: u32,
) -> SessionResult<SupportedStreamConfigRange> {
    let at_rate = |r: &&SupportedStreamConfigRange| {
        r.min_sample_rate().0 <= sample_rate && sample_rate <= r.max_sample_rate().0
    };
    ranges
        .iter()
        .filter(at_rate)
        .find(|r| r.channels() == channels)
        .or_else(|| ranges.iter().filter(at_rate).min_by_key(|r| r.channels()))
        .cloned()
        .ok_or_else(|| SessionError::Device(format!("Device does not support {sample_rate}Hz")))
}

fn device_error(err: impl std::fmt::Display) -> SessionError {
    SessionError::Device(err.to_string())
}

/// Finds an audio device by name or numeric index.
///
/// # Arguments
/// * `host` - The cpal audio host
/// * `device_spec` - A device name or a numeric index (0, 1, 2, etc.) from `taketrack list-devices`
/// * `input` - Whether to search input devices (otherwise output devices)
///
/// # Errors
/// - If no device with the specified name/index is found
fn find_device_by_name(
    host: &cpal::Host,
    device_spec: &str,
    input: bool,
) -> SessionResult<cpal::Device> {
    let devices: Vec<cpal::Device> = if input {
        host.input_devices()
            .map_err(|e| SessionError::Device(format!("Failed to enumerate devices: {e}")))?
            .collect()
    } else {
        host.output_devices()
            .map_err(|e| SessionError::Device(format!("Failed to enumerate devices: {e}")))?
            .collect()
    };

    if let Ok(index) = device_spec.parse::<usize>() {
        let count = devices.len();
        return devices.into_iter().nth(index).ok_or_else(|| {
            SessionError::Device(format!(
                "Device index {} is out of range (0-{})",
                index,
                count.saturating_sub(1)
            ))
        });
    }

    devices
        .into_iter()
        .find(|d| d.name().is_ok_and(|name| name == device_spec))
        .ok_or_else(|| {
            SessionError::Device(format!(
                "Audio device '{device_spec}' not found. Use 'taketrack list-devices' to see available devices."
            ))
        })
}

/// Temporarily redirects stderr to /dev/null to suppress ALSA library warnings on Linux.
#[cfg(target_os = "linux")]
pub fn suppress_alsa_warnings<F, T>(f: F) -> SessionResult<T>
where
    F: FnOnce() -> SessionResult<T>,
{
    let dev_null = OpenOptions::new().write(true).open("/dev/null")?;
    let dev_null_fd = dev_null.as_raw_fd();

    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return Err(std::io::Error::last_os_error().into());
    }

    let redirect_result = unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) };
    if redirect_result == -1 {
        unsafe { libc::close(old_stderr) };
        return Err(std::io::Error::last_os_error().into());
    }

    let result = f();

    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

/// On non-Linux platforms, no stderr suppression is needed since ALSA doesn't exist.
#[cfg(not(target_os = "linux"))]
pub fn suppress_alsa_warnings<F, T>(f: F) -> SessionResult<T>
where
    F: FnOnce() -> SessionResult<T>,
{
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_averages_frames() {
        let stereo: [i32; 4] = [10, 20, -4, -8];
        let mono: Vec<i32> = downmix(&stereo, 2).collect();
        assert_eq!(mono, [15, -6]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let mono: Vec<i32> = downmix(&[i32::MAX, i32::MIN], 1).collect();
        assert_eq!(mono, [i32::MAX, i32::MIN]);
    }

    #[test]
    fn test_silent_device_returns_on_stop() {
        let exchange = new_exchange();
        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let (exchange, stop) = (exchange.clone(), stop.clone());
            std::thread::spawn(move || next_block(&exchange, 4, &stop))
        };
        std::thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::Release);
        assert!(matches!(reader.join().unwrap(), Ok(None)));
    }

    #[test]
    fn test_buffered_block_served_before_stop() {
        let exchange = new_exchange();
        exchange.0.lock().unwrap().queue.extend([1, 2, 3, 4, 5]);
        let stop = AtomicBool::new(true);
        assert_eq!(next_block(&exchange, 4, &stop).unwrap(), Some(vec![1, 2, 3, 4]));
        assert_eq!(next_block(&exchange, 4, &stop).unwrap(), None);
    }

    #[test]
    fn test_downmix_converts_i16() {
        let mono: Vec<i32> = downmix(&[i16::MAX], 1).collect();
        assert_eq!(mono, [(i16::MAX as i32) << 16]);
    }
}
