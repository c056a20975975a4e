//! Capture pipeline: a producer thread reading the input device into a bounded
//! queue, and a consumer task appending each block to the session and streaming
//! it to the audio file.
//!
//! The device stream stays on the producer thread for its whole life; only
//! sample blocks cross the queue. When the queue is full the producer waits for
//! the consumer instead of dropping audio, and every such stall is counted.
//! Stopping never waits on the device for longer than `stop_timeout`: a
//! producer stuck in a driver call is left behind and the queue is closed so the
//! consumer can still drain and finalize.

use super::audio::CaptureDevice;
use crate::config::AudioConfig;
use crate::session::{lock_session, SessionError, SessionResult, SharedSession, StreamingWriter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Free queue slots below which the consumer warns that it is falling behind.
const PRESSURE_FREE_SLOTS: usize = 3;

const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Capture parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    /// Samples per block read from the device
    pub block_size: usize,
    /// Blocks the queue holds before the producer has to wait
    pub queue_capacity: usize,
    /// How long `stop` waits for the capture thread to let go of the device
    pub stop_timeout: Duration,
}

impl From<&AudioConfig> for PipelineConfig {
    fn from(audio: &AudioConfig) -> Self {
        Self {
            sample_rate: audio.sample_rate,
            block_size: audio.block_size,
            queue_capacity: audio.queue_capacity,
            stop_timeout: STOP_TIMEOUT,
        }
    }
}

/// Counters shared between the pipeline halves and the UI.
#[derive(Debug, Default)]
pub struct PipelineStats {
    blocks_captured: AtomicU64,
    blocks_consumed: AtomicU64,
    overflows: AtomicU64,
    pressure_warnings: AtomicU64,
    fault: Mutex<Option<String>>,
}

impl PipelineStats {
    pub fn blocks_captured(&self) -> u64 {
        self.blocks_captured.load(Ordering::Relaxed)
    }

    pub fn blocks_consumed(&self) -> u64 {
        self.blocks_consumed.load(Ordering::Relaxed)
    }

    /// Times the producer found the queue full and had to wait.
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    pub fn pressure_warnings(&self) -> u64 {
        self.pressure_warnings.load(Ordering::Relaxed)
    }

    /// Device failure that stopped capture, if any.
    pub fn fault(&self) -> Option<String> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_fault(&self, message: String) {
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }
}

/// What a stopped pipeline leaves behind.
#[derive(Debug)]
pub struct CaptureSummary {
    /// Finalized audio file, if streaming survived to the end
    pub audio_path: Option<PathBuf>,
    pub blocks: u64,
    pub overflows: u64,
    /// Device failure, or a capture thread that would not stop
    pub fault: Option<String>,
    /// Why streaming to disk was abandoned; the audio is still in the session
    pub stream_error: Option<SessionError>,
}

/// Running capture.
pub struct CapturePipeline {
    stop: Arc<AtomicBool>,
    stop_timeout: Duration,
    producer: Option<thread::JoinHandle<()>>,
    /// Resolves when the capture thread finishes, however it finishes
    producer_exit: Option<oneshot::Receiver<()>>,
    consumer: Option<JoinHandle<SessionResult<Option<PathBuf>>>>,
    /// Tells the consumer to close the queue when the producer cannot be joined
    close_queue: Option<oneshot::Sender<()>>,
    stats: Arc<PipelineStats>,
}

impl CapturePipeline {
    /// Opens the device and starts capturing into `session`.
    ///
    /// Blocks are also written to `sink` when one is given; if the sink fails the
    /// session falls back to in-memory audio.
    ///
    /// # Errors
    /// - If the capture thread cannot be spawned
    /// - If the device cannot be opened
    pub async fn start<D: CaptureDevice>(
        device: D,
        session: SharedSession,
        sink: Option<StreamingWriter>,
        config: PipelineConfig,
    ) -> SessionResult<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (ready_tx, ready_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(PipelineStats::default());
        let (exit_tx, exit_rx) = oneshot::channel::<()>();

        let producer = {
            let stop = stop.clone();
            let stats = stats.clone();
            thread::Builder::new()
                .name("capture".to_string())
                .spawn(move || {
                    let _exit = exit_tx;
                    run_producer(device, config, tx, ready_tx, &stop, &stats)
                })?
        };

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(SessionError::Device(
                    "capture thread exited before the device was opened".to_string(),
                ))
            }
        }

        let (close_tx, close_rx) = oneshot::channel();
        let consumer = tokio::spawn(run_consumer(rx, close_rx, session, sink, stats.clone()));
        tracing::info!(
            "Capture started: {} Hz, {} samples per block, queue of {}",
            config.sample_rate,
            config.block_size,
            config.queue_capacity
        );

        Ok(Self {
            stop,
            stop_timeout: config.stop_timeout,
            producer: Some(producer),
            producer_exit: Some(exit_rx),
            consumer: Some(consumer),
            close_queue: Some(close_tx),
            stats,
        })
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Stops capture, drains the queue and closes the audio file.
    ///
    /// Always finishes. A capture thread that does not let go of the device
    /// within the stop timeout is recorded as a fault, and a failed disk stream
    /// as `stream_error`; both leave the captured audio in the session.
    pub async fn stop(mut self) -> CaptureSummary {
        self.stop.store(true, Ordering::Release);

        if let (Some(producer), Some(exit)) = (self.producer.take(), self.producer_exit.take()) {
            match tokio::time::timeout(self.stop_timeout, exit).await {
                Ok(_) => {
                    if producer.join().is_err() {
                        self.stats.set_fault("capture thread panicked".to_string());
                    }
                }
                Err(_) => {
                    tracing::error!(
                        "Capture thread did not stop within {:?}, closing the queue",
                        self.stop_timeout
                    );
                    self.stats.set_fault(format!(
                        "capture device did not stop within {:?}",
                        self.stop_timeout
                    ));
                    if let Some(close) = self.close_queue.take() {
                        let _ = close.send(());
                    }
                }
            }
        }

        let (audio_path, stream_error) = match self.consumer.take() {
            Some(consumer) => match consumer.await {
                Ok(Ok(path)) => (path, None),
                Ok(Err(e)) => (None, Some(e)),
                Err(e) => (
                    None,
                    Some(SessionError::Device(format!("capture consumer failed: {e}"))),
                ),
            },
            None => (None, None),
        };

        let summary = CaptureSummary {
            audio_path,
            blocks: self.stats.blocks_consumed(),
            overflows: self.stats.overflows(),
            fault: self.stats.fault(),
            stream_error,
        };
        tracing::info!(
            "Capture stopped: {} blocks, {} overflows",
            summary.blocks,
            summary.overflows
        );
        summary
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn run_producer<D: CaptureDevice>(
    device: D,
    config: PipelineConfig,
    tx: mpsc::Sender<Vec<i32>>,
    ready: oneshot::Sender<SessionResult<()>>,
    stop: &AtomicBool,
    stats: &PipelineStats,
) {
    let mut stream = match device.open_input_stream(1, config.sample_rate, config.block_size) {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            stream
        }
        Err(e) => {
            tracing::error!("Failed to open capture device: {}", e);
            let _ = ready.send(Err(e));
            return;
        }
    };

    loop {
        match stream.read(stop) {
            Ok(Some(block)) => {
                stats.blocks_captured.fetch_add(1, Ordering::Relaxed);
                if !submit(&tx, block, stats) {
                    tracing::warn!("Capture queue closed, stopping producer");
                    break;
                }
            }
            Ok(None) => {
                tracing::info!("Capture stream ended");
                break;
            }
            Err(e) => {
                tracing::error!("Capture failed: {}", e);
                stats.set_fault(e.to_string());
                break;
            }
        }
    }
}

/// Hands a block to the consumer, waiting if the queue is full. Returns false
/// once the consumer is gone.
fn submit(tx: &mpsc::Sender<Vec<i32>>, block: Vec<i32>, stats: &PipelineStats) -> bool {
    match tx.try_send(block) {
        Ok(()) => true,
        Err(TrySendError::Full(block)) => {
            let overflows = stats.overflows.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::error!(
                "Audio queue full, capture waiting on the consumer (overflow #{})",
                overflows
            );
            tx.blocking_send(block).is_ok()
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

async fn run_consumer(
    mut rx: mpsc::Receiver<Vec<i32>>,
    mut close: oneshot::Receiver<()>,
    session: SharedSession,
    mut sink: Option<StreamingWriter>,
    stats: Arc<PipelineStats>,
) -> SessionResult<Option<PathBuf>> {
    let capacity = rx.max_capacity();
    let mut stream_error = None;
    let mut closed = false;

    loop {
        let next = if closed {
            rx.recv().await
        } else {
            tokio::select! {
                next = rx.recv() => next,
                _ = &mut close => {
                    // Whatever is already queued is still drained.
                    rx.close();
                    closed = true;
                    continue;
                }
            }
        };
        let Some(block) = next else {
            break;
        };

        let queued = rx.len();
        if capacity.saturating_sub(queued) < PRESSURE_FREE_SLOTS {
            stats.pressure_warnings.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Audio queue under pressure: {}/{} blocks waiting", queued, capacity);
        }

        lock_session(&session).append_audio(&block);

        let failed = sink.as_mut().and_then(|w| w.write_block(&block).err());
        if let Some(e) = failed {
            tracing::error!("Streaming audio to disk failed, keeping it in memory: {}", e);
            lock_session(&session).set_streaming(false);
            sink = None;
            stream_error = Some(e);
        }

        stats.blocks_consumed.fetch_add(1, Ordering::Relaxed);
    }

    if let Some(e) = stream_error {
        return Err(e);
    }

    match sink {
        Some(writer) => match writer.finalize() {
            Ok(path) => Ok(Some(path)),
            Err(e) => {
                tracing::error!("Failed to close audio file: {}", e);
                lock_session(&session).set_streaming(false);
                Err(e)
            }
        },
        None => Ok(None),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::document::parse_script;
    use crate::recording::audio::InputStream;
    use crate::session::{Session, SessionStore};
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    /// Capture device fed block by block from the test.
    pub(crate) struct FeedDevice {
        blocks: Mutex<Option<std_mpsc::Receiver<SessionResult<Vec<i32>>>>>,
    }

    impl FeedDevice {
        pub(crate) fn new() -> (Self, std_mpsc::Sender<SessionResult<Vec<i32>>>) {
            let (tx, rx) = std_mpsc::channel();
            (
                Self {
                    blocks: Mutex::new(Some(rx)),
                },
                tx,
            )
        }
    }

    struct FeedStream(std_mpsc::Receiver<SessionResult<Vec<i32>>>);

    impl InputStream for FeedStream {
        /// Fed blocks are always delivered before a stop request is honored.
        fn read(&mut self, stop: &AtomicBool) -> SessionResult<Option<Vec<i32>>> {
            loop {
                match self.0.recv_timeout(Duration::from_millis(5)) {
                    Ok(Ok(block)) => return Ok(Some(block)),
                    Ok(Err(e)) => return Err(e),
                    Err(std_mpsc::RecvTimeoutError::Disconnected) => return Ok(None),
                    Err(std_mpsc::RecvTimeoutError::Timeout) if stop.load(Ordering::Acquire) => {
                        return Ok(None)
                    }
                    Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                }
            }
        }
    }

    /// Delivers one block, then hangs inside the driver and ignores stop requests.
    struct StalledDevice;

    struct StalledStream {
        delivered: bool,
    }

    impl InputStream for StalledStream {
        fn read(&mut self, _stop: &AtomicBool) -> SessionResult<Option<Vec<i32>>> {
            if !self.delivered {
                self.delivered = true;
                return Ok(Some(vec![3; BLOCK]));
            }
            loop {
                std::thread::park();
            }
        }
    }

    impl CaptureDevice for StalledDevice {
        fn open_input_stream(
            &self,
            _channels: u16,
            _sample_rate: u32,
            _block_size: usize,
        ) -> SessionResult<Box<dyn InputStream>> {
            Ok(Box::new(StalledStream { delivered: false }))
        }
    }

    impl CaptureDevice for FeedDevice {
        fn open_input_stream(
            &self,
            _channels: u16,
            _sample_rate: u32,
            _block_size: usize,
        ) -> SessionResult<Box<dyn InputStream>> {
            let rx = self
                .blocks
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| SessionError::Device("already opened".to_string()))?;
            Ok(Box::new(FeedStream(rx)))
        }
    }

    struct MissingDevice;

    impl CaptureDevice for MissingDevice {
        fn open_input_stream(
            &self,
            _channels: u16,
            _sample_rate: u32,
            _block_size: usize,
        ) -> SessionResult<Box<dyn InputStream>> {
            Err(SessionError::Device("no such device".to_string()))
        }
    }

    pub(crate) const RATE: u32 = 44100;
    pub(crate) const BLOCK: usize = 441;

    pub(crate) fn config() -> PipelineConfig {
        PipelineConfig {
            sample_rate: RATE,
            block_size: BLOCK,
            queue_capacity: 10,
            stop_timeout: Duration::from_secs(2),
        }
    }

    pub(crate) fn feed(tx: &std_mpsc::Sender<SessionResult<Vec<i32>>>, blocks: usize, value: i32) {
        for _ in 0..blocks {
            tx.send(Ok(vec![value; BLOCK])).unwrap();
        }
    }

    pub(crate) async fn wait_for_samples(session: &SharedSession, samples: usize) {
        for _ in 0..1000 {
            if lock_session(session).audio().len() >= samples {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("capture never reached {samples} samples");
    }

    #[tokio::test]
    async fn test_blocks_reach_session_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), 32);
        let session = Session::new(parse_script("line"), RATE).shared();
        let writer = store.start_streaming(&mut lock_session(&session)).unwrap();

        let (device, tx) = FeedDevice::new();
        let pipeline = CapturePipeline::start(device, session.clone(), Some(writer), config())
            .await
            .unwrap();
        feed(&tx, 20, 7);
        drop(tx);
        let summary = pipeline.stop().await;

        assert_eq!(summary.blocks, 20);
        assert_eq!(summary.fault, None);
        assert_eq!(lock_session(&session).audio().len(), 20 * BLOCK);

        let path = summary.audio_path.expect("streamed file");
        let reader = hound::WavReader::open(path).unwrap();
        assert_eq!(reader.len() as usize, 20 * BLOCK);
        assert_eq!(reader.spec().sample_rate, RATE);
    }

    #[tokio::test]
    async fn test_capture_order_preserved() {
        let session = Session::new(parse_script("line"), RATE).shared();
        let (device, tx) = FeedDevice::new();
        let pipeline = CapturePipeline::start(device, session.clone(), None, config())
            .await
            .unwrap();
        for i in 0..30 {
            tx.send(Ok(vec![i; BLOCK])).unwrap();
        }
        drop(tx);
        pipeline.stop().await;

        let s = lock_session(&session);
        let firsts: Vec<i32> = s.audio().chunks(BLOCK).map(|b| b[0]).collect();
        assert_eq!(firsts, (0..30).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_open_failure_is_reported() {
        let session = Session::new(parse_script("line"), RATE).shared();
        let result = CapturePipeline::start(MissingDevice, session, None, config()).await;
        assert!(matches!(result, Err(SessionError::Device(_))));
    }

    #[tokio::test]
    async fn test_device_error_becomes_fault() {
        let session = Session::new(parse_script("line"), RATE).shared();
        let (device, tx) = FeedDevice::new();
        let pipeline = CapturePipeline::start(device, session.clone(), None, config())
            .await
            .unwrap();
        feed(&tx, 3, 1);
        tx.send(Err(SessionError::Device("unplugged".to_string())))
            .unwrap();
        wait_for_samples(&session, 3 * BLOCK).await;

        let summary = pipeline.stop().await;
        assert!(summary.fault.unwrap().contains("unplugged"));
        assert_eq!(lock_session(&session).audio().len(), 3 * BLOCK);
    }

    #[tokio::test]
    async fn test_full_queue_waits_instead_of_dropping() {
        let session = Session::new(parse_script("line"), RATE).shared();
        let (device, tx) = FeedDevice::new();
        let pipeline = CapturePipeline::start(
            device,
            session.clone(),
            None,
            PipelineConfig {
                queue_capacity: 2,
                ..config()
            },
        )
        .await
        .unwrap();

        // The consumer task cannot run until this test yields, so the queue fills up.
        feed(&tx, 12, 5);
        for _ in 0..1000 {
            if pipeline.stats().overflows() > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        drop(tx);

        let overflows = pipeline.stats().overflows();
        let summary = pipeline.stop().await;
        assert!(overflows > 0);
        assert_eq!(summary.blocks, 12);
        assert_eq!(lock_session(&session).audio().len(), 12 * BLOCK);
    }

    #[tokio::test]
    async fn test_stop_ends_silent_stream() {
        let session = Session::new(parse_script("line"), RATE).shared();
        let (device, tx) = FeedDevice::new();
        let pipeline = CapturePipeline::start(device, session.clone(), None, config())
            .await
            .unwrap();
        feed(&tx, 2, 1);
        wait_for_samples(&session, 2 * BLOCK).await;

        // The feed stays open, so only the stop request can end the stream.
        let summary = pipeline.stop().await;
        assert_eq!(summary.fault, None);
        assert_eq!(summary.blocks, 2);
        drop(tx);
    }

    #[tokio::test]
    async fn test_stalled_device_does_not_block_stop() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), 32);
        let session = Session::new(parse_script("line"), RATE).shared();
        let writer = store.start_streaming(&mut lock_session(&session)).unwrap();
        let pipeline = CapturePipeline::start(
            StalledDevice,
            session.clone(),
            Some(writer),
            PipelineConfig {
                stop_timeout: Duration::from_millis(50),
                ..config()
            },
        )
        .await
        .unwrap();
        wait_for_samples(&session, BLOCK).await;

        let summary = pipeline.stop().await;
        assert!(summary.fault.unwrap().contains("did not stop"));
        assert!(summary.stream_error.is_none());
        assert_eq!(summary.blocks, 1);

        let reader = hound::WavReader::open(summary.audio_path.unwrap()).unwrap();
        assert_eq!(reader.len() as usize, BLOCK);
    }

    #[tokio::test]
    async fn test_nearly_full_queue_warns() {
        let session = Session::new(parse_script("line"), RATE).shared();
        let (device, tx) = FeedDevice::new();
        let pipeline = CapturePipeline::start(
            device,
            session.clone(),
            None,
            PipelineConfig {
                queue_capacity: 4,
                ..config()
            },
        )
        .await
        .unwrap();

        // Blocking this thread keeps the consumer from running while the queue fills.
        feed(&tx, 4, 2);
        for _ in 0..1000 {
            if pipeline.stats().blocks_captured() >= 4 {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        drop(tx);

        wait_for_samples(&session, 4 * BLOCK).await;
        assert!(pipeline.stats().pressure_warnings() > 0);
        assert_eq!(pipeline.stop().await.blocks, 4);
    }

    #[tokio::test]
    async fn test_roomy_queue_does_not_warn() {
        let session = Session::new(parse_script("line"), RATE).shared();
        let (device, tx) = FeedDevice::new();
        let pipeline = CapturePipeline::start(
            device,
            session.clone(),
            None,
            PipelineConfig {
                queue_capacity: 64,
                ..config()
            },
        )
        .await
        .unwrap();

        feed(&tx, 4, 2);
        for _ in 0..1000 {
            if pipeline.stats().blocks_captured() >= 4 {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        drop(tx);

        wait_for_samples(&session, 4 * BLOCK).await;
        assert_eq!(pipeline.stats().pressure_warnings(), 0);
        pipeline.stop().await;
    }
}
