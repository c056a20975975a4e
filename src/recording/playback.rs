//! Take playback on the output device.
//!
//! Playback runs on its own thread and publishes the sample index it has
//! reached so the waveform can draw a cursor.

use super::audio::OutputStream;
use crate::session::{SessionError, SessionResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Handle to the playback thread's progress.
#[derive(Debug, Clone, Default)]
pub struct Playback {
    playing: Arc<AtomicBool>,
    /// Session sample index of the block being played
    position: Arc<AtomicUsize>,
}

impl Playback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Where playback currently is, in session samples.
    pub fn position(&self) -> Option<usize> {
        self.is_playing()
            .then(|| self.position.load(Ordering::Acquire))
    }

    /// Plays `samples`, which start at session sample `first_sample`.
    ///
    /// `open` runs on the playback thread, so the output stream never has to
    /// leave it.
    ///
    /// # Errors
    /// - If something is already playing
    /// - If the playback thread cannot be spawned
    pub fn play<F>(
        &self,
        samples: Vec<i32>,
        first_sample: usize,
        block_size: usize,
        open: F,
    ) -> SessionResult<()>
    where
        F: FnOnce() -> SessionResult<Box<dyn OutputStream>> + Send + 'static,
    {
        if self
            .playing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::Conflict("already playing"));
        }
        self.position.store(first_sample, Ordering::Release);
        let len = samples.len();

        let playing = self.playing.clone();
        let position = self.position.clone();
        let spawned = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                let result = open().and_then(|mut out| {
                    play_blocks(&samples, first_sample, block_size, out.as_mut(), &position)
                });
                match result {
                    Ok(()) => tracing::debug!("Playback finished"),
                    Err(e) => tracing::error!("Playback failed: {}", e),
                }
                playing.store(false, Ordering::Release);
            });

        if let Err(e) = spawned {
            self.playing.store(false, Ordering::Release);
            return Err(e.into());
        }
        tracing::info!("Playing {} samples from sample {}", len, first_sample);
        Ok(())
    }
}

/// Writes `samples` to `out` block by block, publishing progress to `position`.
pub fn play_blocks(
    samples: &[i32],
    first_sample: usize,
    block_size: usize,
    out: &mut dyn OutputStream,
    position: &AtomicUsize,
) -> SessionResult<()> {
    for (i, block) in samples.chunks(block_size.max(1)).enumerate() {
        position.store(first_sample + i * block_size, Ordering::Release);
        out.write(block)?;
    }
    out.drain()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        blocks: Vec<Vec<i32>>,
        drained: bool,
    }

    impl OutputStream for Recorder {
        fn write(&mut self, block: &[i32]) -> SessionResult<()> {
            self.blocks.push(block.to_vec());
            Ok(())
        }

        fn drain(&mut self) -> SessionResult<()> {
            self.drained = true;
            Ok(())
        }
    }

    #[test]
    fn test_play_blocks_in_order() {
        let samples: Vec<i32> = (0..2500).collect();
        let position = AtomicUsize::new(0);
        let mut out = Recorder::default();

        play_blocks(&samples, 10_000, 1024, &mut out, &position).unwrap();

        let sizes: Vec<usize> = out.blocks.iter().map(Vec::len).collect();
        assert_eq!(sizes, [1024, 1024, 452]);
        assert_eq!(out.blocks[1][0], 1024);
        assert!(out.drained);
        assert_eq!(position.load(Ordering::Acquire), 10_000 + 2048);
    }

    #[test]
    fn test_second_play_conflicts_while_playing() {
        let playback = Playback::new();
        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock().unwrap();

        let waiting = gate.clone();
        playback
            .play(vec![1; 10], 0, 4, move || {
                let _wait = waiting.lock();
                Ok(Box::new(Recorder::default()) as Box<dyn OutputStream>)
            })
            .unwrap();
        assert!(playback.is_playing());
        assert!(matches!(
            playback.play(vec![1; 10], 0, 4, || Err(SessionError::Conflict("unused"))),
            Err(SessionError::Conflict("already playing"))
        ));

        drop(held);
        for _ in 0..500 {
            if !playback.is_playing() {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!playback.is_playing());
        assert_eq!(playback.position(), None);
    }
}
