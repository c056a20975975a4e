//! The session aggregate: captured audio, the script document, and the
//! take-recording state machine that stamps takes against the audio buffer.
//!
//! The capture consumer appends audio while the UI issues take transitions, so a
//! session is always shared as [`SharedSession`] and every read-modify-write runs
//! under a single lock acquisition.

use super::error::{SessionError, SessionResult};
use super::sync::resolve_sync_offset;
use crate::document::{Document, Take, TakeMark, TimeSpan};
use crate::timing::samples_to_duration;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub type SharedSession = Arc<Mutex<Session>>;

/// Locks the shared session, recovering the data if a previous holder panicked.
pub fn lock_session(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where the take state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeState {
    Idle,
    /// Recording take `take` of global chunk `chunk`
    RecordingNormal { chunk: usize, take: usize },
    /// Recording sync take `take`
    RecordingSync { take: usize },
}

/// One recording session.
pub struct Session {
    /// Mono samples in capture order; only ever appended to
    audio: Vec<i32>,
    sample_rate: u32,
    document: Document,
    /// Numeric session directory name, derived on first save
    id: Option<u32>,
    persisted: bool,
    /// Whether the audio file on disk is receiving every captured block
    streaming: bool,
    state: TakeState,
    selected_chunk: usize,
    selected_take: Option<usize>,
}

impl Session {
    pub fn new(document: Document, sample_rate: u32) -> Self {
        let selected_take = document
            .chunk(0)
            .and_then(|c| c.takes.len().checked_sub(1));
        Self {
            audio: Vec::new(),
            sample_rate,
            document,
            id: None,
            persisted: false,
            streaming: false,
            state: TakeState::Idle,
            selected_chunk: 0,
            selected_take,
        }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    // Audio buffer

    pub fn append_audio(&mut self, block: &[i32]) {
        self.audio.extend_from_slice(block);
    }

    pub fn audio(&self) -> &[i32] {
        &self.audio
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration of audio captured so far.
    pub fn recorded(&self) -> Duration {
        samples_to_duration(self.sample_rate, self.audio.len())
    }

    /// Samples covered by `span`, clamped to what has been captured.
    pub fn extract_audio(&self, span: TimeSpan) -> &[i32] {
        &self.audio[span.sample_range(self.sample_rate, self.audio.len())]
    }

    // Identity and persistence flags

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub(super) fn set_id(&mut self, id: u32) {
        self.id = Some(id);
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub(super) fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub(crate) fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    // Selection

    pub fn state(&self) -> TakeState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state != TakeState::Idle
    }

    pub fn selected_chunk(&self) -> usize {
        self.selected_chunk
    }

    pub fn selected_take(&self) -> Option<usize> {
        self.selected_take
    }

    /// The selected take of the selected chunk.
    pub fn current_take(&self) -> Option<&Take> {
        let chunk = self.document.chunk(self.selected_chunk)?;
        chunk.takes.get(self.selected_take?)
    }

    pub fn select_next_chunk(&mut self) -> SessionResult<()> {
        if self.selected_chunk + 1 < self.document.chunk_count() {
            self.select_chunk(self.selected_chunk + 1)
        } else {
            self.select_chunk(self.selected_chunk)
        }
    }

    pub fn select_previous_chunk(&mut self) -> SessionResult<()> {
        self.select_chunk(self.selected_chunk.saturating_sub(1))
    }

    /// Moves the chunk selection and points the take selection at that chunk's latest take.
    pub fn select_chunk(&mut self, index: usize) -> SessionResult<()> {
        if self.is_recording() {
            return Err(SessionError::Conflict("cannot change chunk while recording"));
        }
        let chunk = self
            .document
            .chunk(index)
            .ok_or_else(|| SessionError::Bounds(format!("no chunk at index {index}")))?;
        self.selected_take = chunk.takes.len().checked_sub(1);
        self.selected_chunk = index;
        Ok(())
    }

    // Take state machine

    fn ensure_can_start(&self) -> SessionResult<()> {
        if self.persisted {
            return Err(SessionError::Conflict("session has ended"));
        }
        if self.is_recording() {
            return Err(SessionError::Conflict("already recording"));
        }
        Ok(())
    }

    /// Opens a take on the selected chunk, starting at the current end of the audio.
    pub fn start_take(&mut self) -> SessionResult<()> {
        self.ensure_can_start()?;
        let now = self.recorded();
        let chunk_index = self.selected_chunk;
        let chunk = self
            .document
            .chunk_mut(chunk_index)
            .ok_or_else(|| SessionError::Bounds(format!("no chunk at index {chunk_index}")))?;
        chunk.takes.push(Take::open(now, TakeMark::Unmarked));
        let take = chunk.takes.len() - 1;

        self.selected_take = Some(take);
        self.state = TakeState::RecordingNormal {
            chunk: chunk_index,
            take,
        };
        tracing::info!("Take {} started on chunk {} at {:?}", take, chunk_index, now);
        Ok(())
    }

    /// Opens a sync take at the current end of the audio.
    pub fn start_sync_take(&mut self) -> SessionResult<()> {
        self.ensure_can_start()?;
        let now = self.recorded();
        self.document.sync_takes.push(Take::open(now, TakeMark::Sync));
        let take = self.document.sync_takes.len() - 1;
        self.state = TakeState::RecordingSync { take };
        tracing::info!("Sync take {} started at {:?}", take, now);
        Ok(())
    }

    /// Closes the open take at the current end of the audio.
    ///
    /// Closing the first sync take also resolves the document's sync offset.
    pub fn end_take(&mut self) -> SessionResult<Take> {
        let now = self.recorded();
        let closed = match self.state {
            TakeState::Idle => return Err(SessionError::Conflict("not recording")),
            TakeState::RecordingNormal { chunk, take } => {
                let take = self
                    .document
                    .chunk_mut(chunk)
                    .and_then(|c| c.takes.get_mut(take))
                    .ok_or_else(|| SessionError::Bounds(format!("open take {take} of chunk {chunk} vanished")))?;
                take.close(now);
                take.clone()
            }
            TakeState::RecordingSync { take } => {
                let take = self
                    .document
                    .sync_takes
                    .get_mut(take)
                    .ok_or_else(|| SessionError::Bounds(format!("open sync take {take} vanished")))?;
                take.close(now);
                take.clone()
            }
        };

        let was_sync = matches!(self.state, TakeState::RecordingSync { .. });
        self.state = TakeState::Idle;
        tracing::info!("Take ended at {:?}", now);

        if was_sync {
            self.update_sync_offset();
        }
        Ok(closed)
    }

    /// Marks the selected take. While recording, the open take is also ended.
    ///
    /// A sync take keeps its `Sync` mark; the call only ends it.
    pub fn mark_take(&mut self, mark: TakeMark) -> SessionResult<()> {
        if mark == TakeMark::Sync {
            return Err(SessionError::Conflict("sync marks come only from sync takes"));
        }
        match self.state {
            TakeState::RecordingSync { .. } => {
                tracing::debug!("Mark {} ignored for sync take", mark);
                self.end_take().map(|_| ())
            }
            TakeState::RecordingNormal { chunk, take } => {
                if let Some(t) = self.document.chunk_mut(chunk).and_then(|c| c.takes.get_mut(take)) {
                    t.mark = mark;
                }
                self.end_take().map(|_| ())
            }
            TakeState::Idle => {
                let chunk_index = self.selected_chunk;
                let take_index = self
                    .selected_take
                    .ok_or_else(|| SessionError::Bounds("no take selected".to_string()))?;
                let take = self
                    .document
                    .chunk_mut(chunk_index)
                    .and_then(|c| c.takes.get_mut(take_index))
                    .ok_or_else(|| {
                        SessionError::Bounds(format!("no take {take_index} on chunk {chunk_index}"))
                    })?;
                take.mark = mark;
                tracing::info!("Take {} of chunk {} marked {}", take_index, chunk_index, mark);
                Ok(())
            }
        }
    }

    /// Adds a closed take on the selected chunk covering `span`, clamped to the recorded audio.
    pub fn take_from_selection(&mut self, span: TimeSpan) -> SessionResult<()> {
        self.ensure_can_start()?;
        let recorded = self.recorded();
        let span = TimeSpan::new(span.start.min(recorded), span.end.min(recorded));
        let chunk_index = self.selected_chunk;
        let chunk = self
            .document
            .chunk_mut(chunk_index)
            .ok_or_else(|| SessionError::Bounds(format!("no chunk at index {chunk_index}")))?;
        chunk.takes.push(Take::closed(span, TakeMark::Unmarked));
        self.selected_take = Some(chunk.takes.len() - 1);
        tracing::info!("Take created from selection on chunk {}: {:?}", chunk_index, span);
        Ok(())
    }

    /// Resolves the sync offset from the first sync take, once per document.
    fn update_sync_offset(&mut self) {
        if self.document.sync_offset().is_some() {
            tracing::debug!("Sync offset already resolved; later sync takes are ignored");
            return;
        }
        let Some(span) = self.document.sync_takes.first().and_then(Take::span) else {
            return;
        };
        let offset = resolve_sync_offset(&self.audio, self.sample_rate, span);
        if self.document.set_sync_offset(offset) {
            tracing::info!("Sync offset resolved at {:?}", offset);
        }
    }

    /// Where the open take lives, for reporting.
    pub(super) fn open_take_location(&self) -> Option<(String, usize, usize)> {
        match self.state {
            TakeState::Idle => None,
            TakeState::RecordingSync { take } => Some(("sync".to_string(), 0, take)),
            TakeState::RecordingNormal { chunk, take } => {
                let mut local = chunk;
                for header in &self.document.headers {
                    if local < header.chunks.len() {
                        return Some((header.text.clone(), local, take));
                    }
                    local -= header.chunks.len();
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_script;

    const RATE: u32 = 44100;

    fn session() -> Session {
        Session::new(parse_script("# Scene\nfirst line\n\nsecond line\n"), RATE)
    }

    #[test]
    fn test_start_twice_conflicts() {
        let mut s = session();
        s.start_take().unwrap();
        assert!(matches!(s.start_take(), Err(SessionError::Conflict(_))));
        assert!(matches!(s.start_sync_take(), Err(SessionError::Conflict(_))));
    }

    #[test]
    fn test_end_while_idle_conflicts() {
        let mut s = session();
        assert!(matches!(s.end_take(), Err(SessionError::Conflict(_))));
        assert_eq!(s.state(), TakeState::Idle);
    }

    #[test]
    fn test_take_stamped_from_audio_length() {
        let mut s = session();
        s.append_audio(&vec![0; 22050]);
        s.start_take().unwrap();
        assert!(s.current_take().unwrap().is_open());
        s.append_audio(&vec![0; 44100]);
        let take = s.end_take().unwrap();

        assert_eq!(take.span(), Some(TimeSpan::new(Duration::from_millis(500), Duration::from_millis(1500))));
        assert_eq!(s.selected_take(), Some(0));
    }

    #[test]
    fn test_mark_while_recording_ends_take() {
        let mut s = session();
        s.start_take().unwrap();
        s.append_audio(&[1; 100]);
        s.mark_take(TakeMark::Good).unwrap();
        assert_eq!(s.state(), TakeState::Idle);
        let take = s.current_take().unwrap();
        assert_eq!(take.mark, TakeMark::Good);
        assert!(take.end().unwrap() >= take.start);
    }

    #[test]
    fn test_mark_idle_changes_selected_take() {
        let mut s = session();
        assert!(matches!(s.mark_take(TakeMark::Bad), Err(SessionError::Bounds(_))));
        s.start_take().unwrap();
        s.end_take().unwrap();
        s.mark_take(TakeMark::Bad).unwrap();
        assert_eq!(s.current_take().unwrap().mark, TakeMark::Bad);
    }

    #[test]
    fn test_sync_take_resolves_offset_once() {
        let mut s = session();
        s.append_audio(&vec![0; 1000]);
        s.start_sync_take().unwrap();
        let mut block = vec![0; 1000];
        block[250] = 1 << 30;
        s.append_audio(&block);
        s.end_take().unwrap();
        assert_eq!(s.document().sync_offset(), Some(samples_to_duration(RATE, 1250)));

        s.start_sync_take().unwrap();
        let mut block = vec![0; 1000];
        block[10] = i32::MAX;
        s.append_audio(&block);
        s.mark_take(TakeMark::Good).unwrap();

        assert_eq!(s.document().sync_takes.len(), 2);
        assert_eq!(s.document().sync_takes[1].mark, TakeMark::Sync);
        assert_eq!(s.document().sync_offset(), Some(samples_to_duration(RATE, 1250)));
    }

    #[test]
    fn test_navigation_blocked_while_recording() {
        let mut s = session();
        s.start_take().unwrap();
        assert!(matches!(s.select_next_chunk(), Err(SessionError::Conflict(_))));
        s.end_take().unwrap();
        s.select_next_chunk().unwrap();
        assert_eq!(s.selected_chunk(), 1);
        assert_eq!(s.selected_take(), None);
        s.select_next_chunk().unwrap();
        assert_eq!(s.selected_chunk(), 1);
        s.select_previous_chunk().unwrap();
        assert_eq!(s.selected_take(), Some(0));
    }

    #[test]
    fn test_take_from_selection_is_clamped() {
        let mut s = session();
        s.append_audio(&vec![0; 44100]);
        s.take_from_selection(TimeSpan::new(Duration::from_millis(200), Duration::from_secs(5)))
            .unwrap();
        let span = s.current_take().unwrap().span().unwrap();
        assert_eq!(span, TimeSpan::new(Duration::from_millis(200), Duration::from_secs(1)));
    }

    #[test]
    fn test_persisted_session_rejects_new_takes() {
        let mut s = session();
        s.mark_persisted();
        assert!(matches!(s.start_take(), Err(SessionError::Conflict(_))));
    }

    #[test]
    fn test_extract_audio_clamps() {
        let mut s = session();
        s.append_audio(&[5; 10]);
        let slice = s.extract_audio(TimeSpan::new(Duration::ZERO, Duration::from_secs(3)));
        assert_eq!(slice.len(), 10);
    }
}
