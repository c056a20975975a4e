//! Script structure and the takes recorded against it.

use crate::timing::duration_to_samples;
use std::fmt;
use std::ops::Range;
use std::time::Duration;

/// How a take was judged by the performer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TakeMark {
    #[default]
    Unmarked,
    Good,
    Bad,
    /// Span containing an audio sync peak, usually a clap or clapperboard.
    Sync,
}

impl fmt::Display for TakeMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmarked => write!(f, "unmarked"),
            Self::Good => write!(f, "good"),
            Self::Bad => write!(f, "bad"),
            Self::Sync => write!(f, "sync"),
        }
    }
}

/// A span of session time, both ends measured from the start of capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeSpan {
    pub start: Duration,
    pub end: Duration,
}

impl TimeSpan {
    pub fn new(start: Duration, end: Duration) -> Self {
        Self { start, end }
    }

    /// Length of the span; zero if the ends are inverted.
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    pub fn contains(&self, t: Duration) -> bool {
        self.start <= t && t <= self.end
    }

    /// Sample indices covered by the span, clamped to a buffer of `len` samples.
    pub fn sample_range(&self, sample_rate: u32, len: usize) -> Range<usize> {
        let start = duration_to_samples(sample_rate, self.start).min(len);
        let end = duration_to_samples(sample_rate, self.end).clamp(start, len);
        start..end
    }
}

/// One attempt at a chunk, or a sync take.
///
/// The end is unknown while the take is still being recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Take {
    pub start: Duration,
    end: Option<Duration>,
    pub mark: TakeMark,
}

impl Take {
    pub fn open(start: Duration, mark: TakeMark) -> Self {
        Self {
            start,
            end: None,
            mark,
        }
    }

    pub fn closed(span: TimeSpan, mark: TakeMark) -> Self {
        Self {
            start: span.start,
            end: Some(span.end.max(span.start)),
            mark,
        }
    }

    /// Closes the take. An end earlier than the start is raised to the start.
    pub fn close(&mut self, end: Duration) {
        self.end = Some(end.max(self.start));
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    pub fn end(&self) -> Option<Duration> {
        self.end
    }

    /// The take's span, or `None` while it is still open.
    pub fn span(&self) -> Option<TimeSpan> {
        self.end.map(|end| TimeSpan::new(self.start, end))
    }
}

/// Selectable script text that takes are recorded against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    /// In recording order
    pub takes: Vec<Take>,
}

impl Chunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            takes: Vec::new(),
        }
    }

    /// First `max_chars` characters of the content.
    pub fn preview(&self, max_chars: usize) -> &str {
        match self.content.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.content[..idx],
            None => &self.content,
        }
    }
}

/// Non-selectable script text such as stage directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaChunk {
    pub content: String,
}

impl MetaChunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Parsed piece of script content, before it is filed under a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptChunk {
    Normal(Chunk),
    Meta(MetaChunk),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkKind {
    Normal,
    Meta,
}

/// A script section. Normal and meta chunks are stored apart; `order` remembers how they interleave.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub text: String,
    pub chunks: Vec<Chunk>,
    pub meta_chunks: Vec<MetaChunk>,
    order: Vec<ChunkKind>,
}

impl Header {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn add_chunk(&mut self, chunk: ScriptChunk) {
        match chunk {
            ScriptChunk::Normal(c) => {
                self.chunks.push(c);
                self.order.push(ChunkKind::Normal);
            }
            ScriptChunk::Meta(m) => {
                self.meta_chunks.push(m);
                self.order.push(ChunkKind::Meta);
            }
        }
    }
}

/// Item of the script in reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renderable<'a> {
    Header(&'a Header),
    /// `index` is the chunk's position across the whole document.
    Chunk { index: usize, chunk: &'a Chunk },
    Meta(&'a MetaChunk),
}

/// A script plus every take recorded against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub headers: Vec<Header>,
    pub sync_takes: Vec<Take>,
    /// Precise timestamp of the sync peak, resolved from the first sync take.
    sync_offset: Option<Duration>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(vec![Header::default()])
    }
}

impl Document {
    /// Builds a document; an empty header list gets one untitled header.
    pub fn new(mut headers: Vec<Header>) -> Self {
        if headers.is_empty() {
            headers.push(Header::default());
        }
        Self {
            headers,
            sync_takes: Vec::new(),
            sync_offset: None,
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.headers.iter().map(|h| h.chunks.len()).sum()
    }

    /// Looks up a chunk by its index across all headers.
    pub fn chunk(&self, mut index: usize) -> Option<&Chunk> {
        for header in &self.headers {
            if index < header.chunks.len() {
                return header.chunks.get(index);
            }
            index -= header.chunks.len();
        }
        None
    }

    pub fn chunk_mut(&mut self, mut index: usize) -> Option<&mut Chunk> {
        for header in &mut self.headers {
            if index < header.chunks.len() {
                return header.chunks.get_mut(index);
            }
            index -= header.chunks.len();
        }
        None
    }

    pub fn sync_offset(&self) -> Option<Duration> {
        self.sync_offset
    }

    /// Stores the sync offset unless one is already set. Returns whether it was stored.
    pub fn set_sync_offset(&mut self, offset: Duration) -> bool {
        if self.sync_offset.is_some() {
            return false;
        }
        self.sync_offset = Some(offset);
        true
    }

    /// Sync takes first, then chunk takes in script order.
    pub fn all_takes(&self) -> impl Iterator<Item = &Take> {
        self.sync_takes.iter().chain(
            self.headers
                .iter()
                .flat_map(|h| h.chunks.iter())
                .flat_map(|c| c.takes.iter()),
        )
    }

    /// Rebuilds reading order from each header's interleaving tags.
    pub fn renderable(&self) -> Vec<Renderable<'_>> {
        let mut items = Vec::new();
        let mut chunk_base = 0;
        for header in &self.headers {
            items.push(Renderable::Header(header));
            let (mut normal, mut meta) = (0, 0);
            for kind in &header.order {
                match kind {
                    ChunkKind::Normal => {
                        if let Some(chunk) = header.chunks.get(normal) {
                            items.push(Renderable::Chunk {
                                index: chunk_base + normal,
                                chunk,
                            });
                        }
                        normal += 1;
                    }
                    ChunkKind::Meta => {
                        if let Some(m) = header.meta_chunks.get(meta) {
                            items.push(Renderable::Meta(m));
                        }
                        meta += 1;
                    }
                }
            }
            chunk_base += header.chunks.len();
        }
        items
    }
}
