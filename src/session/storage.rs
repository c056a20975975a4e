//! On-disk session layout.
//!
//! Each session gets a numbered directory under the sessions root holding the
//! streamed `audio.wav`, a `metadata.json` with the sync offset, and `takes.csv`
//! listing every chunk take relative to that offset.

use super::error::{SessionError, SessionResult};
use super::state::Session;
use crate::document::Document;
use crate::timing::{format_offset, format_timestamp};
use chrono::TimeDelta;
use hound::{SampleFormat, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const AUDIO_FILE: &str = "audio.wav";
pub const METADATA_FILE: &str = "metadata.json";
pub const TAKES_FILE: &str = "takes.csv";

const BITS_PER_SAMPLE: u16 = 32;
const TAKES_HEADER: [&str; 7] = [
    "header",
    "chunk_index",
    "chunk_text",
    "take_index",
    "take_mark",
    "take_start",
    "take_end",
];

/// Contents of `metadata.json`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionMetadata {
    #[serde(rename = "SyncOffset")]
    pub sync_offset: String,
}

/// Seekable byte sink the WAV encoder writes into.
pub trait AudioSink: Write + Seek + Send {}

impl<T: Write + Seek + Send> AudioSink for T {}

/// Incremental WAV encoder fed by the capture consumer.
pub struct StreamingWriter {
    writer: WavWriter<Box<dyn AudioSink>>,
    path: PathBuf,
    samples_written: u64,
}

impl StreamingWriter {
    fn create(path: PathBuf, sample_rate: u32) -> SessionResult<Self> {
        let file = BufWriter::new(File::create(&path)?);
        Self::with_sink(Box::new(file), path, sample_rate)
    }

    /// Encodes into `sink`; `path` is where the finished audio is reported to live.
    pub fn with_sink(
        sink: Box<dyn AudioSink>,
        path: PathBuf,
        sample_rate: u32,
    ) -> SessionResult<Self> {
        let writer = WavWriter::new(sink, wav_spec(sample_rate))?;
        Ok(Self {
            writer,
            path,
            samples_written: 0,
        })
    }

    /// Appends one captured block to the file.
    pub fn write_block(&mut self, block: &[i32]) -> SessionResult<()> {
        for &sample in block {
            self.writer.write_sample(sample)?;
        }
        self.samples_written += block.len() as u64;
        Ok(())
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Writes the final header sizes and closes the file.
    pub fn finalize(self) -> SessionResult<PathBuf> {
        self.writer.finalize()?;
        tracing::info!(
            "Audio stream closed: {} ({} samples)",
            self.path.display(),
            self.samples_written
        );
        Ok(self.path)
    }
}

fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    }
}

/// Outcome of a save. Problems that did not stop the save are listed here.
#[derive(Debug, Default)]
pub struct SaveReport {
    pub dir: Option<PathBuf>,
    pub problems: Vec<SessionError>,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }

    /// One line per problem, for display.
    pub fn summary(&self) -> String {
        let location = self
            .dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "<unsaved>".to_string());
        if self.is_clean() {
            return format!("Session saved: {location}");
        }
        let mut lines = vec![format!("Session saved with problems: {location}")];
        lines.extend(self.problems.iter().map(|p| format!("  {p}")));
        lines.join("\n")
    }
}

/// Owns the sessions root directory.
pub struct SessionStore {
    root: PathBuf,
    preview_chars: usize,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>, preview_chars: usize) -> Self {
        Self {
            root: root.into(),
            preview_chars,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Picks the lowest unused numeric directory name, once per session.
    ///
    /// # Errors
    /// - If the sessions root cannot be created
    pub fn derive_id(&self, session: &mut Session) -> SessionResult<u32> {
        if let Some(id) = session.id() {
            return Ok(id);
        }
        fs::create_dir_all(&self.root)?;
        let mut id = 0u32;
        while self.root.join(id.to_string()).exists() {
            id += 1;
        }
        session.set_id(id);
        tracing::debug!("Session id derived: {}", id);
        Ok(id)
    }

    /// Returns the session's directory, creating it if needed.
    pub fn session_dir(&self, session: &mut Session) -> SessionResult<PathBuf> {
        let id = self.derive_id(session)?;
        let dir = self.root.join(id.to_string());
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Opens the streaming encoder for the session's audio file.
    ///
    /// # Errors
    /// - If the session directory cannot be created
    /// - If the WAV file cannot be created
    pub fn start_streaming(&self, session: &mut Session) -> SessionResult<StreamingWriter> {
        let dir = self.session_dir(session)?;
        let writer = StreamingWriter::create(dir.join(AUDIO_FILE), session.sample_rate())?;
        session.set_streaming(true);
        tracing::info!(
            "Streaming audio to {} ({}Hz, {}-bit mono)",
            dir.join(AUDIO_FILE).display(),
            session.sample_rate(),
            BITS_PER_SAMPLE
        );
        Ok(writer)
    }

    /// Removes the directory of a session that never captured anything, so its
    /// id is free for the next run.
    ///
    /// # Errors
    /// - If the directory exists but cannot be removed
    pub fn abandon(&self, session: &mut Session) -> SessionResult<()> {
        session.set_streaming(false);
        let Some(id) = session.id() else {
            return Ok(());
        };
        if session.is_persisted() || !session.audio().is_empty() {
            return Ok(());
        }
        let dir = self.root.join(id.to_string());
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            tracing::info!("Removed unused session directory {}", dir.display());
        }
        Ok(())
    }

    /// Writes metadata and the take log, plus the audio file if streaming did not cover it.
    ///
    /// The session is marked persisted only when every step succeeded; otherwise it can be saved again.
    pub fn save(&self, session: &mut Session) -> SaveReport {
        let mut report = SaveReport::default();
        let dir = match self.session_dir(session) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::error!("Failed to create session directory: {}", e);
                report.problems.push(e);
                return report;
            }
        };
        report.dir = Some(dir.clone());
        let mut failed = false;

        if !session.is_streaming() {
            tracing::warn!("Audio was not fully streamed; writing it from memory");
            match write_audio(&dir.join(AUDIO_FILE), session.audio(), session.sample_rate()) {
                Ok(()) => session.set_streaming(true),
                Err(e) => {
                    tracing::error!("Failed to save audio: {}", e);
                    report.problems.push(e);
                    failed = true;
                }
            }
        }

        if let Err(e) = write_metadata(&dir.join(METADATA_FILE), session.document()) {
            tracing::error!("Failed to save metadata: {}", e);
            report.problems.push(e);
            failed = true;
        }

        match write_takes(&dir.join(TAKES_FILE), session.document(), self.preview_chars) {
            Ok(open_takes) => report.problems.extend(open_takes),
            Err(e) => {
                tracing::error!("Failed to save takes: {}", e);
                report.problems.push(e);
                failed = true;
            }
        }

        if !failed {
            session.mark_persisted();
            tracing::info!("Current session successfully saved: {}", dir.display());
        }
        report
    }
}

/// Writes the whole buffer as a WAV file in one pass.
pub fn write_audio(path: &Path, samples: &[i32], sample_rate: u32) -> SessionResult<()> {
    let mut writer = WavWriter::create(path, wav_spec(sample_rate))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn sync_delta(offset: Duration) -> SessionResult<TimeDelta> {
    TimeDelta::from_std(offset).map_err(|e| SessionError::Bounds(format!("timestamp {offset:?}: {e}")))
}

/// Writes `{"SyncOffset": "HH:MM:SS.mmm"}`.
pub fn write_metadata(path: &Path, document: &Document) -> SessionResult<()> {
    let metadata = SessionMetadata {
        sync_offset: format_timestamp(document.sync_offset().unwrap_or_default()),
    };
    fs::write(path, serde_json::to_string(&metadata)?)?;
    Ok(())
}

/// Writes one row per chunk take, timestamps shifted by the sync offset.
///
/// Open takes are written with an empty end and returned as problems.
pub fn write_takes(
    path: &Path,
    document: &Document,
    preview_chars: usize,
) -> SessionResult<Vec<SessionError>> {
    let offset = sync_delta(document.sync_offset().unwrap_or_default())?;
    let mut problems = Vec::new();
    let mut csv = csv_row(TAKES_HEADER.iter().map(|s| s.to_string()));

    for header in &document.headers {
        for (chunk_index, chunk) in header.chunks.iter().enumerate() {
            for (take_index, take) in chunk.takes.iter().enumerate() {
                let start = format_offset(sync_delta(take.start)? - offset);
                let end = match take.end() {
                    Some(end) => format_offset(sync_delta(end)? - offset),
                    None => {
                        tracing::warn!(
                            "Take {} of chunk {} is still open; writing it without an end",
                            take_index,
                            chunk_index
                        );
                        problems.push(SessionError::OpenTake {
                            header: header.text.clone(),
                            chunk_index,
                            take_index,
                        });
                        String::new()
                    }
                };
                csv.push_str(&csv_row([
                    header.text.clone(),
                    chunk_index.to_string(),
                    format!("{}...", chunk.preview(preview_chars)),
                    take_index.to_string(),
                    take.mark.to_string(),
                    start,
                    end,
                ]));
            }
        }
    }

    fs::write(path, csv)?;
    Ok(problems)
}

fn csv_row(fields: impl IntoIterator<Item = String>) -> String {
    let mut row = fields
        .into_iter()
        .map(|f| csv_field(&f))
        .collect::<Vec<_>>()
        .join(",");
    row.push('\n');
    row
}

fn csv_field(field: &str) -> String {
    let needs_quotes = field.starts_with(' ')
        || field.contains([',', '"', '\n', '\r']);
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{parse_script, TakeMark, TimeSpan};
    use tempfile::TempDir;

    const RATE: u32 = 44100;

    fn session() -> Session {
        Session::new(parse_script("# Intro, part one\nHello there, this line is longer than thirty-two chars\n"), RATE)
    }

    #[test]
    fn test_derive_id_picks_lowest_unused_and_caches() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("0")).unwrap();
        fs::create_dir_all(tmp.path().join("2")).unwrap();
        let store = SessionStore::new(tmp.path(), 32);

        let mut s = session();
        assert_eq!(store.derive_id(&mut s).unwrap(), 1);
        fs::create_dir_all(tmp.path().join("1")).unwrap();
        assert_eq!(store.derive_id(&mut s).unwrap(), 1);
    }

    #[test]
    fn test_abandon_frees_unused_session_id() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path(), 32);

        let mut s = session();
        let writer = store.start_streaming(&mut s).unwrap();
        drop(writer);
        assert!(tmp.path().join("0").join(AUDIO_FILE).exists());

        store.abandon(&mut s).unwrap();
        assert!(!tmp.path().join("0").exists());
        assert!(!s.is_streaming());
        assert_eq!(store.derive_id(&mut session()).unwrap(), 0);
    }

    #[test]
    fn test_abandon_keeps_session_with_audio() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path(), 32);

        let mut s = session();
        store.session_dir(&mut s).unwrap();
        s.append_audio(&[1, 2, 3]);
        store.abandon(&mut s).unwrap();
        assert!(tmp.path().join("0").exists());
    }

    #[test]
    fn test_streaming_writer_produces_readable_wav() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path(), 32);
        let mut s = session();

        let mut writer = store.start_streaming(&mut s).unwrap();
        writer.write_block(&[1, -2, i32::MAX]).unwrap();
        writer.write_block(&[i32::MIN]).unwrap();
        let path = writer.finalize().unwrap();

        let mut reader = hound::WavReader::open(path).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 32);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, RATE);
        let samples: Vec<i32> = reader.samples::<i32>().map(Result::unwrap).collect();
        assert_eq!(samples, [1, -2, i32::MAX, i32::MIN]);
        assert!(s.is_streaming());
    }

    #[test]
    fn test_save_writes_takes_relative_to_sync_offset() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path(), 32);
        let mut s = session();

        s.append_audio(&vec![0; 22050]);
        s.start_sync_take().unwrap();
        let mut block = vec![0; 22050];
        block[0] = 1000;
        s.append_audio(&block);
        s.end_take().unwrap();
        s.start_take().unwrap();
        s.append_audio(&vec![0; 44100]);
        s.mark_take(TakeMark::Good).unwrap();

        let report = store.save(&mut s);
        assert!(report.is_clean(), "{}", report.summary());
        assert!(s.is_persisted());
        let dir = report.dir.unwrap();

        let metadata: SessionMetadata =
            serde_json::from_str(&fs::read_to_string(dir.join(METADATA_FILE)).unwrap()).unwrap();
        assert_eq!(metadata.sync_offset, "00:00:00.500");

        let takes = fs::read_to_string(dir.join(TAKES_FILE)).unwrap();
        let lines: Vec<&str> = takes.lines().collect();
        assert_eq!(lines[0], "header,chunk_index,chunk_text,take_index,take_mark,take_start,take_end");
        assert_eq!(
            lines[1],
            "\"# Intro, part one\",0,\"Hello there, this line is longer...\",0,good,00:00:00.500,00:00:01.500"
        );
        assert_eq!(lines.len(), 2);
        // not streamed, so audio was written from memory
        assert!(dir.join(AUDIO_FILE).exists());
    }

    #[test]
    fn test_open_take_reported_not_zeroed() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path(), 32);
        let mut s = session();
        s.append_audio(&vec![0; 100]);
        s.start_take().unwrap();

        let report = store.save(&mut s);
        assert!(matches!(report.problems.as_slice(), [SessionError::OpenTake { take_index: 0, .. }]));
        let takes = fs::read_to_string(report.dir.unwrap().join(TAKES_FILE)).unwrap();
        let row = takes.lines().nth(1).unwrap();
        assert!(row.ends_with(','), "end column should be empty: {row}");
    }

    #[test]
    fn test_takes_before_sync_point_are_negative() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(TAKES_FILE);
        let mut doc = parse_script("# H\nline\n");
        doc.chunk_mut(0).unwrap().takes.push(crate::document::Take::closed(
            TimeSpan::new(Duration::from_millis(100), Duration::from_millis(300)),
            TakeMark::Bad,
        ));
        doc.set_sync_offset(Duration::from_millis(200));
        write_takes(&path, &doc, 32).unwrap();
        let takes = fs::read_to_string(path).unwrap();
        assert!(takes.contains("bad,-00:00:00.100,00:00:00.100"));
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
