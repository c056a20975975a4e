//! Ending a session: stop capture, close any open take, save everything.

use super::error::SessionError;
use super::state::{lock_session, SharedSession};
use super::storage::{SaveReport, SessionStore};
use crate::recording::CapturePipeline;

/// Stops capture and persists the session.
///
/// Every step runs even if an earlier one failed; failures end up in the
/// report instead of being rolled back. A session that did not persist cleanly
/// can be ended again, which then only retries the save.
pub async fn end_session(
    session: &SharedSession,
    pipeline: Option<CapturePipeline>,
    store: &SessionStore,
) -> SaveReport {
    let mut problems = Vec::new();

    if let Some(pipeline) = pipeline {
        let summary = pipeline.stop().await;
        if let Some(fault) = summary.fault {
            problems.push(SessionError::Device(fault));
        }
        if let Some(e) = summary.stream_error {
            tracing::error!("Audio stream to disk failed: {}", e);
            problems.push(e);
        }
        if summary.overflows > 0 {
            tracing::warn!(
                "Capture queue overflowed {} times during the session",
                summary.overflows
            );
        }
    }

    let mut report = {
        let mut s = lock_session(session);
        if let Some((header, chunk_index, take_index)) = s.open_take_location() {
            tracing::warn!("Closing take left open at session end");
            match s.end_take() {
                Ok(_) => problems.push(SessionError::OpenTake {
                    header,
                    chunk_index,
                    take_index,
                }),
                Err(e) => problems.push(e),
            }
        }
        store.save(&mut s)
    };

    problems.append(&mut report.problems);
    report.problems = problems;
    if report.is_clean() {
        tracing::info!("Session ended cleanly");
    } else {
        tracing::warn!("Session ended with {} problems", report.problems.len());
    }
    report
}
