//! Interactive recording session.
//!
//! Loads the script, starts capturing into a new session, and runs the session
//! screen until the user quits. Quitting an unsaved session ends and saves it.

use crate::config::TakeTrackConfig;
use crate::document::{read_script, TakeMark};
use crate::recording::audio::OutputStream;
use crate::recording::{
    CapturePipeline, CpalDevice, FrameInfo, PipelineConfig, Playback, SessionTui, UiCommand,
};
use crate::session::{
    end_session, lock_session, SaveReport, Session, SessionError, SessionResult, SessionStore,
    SharedSession,
};
use crate::ui::report_fatal;
use std::path::Path;

/// Runs a recording session against the script at `script_path`.
///
/// # Errors
/// - If the configuration or script cannot be loaded
/// - If the capture device cannot be opened
/// - If the terminal UI fails
pub async fn handle_record(script_path: &Path) -> anyhow::Result<()> {
    tracing::info!("=== taketrack session started ===");

    let config = TakeTrackConfig::load().map_err(|err| {
        report_fatal(
            "Configuration Error",
            format!("{err:#}"),
            "Please check ~/.config/taketrack/taketrack.toml and try again.",
        )
    })?;
    tracing::info!(
        "Configuration loaded: device={}, output_device={}, sample_rate={}Hz, block_size={}, queue_capacity={}",
        config.audio.device,
        config.audio.output_device,
        config.audio.sample_rate,
        config.audio.block_size,
        config.audio.queue_capacity
    );

    let document = read_script(script_path).map_err(|err| {
        report_fatal(
            "Script Error",
            format!("{err:#}"),
            "Pass a readable Markdown script with --script.",
        )
    })?;

    let session = Session::new(document, config.audio.sample_rate).shared();
    let store = SessionStore::new(&config.session.sessions_dir, config.session.preview_chars);
    tracing::info!("Sessions directory: {}", store.root().display());

    let mut startup_warning = None;
    let writer = match store.start_streaming(&mut lock_session(&session)) {
        Ok(writer) => Some(writer),
        Err(e) => {
            tracing::error!("Cannot stream audio to disk, keeping it in memory: {}", e);
            startup_warning = Some(format!("Audio kept in memory only: {e}"));
            None
        }
    };

    let pipeline = match CapturePipeline::start(
        CpalDevice::new(&config.audio.device),
        session.clone(),
        writer,
        PipelineConfig::from(&config.audio),
    )
    .await
    {
        Ok(pipeline) => pipeline,
        Err(err) => {
            if let Err(e) = store.abandon(&mut lock_session(&session)) {
                tracing::warn!("Failed to remove unused session directory: {}", e);
            }
            return Err(report_fatal(
                "Recording Error",
                err,
                "Please check your audio configuration and `taketrack list-devices`.",
            ));
        }
    };

    let mut tui = match SessionTui::new() {
        Ok(tui) => tui,
        Err(e) => {
            let report = end_session(&session, Some(pipeline), &store).await;
            tracing::error!("Failed to start the session screen: {}", e);
            eprintln!("{}", report.summary());
            return Err(e);
        }
    };
    if let Some(warning) = startup_warning {
        tui.set_status(warning, true);
    }

    let mut pipeline = Some(pipeline);
    let outcome = run_session(&mut tui, &session, &mut pipeline, &store, &config).await;
    if let Err(e) = &outcome {
        tracing::error!("Session screen failed: {:#}", e);
    }

    // Whatever happened on screen, an unsaved session is ended and saved.
    let final_report = if lock_session(&session).is_persisted() {
        None
    } else {
        tracing::info!("Ending unsaved session on exit");
        Some(end_session(&session, pipeline.take(), &store).await)
    };
    tui.cleanup()?;

    let in_session_report = outcome?;
    match final_report.or(in_session_report) {
        Some(report) => {
            println!("{}", report.summary());
            if !report.is_clean() {
                eprintln!("Some parts of the session need attention; see `taketrack logs`.");
            }
        }
        None => println!("Session ended without saving."),
    }

    tracing::info!("=== taketrack session exited ===");
    Ok(())
}

/// Event loop. Returns the report of the last save made from the screen.
async fn run_session(
    tui: &mut SessionTui,
    session: &SharedSession,
    pipeline: &mut Option<CapturePipeline>,
    store: &SessionStore,
    config: &TakeTrackConfig,
) -> anyhow::Result<Option<SaveReport>> {
    let playback = Playback::new();
    let mut last_report = None;
    let mut frame_count = 0u64;

    loop {
        let info = match pipeline.as_ref().map(|p| p.stats()) {
            Some(stats) => FrameInfo {
                playback_position: playback.position(),
                queued: stats.blocks_captured().saturating_sub(stats.blocks_consumed()),
                pressure_warnings: stats.pressure_warnings(),
                overflows: stats.overflows(),
                fault: stats.fault(),
            },
            None => FrameInfo {
                playback_position: playback.position(),
                ..FrameInfo::default()
            },
        };
        let recorded = {
            let s = lock_session(session);
            tui.render(&s, &info)?;
            s.recorded()
        };

        frame_count += 1;
        if frame_count % 200 == 0 {
            tracing::debug!("Session: {:?} recorded", recorded);
        }

        match tui.handle_input(recorded)? {
            UiCommand::Continue => {}
            UiCommand::Quit => break,
            UiCommand::EndSession => {
                if lock_session(session).is_persisted() {
                    tui.set_status("Session already saved", false);
                    continue;
                }
                let report = end_session(session, pipeline.take(), store).await;
                tui.set_status(report.summary(), !report.is_clean());
                last_report = Some(report);
            }
            command => {
                if let Err(e) = apply_command(command, session, tui, &playback, config) {
                    tracing::debug!("{:?} rejected: {}", command, e);
                    tui.set_status(e.to_string(), true);
                }
            }
        }
    }

    Ok(last_report)
}

/// Applies a take or navigation command to the session.
fn apply_command(
    command: UiCommand,
    session: &SharedSession,
    tui: &mut SessionTui,
    playback: &Playback,
    config: &TakeTrackConfig,
) -> SessionResult<()> {
    let mut s = lock_session(session);
    match command {
        UiCommand::NextChunk => s.select_next_chunk(),
        UiCommand::PreviousChunk => s.select_previous_chunk(),
        UiCommand::ToggleTake => {
            if s.is_recording() {
                s.end_take().map(|_| ())
            } else {
                s.start_take()
            }
        }
        UiCommand::StartSyncTake => s.start_sync_take(),
        UiCommand::MarkGood => s.mark_take(TakeMark::Good),
        UiCommand::MarkBad => s.mark_take(TakeMark::Bad),
        UiCommand::TakeFromSelection => {
            let selection = tui
                .view()
                .selection()
                .ok_or_else(|| SessionError::Bounds("no selection".to_string()))?;
            s.take_from_selection(selection)?;
            drop(s);
            tui.clear_selection();
            Ok(())
        }
        UiCommand::PlayTake => {
            if s.is_recording() {
                return Err(SessionError::Conflict("cannot play while recording"));
            }
            let span = s
                .current_take()
                .and_then(|t| t.span())
                .ok_or_else(|| SessionError::Bounds("no finished take selected".to_string()))?;
            let first_sample = span.sample_range(s.sample_rate(), s.audio().len()).start;
            let samples = s.extract_audio(span).to_vec();
            drop(s);

            let device = CpalDevice::new(&config.audio.output_device);
            let (rate, block_size) = (config.audio.sample_rate, config.audio.block_size);
            playback.play(samples, first_sample, block_size, move || {
                device
                    .open_output_stream(rate, block_size)
                    .map(|stream| Box::new(stream) as Box<dyn OutputStream>)
            })
        }
        UiCommand::Continue
        | UiCommand::EndSession
        | UiCommand::ToggleStickToEnd
        | UiCommand::ToggleDebug
        | UiCommand::Quit => Ok(()),
    }
}
