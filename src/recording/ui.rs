//! Terminal user interface for a recording session.
//!
//! The screen is split into the script (selected chunk highlighted), the audio
//! pane with the waveform of the visible window, the key hints, and on the
//! right the chunk list and the takes of the selected chunk. Mouse gestures in
//! the audio pane zoom, pan and select.

use super::visualizations::{envelope, AudioView, Zoom};
use crate::document::{Renderable, Take, TakeMark, TimeSpan};
use crate::session::{Session, TakeState};
use crate::timing::{format_timestamp, samples_to_duration};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    layout::Position,
    prelude::*,
    symbols::Marker,
    widgets::{
        canvas::{Canvas, Line as CanvasLine},
        Block, List, ListItem, Paragraph, Wrap,
    },
};
use std::io::{stdout, Stdout};
use std::ops::Range;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

const DRIFT_WARN: Duration = Duration::from_millis(500);
const DRIFT_ALARM: Duration = Duration::from_secs(1);

const WAITING_FRAMES: [&str; 4] = ["▖", "▘", "▝", "▗"];

const WAVEFORM_COLOR: Color = Color::Gray;
const UNMARKED_COLOR: Color = Color::Indexed(33);
const SELECTION_COLOR: Color = Color::Yellow;
const SYNC_MARKER_COLOR: Color = Color::Magenta;
const PLAYBACK_COLOR: Color = Color::Cyan;
const CODE_COLOR: Color = Color::Indexed(57);

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    /// Nothing to do this frame
    Continue,
    NextChunk,
    PreviousChunk,
    /// Start a take when idle, end it when recording
    ToggleTake,
    StartSyncTake,
    MarkGood,
    MarkBad,
    PlayTake,
    TakeFromSelection,
    EndSession,
    ToggleStickToEnd,
    ToggleDebug,
    Quit,
}

/// Maps a key press to a command.
pub fn command_for_key(key: KeyEvent) -> UiCommand {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => UiCommand::Quit,
        KeyCode::Char('d') if ctrl => UiCommand::ToggleDebug,
        KeyCode::Char('q') | KeyCode::Esc => UiCommand::Quit,
        KeyCode::Down | KeyCode::Char('j') => UiCommand::NextChunk,
        KeyCode::Up | KeyCode::Char('k') => UiCommand::PreviousChunk,
        KeyCode::Char(' ') => UiCommand::ToggleTake,
        KeyCode::Char('s') => UiCommand::StartSyncTake,
        KeyCode::Char('g') => UiCommand::MarkGood,
        KeyCode::Char('b') => UiCommand::MarkBad,
        KeyCode::Char('p') => UiCommand::PlayTake,
        KeyCode::Char('t') => UiCommand::TakeFromSelection,
        KeyCode::Char('r') => UiCommand::EndSession,
        KeyCode::Char('f') => UiCommand::ToggleStickToEnd,
        _ => UiCommand::Continue,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keybind {
    pub key: &'static str,
    pub description: &'static str,
}

const fn bind(key: &'static str, description: &'static str) -> Keybind {
    Keybind { key, description }
}

/// Key hints for the current state.
pub fn keybinds(state: TakeState, has_takes: bool, selection_active: bool) -> Vec<Keybind> {
    let mut binds = match state {
        TakeState::Idle => {
            let mut binds = vec![
                bind("↑/↓", "chunk"),
                bind("space", "start take"),
                bind("s", "sync take"),
            ];
            if has_takes {
                binds.extend([bind("g", "good"), bind("b", "bad"), bind("p", "play")]);
            }
            if selection_active {
                binds.push(bind("t", "take from selection"));
            }
            binds.push(bind("r", "end session"));
            binds
        }
        TakeState::RecordingNormal { .. } => vec![
            bind("space", "end take"),
            bind("g", "end as good"),
            bind("b", "end as bad"),
        ],
        TakeState::RecordingSync { .. } => vec![bind("space", "end sync take")],
    };
    binds.extend([
        bind("f", "stick to end"),
        bind("^D", "debug"),
        bind("q", "quit"),
    ]);
    binds
}

/// Per-frame data that lives outside the session.
#[derive(Debug, Clone, Default)]
pub struct FrameInfo {
    /// Session sample currently being played back
    pub playback_position: Option<usize>,
    /// Blocks captured but not yet appended to the session
    pub queued: u64,
    pub pressure_warnings: u64,
    pub overflows: u64,
    /// Capture failure to keep on screen
    pub fault: Option<String>,
}

#[derive(Debug, Clone)]
struct Status {
    message: String,
    is_error: bool,
}

/// Terminal UI for a recording session.
pub struct SessionTui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    view: AudioView,
    /// Inner area of the audio pane as last drawn, for mouse hit-testing
    audio_area: Rect,
    show_debug: bool,
    first_audio_at: Option<Instant>,
    tick: usize,
    status: Option<Status>,
    restored: bool,
}

impl SessionTui {
    /// Enters the alternate screen with mouse capture.
    ///
    /// # Errors
    /// - If raw mode cannot be enabled
    /// - If the alternate screen or mouse capture cannot be entered
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;

        Ok(SessionTui {
            terminal,
            view: AudioView::default(),
            audio_area: Rect::default(),
            show_debug: false,
            first_audio_at: None,
            tick: 0,
            status: None,
            restored: false,
        })
    }

    pub fn view(&self) -> &AudioView {
        &self.view
    }

    pub fn clear_selection(&mut self) {
        self.view.clear_selection();
    }

    /// Shows a message in the controls pane until the next one replaces it.
    pub fn set_status(&mut self, message: impl Into<String>, is_error: bool) {
        self.status = Some(Status {
            message: message.into(),
            is_error,
        });
    }

    /// Draws one frame.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn render(&mut self, session: &Session, info: &FrameInfo) -> anyhow::Result<()> {
        if self.first_audio_at.is_none() && !session.audio().is_empty() {
            self.first_audio_at = Some(Instant::now());
        }
        self.view.refresh(session.recorded());
        self.tick = self.tick.wrapping_add(1);

        let drift = self.first_audio_at.map(|t| {
            let elapsed = t.elapsed();
            let recorded = session.recorded();
            if elapsed > recorded {
                elapsed - recorded
            } else {
                recorded - elapsed
            }
        });
        let debug = self.show_debug.then(|| debug_line(drift, info));
        let waiting = WAITING_FRAMES[(self.tick / 4) % WAITING_FRAMES.len()];

        let Self {
            terminal,
            view,
            audio_area,
            status,
            ..
        } = self;

        terminal.draw(|frame| {
            let [main, side] =
                Layout::horizontal([Constraint::Percentage(80), Constraint::Percentage(20)])
                    .areas(frame.area());
            let [script_area, audio_pane, controls_area] = Layout::vertical([
                Constraint::Percentage(50),
                Constraint::Min(6),
                Constraint::Length(4),
            ])
            .areas(main);
            let [chunks_area, takes_area] =
                Layout::vertical([Constraint::Percentage(60), Constraint::Percentage(40)])
                    .areas(side);

            render_script(frame, script_area, session);
            *audio_area = render_audio(frame, audio_pane, session, view, info, waiting, debug);
            render_controls(frame, controls_area, session, view, info, status.as_ref());
            render_chunks(frame, chunks_area, session);
            render_takes(frame, takes_area, session);
        })?;
        Ok(())
    }

    /// Waits briefly for input and returns what it asked for.
    ///
    /// Mouse gestures and display toggles are applied here and come back as `Continue`.
    ///
    /// # Errors
    /// - If event polling fails
    pub fn handle_input(&mut self, recorded: Duration) -> anyhow::Result<UiCommand> {
        if !event::poll(POLL_INTERVAL)? {
            return Ok(UiCommand::Continue);
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                let command = command_for_key(key);
                tracing::debug!("Key {:?} -> {:?}", key.code, command);
                Ok(match command {
                    UiCommand::ToggleStickToEnd => {
                        self.view.toggle_stick_to_end();
                        UiCommand::Continue
                    }
                    UiCommand::ToggleDebug => {
                        self.show_debug = !self.show_debug;
                        UiCommand::Continue
                    }
                    other => other,
                })
            }
            Event::Mouse(mouse) => {
                self.handle_mouse(mouse, recorded);
                Ok(UiCommand::Continue)
            }
            _ => Ok(UiCommand::Continue),
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent, recorded: Duration) {
        let area = self.audio_area;
        if area.width == 0 {
            return;
        }
        let inside = area.contains(Position::new(mouse.column, mouse.row));
        let x = mouse
            .column
            .saturating_sub(area.x)
            .min(area.width.saturating_sub(1));

        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) if inside => self.view.press(x),
            MouseEventKind::Drag(MouseButton::Left) => self.view.drag(x),
            MouseEventKind::Down(MouseButton::Right) if inside => self.view.clear_selection(),
            MouseEventKind::Down(MouseButton::Middle) if inside => self.view.pan(x, recorded),
            MouseEventKind::Drag(MouseButton::Middle) => self.view.pan(x, recorded),
            MouseEventKind::Up(_) => self.view.release(x),
            MouseEventKind::ScrollUp if inside => self.view.zoom(Zoom::In, recorded),
            MouseEventKind::ScrollDown if inside => self.view.zoom(Zoom::Out, recorded),
            _ => {}
        }
    }

    /// Restores the terminal.
    ///
    /// # Errors
    /// - If raw mode cannot be disabled
    /// - If the alternate screen cannot be left
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for SessionTui {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn mark_color(mark: TakeMark) -> Color {
    match mark {
        TakeMark::Unmarked => UNMARKED_COLOR,
        TakeMark::Good => Color::Green,
        TakeMark::Bad => Color::Red,
        TakeMark::Sync => Color::Magenta,
    }
}

fn debug_line(drift: Option<Duration>, info: &FrameInfo) -> Line<'static> {
    let Some(drift) = drift else {
        return Line::from("drift: waiting for audio").style(Style::default().fg(Color::DarkGray));
    };
    let color = if drift > DRIFT_ALARM {
        Color::Red
    } else if drift > DRIFT_WARN {
        Color::Yellow
    } else {
        Color::Green
    };
    Line::from(format!(
        "drift {} ms | queued {} | pressure {} | overflows {}",
        drift.as_millis(),
        info.queued,
        info.pressure_warnings,
        info.overflows
    ))
    .style(Style::default().fg(color))
}

/// Styles `*italic*`, `**bold**` and `` `code` `` runs, dropping the markers.
///
/// A run of stars opens emphasis at that depth; the same number of stars
/// closes it. Backticks toggle code.
fn emphasis_spans(line: &str, base: Style) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut depth = 0usize;
    let mut code = false;
    let mut stars = 0usize;

    for c in line.chars() {
        match c {
            '`' => {
                code = !code;
                continue;
            }
            '*' => {
                stars += 1;
                continue;
            }
            _ => {
                if depth == 0 {
                    depth = stars;
                } else if stars == depth {
                    depth = 0;
                }
                stars = 0;
            }
        }

        let style = if code {
            base.fg(CODE_COLOR).add_modifier(Modifier::BOLD)
        } else {
            match depth {
                0 => base,
                1 => base.add_modifier(Modifier::ITALIC),
                _ => base.add_modifier(Modifier::BOLD),
            }
        };
        match spans.last_mut() {
            Some(last) if last.style == style => last.content.to_mut().push(c),
            _ => spans.push(Span::styled(c.to_string(), style)),
        }
    }
    spans
}

fn render_script(frame: &mut Frame, area: Rect, session: &Session) {
    let selected = session.selected_chunk();
    let mut lines: Vec<Line> = Vec::new();
    let mut selected_line = 0;

    for item in session.document().renderable() {
        match item {
            Renderable::Header(header) => {
                if header.text.is_empty() {
                    continue;
                }
                lines.push(Line::styled(
                    header.text.clone(),
                    Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
                ));
            }
            Renderable::Chunk { index, chunk } => {
                let style = if index == selected {
                    selected_line = lines.len();
                    Style::default().fg(Color::Black).bg(Color::Yellow)
                } else {
                    Style::default()
                };
                lines.extend(chunk.content.lines().map(|l| Line::from(emphasis_spans(l, style))));
            }
            Renderable::Meta(meta) => {
                let style = Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC);
                lines.extend(meta.content.lines().map(|l| Line::from(emphasis_spans(l, style))));
            }
        }
        lines.push(Line::default());
    }

    let scroll = selected_line.saturating_sub(area.height as usize / 3);
    frame.render_widget(
        Paragraph::new(lines)
            .block(Block::bordered().title(" Script "))
            .wrap(Wrap { trim: false })
            .scroll((scroll.min(u16::MAX as usize) as u16, 0)),
        area,
    );
}

/// Column coloring: chunk takes by mark, the selection on top.
struct SpanColors {
    takes: Vec<(Range<usize>, Color)>,
    selection: Option<Range<usize>>,
}

impl SpanColors {
    fn new(session: &Session, selection: Option<TimeSpan>) -> Self {
        let rate = session.sample_rate();
        let len = session.audio().len();
        let recorded = session.recorded();
        let takes = session
            .document()
            .all_takes()
            .map(|take: &Take| {
                let span = take
                    .span()
                    .unwrap_or_else(|| TimeSpan::new(take.start, recorded));
                (span.sample_range(rate, len), mark_color(take.mark))
            })
            .collect();
        Self {
            takes,
            selection: selection.map(|s| s.sample_range(rate, len)),
        }
    }

    fn color(&self, columns: Range<usize>) -> Color {
        let hits = |r: &Range<usize>| {
            if columns.is_empty() {
                r.contains(&columns.start)
            } else {
                columns.start < r.end && r.start < columns.end
            }
        };
        if self.selection.as_ref().is_some_and(hits) {
            return SELECTION_COLOR;
        }
        self.takes
            .iter()
            .find(|(r, _)| hits(r))
            .map(|(_, color)| *color)
            .unwrap_or(WAVEFORM_COLOR)
    }
}

fn audio_title(session: &Session) -> String {
    let state = match session.state() {
        TakeState::Idle => String::new(),
        TakeState::RecordingNormal { take, .. } => format!(" ● recording take {take}"),
        TakeState::RecordingSync { .. } => " ● recording sync take".to_string(),
    };
    let saved = if session.is_persisted() { " (saved)" } else { "" };
    format!(" Audio{state}{saved} ")
}

/// Draws the audio pane and returns its inner area.
fn render_audio(
    frame: &mut Frame,
    area: Rect,
    session: &Session,
    view: &mut AudioView,
    info: &FrameInfo,
    waiting: &str,
    debug: Option<Line<'static>>,
) -> Rect {
    let title_style = if session.is_recording() {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };
    let block = Block::bordered()
        .title(Line::styled(audio_title(session), title_style));
    let inner = block.inner(area);
    frame.render_widget(block, area);
    view.set_width(inner.width);

    if session.audio().is_empty() {
        let [_, middle, _] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(1),
            Constraint::Fill(1),
        ])
        .areas(inner);
        frame.render_widget(
            Paragraph::new(format!("{waiting} Waiting for audio")).alignment(Alignment::Center),
            middle,
        );
        return inner;
    }

    let rate = session.sample_rate();
    let visible = view.window().sample_range(rate, session.audio().len());
    let columns = envelope(&session.audio()[visible.clone()], inner.width as usize * 2);
    let colors = SpanColors::new(session, view.selection());
    let painted: Vec<_> = columns
        .iter()
        .map(|c| {
            let color = colors.color(visible.start + c.start..visible.start + c.end);
            (*c, color)
        })
        .collect();
    let height = inner.height as i64 * 4;

    frame.render_widget(
        Canvas::default()
            .marker(Marker::Braille)
            .x_bounds([0.0, painted.len().max(1) as f64])
            .y_bounds([0.0, height.max(1) as f64])
            .paint(|ctx| {
                for (x, (column, color)) in painted.iter().enumerate() {
                    let (top, bottom) = column.rows(height);
                    ctx.draw(&CanvasLine::new(
                        x as f64,
                        (height - top) as f64,
                        x as f64,
                        (height - bottom) as f64,
                        *color,
                    ));
                }
            }),
        inner,
    );

    let markers = [
        (session.document().sync_offset(), SYNC_MARKER_COLOR),
        (
            info.playback_position
                .map(|p| samples_to_duration(rate, p)),
            PLAYBACK_COLOR,
        ),
    ];
    for (time, color) in markers {
        let Some(x) = time.and_then(|t| view.time_to_pixel(t)) else {
            continue;
        };
        for y in inner.top()..inner.bottom() {
            if let Some(cell) = frame.buffer_mut().cell_mut((inner.x + x, y)) {
                cell.set_bg(color);
            }
        }
    }

    let top = Rect { height: 1, ..inner };
    frame.render_widget(
        Paragraph::new(format!("Recorded: {}", format_timestamp(session.recorded()))),
        top,
    );
    if let Some(debug) = debug {
        if inner.height > 2 {
            frame.render_widget(Paragraph::new(debug), Rect { y: inner.y + 1, ..top });
        }
    }

    let bottom = Rect {
        y: inner.bottom().saturating_sub(1),
        ..top
    };
    let window = view.window();
    frame.render_widget(Paragraph::new(format_timestamp(window.start)), bottom);
    frame.render_widget(
        Paragraph::new(format_timestamp(window.end)).alignment(Alignment::Right),
        bottom,
    );
    if let Some(selection) = view.selection() {
        frame.render_widget(
            Paragraph::new(format!(
                "selection {}",
                format_timestamp(selection.duration())
            ))
            .style(Style::default().fg(SELECTION_COLOR))
            .alignment(Alignment::Center),
            bottom,
        );
    }
    inner
}

fn render_controls(
    frame: &mut Frame,
    area: Rect,
    session: &Session,
    view: &AudioView,
    info: &FrameInfo,
    status: Option<&Status>,
) {
    let has_takes = session
        .document()
        .chunk(session.selected_chunk())
        .is_some_and(|c| !c.takes.is_empty());
    let key_style = Style::default().fg(Color::Black).bg(Color::White);
    let hints: Vec<Span> = keybinds(session.state(), has_takes, view.selection().is_some())
        .into_iter()
        .flat_map(|b| {
            [
                Span::styled(format!(" {} ", b.key), key_style),
                Span::raw(format!(" {}  ", b.description)),
            ]
        })
        .collect();

    let status_line = if let Some(fault) = &info.fault {
        Line::styled(
            format!("Capture stopped: {fault}"),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )
    } else if let Some(status) = status {
        let color = if status.is_error { Color::Red } else { Color::Green };
        Line::styled(status.message.clone(), Style::default().fg(color))
    } else {
        let stick = if view.stick_to_end() { "following" } else { "free" };
        Line::styled(
            format!("view: {stick}"),
            Style::default().fg(Color::DarkGray),
        )
    };

    frame.render_widget(
        Paragraph::new(vec![Line::from(hints), status_line])
            .block(Block::bordered().title(" Controls "))
            .wrap(Wrap { trim: true }),
        area,
    );
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

fn render_chunks(frame: &mut Frame, area: Rect, session: &Session) {
    let selected = session.selected_chunk();
    let mut pending_header = None;
    let mut items = Vec::new();

    for item in session.document().renderable() {
        match item {
            Renderable::Header(header) => pending_header = Some(header),
            Renderable::Chunk { index, chunk } if index >= selected => {
                if let Some(header) = pending_header.take() {
                    if !header.text.is_empty() {
                        items.push(ListItem::new(Line::styled(
                            header.text.clone(),
                            Style::default().fg(Color::Blue),
                        )));
                    }
                }
                let style = if index == selected {
                    Style::default().fg(Color::Black).bg(Color::Yellow)
                } else {
                    Style::default()
                };
                let good = chunk.takes.iter().any(|t| t.mark == TakeMark::Good);
                let marker = if good { "✓" } else { " " };
                items.push(ListItem::new(Line::styled(
                    format!("{marker}{index:>3} {}", first_line(&chunk.content)),
                    style,
                )));
            }
            _ => {}
        }
    }

    frame.render_widget(List::new(items).block(Block::bordered().title(" Chunks ")), area);
}

fn render_takes(frame: &mut Frame, area: Rect, session: &Session) {
    let takes = session
        .document()
        .chunk(session.selected_chunk())
        .map(|c| c.takes.as_slice())
        .unwrap_or_default();

    let items: Vec<ListItem> = takes
        .iter()
        .enumerate()
        .map(|(i, take)| {
            let (symbol, color) = match (take.is_open(), take.mark) {
                (true, _) => ("●", Color::Red),
                (false, TakeMark::Good) => ("✓", Color::Green),
                (false, TakeMark::Bad) => ("✗", Color::Red),
                (false, mark) => ("·", mark_color(mark)),
            };
            let end = take
                .end()
                .map(format_timestamp)
                .unwrap_or_else(|| "...".to_string());
            let mut style = Style::default().fg(color);
            if session.selected_take() == Some(i) {
                style = style.add_modifier(Modifier::REVERSED);
            }
            ListItem::new(Line::styled(
                format!("{symbol} {i:>2} {} - {end}", format_timestamp(take.start)),
                style,
            ))
        })
        .collect();

    frame.render_widget(List::new(items).block(Block::bordered().title(" Takes ")), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(binds: &[Keybind]) -> Vec<&'static str> {
        binds.iter().map(|b| b.key).collect()
    }

    #[test]
    fn test_idle_hints_depend_on_takes_and_selection() {
        let bare = keys(&keybinds(TakeState::Idle, false, false));
        assert!(bare.contains(&"space"));
        assert!(bare.contains(&"s"));
        assert!(!bare.contains(&"g"));
        assert!(!bare.contains(&"t"));

        let full = keys(&keybinds(TakeState::Idle, true, true));
        for key in ["g", "b", "p", "t", "r"] {
            assert!(full.contains(&key), "missing {key}");
        }
    }

    #[test]
    fn test_recording_hints() {
        let normal = keybinds(TakeState::RecordingNormal { chunk: 0, take: 0 }, true, true);
        assert_eq!(normal[0], bind("space", "end take"));
        assert!(!keys(&normal).contains(&"s"));
        assert!(!keys(&normal).contains(&"r"));

        let sync = keys(&keybinds(TakeState::RecordingSync { take: 0 }, false, false));
        assert!(!sync.contains(&"g"));
        assert!(sync.contains(&"q"));
    }

    #[test]
    fn test_key_mapping() {
        let key = |code| KeyEvent::new(code, KeyModifiers::NONE);
        let ctrl = |c| KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL);

        assert_eq!(command_for_key(key(KeyCode::Char(' '))), UiCommand::ToggleTake);
        assert_eq!(command_for_key(key(KeyCode::Down)), UiCommand::NextChunk);
        assert_eq!(command_for_key(key(KeyCode::Char('s'))), UiCommand::StartSyncTake);
        assert_eq!(command_for_key(key(KeyCode::Esc)), UiCommand::Quit);
        assert_eq!(command_for_key(ctrl('c')), UiCommand::Quit);
        assert_eq!(command_for_key(ctrl('d')), UiCommand::ToggleDebug);
        assert_eq!(command_for_key(key(KeyCode::Char('x'))), UiCommand::Continue);
    }

    #[test]
    fn test_debug_line_colors_by_drift() {
        let info = FrameInfo::default();
        let color = |ms| debug_line(Some(Duration::from_millis(ms)), &info).style.fg;
        assert_eq!(color(100), Some(Color::Green));
        assert_eq!(color(700), Some(Color::Yellow));
        assert_eq!(color(1500), Some(Color::Red));
    }

    #[test]
    fn test_emphasis_markers_become_styles() {
        let base = Style::default();
        let spans = emphasis_spans("hello **world**!", base);
        let text: Vec<&str> = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, ["hello ", "world", "!"]);
        assert_eq!(spans[0].style, base);
        assert_eq!(spans[1].style, base.add_modifier(Modifier::BOLD));
        assert_eq!(spans[2].style, base);

        let spans = emphasis_spans("a *b* `c`", base);
        let text: Vec<&str> = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, ["a ", "b", " ", "c"]);
        assert_eq!(spans[1].style, base.add_modifier(Modifier::ITALIC));
        assert_eq!(spans[3].style.fg, Some(CODE_COLOR));
    }

    #[test]
    fn test_emphasis_keeps_line_style() {
        let selected = Style::default().fg(Color::Black).bg(Color::Yellow);
        let spans = emphasis_spans("plain **loud**", selected);
        assert!(spans.iter().all(|s| s.style.bg == Some(Color::Yellow)));
    }

    #[test]
    fn test_selection_color_wins_over_takes() {
        let colors = SpanColors {
            takes: vec![(0..100, Color::Green)],
            selection: Some(50..60),
        };
        assert_eq!(colors.color(10..20), Color::Green);
        assert_eq!(colors.color(55..58), SELECTION_COLOR);
        assert_eq!(colors.color(200..210), WAVEFORM_COLOR);
        assert_eq!(colors.color(99..99), Color::Green);
    }
}
