//! Full-screen error display for failures that stop a session before it starts.

use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Paragraph, Wrap},
};
use std::io::{self, Stdout};
use std::time::Duration;

const BACKGROUND: Color = Color::Rgb(160, 0, 0);

/// Red full-screen message dismissed by any key.
pub struct ErrorScreen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    restored: bool,
}

impl ErrorScreen {
    /// Enters the alternate screen.
    ///
    /// # Errors
    /// - If raw mode or the alternate screen cannot be entered
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(ErrorScreen {
            terminal,
            restored: false,
        })
    }

    /// Shows `title` above `detail` and a `hint` line until a key is pressed.
    ///
    /// # Errors
    /// - If rendering or event polling fails
    pub fn show(&mut self, title: &str, detail: &str, hint: &str) -> anyhow::Result<()> {
        let text = Text::from(vec![
            Line::from(title.to_string()).style(Style::default().add_modifier(Modifier::BOLD)),
            Line::default(),
            Line::from(detail.to_string()),
            Line::default(),
            Line::from(hint.to_string()).style(Style::default().add_modifier(Modifier::ITALIC)),
            Line::default(),
            Line::from("Press any key to exit").style(Style::default().fg(Color::Gray)),
        ]);

        loop {
            self.terminal.draw(|frame| {
                let area = frame.area();
                frame.render_widget(
                    Paragraph::new("").style(Style::default().bg(BACKGROUND)),
                    area,
                );
                let [_, body, _] = Layout::vertical([
                    Constraint::Percentage(30),
                    Constraint::Min(7),
                    Constraint::Percentage(30),
                ])
                .areas(area);
                let [_, body, _] = Layout::horizontal([
                    Constraint::Percentage(10),
                    Constraint::Percentage(80),
                    Constraint::Percentage(10),
                ])
                .areas(body);
                frame.render_widget(
                    Paragraph::new(text.clone())
                        .style(Style::default().fg(Color::White).bg(BACKGROUND))
                        .alignment(Alignment::Center)
                        .wrap(Wrap { trim: true }),
                    body,
                );
            })?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Leaves the alternate screen.
    ///
    /// # Errors
    /// - If the terminal cannot be restored
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for ErrorScreen {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Logs `err`, shows it on an [`ErrorScreen`] and hands it back as an `anyhow` error.
pub fn report_fatal(title: &str, err: impl std::fmt::Display, hint: &str) -> anyhow::Error {
    tracing::error!("{}: {}", title, err);
    let detail = err.to_string();
    let shown = ErrorScreen::new().and_then(|mut screen| {
        screen.show(title, &detail, hint)?;
        screen.cleanup()
    });
    if let Err(e) = shown {
        tracing::warn!("Could not display error screen: {}", e);
    }
    anyhow::anyhow!("{title}: {detail}")
}
