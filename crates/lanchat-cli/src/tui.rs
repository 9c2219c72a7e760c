//! Terminal User Interface using ratatui
//!
//! A single screen: a spinner with the online status, the last few messages,
//! a text input and a help line. Enter sends, Esc or Ctrl-C quits.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame, Terminal,
};
use tracing::{debug, info};

use lanchat_core::{
    ChatEvent, EventReceiver, Message, Notice, NoticeLevel, Sender, UiConfig,
};

use crate::app::ChatApp;
use crate::error::{CliError, Result};

const SPINNER_FRAMES: &[&str] = &["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];
/// Width of the dotted row standing in for an empty message
const PLACEHOLDER_WIDTH: usize = 30;
pub const FAREWELL: &str = "That’s all for today!";

// ----------------------------------------------------------------------------
// Theme
// ----------------------------------------------------------------------------

/// Styles used across the screen, built once at startup
#[derive(Debug, Clone)]
pub struct Theme {
    pub spinner: Style,
    pub help: Style,
    pub placeholder: Style,
    pub sender: Style,
    pub input: Style,
    pub warning: Style,
    pub error: Style,
}

impl Default for Theme {
    fn default() -> Self {
        let help = Style::default().fg(Color::Indexed(241));
        Self {
            spinner: Style::default().fg(Color::Indexed(63)),
            help,
            placeholder: help,
            sender: help,
            input: Style::default().fg(Color::White),
            warning: Style::default().fg(Color::Yellow),
            error: Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        }
    }
}

// ----------------------------------------------------------------------------
// Screen State
// ----------------------------------------------------------------------------

/// Row body and trailing sender label; placeholders carry no label
fn message_parts(message: &Message) -> (String, Option<&'static str>) {
    if message.is_placeholder() {
        return (".".repeat(PLACEHOLDER_WIDTH), None);
    }
    let icon = match message.sender() {
        Sender::Local => "🐚",
        Sender::Remote => "🐠",
    };
    (
        format!("{}  {}", icon, message.content()),
        Some(message.sender().as_str()),
    )
}

/// One displayed row
pub fn format_message(message: &Message) -> String {
    match message_parts(message) {
        (body, Some(label)) => format!("{} {}", body, label),
        (body, None) => body,
    }
}

/// Chat screen state, independent of the terminal
pub struct TuiApp {
    /// Fixed-length scrollback, oldest first
    history: VecDeque<Message>,
    history_size: usize,
    input: String,
    char_limit: usize,
    placeholder: String,
    spinner_frame: usize,
    last_notice: Option<Notice>,
    quitting: bool,
}

impl TuiApp {
    pub fn new(config: &UiConfig) -> Self {
        // Start full of empty rows so the screen height never changes.
        let history = (0..config.history_size).map(|_| Message::local("")).collect();
        Self {
            history,
            history_size: config.history_size,
            input: String::new(),
            char_limit: config.char_limit,
            placeholder: config.placeholder.clone(),
            spinner_frame: 0,
            last_notice: None,
            quitting: false,
        }
    }

    /// Handle application events from the core
    pub fn handle_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Message(message) => self.push_message(message),
            ChatEvent::Notice(notice) => self.last_notice = Some(notice),
        }
    }

    fn push_message(&mut self, message: Message) {
        self.history.push_back(message);
        while self.history.len() > self.history_size {
            self.history.pop_front();
        }
    }

    /// Handle a key press; returns the text to send when Enter is pressed
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<String> {
        match key.code {
            KeyCode::Esc => self.quitting = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.quitting = true
            }
            KeyCode::Enter => return Some(std::mem::take(&mut self.input)),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => {
                if self.input.chars().count() < self.char_limit {
                    self.input.push(c);
                }
            }
            _ => {}
        }
        None
    }

    pub fn tick(&mut self) {
        self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAMES.len();
    }

    pub fn should_quit(&self) -> bool {
        self.quitting
    }

    pub fn history(&self) -> impl Iterator<Item = &Message> {
        self.history.iter()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    fn render(&self, frame: &mut Frame, theme: &Theme, listen_addr: &str) {
        let area = frame.area().inner(Margin {
            vertical: 1,
            horizontal: 2,
        });

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Length(self.history_size as u16),
                Constraint::Length(2),
                Constraint::Length(2),
                Constraint::Length(2),
                Constraint::Min(0),
            ])
            .split(area);

        self.render_header(frame, layout[0], theme, listen_addr);
        self.render_history(frame, layout[1], theme);

        if self.quitting {
            return;
        }

        frame.render_widget(
            Paragraph::new(Line::styled("Type here", theme.help)),
            layout[2],
        );
        self.render_input(frame, layout[3], theme);
        frame.render_widget(
            Paragraph::new(Line::styled("esc to exit", theme.help)),
            layout[4],
        );
        self.render_notice(frame, layout[5], theme);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect, theme: &Theme, listen_addr: &str) {
        let line = if self.quitting {
            Line::from(FAREWELL)
        } else {
            Line::from(vec![
                Span::styled(SPINNER_FRAMES[self.spinner_frame], theme.spinner),
                Span::raw(" Online ..."),
                Span::styled(format!("  {}", listen_addr), theme.help),
            ])
        };
        frame.render_widget(Paragraph::new(line), area);
    }

    fn render_history(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let lines: Vec<Line> = self
            .history
            .iter()
            .map(|message| match message_parts(message) {
                (body, Some(label)) => Line::from(vec![
                    Span::raw(body),
                    Span::raw(" "),
                    Span::styled(label, theme.sender),
                ]),
                (body, None) => Line::styled(body, theme.placeholder),
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), area);
    }

    fn render_input(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let line = if self.input.is_empty() {
            Line::from(vec![
                Span::styled("> ", theme.input),
                Span::styled(self.placeholder.as_str(), theme.help),
            ])
        } else {
            Line::styled(format!("> {}", self.input), theme.input)
        };
        frame.render_widget(Paragraph::new(line), area);

        let cursor_x = area.x + 2 + self.input.chars().count() as u16;
        frame.set_cursor_position((cursor_x.min(area.right().saturating_sub(1)), area.y));
    }

    fn render_notice(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let Some(notice) = &self.last_notice else {
            return;
        };
        let style = match notice.level() {
            NoticeLevel::Info => theme.help,
            NoticeLevel::Warning => theme.warning,
            NoticeLevel::Error => theme.error,
        };
        frame.render_widget(Paragraph::new(Line::styled(notice.text(), style)), area);
    }
}

// ----------------------------------------------------------------------------
// Terminal Manager
// ----------------------------------------------------------------------------

/// TUI Manager that handles the terminal and rendering
pub struct TuiManager {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
    tui_app: TuiApp,
    theme: Theme,
    event_receiver: EventReceiver,
    tick_rate: Duration,
}

impl TuiManager {
    /// Take over the terminal
    pub fn new(config: &UiConfig, event_receiver: EventReceiver, theme: Theme) -> Result<Self> {
        enable_raw_mode().map_err(|e| CliError::UI(format!("Failed to enable raw mode: {}", e)))?;
        let mut stdout = std::io::stdout();
        stdout
            .execute(EnterAlternateScreen)
            .map_err(|e| CliError::UI(format!("Failed to enter alternate screen: {}", e)))?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)
            .map_err(|e| CliError::UI(format!("Failed to create terminal: {}", e)))?;

        Ok(Self {
            terminal,
            tui_app: TuiApp::new(config),
            theme,
            event_receiver,
            tick_rate: Duration::from_millis(config.tick_rate_ms),
        })
    }

    /// Run the TUI main loop until the user quits
    pub async fn run(&mut self, app: &ChatApp) -> Result<()> {
        let mut last_tick = Instant::now();
        let listen_addr = app.listen_addr().to_string();

        info!("Starting TUI main loop");

        loop {
            let timeout = self.tick_rate.saturating_sub(last_tick.elapsed());
            if event::poll(timeout).map_err(|e| CliError::UI(format!("Event poll failed: {}", e)))? {
                if let Event::Key(key) =
                    event::read().map_err(|e| CliError::UI(format!("Failed to read event: {}", e)))?
                {
                    if key.kind == KeyEventKind::Press {
                        if let Some(text) = self.tui_app.handle_key(key) {
                            // Outcomes surface as notices through the sink.
                            drop(app.send_message(text));
                        }
                    }
                }
            }

            while let Ok(event) = self.event_receiver.try_recv() {
                self.tui_app.handle_event(event);
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.tui_app.tick();
                last_tick = Instant::now();
            }

            self.draw(&listen_addr)?;

            if self.tui_app.should_quit() {
                break;
            }

            tokio::task::yield_now().await;
        }

        debug!("Leaving TUI main loop");
        Ok(())
    }

    fn draw(&mut self, listen_addr: &str) -> Result<()> {
        let tui_app = &self.tui_app;
        let theme = &self.theme;
        self.terminal
            .draw(|frame| tui_app.render(frame, theme, listen_addr))
            .map_err(|e| CliError::UI(format!("Failed to draw terminal: {}", e)))?;
        Ok(())
    }

    fn restore_terminal(&mut self) {
        let _ = disable_raw_mode();
        let _ = self.terminal.backend_mut().execute(LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

impl Drop for TuiManager {
    fn drop(&mut self) {
        self.restore_terminal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut TuiApp, text: &str) {
        for c in text.chars() {
            assert!(app.handle_key(key(KeyCode::Char(c))).is_none());
        }
    }

    #[test]
    fn test_format_message() {
        assert_eq!(format_message(&Message::local("hi")), "🐚  hi local");
        assert_eq!(format_message(&Message::remote("yo")), "🐠  yo remote");
        assert_eq!(format_message(&Message::remote("")), ".".repeat(30));
    }

    #[test]
    fn test_rendered_history_matches_formatted_rows() {
        use ratatui::{backend::TestBackend, Terminal};

        let mut app = TuiApp::new(&UiConfig {
            history_size: 3,
            ..UiConfig::default()
        });
        app.handle_event(ChatEvent::Message(Message::local("hi")));
        app.handle_event(ChatEvent::Message(Message::remote("yo")));

        let mut terminal = Terminal::new(TestBackend::new(60, 20)).unwrap();
        terminal
            .draw(|frame| app.render(frame, &Theme::default(), "127.0.0.1:3998"))
            .unwrap();

        let buffer = terminal.backend().buffer();
        let screen: Vec<String> = buffer
            .content
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect();
        for message in app.history() {
            let row = format_message(message);
            let words: Vec<&str> = row.split_whitespace().collect();
            assert!(
                screen.iter().any(|line| {
                    let rendered: Vec<&str> = line.split_whitespace().collect();
                    rendered == words
                }),
                "row {:?} not rendered",
                row
            );
        }
    }

    #[test]
    fn test_history_starts_full_and_evicts_oldest() {
        let mut app = TuiApp::new(&UiConfig {
            history_size: 3,
            ..UiConfig::default()
        });
        assert_eq!(app.history().count(), 3);
        assert!(app.history().all(Message::is_placeholder));

        for i in 0..4 {
            app.handle_event(ChatEvent::Message(Message::remote(format!("m{}", i))));
        }
        let contents: Vec<&str> = app.history().map(Message::content).collect();
        assert_eq!(contents, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_enter_returns_and_clears_input() {
        let mut app = TuiApp::new(&UiConfig::default());
        type_text(&mut app, "hello");
        assert_eq!(app.input(), "hello");

        assert_eq!(app.handle_key(key(KeyCode::Enter)), Some("hello".to_string()));
        assert_eq!(app.input(), "");
    }

    #[test]
    fn test_char_limit_and_backspace() {
        let mut app = TuiApp::new(&UiConfig {
            char_limit: 4,
            ..UiConfig::default()
        });
        type_text(&mut app, "abcdef");
        assert_eq!(app.input(), "abcd");

        app.handle_key(key(KeyCode::Backspace));
        assert_eq!(app.input(), "abc");
    }

    #[test]
    fn test_quit_keys() {
        let mut app = TuiApp::new(&UiConfig::default());
        assert!(!app.should_quit());
        app.handle_key(key(KeyCode::Esc));
        assert!(app.should_quit());

        let mut app = TuiApp::new(&UiConfig::default());
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit());
        assert_eq!(app.input(), "");
    }

    #[test]
    fn test_notice_is_kept_out_of_history() {
        let mut app = TuiApp::new(&UiConfig::default());
        app.handle_event(ChatEvent::Notice(Notice::warning("Could not reach 10.0.0.2:3998")));
        assert!(app.history().all(Message::is_placeholder));
        assert_eq!(
            app.last_notice.as_ref().map(Notice::text),
            Some("Could not reach 10.0.0.2:3998")
        );
    }
}
