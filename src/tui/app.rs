//! Main TUI application

use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, MouseEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Stylize,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::input::{InputAction, InputState};
use super::slash_commands::{parse_command, ChatCommand, ParsedCommand, SlashPopup};
use super::theme::Theme;
use super::widgets::{
    indicator_lines, render_turn_lines, FooterBar, HeaderBar, HelpBar, InputBox, SavedPanel,
    StatusBar, StatusKind,
};
use crate::backend::{ResponseBackend, StreamEvent};
use crate::config::{write_theme_preference, ChatConfig};
use crate::session::stream::{spawn_stream, Tagged};
use crate::session::{Applied, SavedMessages, SessionController, TurnStatus};
use crate::upload::{upload_file, UploadReceipt};
use crate::{ChatError, Result};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const QUIT_ARM_WINDOW: Duration = Duration::from_secs(2);
const EMPTY_STATE: &str = "Ask a question to start the conversation";

/// Result of a background upload
#[derive(Debug)]
struct UploadOutcome {
    file_name: String,
    result: Result<UploadReceipt>,
}

/// Everything the TUI shows and mutates, independent of the terminal
pub struct AppState<B: ResponseBackend + 'static> {
    config: ChatConfig,
    theme: Theme,
    backend: Arc<B>,
    http: reqwest::Client,
    session: SessionController,
    saved: SavedMessages,
    input: InputState,
    slash_popup: SlashPopup,
    show_help: bool,
    events_tx: mpsc::Sender<Tagged>,
    events_rx: mpsc::Receiver<Tagged>,
    uploads_tx: mpsc::Sender<UploadOutcome>,
    uploads_rx: mpsc::Receiver<UploadOutcome>,
    /// Pump for the outstanding request, aborted on clear/stop
    stream_task: Option<JoinHandle<()>>,
    /// One-shot status message, replaced by the next one
    notice: Option<(StatusKind, String)>,
    scroll_offset: usize,
    spinner_frame: usize,
    quit_armed_at: Option<Instant>,
    should_quit: bool,
}

impl<B: ResponseBackend + 'static> AppState<B> {
    pub fn new(config: ChatConfig, backend: Arc<B>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upload.request_timeout_secs))
            .build()
            .map_err(|e| ChatError::Http(e.to_string()))?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (uploads_tx, uploads_rx) = mpsc::channel(8);

        Ok(Self {
            theme: Theme::new(config.ui.theme),
            config,
            backend,
            http,
            session: SessionController::new(),
            saved: SavedMessages::new(),
            input: InputState::new(),
            slash_popup: SlashPopup::new(),
            show_help: false,
            events_tx,
            events_rx,
            uploads_tx,
            uploads_rx,
            stream_task: None,
            notice: None,
            scroll_offset: 0,
            spinner_frame: 0,
            quit_armed_at: None,
            should_quit: false,
        })
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn saved(&self) -> &SavedMessages {
        &self.saved
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Apply everything the background tasks produced since the last call
    pub fn drain_events(&mut self) {
        while let Ok(tagged) = self.events_rx.try_recv() {
            self.apply_tagged(tagged);
        }
        while let Ok(outcome) = self.uploads_rx.try_recv() {
            self.finish_upload(outcome);
        }
    }

    fn apply_tagged(&mut self, tagged: Tagged) {
        let terminal = tagged.event.is_terminal();
        match self.session.apply(tagged.generation, tagged.event) {
            Applied::Accepted if terminal => {
                self.stream_task = None;
                if let Some(err) = self.session.last_error() {
                    self.notice = Some((StatusKind::Error, format!("Answer failed: {err}")));
                }
            }
            Applied::Accepted => {}
            Applied::Stale => debug!(generation = %tagged.generation, "ignored stale event"),
            Applied::Ignored => {}
        }
    }

    fn tick(&mut self) {
        self.spinner_frame = self.spinner_frame.wrapping_add(1);
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.show_help {
            self.show_help = false;
            if key.code == KeyCode::Esc {
                return;
            }
        }

        if self.slash_popup.visible {
            match key.code {
                KeyCode::Up => {
                    self.slash_popup.select_prev();
                    return;
                }
                KeyCode::Down => {
                    self.slash_popup.select_next();
                    return;
                }
                KeyCode::Tab => {
                    self.complete_from_popup();
                    return;
                }
                KeyCode::Enter => {
                    // Complete first unless the buffer already names the command
                    let typed = self.input.slash_prefix().unwrap_or_default().to_string();
                    if ChatCommand::parse(&typed).is_none() {
                        self.complete_from_popup();
                        return;
                    }
                    self.slash_popup.close();
                }
                KeyCode::Esc => {
                    self.slash_popup.close();
                    return;
                }
                _ => {}
            }
        }

        if let Some(armed_at) = self.quit_armed_at {
            if armed_at.elapsed() > QUIT_ARM_WINDOW {
                self.quit_armed_at = None;
            }
        }

        match self.input.handle_key(key) {
            InputAction::Quit => {
                if self.session.is_busy() {
                    self.stop_answer();
                } else if self.quit_armed_at.is_some() {
                    self.should_quit = true;
                } else {
                    self.quit_armed_at = Some(Instant::now());
                    self.notice = Some((StatusKind::Info, "Press Ctrl+C again to quit.".into()));
                }
            }
            InputAction::Submit(text) => {
                self.slash_popup.close();
                match parse_command(&text) {
                    Some(ParsedCommand::Command(cmd, args)) => self.execute_command(cmd, &args),
                    Some(ParsedCommand::Unknown(name)) => {
                        self.notice = Some((
                            StatusKind::Error,
                            format!("Unknown command: /{name}. Type /help for commands."),
                        ));
                    }
                    None => self.submit_question(&text),
                }
            }
            InputAction::ClearChat => self.clear_chat(),
            InputAction::ToggleTheme => self.toggle_theme(),
            InputAction::ToggleSaved => self.saved.toggle_visibility(),
            InputAction::ScrollUp => self.scroll_offset = self.scroll_offset.saturating_add(5),
            InputAction::ScrollDown => self.scroll_offset = self.scroll_offset.saturating_sub(5),
            InputAction::Tab => {
                if self.input.slash_prefix().is_some() {
                    if !self.slash_popup.visible {
                        self.slash_popup.open();
                    }
                    self.update_popup_filter();
                    if self.slash_popup.matches.len() == 1 {
                        self.complete_from_popup();
                    }
                }
            }
            InputAction::Escape => {
                if self.session.is_busy() {
                    self.stop_answer();
                }
            }
            InputAction::Edited => self.update_popup_filter(),
            InputAction::None => {}
        }
    }

    fn complete_from_popup(&mut self) {
        if let Some(completed) = self.slash_popup.complete() {
            self.input.set_buffer(&completed);
        }
        self.slash_popup.close();
    }

    fn update_popup_filter(&mut self) {
        let Some(prefix) = self.input.slash_prefix().map(str::to_string) else {
            self.slash_popup.close();
            return;
        };
        // Popup only while the command name is still being typed
        if self.input.buffer.contains(' ') {
            self.slash_popup.close();
            return;
        }
        if !self.slash_popup.visible {
            self.slash_popup.open();
        }
        self.slash_popup.set_filter(&prefix);
    }

    fn submit_question(&mut self, text: &str) {
        match self.session.submit(text) {
            Ok(submission) => {
                self.notice = None;
                self.scroll_offset = 0;
                let handle = spawn_stream(
                    Arc::clone(&self.backend),
                    submission,
                    self.config.backend.inactivity_timeout(),
                    self.events_tx.clone(),
                );
                self.stream_task = Some(handle);
            }
            Err(rejected) => {
                debug!("Submission ignored: {rejected}");
                // Keep what the user typed for when the answer is done
                self.input.set_buffer(text);
            }
        }
    }

    fn execute_command(&mut self, cmd: ChatCommand, args: &str) {
        match cmd {
            ChatCommand::Clear => self.clear_chat(),
            ChatCommand::Save => self.save_answer(args),
            ChatCommand::Unsave => self.unsave(args),
            ChatCommand::Saved => self.saved.toggle_visibility(),
            ChatCommand::Theme => self.toggle_theme(),
            ChatCommand::Upload => self.start_upload(args),
            ChatCommand::Help => self.show_help = true,
            ChatCommand::Quit => self.should_quit = true,
        }
    }

    /// Abandon the outstanding request and empty the conversation.
    /// Saved messages stay.
    fn clear_chat(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        self.session.clear();
        self.scroll_offset = 0;
        self.notice = Some((StatusKind::Info, "Conversation cleared.".into()));
    }

    /// Cancel the outstanding request, keeping any partial answer
    fn stop_answer(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        let generation = self.session.generation();
        self.session
            .apply(generation, StreamEvent::Failed("stopped".to_string()));
        self.notice = Some((StatusKind::Info, "Answer stopped.".into()));
    }

    fn save_answer(&mut self, args: &str) {
        let answers: Vec<_> = self.session.transcript().assistant_turns().collect();
        let picked = if args.is_empty() {
            answers
                .iter()
                .enumerate()
                .rev()
                .find(|(_, (_, turn))| turn.status != TurnStatus::Streaming)
                .map(|(n, (_, turn))| (n + 1, *turn))
        } else {
            match args.parse::<usize>() {
                Ok(n) if n >= 1 => answers.get(n - 1).map(|(_, turn)| (n, *turn)),
                _ => {
                    self.notice = Some((StatusKind::Error, "Usage: /save [n]".into()));
                    return;
                }
            }
        };

        self.notice = Some(match picked {
            Some((_, turn)) if turn.status == TurnStatus::Streaming => {
                (StatusKind::Error, "That answer is still arriving.".into())
            }
            Some((n, turn)) => {
                self.saved.add(turn);
                (StatusKind::Info, format!("Saved answer #{n}."))
            }
            None => (StatusKind::Error, "No answer to save.".into()),
        });
    }

    fn unsave(&mut self, args: &str) {
        self.notice = Some(match args.parse::<usize>() {
            Ok(n) if n >= 1 => match self.saved.remove_at(n - 1) {
                Some(_) => (StatusKind::Info, format!("Removed saved message {n}.")),
                None => (StatusKind::Error, format!("No saved message {n}.")),
            },
            _ => (StatusKind::Error, "Usage: /unsave <n>".into()),
        });
    }

    fn toggle_theme(&mut self) {
        let mode = self.theme.mode().toggled();
        self.theme = Theme::new(mode);
        self.config.ui.theme = mode;

        if let Some(path) = &self.config.source {
            if let Err(e) = write_theme_preference(path, mode) {
                warn!("Failed to save theme preference: {e}");
                self.notice = Some((StatusKind::Error, format!("Theme not saved: {e}")));
            }
        }
    }

    fn start_upload(&mut self, args: &str) {
        if args.is_empty() {
            self.notice = Some((StatusKind::Error, "Usage: /upload <path>".into()));
            return;
        }
        let path = PathBuf::from(args);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.to_string());
        self.notice = Some((StatusKind::Info, format!("Uploading {file_name}...")));

        let client = self.http.clone();
        let endpoint = self.config.upload.endpoint.clone();
        let tx = self.uploads_tx.clone();
        tokio::spawn(async move {
            let result = upload_file(&client, &endpoint, &path).await;
            let _ = tx.send(UploadOutcome { file_name, result }).await;
        });
    }

    fn finish_upload(&mut self, outcome: UploadOutcome) {
        let UploadOutcome { file_name, result } = outcome;
        self.notice = Some(match result {
            Ok(receipt) => {
                info!("Uploaded {file_name}");
                (StatusKind::Info, format!("{file_name}: {}", receipt.message))
            }
            Err(ChatError::UploadFailed(message)) => (StatusKind::Error, message),
            Err(e) => (StatusKind::Error, format!("Could not upload {file_name}: {e}")),
        });
    }

    fn status(&self) -> (StatusKind, String) {
        if self.session.is_busy() {
            let text = match self.session.indicator().current() {
                Some(phase) if self.session.indicator_visible() => phase.status.clone(),
                _ => self.config.ui.loading_message.clone(),
            };
            return (StatusKind::Busy, format!("{text} (Esc to stop)"));
        }
        match &self.notice {
            Some((kind, text)) => (*kind, text.clone()),
            None => (StatusKind::Ready, String::new()),
        }
    }
}

/// Draw the whole screen for `state`
pub fn render<B: ResponseBackend + 'static>(f: &mut Frame, state: &AppState<B>) {
    let theme = &state.theme;
    let size = f.area();

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Length(1), // Status
            Constraint::Min(6),    // Content
            Constraint::Length(3), // Input
            Constraint::Length(1), // Help
            Constraint::Length(1), // Footer
        ])
        .split(size);

    f.render_widget(
        HeaderBar {
            title: &state.config.ui.title,
            clear_hint: &state.config.ui.clear_button_text,
            is_processing: state.session.is_busy(),
            theme,
        },
        main_chunks[0],
    );

    let (kind, text) = state.status();
    f.render_widget(
        StatusBar {
            kind,
            text: &text,
            spinner_frame: state.spinner_frame,
            theme,
        },
        main_chunks[1],
    );

    if state.saved.is_expanded() {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(30), Constraint::Length(34)])
            .split(main_chunks[2]);
        render_messages(f, content_chunks[0], state);
        f.render_widget(
            SavedPanel {
                saved: &state.saved,
                theme,
            },
            content_chunks[1],
        );
    } else {
        render_messages(f, main_chunks[2], state);
    }

    let input_area = main_chunks[3];
    f.render_widget(
        InputBox {
            content: &state.input.buffer,
            busy: state.session.is_busy(),
            theme,
        },
        input_area,
    );
    if state.slash_popup.visible {
        render_slash_popup(f, input_area, &state.slash_popup, theme);
    }
    let cursor_x = input_area.x + 1 + state.input.cursor_display_width() as u16;
    f.set_cursor_position((
        cursor_x.min(input_area.x + input_area.width.saturating_sub(2)),
        input_area.y + 1,
    ));

    f.render_widget(HelpBar { theme }, main_chunks[4]);
    f.render_widget(
        FooterBar {
            message: &state.config.ui.footer_message,
            theme,
        },
        main_chunks[5],
    );

    if state.show_help {
        render_help_overlay(f, size, theme);
    }
}

fn render_messages<B: ResponseBackend + 'static>(f: &mut Frame, area: Rect, state: &AppState<B>) {
    let theme = &state.theme;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border())
        .title_top(Line::styled(" Conversation ", theme.muted()));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let transcript = state.session.transcript();
    if transcript.is_empty() && !state.session.is_busy() {
        let y = inner.y + inner.height / 2;
        let placeholder = Paragraph::new(Line::styled(EMPTY_STATE, theme.muted()))
            .alignment(Alignment::Center);
        f.render_widget(placeholder, Rect { y, height: 1, ..inner });
        return;
    }

    let width = inner.width as usize;
    let mut all_lines: Vec<Line> = Vec::new();
    let mut answer_number = 0;
    for turn in transcript.turns() {
        let number = if turn.is_assistant() {
            answer_number += 1;
            Some(answer_number)
        } else {
            None
        };
        all_lines.extend(render_turn_lines(
            turn,
            number,
            width,
            theme,
            &state.config.ui.empty_citation_message,
        ));
    }
    if state.session.indicator_visible() {
        all_lines.extend(indicator_lines(state.session.indicator(), theme));
    }

    let total_lines = all_lines.len();
    let visible_height = inner.height as usize;
    let max_scroll = total_lines.saturating_sub(visible_height);
    let actual_scroll = state.scroll_offset.min(max_scroll);
    let start = max_scroll.saturating_sub(actual_scroll);
    let visible: Vec<Line> = all_lines.into_iter().skip(start).take(visible_height).collect();

    f.render_widget(Paragraph::new(visible).wrap(Wrap { trim: false }), inner);

    if total_lines > visible_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"))
            .track_symbol(Some("│"))
            .thumb_symbol("█");
        let mut scrollbar_state =
            ScrollbarState::new(max_scroll).position(max_scroll.saturating_sub(actual_scroll));
        f.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn render_slash_popup(f: &mut Frame, input_area: Rect, popup: &SlashPopup, theme: &Theme) {
    let items = popup.display_items();
    if items.is_empty() {
        return;
    }
    let popup_height = (items.len() as u16 + 2).min(12);
    let popup_width = 52.min(input_area.width.saturating_sub(2));
    let popup_area = Rect {
        x: input_area.x + 1,
        y: input_area.y.saturating_sub(popup_height),
        width: popup_width,
        height: popup_height,
    };
    f.render_widget(Clear, popup_area);

    let lines: Vec<Line> = items
        .iter()
        .map(|(usage, desc, selected)| {
            let (prefix, style) = if *selected {
                ("▸ ", theme.accent())
            } else {
                ("  ", theme.text())
            };
            Line::from(vec![
                Span::styled(prefix, style),
                Span::styled(*usage, style.bold()),
                Span::styled(format!(" - {desc}"), theme.muted()),
            ])
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.accent())
        .title_top(Line::styled(" Commands (Tab) ", theme.title()));
    f.render_widget(Paragraph::new(lines).block(block), popup_area);
}

fn render_help_overlay(f: &mut Frame, area: Rect, theme: &Theme) {
    let mut lines = vec![Line::styled("Commands", theme.title()), Line::from("")];
    for cmd in ChatCommand::all() {
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<16}", cmd.usage()), theme.key()),
            Span::styled(cmd.description(), theme.key_desc()),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::styled("Keys", theme.title()));
    lines.push(Line::from(""));
    for (key, desc) in [
        ("Ctrl+L", "clear the conversation"),
        ("Ctrl+T", "switch dark/light mode"),
        ("F2", "show or hide saved messages"),
        ("Up/Down", "input history"),
        ("PgUp/PgDn", "scroll"),
        ("Esc", "stop the current answer"),
    ] {
        lines.push(Line::from(vec![
            Span::styled(format!("  {key:<16}"), theme.key()),
            Span::styled(desc, theme.key_desc()),
        ]));
    }

    let height = (lines.len() as u16 + 2).min(area.height);
    let width = 60.min(area.width);
    let overlay = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };
    f.render_widget(Clear, overlay);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border_focused())
        .title_top(Line::styled(" Help (any key to close) ", theme.muted()));
    f.render_widget(Paragraph::new(lines).block(block), overlay);
}

/// Terminal front end around an [`AppState`]
pub struct App<B: ResponseBackend + 'static> {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    state: AppState<B>,
}

impl<B: ResponseBackend + 'static> App<B> {
    pub fn new(config: ChatConfig, backend: Arc<B>) -> anyhow::Result<Self> {
        let state = AppState::new(config, backend)?;

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, crossterm::event::EnableMouseCapture)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;

        Ok(Self { terminal, state })
    }

    /// Run the main event loop until the user quits
    pub async fn run(&mut self) -> io::Result<()> {
        let poll_timeout = Duration::from_millis(16);
        let spinner_interval = Duration::from_millis(80);
        let mut last_spinner_update = Instant::now();

        while !self.state.should_quit() {
            self.state.drain_events();

            if last_spinner_update.elapsed() >= spinner_interval {
                self.state.tick();
                last_spinner_update = Instant::now();
            }

            let state = &self.state;
            self.terminal.draw(|f| render(f, state))?;

            if event::poll(poll_timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                        self.state.handle_key(key);
                    }
                    Event::Mouse(mouse) => match mouse.kind {
                        MouseEventKind::ScrollUp => {
                            self.state.scroll_offset = self.state.scroll_offset.saturating_add(3);
                        }
                        MouseEventKind::ScrollDown => {
                            self.state.scroll_offset = self.state.scroll_offset.saturating_sub(3);
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
            // Let spawned stream and upload tasks make progress
            tokio::task::yield_now().await;
        }

        if let Some(task) = self.state.stream_task.take() {
            task.abort();
        }
        Ok(())
    }
}

impl<B: ResponseBackend + 'static> Drop for App<B> {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            crossterm::event::DisableMouseCapture,
            LeaveAlternateScreen
        );
        let _ = self.terminal.show_cursor();
    }
}
