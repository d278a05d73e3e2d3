//! Live terminal view of a probe run

use crate::proxy::report::render_line;
use crate::proxy::ProbeResult;
use crate::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Duration;

/// Maximum number of recent results kept per list for display
const MAX_RECENT_RESULTS: usize = 100;

/// What the view collected before it closed
pub struct RunViewOutcome {
    /// Results in completion order
    pub results: Vec<ProbeResult>,
    /// `false` when the operator quit before the run drained
    pub completed: bool,
}

/// Terminal view fed by a streaming run
pub struct RunView {
    /// Total number of input lines
    total: usize,
    /// Every result received so far
    results: Vec<ProbeResult>,
    working_count: usize,
    failed_count: usize,
    /// Recent working results (for display)
    recent_working: VecDeque<ProbeResult>,
    /// Recent failed results (for display)
    recent_failed: VecDeque<ProbeResult>,
    /// Selected list (0 = working, 1 = failed)
    selected_list: usize,
    list_state: ListState,
    status_message: String,
    is_complete: bool,
    should_quit: bool,
}

impl RunView {
    pub fn new(total: usize) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            total,
            results: Vec::with_capacity(total),
            working_count: 0,
            failed_count: 0,
            recent_working: VecDeque::new(),
            recent_failed: VecDeque::new(),
            selected_list: 0,
            list_state,
            status_message: "Starting probe run... Press 'q' to quit.".to_string(),
            is_complete: false,
            should_quit: false,
        }
    }

    /// Drive the view until the operator quits
    ///
    /// Quitting early drops the receiver, which cancels the run.
    pub async fn run(mut self, rx: mpsc::Receiver<ProbeResult>) -> Result<RunViewOutcome> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal, rx).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result?;
        Ok(RunViewOutcome {
            completed: self.is_complete,
            results: self.results,
        })
    }

    async fn run_app<B: Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
        mut rx: mpsc::Receiver<ProbeResult>,
    ) -> Result<()> {
        loop {
            terminal.draw(|f| self.ui(f))?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code);
                        if self.should_quit {
                            break;
                        }
                    }
                }
            }

            // Drain whatever is ready so a fast run does not lag behind the UI
            loop {
                match rx.try_recv() {
                    Ok(result) => self.record(result),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        if !self.is_complete {
                            self.is_complete = true;
                            self.status_message = format!(
                                "Complete! Checked: {} | Working: {} | Failed: {} | Press 'q' to quit",
                                self.results.len(),
                                self.working_count,
                                self.failed_count
                            );
                        }
                        break;
                    }
                }
            }
            tokio::task::yield_now().await;
        }

        Ok(())
    }

    fn record(&mut self, result: ProbeResult) {
        let (recent, count) = if result.is_working() {
            (&mut self.recent_working, &mut self.working_count)
        } else {
            (&mut self.recent_failed, &mut self.failed_count)
        };
        *count += 1;
        recent.push_back(result.clone());
        if recent.len() > MAX_RECENT_RESULTS {
            recent.pop_front();
        }
        self.results.push(result);

        let checked = self.results.len();
        self.status_message = format!(
            "Checking... {}% ({}/{}) | Working: {} | Failed: {}",
            percent(checked, self.total),
            checked,
            self.total,
            self.working_count,
            self.failed_count
        );
    }

    fn handle_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.selected_list = (self.selected_list + 1) % 2;
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(i) if i + 1 < len => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(0) | None => len.saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn selected_len(&self) -> usize {
        if self.selected_list == 0 {
            self.recent_working.len()
        } else {
            self.recent_failed.len()
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Progress bar
                Constraint::Min(0),    // Result lists
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        let title = Paragraph::new("Proxy Probe")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let checked = self.results.len();
        let progress = percent(checked, self.total);
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(progress)
            .label(format!("{}/{} ({}%)", checked, self.total, progress));
        f.render_widget(gauge, chunks[1]);

        let list_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        render_result_list(
            f,
            list_chunks[0],
            "Working",
            &self.recent_working,
            self.working_count,
            Color::Green,
            (self.selected_list == 0).then_some(&mut self.list_state),
        );
        render_result_list(
            f,
            list_chunks[1],
            "Failed",
            &self.recent_failed,
            self.failed_count,
            Color::Red,
            (self.selected_list == 1).then_some(&mut self.list_state),
        );

        let status = Paragraph::new(self.status_message.clone())
            .style(if self.is_complete {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Yellow)
            })
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }
}

fn percent(done: usize, total: usize) -> u16 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0).min(100.0) as u16
}

fn render_result_list(
    f: &mut Frame,
    area: Rect,
    title: &str,
    results: &VecDeque<ProbeResult>,
    total_count: usize,
    color: Color,
    list_state: Option<&mut ListState>,
) {
    let items: Vec<ListItem> = results
        .iter()
        .rev() // newest first
        .map(|result| ListItem::new(render_line(result)).style(Style::default().fg(color)))
        .collect();

    let border_style = if list_state.is_some() {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} ({})", title, total_count))
                .border_style(border_style),
        )
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol(">> ");

    match list_state {
        Some(state) => f.render_stateful_widget(list, area, state),
        None => f.render_widget(list, area),
    }
}
