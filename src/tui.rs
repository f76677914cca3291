use std::io;
use std::time::Duration;

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use crate::domain::RunView;

const HELP: &str = "Up/Down move, Enter select, q/Esc cancel";

#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyOutcome {
    Continue,
    Selected(usize),
    Cancelled,
}

#[derive(Debug)]
struct PickerState {
    labels: Vec<String>,
    pending: Vec<bool>,
    cursor: usize,
    notice: Option<String>,
}

impl PickerState {
    fn new(runs: &[RunView]) -> Self {
        Self {
            labels: runs.iter().map(run_label).collect(),
            pending: runs.iter().map(RunView::is_pending).collect(),
            cursor: 0,
            notice: None,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        if key.kind != KeyEventKind::Press {
            return KeyOutcome::Continue;
        }
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.cursor = self.cursor.saturating_sub(1);
                self.notice = None;
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.cursor + 1 < self.labels.len() {
                    self.cursor += 1;
                }
                self.notice = None;
            }
            KeyCode::Enter => {
                if self.labels.is_empty() {
                    return KeyOutcome::Continue;
                }
                if self.pending[self.cursor] {
                    self.notice = Some(format!(
                        "{} is still transferring and cannot be processed yet",
                        self.labels[self.cursor]
                    ));
                } else {
                    return KeyOutcome::Selected(self.cursor);
                }
            }
            KeyCode::Char('q') | KeyCode::Esc => return KeyOutcome::Cancelled,
            _ => {}
        }
        KeyOutcome::Continue
    }
}

fn run_label(run: &RunView) -> String {
    let mut label = format!(
        "{} - Started: {} ({} biosamples)",
        run.name(),
        run.started_date().unwrap_or("unknown"),
        run.sample_count()
    );
    if run.is_pending() {
        label.push_str(" (pending)");
    }
    label
}

/// Full-screen list of runs; returns the chosen index, or `None` when cancelled.
pub struct RunPicker<'a> {
    runs: &'a [RunView],
}

impl<'a> RunPicker<'a> {
    pub fn new(runs: &'a [RunView]) -> Self {
        Self { runs }
    }

    pub fn pick(&self) -> miette::Result<Option<usize>> {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        result
    }

    fn event_loop(
        &self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> miette::Result<Option<usize>> {
        let mut state = PickerState::new(self.runs);
        let mut list_state = ListState::default();

        loop {
            list_state.select(Some(state.cursor));
            terminal
                .draw(|frame| {
                    let chunks = Layout::default()
                        .direction(Direction::Vertical)
                        .constraints([Constraint::Min(3), Constraint::Length(3)])
                        .split(frame.area());

                    let items = state
                        .labels
                        .iter()
                        .zip(&state.pending)
                        .map(|(label, pending)| {
                            let style = if *pending {
                                Style::default().add_modifier(Modifier::DIM)
                            } else {
                                Style::default()
                            };
                            ListItem::new(Line::from(label.as_str())).style(style)
                        })
                        .collect::<Vec<_>>();
                    let list = List::new(items)
                        .block(Block::default().borders(Borders::ALL).title("Select a run"))
                        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
                        .highlight_symbol("> ");
                    frame.render_stateful_widget(list, chunks[0], &mut list_state);

                    let footer = Paragraph::new(state.notice.as_deref().unwrap_or(HELP))
                        .block(Block::default().borders(Borders::ALL));
                    frame.render_widget(footer, chunks[1]);
                })
                .into_diagnostic()?;

            if event::poll(Duration::from_millis(100)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    match state.handle_key(key) {
                        KeyOutcome::Continue => {}
                        KeyOutcome::Selected(index) => return Ok(Some(index)),
                        KeyOutcome::Cancelled => return Ok(None),
                    }
                }
            }
        }
    }
}
