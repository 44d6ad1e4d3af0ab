//! Terminal UI: browse and search memories.
//!
//! A single-threaded ratatui app over the store. The layout is a query
//! bar, a result list beside a detail pane, and a status line that
//! carries the last error without interrupting the session.

use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};

use crate::error::Result;
use crate::model::{Observation, SearchOptions};
use crate::storage::Store;

/// Rows loaded into the browse list.
const LIST_LIMIT: usize = 50;

/// Input focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Navigating the result list.
    Browse,
    /// Editing the query.
    Query,
}

/// Application state.
struct App {
    store: Store,
    mode: Mode,
    query: String,
    rows: Vec<Observation>,
    list_state: ListState,
    status: String,
    showing_search: bool,
    should_quit: bool,
}

impl App {
    fn new(store: Store) -> Self {
        let mut app = Self {
            store,
            mode: Mode::Browse,
            query: String::new(),
            rows: Vec::new(),
            list_state: ListState::default(),
            status: String::from("/ search · ↑/↓ select · r recent · q quit"),
            showing_search: false,
            should_quit: false,
        };
        app.load_recent();
        app
    }

    /// Load the recency view into the list.
    fn load_recent(&mut self) {
        match self.store.recent_observations(None, None, LIST_LIMIT) {
            Ok(rows) => {
                self.rows = rows;
                self.showing_search = false;
                self.reset_selection();
            }
            Err(e) => self.status = format!("error: {e}"),
        }
    }

    /// Run the current query and show its results.
    fn run_search(&mut self) {
        let options = SearchOptions {
            limit: Some(crate::storage::store::SEARCH_LIMIT_MAX),
            ..SearchOptions::default()
        };
        match self.store.search(&self.query, &options) {
            Ok(results) => {
                self.rows = results.into_iter().map(|r| r.observation).collect();
                self.showing_search = true;
                self.reset_selection();
                self.status = format!("{} result(s) for {:?}", self.rows.len(), self.query);
            }
            Err(e) => self.status = format!("error: {e}"),
        }
    }

    fn reset_selection(&mut self) {
        self.list_state
            .select(if self.rows.is_empty() { None } else { Some(0) });
    }

    fn selected(&self) -> Option<&Observation> {
        self.list_state.selected().and_then(|i| self.rows.get(i))
    }

    fn move_selection(&mut self, delta: i64) {
        if self.rows.is_empty() {
            return;
        }
        let current = self.list_state.selected().unwrap_or(0) as i64;
        let next = (current + delta).clamp(0, self.rows.len() as i64 - 1);
        #[allow(clippy::cast_sign_loss)]
        self.list_state.select(Some(next as usize));
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        match self.mode {
            Mode::Browse => match key.code {
                KeyCode::Char('q') => self.should_quit = true,
                KeyCode::Char('/') => {
                    self.mode = Mode::Query;
                    self.status = "enter to search · esc to cancel".into();
                }
                KeyCode::Char('r') => {
                    self.load_recent();
                    self.status = "showing recent observations".into();
                }
                KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
                KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
                _ => {}
            },
            Mode::Query => match key.code {
                KeyCode::Esc => {
                    self.mode = Mode::Browse;
                    self.status = "search cancelled".into();
                }
                KeyCode::Enter => {
                    self.mode = Mode::Browse;
                    self.run_search();
                }
                KeyCode::Backspace => {
                    self.query.pop();
                }
                KeyCode::Char(c) => self.query.push(c),
                _ => {}
            },
        }
    }
}

/// Run the TUI until the user quits.
///
/// # Errors
///
/// Terminal setup or store failures.
pub fn run(store: Store) -> Result<()> {
    let mut app = App::new(store);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|frame| render(frame, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key);
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn render(frame: &mut Frame, app: &mut App) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_query_bar(frame, app, outer[0]);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(outer[1]);

    render_list(frame, app, main[0]);
    render_detail(frame, app, main[1]);

    let status = Paragraph::new(app.status.as_str()).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, outer[2]);
}

fn render_query_bar(frame: &mut Frame, app: &App, area: Rect) {
    let style = if app.mode == Mode::Query {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let bar = Paragraph::new(app.query.as_str())
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(" search "));
    frame.render_widget(bar, area);
}

fn render_list(frame: &mut Frame, app: &mut App, area: Rect) {
    let title = if app.showing_search {
        " results "
    } else {
        " recent "
    };

    let items: Vec<ListItem> = app
        .rows
        .iter()
        .map(|o| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("#{} ", o.id), Style::default().fg(Color::DarkGray)),
                Span::styled(
                    format!("[{}] ", o.kind),
                    Style::default().fg(Color::Cyan),
                ),
                Span::raw(o.title.clone()),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_detail(frame: &mut Frame, app: &App, area: Rect) {
    let body = match app.selected() {
        Some(o) => {
            let mut lines = vec![
                Line::from(Span::styled(
                    o.title.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(format!(
                    "type: {} · scope: {} · created: {}",
                    o.kind, o.scope, o.created_at
                )),
            ];
            if let Some(project) = &o.project {
                lines.push(Line::from(format!("project: {project}")));
            }
            if let Some(topic) = &o.topic_key {
                lines.push(Line::from(format!("topic: {topic}")));
            }
            lines.push(Line::from(""));
            for line in o.content.lines() {
                lines.push(Line::from(line.to_string()));
            }
            lines
        }
        None => vec![Line::from("no observation selected")],
    };

    let detail = Paragraph::new(body)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" detail "));
    frame.render_widget(detail, area);
}
