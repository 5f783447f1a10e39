use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use player_similarity::config::{Settings, load_dotenv};
use player_similarity::positions::Position;
use player_similarity::provider::Sources;
use player_similarity::state::{
    ComparisonEntry, DetailPhase, Phase, SimilarityState, initials, similarity_percent,
};
use player_similarity::view_model::SimilarityViewModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Positions,
    Players,
    Similar,
}

struct App {
    vm: SimilarityViewModel,
    screen: Screen,
    position_selected: usize,
    player_selected: usize,
    player_filter: String,
    filter_active: bool,
    candidate_selected: usize,
    help_overlay: bool,
    should_quit: bool,
}

impl App {
    fn new(vm: SimilarityViewModel) -> Self {
        Self {
            vm,
            screen: Screen::Positions,
            position_selected: 0,
            player_selected: 0,
            player_filter: String::new(),
            filter_active: false,
            candidate_selected: 0,
            help_overlay: false,
            should_quit: false,
        }
    }

    fn position(&self) -> Position {
        Position::ALL[self.position_selected.min(Position::ALL.len() - 1)]
    }

    fn filtered_players(&self) -> Vec<&str> {
        self.vm
            .state()
            .players
            .iter()
            .filter(|name| contains_ascii_ci(name, &self.player_filter))
            .map(String::as_str)
            .collect()
    }

    fn on_key(&mut self, key: KeyEvent) {
        if self.filter_active {
            match key.code {
                KeyCode::Char(c) => self.player_filter.push(c),
                KeyCode::Backspace => {
                    self.player_filter.pop();
                }
                KeyCode::Enter | KeyCode::Esc => self.filter_active = false,
                _ => {}
            }
            self.player_selected = 0;
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.help_overlay = !self.help_overlay,
            KeyCode::Char('j') | KeyCode::Down => self.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.select_prev(),
            KeyCode::Enter => self.activate(),
            KeyCode::Char('b') | KeyCode::Esc => self.back(),
            KeyCode::Char('/') if self.screen == Screen::Players => {
                self.filter_active = true;
                self.player_filter.clear();
            }
            KeyCode::Char('r') => self.reload(),
            _ => {}
        }
    }

    fn select_next(&mut self) {
        let (cursor, len) = match self.screen {
            Screen::Positions => (&mut self.position_selected, Position::ALL.len()),
            Screen::Players => {
                let len = self.filtered_players().len();
                (&mut self.player_selected, len)
            }
            Screen::Similar => {
                let len = self.vm.state().candidates.len();
                (&mut self.candidate_selected, len)
            }
        };
        if len > 0 && *cursor + 1 < len {
            *cursor += 1;
        }
    }

    fn select_prev(&mut self) {
        let cursor = match self.screen {
            Screen::Positions => &mut self.position_selected,
            Screen::Players => &mut self.player_selected,
            Screen::Similar => &mut self.candidate_selected,
        };
        *cursor = cursor.saturating_sub(1);
    }

    fn activate(&mut self) {
        match self.screen {
            Screen::Positions => {
                let position = self.position();
                self.vm.request_players(position);
                self.player_filter.clear();
                self.player_selected = 0;
                self.screen = Screen::Players;
            }
            Screen::Players => {
                let Some(player) = self
                    .filtered_players()
                    .get(self.player_selected)
                    .map(|name| name.to_string())
                else {
                    return;
                };
                let position = self.position();
                self.vm.request_analysis(position, player);
                self.candidate_selected = 0;
                self.screen = Screen::Similar;
            }
            Screen::Similar => {
                let Some(name) = self
                    .vm
                    .state()
                    .candidates
                    .get(self.candidate_selected)
                    .map(|c| c.name.clone())
                else {
                    return;
                };
                self.vm.select_candidate(name);
            }
        }
    }

    fn back(&mut self) {
        match self.screen {
            Screen::Positions => {}
            Screen::Players => self.screen = Screen::Positions,
            Screen::Similar => {
                if self.vm.state().selected.is_some() {
                    self.vm.clear_selection();
                } else {
                    self.screen = Screen::Players;
                }
            }
        }
    }

    fn reload(&mut self) {
        match self.screen {
            Screen::Positions => {}
            Screen::Players => {
                let position = self.position();
                self.vm.request_players(position);
            }
            Screen::Similar => {
                // Only takes effect after a failed analysis; an active query is left alone.
                if let Some(query) = self.vm.state().query.clone() {
                    self.vm.request_analysis(query.position, query.player);
                }
            }
        }
    }

    fn clamp_cursors(&mut self) {
        let players = self.filtered_players().len();
        self.player_selected = self.player_selected.min(players.saturating_sub(1));
        let candidates = self.vm.state().candidates.len();
        self.candidate_selected = self.candidate_selected.min(candidates.saturating_sub(1));
    }
}

fn main() -> anyhow::Result<()> {
    load_dotenv();
    let settings = Settings::from_env();
    let sources = Sources::from_settings(&settings)?;
    let (vm, _provider) = SimilarityViewModel::spawn(sources, settings.fetch_parallelism);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let mut app = App::new(vm);
    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();

    loop {
        app.vm.pump();
        app.clamp_cursors();

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key(key);
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(1),
            Constraint::Length(6),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(app))
        .style(Style::default().add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    match app.screen {
        Screen::Positions => render_positions(frame, chunks[1], app),
        Screen::Players => render_players(frame, chunks[1], app),
        Screen::Similar => render_similar(frame, chunks[1], app.vm.state(), app),
    }

    let console = Paragraph::new(console_text(app.vm.state(), chunks[2].height))
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().title("Console").borders(Borders::TOP));
    frame.render_widget(console, chunks[2]);

    frame.render_widget(Paragraph::new(footer_text(app)), chunks[3]);

    if app.screen == Screen::Similar && app.vm.state().selected.is_some() {
        render_comparison_overlay(frame, frame.size(), app.vm.state());
    }
    if app.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(app: &App) -> String {
    let screen = match app.screen {
        Screen::Positions => "SELECT POSITION",
        Screen::Players => "SELECT PLAYER",
        Screen::Similar => "SIMILAR PLAYERS",
    };
    format!(" PLAYER SIMILARITY | {screen} | {}", app.position().label())
}

fn footer_text(app: &App) -> String {
    if app.filter_active {
        return format!("Filter: {}_  (Enter/Esc done)", app.player_filter);
    }
    match app.screen {
        Screen::Positions => "j/k Move | Enter Choose | ? Help | q Quit".to_string(),
        Screen::Players => {
            "j/k Move | / Filter | Enter Compare | r Reload | b/Esc Back | q Quit".to_string()
        }
        Screen::Similar => {
            "j/k Move | Enter Toggle comparison | Esc Close/Back | r Retry | q Quit".to_string()
        }
    }
}

fn render_positions(frame: &mut Frame, area: Rect, app: &App) {
    let lines: Vec<Line> = Position::ALL
        .iter()
        .enumerate()
        .map(|(idx, pos)| list_line(pos.label(), idx == app.position_selected))
        .collect();
    let list = Paragraph::new(lines).block(Block::default().title("Position").borders(Borders::ALL));
    frame.render_widget(list, area);
}

fn render_players(frame: &mut Frame, area: Rect, app: &App) {
    let state = app.vm.state();
    let block = Block::default()
        .title(format!("Players · {}", app.position().label()))
        .borders(Borders::ALL);

    if state.players_loading {
        frame.render_widget(Paragraph::new("Loading players...").block(block), area);
        return;
    }
    if let Some(err) = state.players_error.as_deref() {
        let msg = Paragraph::new(format!("Player list unavailable: {err}\nPress r to retry."))
            .style(Style::default().fg(Color::Red))
            .block(block);
        frame.render_widget(msg, area);
        return;
    }

    let players = app.filtered_players();
    if players.is_empty() {
        let empty = Paragraph::new("No players match")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let visible = area.height.saturating_sub(2) as usize;
    let (start, end) = visible_range(app.player_selected, players.len(), visible);
    let lines: Vec<Line> = (start..end)
        .map(|idx| list_line(players[idx], idx == app.player_selected))
        .collect();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_similar(frame: &mut Frame, area: Rect, state: &SimilarityState, app: &App) {
    let Some(query) = state.query.as_ref() else {
        let idle = Paragraph::new("No comparison active. Pick a position and a player.")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(idle, area);
        return;
    };

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(1)])
        .split(area);

    if state.phase == Phase::Loading && state.fingerprint.is_empty() {
        let loading = Paragraph::new(format!("Finding players similar to {}...", query.player))
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(loading, area);
        return;
    }

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(sections[0]);

    let target = Paragraph::new(target_card_text(state, &query.player, query.position))
        .block(Block::default().title(query.player.as_str()).borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    frame.render_widget(target, top[0]);

    let traits = Paragraph::new(fingerprint_text(state))
        .block(Block::default().title("Unique Traits").borders(Borders::ALL));
    frame.render_widget(traits, top[1]);

    render_candidates(frame, sections[1], state, app.candidate_selected);
}

fn target_card_text(state: &SimilarityState, player: &str, position: Position) -> String {
    let team = state.team_for(player).unwrap_or(position.label());
    let portrait = match state.target_portrait.as_ref() {
        None => "portrait: loading...".to_string(),
        Some(p) => match p.image_url.as_deref() {
            Some(url) => format!("portrait: {url}"),
            None => format!("[{}]", initials(player)),
        },
    };
    format!("{team}\n\n{portrait}")
}

fn fingerprint_text(state: &SimilarityState) -> String {
    if state.fingerprint.is_empty() {
        return "No fingerprint".to_string();
    }
    state
        .fingerprint
        .entries()
        .iter()
        .map(|e| format!("{:<28} {:>6.2}", e.attribute, e.weighted_z_score))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_candidates(frame: &mut Frame, area: Rect, state: &SimilarityState, selected: usize) {
    let title = match state.updated_at.as_deref() {
        Some(at) => format!("Similar players · updated {at}"),
        None => "Similar players".to_string(),
    };
    let block = Block::default().title(title).borders(Borders::ALL);

    if let Some(err) = state.analysis_error.as_deref() {
        let msg = Paragraph::new(format!("No similar players found.\n{err}\nPress r to retry."))
            .style(Style::default().fg(Color::Red))
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(msg, area);
        return;
    }
    if state.candidates.is_empty() {
        let empty = Paragraph::new("No similar players returned")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let visible = area.height.saturating_sub(2) as usize;
    let (start, end) = visible_range(selected, state.candidates.len(), visible);
    let lines: Vec<Line> = (start..end)
        .map(|idx| {
            let c = &state.candidates[idx];
            let avatar = if !state.images_ready {
                "[…]".to_string()
            } else if c.image_url.is_some() {
                "[img]".to_string()
            } else {
                format!("[{}]", initials(&c.name))
            };
            let team = state.team_for(&c.name).unwrap_or("");
            let marker = if state.selected.as_deref() == Some(c.name.as_str()) {
                "*"
            } else {
                " "
            };
            let text = format!(
                "{marker}{avatar:<6}{:<26}{:<20}{} {:>4}",
                c.name,
                team,
                similarity_bar(c.similarity(), 20),
                similarity_percent(c.similarity())
            );
            list_line(&text, idx == selected)
        })
        .collect();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_comparison_overlay(frame: &mut Frame, area: Rect, state: &SimilarityState) {
    let (Some(candidate), Some(query)) = (state.selected.as_deref(), state.query.as_ref()) else {
        return;
    };
    let popup = centered_rect(75, 70, area);
    frame.render_widget(Clear, popup);

    let mut lines = vec![
        format!(
            "{}  ({})",
            query.player,
            state.team_for(&query.player).unwrap_or(query.position.label())
        ),
        format!(
            "{}  ({})",
            candidate,
            state.team_for(candidate).unwrap_or("team unknown")
        ),
        String::new(),
    ];
    match state.detail_phase() {
        DetailPhase::ComparisonLoading => lines.push("Loading comparison...".to_string()),
        DetailPhase::ComparisonUnavailable | DetailPhase::NoSelection => {
            lines.push("No detailed comparison data available".to_string())
        }
        DetailPhase::ComparisonReady => {
            let entries = state.selected_comparison().unwrap_or_default();
            if entries.is_empty() {
                lines.push("No detailed comparison data available".to_string());
            }
            lines.extend(entries.iter().map(comparison_line));
        }
    }

    let detail = Paragraph::new(lines.join("\n"))
        .block(
            Block::default()
                .title(format!("{candidate} vs {}", query.player))
                .borders(Borders::ALL),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(detail, popup);
}

fn comparison_line(entry: &ComparisonEntry) -> String {
    let arrow = if entry.target_is_better() { "▲" } else { "▼" };
    format!(
        "{:<30} {:>6.1} vs {:<6.1} ({:+.1}) {arrow}",
        entry.stat, entry.target_score, entry.similar_score, entry.difference
    )
}

fn console_text(state: &SimilarityState, height: u16) -> String {
    let rows = height.saturating_sub(1) as usize;
    let skip = state.logs.len().saturating_sub(rows);
    state
        .logs
        .iter()
        .skip(skip)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}

fn list_line(text: &str, selected: bool) -> Line<'static> {
    let style = if selected {
        Style::default().fg(Color::White).bg(Color::DarkGray)
    } else {
        Style::default()
    };
    Line::styled(text.to_string(), style)
}

fn similarity_bar(similarity: f64, width: usize) -> String {
    let filled = ((similarity.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn contains_ascii_ci(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 || visible == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "Player Similarity - Help",
        "",
        "Global:",
        "  j/k or ↑/↓   Move",
        "  Enter        Choose / toggle comparison",
        "  b / Esc      Close comparison or go back",
        "  r            Reload players / retry analysis",
        "  ?            Toggle help",
        "  q            Quit",
        "",
        "Players:",
        "  /            Filter by name",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_range_keeps_selection_in_view() {
        assert_eq!(visible_range(0, 3, 10), (0, 3));
        assert_eq!(visible_range(8, 20, 6), (5, 11));
        assert_eq!(visible_range(19, 20, 6), (14, 20));
        assert_eq!(visible_range(0, 0, 6), (0, 0));
    }

    #[test]
    fn similarity_bar_fills_proportionally() {
        assert_eq!(similarity_bar(0.5, 4), "██░░");
        assert_eq!(similarity_bar(1.4, 4), "████");
    }

    #[test]
    fn comparison_line_marks_direction() {
        let line = comparison_line(&ComparisonEntry::new("Shots", 91.0, 93.5));
        assert!(line.contains("(-2.5)"));
        assert!(line.ends_with('▼'));
    }
}
