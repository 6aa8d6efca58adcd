use std::collections::VecDeque;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, Tabs};

use crate::admin::{AdminCommand, PlayerRef};
use crate::server::{GamePhase, ParticipantInfo, ServerStats};

const MAX_LOG_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Players,
    Log,
}

impl Tab {
    const ALL: [Tab; 2] = [Tab::Players, Tab::Log];

    fn title(self) -> &'static str {
        match self {
            Tab::Players => "Players",
            Tab::Log => "Log",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Warn,
    Error,
}

pub struct TuiState {
    tab: Tab,
    log: VecDeque<(Level, String)>,
    /// Lines scrolled up from the bottom of the log.
    scroll: usize,
    selected: usize,
    pending: Option<AdminCommand>,
}

impl Default for TuiState {
    fn default() -> Self {
        Self::new()
    }
}

impl TuiState {
    pub fn new() -> Self {
        Self {
            tab: Tab::Players,
            log: VecDeque::new(),
            scroll: 0,
            selected: 0,
            pending: None,
        }
    }

    fn push(&mut self, level: Level, text: impl Into<String>) {
        if self.log.len() == MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back((level, text.into()));
    }

    pub fn log_info(&mut self, text: impl Into<String>) {
        self.push(Level::Info, text);
    }

    pub fn log_warn(&mut self, text: impl Into<String>) {
        self.push(Level::Warn, text);
    }

    pub fn log_error(&mut self, text: impl Into<String>) {
        self.push(Level::Error, text);
    }

    pub fn active_tab(&self) -> Tab {
        self.tab
    }

    pub fn next_tab(&mut self) {
        let i = Tab::ALL.iter().position(|t| *t == self.tab).unwrap_or(0);
        self.tab = Tab::ALL[(i + 1) % Tab::ALL.len()];
    }

    pub fn prev_tab(&mut self) {
        let i = Tab::ALL.iter().position(|t| *t == self.tab).unwrap_or(0);
        self.tab = Tab::ALL[(i + Tab::ALL.len() - 1) % Tab::ALL.len()];
    }

    pub fn scroll_up(&mut self) {
        self.scroll = (self.scroll + 10).min(self.log.len().saturating_sub(1));
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(10);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = 0;
    }

    pub fn select_prev(&mut self, count: usize) {
        if count > 0 {
            self.selected = (self.selected + count - 1) % count;
        }
    }

    pub fn select_next(&mut self, count: usize) {
        if count > 0 {
            self.selected = (self.selected + 1) % count;
        }
    }

    fn selected_player(&self, players: &[ParticipantInfo]) -> Option<u8> {
        players.get(self.selected).map(|p| p.player)
    }

    pub fn request_kick(&mut self, players: &[ParticipantInfo]) {
        if let Some(player) = self.selected_player(players) {
            self.pending = Some(AdminCommand::Kick(PlayerRef::Number(player)));
        }
    }

    pub fn request_spectate(&mut self, players: &[ParticipantInfo]) {
        if let Some(player) = self.selected_player(players) {
            self.pending = Some(AdminCommand::Spectate(PlayerRef::Number(player)));
        }
    }

    pub fn request_mute(&mut self, players: &[ParticipantInfo]) {
        if let Some(p) = players.get(self.selected) {
            let mute = !p.muted_chat;
            self.pending = Some(AdminCommand::Mute {
                player: PlayerRef::Number(p.player),
                chat: mute,
                draw: mute,
            });
        }
    }

    pub fn request(&mut self, command: AdminCommand) {
        self.pending = Some(command);
    }

    pub fn take_pending_command(&mut self) -> Option<AdminCommand> {
        self.pending.take()
    }
}

pub fn render(
    frame: &mut Frame,
    state: &TuiState,
    stats: &ServerStats,
    players: &[ParticipantInfo],
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], stats);
    render_status(frame, chunks[1], stats);

    let titles: Vec<Line> = Tab::ALL.iter().map(|t| Line::from(t.title())).collect();
    let selected = Tab::ALL.iter().position(|t| *t == state.tab).unwrap_or(0);
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL))
        .select(selected)
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, chunks[2]);

    match state.tab {
        Tab::Players => render_players(frame, chunks[3], state, players),
        Tab::Log => render_log(frame, chunks[3], state),
    }
    render_help(frame, chunks[4], state.tab);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let uptime = format_duration(stats.game_time as u64);
    let title = format!(" Strata Server - Uptime: {uptime} ");

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let addr = stats
        .local_addr
        .map_or_else(|| "local only".to_string(), |a| a.to_string());
    let mode = if stats.playback {
        "demo playback"
    } else if stats.recording {
        "recording"
    } else {
        "live"
    };
    let text = format!(
        "{addr}  |  {}  |  {mode}  |  Players: {}/{} linked",
        stats.phase.as_str(),
        stats.linked,
        stats.players
    );

    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::White));
    frame.render_widget(paragraph, area);
}

fn render_status(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Game ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let phase_color = match stats.phase {
        GamePhase::Running if stats.paused => Color::Yellow,
        GamePhase::Running => Color::Green,
        GamePhase::Over => Color::Red,
        _ => Color::White,
    };
    let net = &stats.network;
    let lines = vec![
        Line::from(vec![
            Span::styled("Frame: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!(
                    "{} ({}){}",
                    stats.frame,
                    format_duration(stats.mod_game_time as u64),
                    if stats.paused { " paused" } else { "" }
                ),
                Style::default().fg(phase_color),
            ),
        ]),
        Line::from(vec![
            Span::styled("Speed: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!(
                    "{:.2}x requested, {:.2}x running",
                    stats.user_speed, stats.internal_speed
                ),
                Style::default().fg(if stats.internal_speed < stats.user_speed {
                    Color::Yellow
                } else {
                    Color::White
                }),
            ),
        ]),
        Line::from(vec![
            Span::styled("Traffic: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!(
                    "{} sent / {} recv, {:.1}% resent",
                    format_bytes(net.bytes_sent),
                    format_bytes(net.bytes_received),
                    net.resend_percent()
                ),
                Style::default().fg(Color::White),
            ),
        ]),
        Line::from(vec![
            Span::styled("Sync: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!(
                    "{} frames outstanding, {} cached packets",
                    stats.outstanding_sync_frames, stats.cached_packets
                ),
                Style::default().fg(Color::White),
            ),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_players(frame: &mut Frame, area: Rect, state: &TuiState, players: &[ParticipantInfo]) {
    let header = Row::new(["#", "Name", "State", "Team", "Peer", "CPU", "Ping", "RTT", "Flags"])
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));

    let rows = players.iter().enumerate().map(|(i, p)| {
        let mut flags = Vec::new();
        if p.is_local {
            flags.push("host");
        }
        if p.spectator {
            flags.push("spec");
        }
        if p.desynced {
            flags.push("DESYNC");
        }
        if p.muted_chat || p.muted_draw {
            flags.push("muted");
        }
        let style = if i == state.selected {
            Style::default().bg(Color::DarkGray)
        } else if p.desynced {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(p.player.to_string()),
            Cell::from(p.name.clone()),
            Cell::from(p.state.as_str()),
            Cell::from(p.team.to_string()),
            Cell::from(p.peer.clone().unwrap_or_else(|| "-".into())),
            Cell::from(format!("{:.0}%", p.cpu_usage * 100.0)),
            Cell::from(p.ping_frames.to_string()),
            Cell::from(format!("{:.0}ms", p.rtt_ms)),
            Cell::from(flags.join(" ")),
        ])
        .style(style)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Min(12),
            Constraint::Length(13),
            Constraint::Length(5),
            Constraint::Length(22),
            Constraint::Length(5),
            Constraint::Length(5),
            Constraint::Length(7),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(Block::default().title(" Players ").borders(Borders::ALL));
    frame.render_widget(table, area);
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let height = area.height.saturating_sub(2) as usize;
    let end = state.log.len().saturating_sub(state.scroll);
    let start = end.saturating_sub(height);
    let lines: Vec<Line> = state
        .log
        .range(start..end)
        .map(|(level, text)| {
            let color = match level {
                Level::Info => Color::White,
                Level::Warn => Color::Yellow,
                Level::Error => Color::Red,
            };
            Line::from(Span::styled(text.as_str(), Style::default().fg(color)))
        })
        .collect();

    let title = if state.scroll > 0 {
        format!(" Log (+{}) ", state.scroll)
    } else {
        " Log ".to_string()
    };
    let block = Block::default().title(title).borders(Borders::ALL);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect, tab: Tab) {
    let block = Block::default()
        .title(" Controls ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let help = match tab {
        Tab::Players => {
            "q/Esc quit | Tab switch | Up/Down select | k kick | s spec | m mute | p pause | f force start"
        }
        Tab::Log => "q/Esc quit | Tab switch | PgUp/PgDn scroll | End bottom",
    };
    let text = Paragraph::new(help).block(block).style(
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    );
    frame.render_widget(text, area);
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{hours:02}:{mins:02}:{secs:02}")
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes}B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1}GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
