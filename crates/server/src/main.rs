use std::io;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use strata::GameSetup;
use strata::net::{DEFAULT_PORT, PacketLossSimulation};
use strata_server::tui::{self, TuiState};
use strata_server::{AdminCommand, GameServer, ServerConfig, ServerEvent, SpeedControl};

#[derive(Parser)]
#[command(name = "strata-server")]
#[command(about = "Dedicated lockstep game server")]
struct Args {
    /// Game setup (JSON) to host.
    #[arg(required_unless_present = "demo")]
    setup: Option<PathBuf>,

    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, help = "Replay a recorded demo instead of hosting a new game")]
    demo: Option<PathBuf>,

    #[arg(long, help = "Record the game to this demo file")]
    record: Option<PathBuf>,

    #[arg(long, default_value_t = 0, help = "0 = max CPU, 1 = median CPU, 2 = host CPU")]
    speed_control: u8,

    #[arg(long)]
    allow_reconnect: bool,

    #[arg(long, default_value_t = 30, help = "Seconds to wait for the first player")]
    pregame_timeout: u64,

    #[arg(long)]
    headless: bool,

    #[arg(long, help = "Enable packet loss simulation on remote links")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Minimum latency in ms")]
    min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum latency in ms")]
    max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    jitter: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let packet_loss = args.simulate_packet_loss.then(|| PacketLossSimulation {
        enabled: true,
        loss_percent: args.loss_percent,
        min_latency_ms: args.min_latency,
        max_latency_ms: args.max_latency,
        jitter_ms: args.jitter,
        ..Default::default()
    });
    let speed_control = SpeedControl::from_mode(args.speed_control)
        .with_context(|| format!("unknown speed control mode {}", args.speed_control))?;

    let config = ServerConfig {
        speed_control,
        allow_reconnect: args.allow_reconnect,
        pregame_timeout: Duration::from_secs(args.pregame_timeout),
        record_demo: args.record.clone(),
        packet_loss,
        ..Default::default()
    };

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let mut server = match (&args.demo, &args.setup) {
        (Some(demo), _) => GameServer::playback(demo, config)
            .with_context(|| format!("failed to open demo {}", demo.display()))?,
        (None, Some(path)) => {
            let setup = GameSetup::load(path)
                .with_context(|| format!("failed to load setup {}", path.display()))?;
            GameServer::new(setup, config)?
        }
        (None, None) => anyhow::bail!("either a setup file or --demo is required"),
    };
    let addr = server.listen(bind_addr.as_str())?;

    if args.headless {
        log::info!("Server started on {addr}");
        server.run();
        log::info!("Server shutting down");
    } else {
        run_with_tui(&mut server)?;
    }

    Ok(())
}

fn run_with_tui(server: &mut GameServer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();
    let mut tui_state = TuiState::new();

    if let Some(addr) = server.local_addr() {
        tui_state.log_info(format!("Server started on {addr}"));
    }

    while running.load(Ordering::SeqCst) {
        server.tick_once();

        for event in server.drain_events() {
            match event {
                ServerEvent::ConnectionAttempt {
                    name,
                    peer,
                    reconnect,
                } => {
                    let kind = if reconnect { "Reconnection" } else { "Connection" };
                    tui_state.log_info(format!("{kind} attempt from {name} at {peer}"));
                }
                ServerEvent::PlayerConnected {
                    player,
                    name,
                    reconnect,
                } => {
                    let verb = if reconnect { "reconnected" } else { "connected" };
                    tui_state.log_info(format!("{name} {verb} as player {player}"));
                }
                ServerEvent::PlayerJoined { player, name } => {
                    tui_state.log_info(format!("{name} (player {player}) is ingame"));
                }
                ServerEvent::PlayerLeft { player, reason } => {
                    tui_state.log_info(format!("Player {player} left: {}", reason.as_str()));
                }
                ServerEvent::ConnectionDenied { peer, reason } => {
                    tui_state.log_warn(format!("Connection denied to {peer}: {reason}"));
                }
                ServerEvent::GameStarted => tui_state.log_info("Game started"),
                ServerEvent::GameOver { winning_ally_teams } => {
                    tui_state.log_info(format!("Game over, winners: {winning_ally_teams:?}"));
                }
                ServerEvent::Desync { frame, players } => {
                    tui_state.log_error(format!("Desync in frame {frame}: players {players:?}"));
                }
                ServerEvent::Message { text } => tui_state.log_info(text),
                ServerEvent::Error { message } => tui_state.log_error(message),
            }
        }

        if let Some(command) = tui_state.take_pending_command() {
            server.execute(command);
        }

        if event::poll(Duration::from_millis(1))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            let players = server.participant_infos();
            let on_players = tui_state.active_tab() == tui::Tab::Players;
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    running.store(false, Ordering::SeqCst);
                }
                KeyCode::Tab => tui_state.next_tab(),
                KeyCode::BackTab => tui_state.prev_tab(),
                KeyCode::PageUp => tui_state.scroll_up(),
                KeyCode::PageDown => tui_state.scroll_down(),
                KeyCode::End => tui_state.scroll_to_bottom(),
                KeyCode::Up if on_players => tui_state.select_prev(players.len()),
                KeyCode::Down if on_players => tui_state.select_next(players.len()),
                KeyCode::Char('k') | KeyCode::Char('K') if on_players => {
                    tui_state.request_kick(&players);
                }
                KeyCode::Char('s') if on_players => tui_state.request_spectate(&players),
                KeyCode::Char('m') if on_players => tui_state.request_mute(&players),
                KeyCode::Char('p') => {
                    tui_state.request(AdminCommand::Pause(!server.is_paused()));
                }
                KeyCode::Char('f') => tui_state.request(AdminCommand::ForceStart),
                _ => {}
            }
        }

        let stats = server.stats();
        let players = server.participant_infos();
        terminal.draw(|frame| {
            tui::render(frame, &tui_state, &stats, &players);
        })?;

        std::thread::sleep(Duration::from_millis(5));
    }

    tui_state.log_info("Shutting down...");
    server.shutdown();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
