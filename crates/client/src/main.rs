use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use strata::GameSetup;
use strata::net::DEFAULT_PORT;
use strata_client::{ClientConfig, ClientEvent, ClientSession, ClientSimLoop, host_game};
use strata_server::ServerConfig;

#[derive(Parser)]
#[command(name = "strata-client")]
#[command(about = "Headless lockstep client running the reference simulation")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    connect: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "player")]
    name: String,

    #[arg(long, default_value = "")]
    password: String,

    /// Host this game setup (JSON) in-process instead of connecting.
    #[arg(long)]
    host: Option<PathBuf>,

    #[arg(long, help = "Record the hosted game to this demo file")]
    record: Option<PathBuf>,

    #[arg(long, help = "Leave after this many frames")]
    frames: Option<i32>,

    #[arg(long, default_value_t = 5, help = "Milliseconds between client ticks")]
    tick_ms: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = ClientConfig::new(&args.name).with_password(&args.password);
    let (_host, mut client) = match &args.host {
        Some(path) => {
            let setup = GameSetup::load(path)
                .with_context(|| format!("failed to load setup {}", path.display()))?;
            let server_config = ServerConfig {
                record_demo: args.record.clone(),
                ..Default::default()
            };
            let bind = format!("0.0.0.0:{}", args.port);
            let (host, client) = host_game(setup, server_config, Some(&bind), config)?;
            (Some(host), client)
        }
        None => {
            let addr = format!("{}:{}", args.connect, args.port);
            let session = ClientSession::connect(addr.as_str(), config)
                .with_context(|| format!("failed to connect to {addr}"))?;
            (None, ClientSimLoop::reference(session))
        }
    };

    let tick = Duration::from_millis(args.tick_ms.max(1));
    let mut last_report = Instant::now();
    while !client.session().is_ended() {
        client.update(Instant::now())?;

        for event in client.session_mut().drain_events() {
            match event {
                ClientEvent::Connected { player } => log::info!("joined as player {player}"),
                ClientEvent::Countdown { millis } => log::info!("starting in {millis} ms"),
                ClientEvent::GameStarted => log::info!("game started"),
                ClientEvent::Paused { by, paused } => {
                    log::info!("{} by player {by}", if paused { "paused" } else { "unpaused" });
                }
                ClientEvent::Ended { reason } => log::info!("left the game: {reason}"),
                _ => {}
            }
        }

        if let Some(limit) = args.frames
            && client.frame() >= limit
        {
            log::info!("reached frame {limit}, leaving");
            client.session_mut().quit()?;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let session = client.session();
            log::info!(
                "{}: frame {} of {}, speed {:.2}, checksum {:08x}",
                session.state().as_str(),
                client.frame(),
                session.server_frame().max(client.frame()),
                client.pacer().speed(),
                client.simulation().map_or(0, |sim| sim.checksum()),
            );
        }

        std::thread::sleep(tick);
    }

    if let Some(reason) = client.session().end_reason() {
        log::info!("session over: {reason}");
    }
    Ok(())
}
