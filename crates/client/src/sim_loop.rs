use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use strata::ai;
use strata::{
    ChecksumSimulation, ClientPacer, GameSetup, MessageType, NetMessage, RawPacket, Simulation,
};

use crate::events::ClientEvent;
use crate::session::{ClientError, ClientSession, SessionState};

/// Builds the simulation once the game starts, from the setup and seed the
/// server sent.
pub type SimulationFactory<S> = Box<dyn FnMut(&GameSetup, u32) -> S + Send>;

/// Drives a [`Simulation`] in lockstep with the server. Frames only run
/// when the server's frame message for them has been dequeued, and every
/// message is applied in the order the server sent it.
pub struct ClientSimLoop<S: Simulation> {
    session: ClientSession,
    pacer: ClientPacer,
    simulation: Option<S>,
    new_simulation: SimulationFactory<S>,
    frame: i32,
    steps: u64,
    checksums: Option<Vec<u32>>,
    last_update: Instant,
    busy: Duration,
    last_cpu_report: Instant,
}

impl ClientSimLoop<ChecksumSimulation> {
    /// A loop running the reference [`ChecksumSimulation`].
    pub fn reference(session: ClientSession) -> Self {
        Self::new(session, |setup, seed| {
            ChecksumSimulation::new(seed, setup.teams.len().min(u8::MAX as usize) as u8)
        })
    }
}

impl<S: Simulation> ClientSimLoop<S> {
    pub fn new(
        session: ClientSession,
        new_simulation: impl FnMut(&GameSetup, u32) -> S + Send + 'static,
    ) -> Self {
        let pacer = ClientPacer::new(session.config().max_frames_per_tick);
        let now = Instant::now();
        Self {
            session,
            pacer,
            simulation: None,
            new_simulation: Box::new(new_simulation),
            frame: 0,
            steps: 0,
            checksums: None,
            last_update: now,
            busy: Duration::ZERO,
            last_cpu_report: now,
        }
    }

    /// Keeps the checksum of every simulated frame.
    pub fn with_checksum_log(mut self) -> Self {
        self.checksums = Some(Vec::new());
        self
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ClientSession {
        &mut self.session
    }

    pub fn simulation(&self) -> Option<&S> {
        self.simulation.as_ref()
    }

    pub fn pacer(&self) -> &ClientPacer {
        &self.pacer
    }

    /// Last simulated frame.
    pub fn frame(&self) -> i32 {
        self.frame
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Checksums of frames 1, 2, ... when the log is enabled.
    pub fn checksums(&self) -> &[u32] {
        self.checksums.as_deref().unwrap_or_default()
    }

    /// Counts frame messages among the first queued messages. Frame
    /// progress reports found on the way are consumed.
    pub fn buffered_frames(&mut self) -> usize {
        let limit = self.session.config().peek_limit;
        let channel = self.session.channel_mut();
        let mut frames = 0;
        let mut progress = None;
        let mut index = 0;
        for _ in 0..limit {
            let kind = match channel.peek(index) {
                Some(packet) => packet.message_type(),
                None => break,
            };
            match kind {
                Some(MessageType::GameFrameProgress) => {
                    if let Some(packet) = channel.delete_at(index)
                        && let Ok(NetMessage::GameFrameProgress { frame }) =
                            NetMessage::decode(packet.bytes())
                    {
                        progress = Some(frame);
                    }
                    continue;
                }
                Some(kind) if kind.is_frame_advance() => frames += 1,
                _ => {}
            }
            index += 1;
        }
        if let Some(frame) = progress {
            self.session.note_server_frame(frame);
        }
        frames
    }

    /// One client tick. Returns the number of frames simulated.
    pub fn update(&mut self, now: Instant) -> Result<u32, ClientError> {
        if self.session.is_ended() {
            return Ok(0);
        }
        let started = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_update);
        self.last_update = now;
        self.session.retry_handshake(now)?;

        let backlog = self.buffered_frames();
        let mut allowed = self.pacer.update(elapsed, backlog);
        let mut steps = 0;
        while !self.session.is_ended() {
            let advances = match self.session.channel_mut().peek(0) {
                Some(packet) => packet
                    .message_type()
                    .is_some_and(MessageType::is_frame_advance),
                None => break,
            };
            if advances {
                if allowed == 0 {
                    break;
                }
                allowed -= 1;
            }
            let Some(packet) = self.session.channel_mut().receive() else {
                break;
            };
            if self.process(packet)? {
                steps += 1;
            }
        }
        if self.session.is_ended() {
            return Ok(steps);
        }

        self.busy += started.elapsed();
        self.report_cpu(now)?;
        self.session.flush(now)?;
        Ok(steps)
    }

    /// Ticks until the session ends or `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool, tick: Duration) -> Result<(), ClientError> {
        while running.load(Ordering::SeqCst) && !self.session.is_ended() {
            self.update(Instant::now())?;
            thread::sleep(tick);
        }
        Ok(())
    }

    /// Returns `true` when a frame was simulated.
    fn process(&mut self, packet: RawPacket) -> Result<bool, ClientError> {
        let message = match NetMessage::decode(packet.bytes()) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("dropping message from server: {e}");
                return Ok(false);
            }
        };

        match message {
            NetMessage::KeyFrame { frame } => {
                if frame != self.frame + 1 {
                    log::error!(
                        "keyframe difference: {} (client {}, server {frame})",
                        self.frame + 1 - frame,
                        self.frame
                    );
                    return Ok(false);
                }
                self.session.send(&NetMessage::KeyFrame { frame })?;
                self.step()
            }
            NetMessage::NewFrame => self.step(),
            NetMessage::StartPlaying { countdown } => {
                if countdown > 0 {
                    log::info!("game starts in {countdown} ms");
                    self.session
                        .push_event(ClientEvent::Countdown { millis: countdown });
                } else {
                    self.start();
                }
                Ok(false)
            }
            NetMessage::Pause { player, paused } => {
                self.pacer.set_paused(paused);
                if self.session.state() != SessionState::PreGame {
                    self.session.set_state(if paused {
                        SessionState::Paused
                    } else {
                        SessionState::Playing
                    });
                }
                log::info!("player {player} {}", if paused { "paused" } else { "unpaused" });
                self.session
                    .push_event(ClientEvent::Paused { by: player, paused });
                Ok(false)
            }
            NetMessage::UserSpeed { speed, .. } | NetMessage::InternalSpeed { speed } => {
                if (self.pacer.speed() - speed).abs() > f32::EPSILON {
                    log::debug!("speed set to {speed:.2}");
                    self.pacer.set_speed(speed);
                    self.session.push_event(ClientEvent::SpeedChanged { speed });
                }
                Ok(false)
            }
            NetMessage::Command { player, command } => {
                if let Some(sim) = self.simulation.as_mut() {
                    sim.apply(player, &command);
                } else {
                    log::debug!("command from player {player} before game start");
                }
                Ok(false)
            }
            NetMessage::Select { player, units } => {
                if let Some(sim) = self.simulation.as_mut() {
                    sim.select(player, &units);
                }
                Ok(false)
            }
            NetMessage::AiCommand {
                player,
                ai,
                unit,
                command,
            } => {
                log::trace!(
                    "ai {ai} of player {player} orders unit {unit} (topic {})",
                    ai::topic_for(&command)
                );
                if let Some(sim) = self.simulation.as_mut() {
                    sim.command_units(player, &[unit], &command);
                }
                Ok(false)
            }
            NetMessage::AiCommands {
                player,
                pairwise,
                units,
                commands,
                ..
            } => {
                let Some(sim) = self.simulation.as_mut() else {
                    return Ok(false);
                };
                if pairwise {
                    for (unit, command) in units.iter().zip(&commands) {
                        sim.command_units(player, &[*unit], command);
                    }
                } else {
                    for command in &commands {
                        sim.command_units(player, &units, command);
                    }
                }
                Ok(false)
            }
            other => {
                self.session.handle(other);
                Ok(false)
            }
        }
    }

    fn start(&mut self) {
        self.create_simulation();
        self.session.channel_mut().set_in_game(true);
        self.session.set_state(if self.pacer.is_paused() {
            SessionState::Paused
        } else {
            SessionState::Playing
        });
        log::info!("game started");
        self.session.push_event(ClientEvent::GameStarted);
    }

    fn create_simulation(&mut self) {
        if self.simulation.is_some() {
            return;
        }
        let (Some(setup), Some(seed)) = (self.session.setup(), self.session.random_seed()) else {
            return;
        };
        log::debug!("creating simulation with seed {seed}");
        self.simulation = Some((self.new_simulation)(setup, seed));
    }

    fn step(&mut self) -> Result<bool, ClientError> {
        self.create_simulation();
        let Some(sim) = self.simulation.as_mut() else {
            log::error!("frame {} arrived before game data", self.frame + 1);
            return Ok(false);
        };
        let checksum = sim.step();
        self.frame += 1;
        self.steps += 1;
        if let Some(log) = self.checksums.as_mut() {
            log.push(checksum);
        }
        if let Some(player) = self.session.player() {
            self.session.send(&NetMessage::SyncResponse {
                player,
                frame: self.frame,
                checksum,
            })?;
        }
        Ok(true)
    }

    fn report_cpu(&mut self, now: Instant) -> Result<(), ClientError> {
        let window = now.saturating_duration_since(self.last_cpu_report);
        if window < self.session.config().cpu_report_interval {
            return Ok(());
        }
        let usage = (self.busy.as_secs_f32() / window.as_secs_f32().max(f32::EPSILON)).clamp(0.0, 1.0);
        self.busy = Duration::ZERO;
        self.last_cpu_report = now;
        if self.session.player().is_some() {
            self.session.send(&NetMessage::CpuUsage { usage })?;
        }
        Ok(())
    }
}
