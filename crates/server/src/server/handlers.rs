//! What the server does with each message a linked client sends.

use std::time::Instant;

use strata::net::{AiState, LeaveReason, TeamAction};
use strata::setup::StartPosType;
use strata::{NetMessage, RawPacket};

use super::GameServer;
use crate::admin::AdminCommand;
use crate::events::ServerEvent;
use crate::participant::{AiSlot, ParticipantState, reserve_ai_id};

impl GameServer {
    /// Handles one packet that already passed screening.
    pub(super) fn process_packet(&mut self, a: u8, packet: RawPacket, now: Instant) {
        let message = match NetMessage::decode(&packet) {
            Ok(message) => message,
            Err(e) => {
                self.message(format!("Player {} sent invalid message: {e}", self.name_of(a)));
                return;
            }
        };
        let playback = self.playback.is_some();
        let index = a as usize;

        match message {
            NetMessage::KeyFrame { frame } => {
                let player = &mut self.players[index];
                if frame <= self.frame && frame > player.last_frame_response {
                    player.last_frame_response = frame;
                }
            }
            NetMessage::Pause { paused, .. } => self.handle_pause(a, paused),
            NetMessage::UserSpeed { speed, .. } => {
                let p = &self.players[index];
                if !playback && p.spectator && !p.is_local {
                    self.private_message(a, "Spectators cannot change game speed");
                } else {
                    self.user_speed_change(speed, a);
                }
            }
            NetMessage::CpuUsage { usage } => self.players[index].cpu_usage = usage,
            NetMessage::Quit { .. } => {
                self.message(format!("{} left the game: normal quit", self.describe(a)));
                self.drop_player(a, LeaveReason::Quit, "User exited", now);
            }
            NetMessage::PlayerName { name, .. } => {
                let player = &mut self.players[index];
                player.name = name.clone();
                player.state = ParticipantState::InGame;
                self.broadcast_message(&NetMessage::PlayerInfo {
                    player: a,
                    cpu_usage: 0.0,
                    ping: 0,
                });
                self.message(format!(
                    "{} finished loading and is now ingame",
                    self.describe(a)
                ));
                self.broadcast(packet);
                self.pending_events
                    .push_back(ServerEvent::PlayerJoined { player: a, name });
            }
            NetMessage::Chat(chat) => {
                if self.players[index].muted_chat || chat.text.is_empty() {
                    return;
                }
                self.broadcast(packet);
            }
            NetMessage::StartPos {
                team, ready, pos, ..
            } => self.handle_start_pos(a, team, ready, pos, packet),
            NetMessage::SyncResponse {
                frame, checksum, ..
            } => {
                self.sync.record(a, frame, checksum);
                let player = &mut self.players[index];
                if frame <= self.frame && frame > player.last_frame_response {
                    player.last_frame_response = frame;
                }
            }
            NetMessage::PathChecksum { .. }
            | NetMessage::SystemMsg { .. }
            | NetMessage::PlayerStat { .. }
            | NetMessage::LogMsg { .. } => self.broadcast(packet),
            NetMessage::Command { .. }
            | NetMessage::Select { .. }
            | NetMessage::LuaMsg { .. }
            | NetMessage::Share { .. }
            | NetMessage::SetShare { .. }
            | NetMessage::DcUpdate { .. }
            | NetMessage::ClientData { .. } => {
                if !playback {
                    self.broadcast(packet);
                }
            }
            NetMessage::AiCommand { .. }
            | NetMessage::AiCommands { .. }
            | NetMessage::AiShare { .. } => {
                if self.no_helper_ais {
                    self.message(format!(
                        "Player {} is using AIs, which are not allowed",
                        self.name_of(a)
                    ));
                } else if !playback {
                    self.broadcast(packet);
                }
            }
            NetMessage::MapDraw { .. } => {
                let p = &self.players[index];
                if p.muted_draw {
                    return;
                }
                if !p.spectator || self.allow_spec_draw {
                    self.broadcast(packet);
                }
            }
            NetMessage::DirectControl { .. } => {
                if self.players[index].spectator {
                    self.message(format!(
                        "Error: spectator {} tried direct-controlling a unit",
                        self.name_of(a)
                    ));
                } else if !playback {
                    self.broadcast(packet);
                }
            }
            NetMessage::StartPlaying { .. } => {
                if self.players[index].is_local && !self.started {
                    self.check_for_game_start(now, true);
                }
            }
            NetMessage::Team { action, .. } => self.handle_team(a, action),
            NetMessage::AiCreated { team, name, .. } => self.handle_ai_created(a, team, name),
            NetMessage::AiStateChanged { ai, state, .. } => {
                self.handle_ai_state(a, ai, state, packet)
            }
            NetMessage::Alliance {
                ally_team, allied, ..
            } => {
                let own = self
                    .teams
                    .get(self.players[index].team as usize)
                    .map(|t| t.ally_team);
                if own == Some(ally_team) {
                    self.message(format!(
                        "Player {} tried to send spoofed alliance message",
                        self.name_of(a)
                    ));
                } else if !self.setup.fixed_allies {
                    self.broadcast_message(&NetMessage::Alliance {
                        player: a,
                        ally_team,
                        allied,
                    });
                }
            }
            NetMessage::CCommand { command, extra } => self.handle_ccommand(a, command, extra),
            NetMessage::GameOver {
                winning_ally_teams, ..
            } => {
                log::info!(
                    "{} reported game over, winners: {winning_ally_teams:?}",
                    self.describe(a)
                );
                self.broadcast(packet);
                self.game_over(winning_ally_teams);
            }
            other => log::debug!("ignoring {:?} from player {a}", other.kind()),
        }
    }

    fn handle_pause(&mut self, a: u8, paused: bool) {
        let playback = self.playback.is_some();
        if !paused {
            self.sync.reset_error_frame();
        }
        let p = &self.players[a as usize];
        if !self.pausable && !p.is_local {
            self.private_message(a, "Pausing is disabled");
            return;
        }
        if !playback && p.spectator && !p.is_local {
            self.private_message(a, "Spectators cannot pause the game");
            return;
        }
        if !self.paused
            && !p.is_local
            && self.speed.vote_rejected(
                p.cpu_usage,
                self.frame - p.last_frame_response,
                p.spectator,
            )
        {
            self.private_message(a, "Pausing rejected (cpu load or ping is too high)");
            return;
        }
        if paused == self.paused {
            return;
        }
        self.set_paused(paused);
        if playback {
            let verb = if paused { "paused" } else { "unpaused" };
            self.message(format!("{} {verb} the demo", self.name_of(a)));
        } else {
            self.broadcast_message(&NetMessage::Pause { player: a, paused });
        }
    }

    fn handle_start_pos(
        &mut self,
        a: u8,
        team: u8,
        ready: u8,
        pos: glam::Vec3,
        packet: RawPacket,
    ) {
        if self.setup.start_pos_type != StartPosType::ChooseInGame {
            self.message(format!(
                "Player {} sent a start position although start positions are fixed",
                self.name_of(a)
            ));
            return;
        }
        if team as usize >= self.teams.len() {
            self.message(format!(
                "Invalid teamID {team} in start position from player {a}"
            ));
            return;
        }
        let p = &self.players[a as usize];
        let own_ai_team = self
            .ais
            .values()
            .any(|ai| ai.team == team && ai.host_player == a);
        if !own_ai_team && (team != p.team || p.spectator) {
            self.message(format!(
                "Player {} sent spoofed start position for team {team}",
                self.name_of(a)
            ));
            return;
        }
        self.teams[team as usize].start_pos = pos;
        if ready == 1 {
            self.players[a as usize].ready_to_start = true;
        }
        self.broadcast(packet);
    }

    fn handle_team(&mut self, a: u8, action: TeamAction) {
        let index = a as usize;
        let single_player = self.players.len() <= 1;
        let own_team = self.players[index].team;
        match action {
            TeamAction::GiveAway { to_team, from_team } => {
                if to_team as usize >= self.teams.len() || from_team as usize >= self.teams.len() {
                    self.message(format!(
                        "Invalid team in give-away from player {a}"
                    ));
                    return;
                }
                let humans = self.humans_in_team(from_team);
                let all_ais: Vec<u8> = self.ais_in_team(from_team, None);
                let my_ais: Vec<u8> = self.ais_in_team(from_team, Some(a));
                let is_own = from_team == own_team;
                let is_leader = self.teams[from_team as usize].leader == Some(a);
                let allied = self.teams[from_team as usize].ally_team
                    == self.teams.get(own_team as usize).map_or(u8::MAX, |t| t.ally_team);
                let spectator = self.players[index].spectator;
                if !single_player
                    && (spectator
                        || (!is_own && !is_leader)
                        || (!my_ais.is_empty() && !allied && !self.cheating))
                {
                    self.message(format!("{} sent invalid team giveaway", self.describe(a)));
                    return;
                }
                self.broadcast_message(&NetMessage::Team {
                    player: a,
                    action: TeamAction::GiveAway { to_team, from_team },
                });

                let given = if is_own {
                    self.players[index].spectator = true;
                    true
                } else if humans == 0 {
                    if let Some(first) = my_ais.first() {
                        self.ais.remove(first);
                        self.players[index].ais.remove(first);
                    }
                    true
                } else {
                    self.message(format!(
                        "{} can not give away stuff of team {from_team} (still has human players left)",
                        self.describe(a)
                    ));
                    false
                };
                if given && humans + all_ais.len() == 1 {
                    let team = &mut self.teams[from_team as usize];
                    team.active = false;
                    team.leader = None;
                    let receiver = self.teams[to_team as usize]
                        .leader
                        .map_or_else(|| "uncontrolled".to_string(), |l| self.name_of(l));
                    self.message(format!(
                        "{} gave everything to {receiver}",
                        self.name_of(a)
                    ));
                }
            }
            TeamAction::Resign => {
                if self.players[index].spectator && !single_player {
                    self.message(format!(
                        "Spectator {} sent invalid team resign",
                        self.name_of(a)
                    ));
                    return;
                }
                self.resign_player(a);
            }
            TeamAction::JoinTeam { team } => {
                if team as usize >= self.teams.len() || !(single_player || self.cheating) {
                    self.message(format!(
                        "Player {} sent an invalid team change request",
                        self.name_of(a)
                    ));
                    return;
                }
                self.broadcast_message(&NetMessage::Team {
                    player: a,
                    action: TeamAction::JoinTeam { team },
                });
                let player = &mut self.players[index];
                player.team = team;
                player.spectator = false;
                let state = &mut self.teams[team as usize];
                state.active = true;
                if state.leader.is_none() {
                    state.leader = Some(a);
                }
            }
            TeamAction::TeamDied { team } => {
                // with a local host only the host reports deaths
                let hosted = self.players.iter().any(|p| p.is_local);
                let sender = &self.players[index];
                if (hosted && !sender.is_local) || (!hosted && sender.desynced) {
                    return;
                }
                if team as usize >= self.teams.len() {
                    self.message(format!(
                        "Invalid teamID {team} in team death from player {a}"
                    ));
                    return;
                }
                let state = &mut self.teams[team as usize];
                state.active = false;
                state.leader = None;
                let defeated: Vec<usize> = self
                    .players
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.team == team && !p.spectator)
                    .map(|(i, _)| i)
                    .collect();
                for p in defeated {
                    self.players[p].spectator = true;
                    self.broadcast_message(&NetMessage::Team {
                        player: a,
                        action: TeamAction::TeamDied { team },
                    });
                }
            }
        }
    }

    fn humans_in_team(&self, team: u8) -> usize {
        self.players
            .iter()
            .filter(|p| p.team == team && !p.spectator)
            .count()
    }

    fn ais_in_team(&self, team: u8, host: Option<u8>) -> Vec<u8> {
        self.ais
            .iter()
            .filter(|(_, ai)| ai.team == team && host.is_none_or(|h| ai.host_player == h))
            .map(|(id, _)| *id)
            .collect()
    }

    fn handle_ai_created(&mut self, a: u8, team: u8, name: String) {
        let Some(ai_team) = self.teams.get(team as usize) else {
            self.message(format!(
                "Invalid teamID {team} in AI creation from player {a}"
            ));
            return;
        };
        let own_ally = self
            .teams
            .get(self.players[a as usize].team as usize)
            .map(|t| t.ally_team);
        let leader = ai_team.leader == Some(a);
        let allied = own_ally == Some(ai_team.ally_team);
        let single_player = self.players.len() <= 1;
        let no_leader = ai_team.leader.is_none();
        if !(leader || single_player || (allied && (self.cheating || no_leader))) {
            self.message(format!(
                "Player {} ({a}) is not allowed to create an AI in team {team}",
                self.name_of(a)
            ));
            return;
        }
        let Some(id) = reserve_ai_id(self.ais.keys().copied()) else {
            self.message("Unable to create AI, limit reached");
            return;
        };
        self.players[a as usize].ais.insert(id);
        self.broadcast_message(&NetMessage::AiCreated {
            player: a,
            ai: id,
            team,
            name: name.clone(),
        });
        self.ais.insert(
            id,
            AiSlot {
                name,
                team,
                host_player: a,
                state: AiState::Constructed,
            },
        );
        let state = &mut self.teams[team as usize];
        if state.leader.is_none() {
            state.leader = Some(a);
            state.active = true;
        }
    }

    fn handle_ai_state(&mut self, a: u8, ai: u8, state: AiState, packet: RawPacket) {
        let Some(slot) = self.ais.get(&ai) else {
            self.message(format!(
                "Player {} ({a}) tried to change the state of unknown AI {ai}",
                self.name_of(a)
            ));
            return;
        };
        let ai_team = slot.team;
        let old_state = slot.state;
        let host = slot.host_player == a;
        let team = &self.teams[ai_team as usize];
        let leader = team.leader == Some(a);
        let allied = self
            .teams
            .get(self.players[a as usize].team as usize)
            .is_some_and(|t| t.ally_team == team.ally_team);
        let single_player = self.players.len() <= 1;
        if !(host || leader || single_player || (allied && self.cheating)) {
            self.message(format!(
                "Player {} ({a}) is not allowed to change the state of AI {ai} in team {ai_team}",
                self.name_of(a)
            ));
            return;
        }
        let controllers = self.humans_in_team(ai_team) + self.ais_in_team(ai_team, None).len();
        self.broadcast(packet);

        if let Some(slot) = self.ais.get_mut(&ai) {
            slot.state = state;
        }
        if state == AiState::Dead && old_state != AiState::Reloading {
            self.ais.remove(&ai);
            self.players[a as usize].ais.remove(&ai);
            if controllers == 1 {
                let team = &mut self.teams[ai_team as usize];
                team.active = false;
                team.leader = None;
            }
        }
    }

    fn handle_ccommand(&mut self, a: u8, command: String, extra: String) {
        let blacklisted = self.config.command_blacklist.iter().any(|c| *c == command);
        if !blacklisted {
            self.broadcast_message(&NetMessage::CCommand { command, extra });
            return;
        }
        if !self.players[a as usize].is_local {
            self.private_message(
                a,
                format!("Server command {command} is not allowed for remote players"),
            );
            return;
        }
        match AdminCommand::parse(&command, &extra) {
            Some(admin) => {
                log::info!("{} runs /{command} {extra}", self.describe(a));
                self.execute(admin);
            }
            None => self.private_message(a, format!("Unknown server command {command}")),
        }
    }
}
