use strata::GameSetup;
use strata::net::{ChatParty, NetMessage, TeamAction};

/// Ping value the server reports while a player is still loading.
pub const PING_LOADING: u32 = u32::MAX;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterEntry {
    pub name: String,
    pub team: u8,
    pub spectator: bool,
    /// Frames behind the server, as last reported.
    pub ping: u32,
    pub cpu_usage: f32,
    /// Connected and done loading.
    pub active: bool,
    pub loading: bool,
}

/// The client's view of every player in the game, keyed by player number.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: Vec<Option<RosterEntry>>,
    team_allies: Vec<u8>,
}

impl Roster {
    pub fn from_setup(setup: &GameSetup) -> Self {
        let players = setup
            .players
            .iter()
            .map(|p| {
                Some(RosterEntry {
                    name: p.name.clone(),
                    team: p.team,
                    spectator: p.spectator,
                    ..Default::default()
                })
            })
            .collect();
        Self {
            players,
            team_allies: setup.teams.iter().map(|t| t.ally_team).collect(),
        }
    }

    pub fn get(&self, player: u8) -> Option<&RosterEntry> {
        self.players.get(player as usize)?.as_ref()
    }

    pub fn len(&self) -> usize {
        self.players.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &RosterEntry)> {
        self.players
            .iter()
            .enumerate()
            .filter_map(|(i, p)| Some((i as u8, p.as_ref()?)))
    }

    pub fn ally_team(&self, team: u8) -> Option<u8> {
        self.team_allies.get(team as usize).copied()
    }

    /// What chat filtering needs about `player`, if known.
    pub fn chat_party(&self, player: u8) -> Option<ChatParty> {
        let entry = self.get(player)?;
        Some(ChatParty {
            player,
            ally_team: self.ally_team(entry.team).unwrap_or(entry.team),
            spectator: entry.spectator,
            full_view: false,
        })
    }

    /// Entry for `player`, created when the number is new. Numbers may
    /// arrive out of order, so gaps are filled with empty slots.
    fn entry(&mut self, player: u8) -> &mut RosterEntry {
        let index = player as usize;
        if index >= self.players.len() {
            self.players.resize(index + 1, None);
        }
        self.players[index].get_or_insert_with(RosterEntry::default)
    }

    /// Applies a roster-relevant message. Returns `true` when it was one.
    pub fn apply(&mut self, message: &NetMessage) -> bool {
        match message {
            NetMessage::PlayerName { player, name } => {
                let entry = self.entry(*player);
                entry.name = name.clone();
                entry.active = true;
            }
            NetMessage::CreateNewPlayer {
                player,
                spectator,
                team,
                name,
            } => {
                let entry = self.entry(*player);
                entry.name = name.clone();
                entry.team = *team;
                entry.spectator = *spectator;
                entry.active = false;
            }
            NetMessage::PlayerInfo {
                player,
                cpu_usage,
                ping,
            } => {
                let entry = self.entry(*player);
                entry.cpu_usage = *cpu_usage;
                entry.loading = *ping == PING_LOADING;
                if !entry.loading {
                    entry.ping = *ping;
                }
            }
            NetMessage::PlayerLeft { player, .. } => {
                if let Some(Some(entry)) = self.players.get_mut(*player as usize) {
                    entry.active = false;
                }
            }
            NetMessage::Team { player, action } => match *action {
                TeamAction::JoinTeam { team } => {
                    let entry = self.entry(*player);
                    entry.team = team;
                    entry.spectator = false;
                }
                TeamAction::Resign => self.entry(*player).spectator = true,
                TeamAction::GiveAway { from_team, .. } => {
                    let entry = self.entry(*player);
                    if entry.team == from_team && !entry.spectator {
                        entry.spectator = true;
                    }
                }
                TeamAction::TeamDied { team } => {
                    for entry in self.players.iter_mut().flatten() {
                        if entry.team == team {
                            entry.spectator = true;
                        }
                    }
                }
            },
            _ => return false,
        }
        true
    }
}
