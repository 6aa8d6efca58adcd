use strata::GAME_SPEED;

/// Commands only the cheating host may relay to everyone.
const CHEAT_COMMANDS: &[&str] = &[
    "godmode",
    "globallos",
    "nocost",
    "editdefs",
    "devlua",
    "reloadcob",
    "reloadcegs",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerRef {
    Number(u8),
    /// Case-insensitive name prefix.
    Name(String),
}

impl PlayerRef {
    pub fn matches(&self, number: usize, name: &str) -> bool {
        match self {
            PlayerRef::Number(n) => *n as usize == number,
            PlayerRef::Name(prefix) => name.to_lowercase().starts_with(prefix.as_str()),
        }
    }

    fn name(extra: &str) -> Option<Self> {
        let name = extra.trim();
        (!name.is_empty()).then(|| PlayerRef::Name(name.to_lowercase()))
    }

    fn number(extra: &str) -> Option<Self> {
        extra.trim().parse().ok().map(PlayerRef::Number)
    }
}

/// Where a demo skip should end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipTarget {
    pub amount: i32,
    /// `amount` counts frames rather than seconds.
    pub frames: bool,
    pub relative: bool,
}

impl SkipTarget {
    /// `[f][+]amount`: seconds by default, frames with `f`, relative to
    /// now with `+`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut rest = text.trim();
        let frames = rest.starts_with('f');
        if frames {
            rest = &rest[1..];
        }
        let relative = rest.starts_with('+');
        if relative {
            rest = &rest[1..];
        }
        Some(Self {
            amount: rest.parse().ok()?,
            frames,
            relative,
        })
    }

    pub fn frame(&self, current: i32) -> i32 {
        let frames = if self.frames {
            self.amount
        } else {
            self.amount.saturating_mul(GAME_SPEED)
        };
        if self.relative {
            current.saturating_add(frames)
        } else {
            frames
        }
    }
}

/// Something the host (or the server console) asks the server to do.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    Kick(PlayerRef),
    Mute {
        player: PlayerRef,
        chat: bool,
        draw: bool,
    },
    Spectate(PlayerRef),
    /// `None` toggles.
    SetPausable(Option<bool>),
    NoHelperAis(Option<bool>),
    AllowSpecDraw(Option<bool>),
    Cheat(Option<bool>),
    SetMinSpeed(f32),
    SetMaxSpeed(f32),
    SetUserSpeed(f32),
    ForceStart,
    Skip(SkipTarget),
    SingleStep,
    AddUser {
        name: String,
        password: String,
        spectator: bool,
        team: u8,
    },
    Pause(bool),
    Message(String),
    /// Relayed to all clients as a CCOMMAND from the server.
    Relay {
        command: String,
        extra: String,
        needs_cheats: bool,
    },
    Quit,
}

fn bool_arg(extra: &str) -> Option<bool> {
    let extra = extra.trim();
    if extra.is_empty() {
        None
    } else {
        Some(extra.parse::<i32>().map_or(true, |v| v != 0))
    }
}

impl AdminCommand {
    /// Parses a CCOMMAND action. `None` for commands the server does not
    /// handle itself.
    pub fn parse(command: &str, extra: &str) -> Option<Self> {
        let tokens: Vec<&str> = extra.split_whitespace().collect();
        let cmd = match command {
            "kick" => AdminCommand::Kick(PlayerRef::name(extra)?),
            "kickbynum" => AdminCommand::Kick(PlayerRef::number(extra)?),
            "spec" => AdminCommand::Spectate(PlayerRef::name(extra)?),
            "specbynum" => AdminCommand::Spectate(PlayerRef::number(extra)?),
            "mute" | "mutebynum" => {
                let (first, flags) = tokens.split_first()?;
                if flags.len() > 2 {
                    return None;
                }
                let player = if command == "mute" {
                    PlayerRef::name(first)?
                } else {
                    PlayerRef::number(first)?
                };
                AdminCommand::Mute {
                    player,
                    chat: flags.first().and_then(|f| bool_arg(f)).unwrap_or(true),
                    draw: flags.get(1).and_then(|f| bool_arg(f)).unwrap_or(true),
                }
            }
            "nopause" => AdminCommand::SetPausable(bool_arg(extra)),
            "nohelp" => AdminCommand::NoHelperAis(bool_arg(extra)),
            "nospecdraw" => AdminCommand::AllowSpecDraw(bool_arg(extra).map(|v| !v)),
            "cheat" => AdminCommand::Cheat(bool_arg(extra)),
            "setminspeed" => AdminCommand::SetMinSpeed(extra.trim().parse().ok()?),
            "setmaxspeed" => AdminCommand::SetMaxSpeed(extra.trim().parse().ok()?),
            "speed" => AdminCommand::SetUserSpeed(extra.trim().parse().ok()?),
            "forcestart" => AdminCommand::ForceStart,
            "skip" => AdminCommand::Skip(SkipTarget::parse(extra)?),
            "singlestep" => AdminCommand::SingleStep,
            "adduser" => {
                let [name, password, rest @ ..] = tokens.as_slice() else {
                    return None;
                };
                AdminCommand::AddUser {
                    name: name.to_string(),
                    password: password.to_string(),
                    spectator: rest.first().is_none_or(|s| *s != "0"),
                    team: rest.get(1).and_then(|t| t.parse().ok()).unwrap_or(0),
                }
            }
            "nospectatorchat" => AdminCommand::Relay {
                command: command.to_string(),
                extra: extra.to_string(),
                needs_cheats: false,
            },
            other if CHEAT_COMMANDS.contains(&other) => AdminCommand::Relay {
                command: command.to_string(),
                extra: extra.to_string(),
                needs_cheats: true,
            },
            _ => return None,
        };
        Some(cmd)
    }
}
