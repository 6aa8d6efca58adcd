//! Adapter between [`Command`] and the frozen topic numbering of legacy AI
//! plugins. Plugins address unit orders by topic, with one parameter block per
//! topic; the numbers below must never change.

use glam::Vec3;

use crate::command::*;

pub mod topic {
    pub const BUILD: i32 = 35;
    pub const STOP: i32 = 36;
    pub const WAIT: i32 = 37;
    pub const WAIT_TIME: i32 = 38;
    pub const WAIT_DEATH: i32 = 39;
    pub const WAIT_SQUAD: i32 = 40;
    pub const WAIT_GATHER: i32 = 41;
    pub const MOVE: i32 = 42;
    pub const PATROL: i32 = 43;
    pub const FIGHT: i32 = 44;
    pub const ATTACK: i32 = 45;
    pub const ATTACK_AREA: i32 = 46;
    pub const GUARD: i32 = 47;
    pub const AI_SELECT: i32 = 48;
    pub const GROUP_ADD: i32 = 49;
    pub const GROUP_CLEAR: i32 = 50;
    pub const REPAIR: i32 = 51;
    pub const SET_FIRE_STATE: i32 = 52;
    pub const SET_MOVE_STATE: i32 = 53;
    pub const SET_BASE: i32 = 54;
    pub const SELF_DESTROY: i32 = 55;
    pub const SET_WANTED_MAX_SPEED: i32 = 56;
    pub const LOAD_UNITS: i32 = 57;
    pub const LOAD_UNITS_AREA: i32 = 58;
    pub const LOAD_ONTO: i32 = 59;
    pub const UNLOAD_UNITS_AREA: i32 = 60;
    pub const UNLOAD_UNIT: i32 = 61;
    pub const SET_ON_OFF: i32 = 62;
    pub const RECLAIM: i32 = 63;
    pub const RECLAIM_AREA: i32 = 64;
    pub const CLOAK: i32 = 65;
    pub const STOCKPILE: i32 = 66;
    pub const D_GUN: i32 = 67;
    pub const D_GUN_POS: i32 = 68;
    pub const RESTORE_AREA: i32 = 69;
    pub const SET_REPEAT: i32 = 70;
    pub const SET_TRAJECTORY: i32 = 71;
    pub const RESURRECT: i32 = 72;
    pub const RESURRECT_AREA: i32 = 73;
    pub const CAPTURE: i32 = 74;
    pub const CAPTURE_AREA: i32 = 75;
    pub const SET_AUTO_REPAIR_LEVEL: i32 = 76;
    pub const SET_IDLE_MODE: i32 = 77;
    pub const CUSTOM: i32 = 78;
}

/// Facing value meaning "let the engine pick".
pub const BUILD_NO_FACING: i32 = -1;

const NO_BUILD_POS: Vec3 = Vec3::splat(-1.0);

/// Legacy topic a plugin sees for `command`.
pub fn topic_for(command: &Command) -> i32 {
    let n = command.params.len();
    match command.id {
        CMD_STOP => topic::STOP,
        CMD_WAIT => topic::WAIT,
        CMD_TIMEWAIT => topic::WAIT_TIME,
        CMD_DEATHWAIT => topic::WAIT_DEATH,
        CMD_SQUADWAIT => topic::WAIT_SQUAD,
        CMD_GATHERWAIT => topic::WAIT_GATHER,
        CMD_MOVE => topic::MOVE,
        CMD_PATROL => topic::PATROL,
        CMD_FIGHT => topic::FIGHT,
        CMD_ATTACK if n >= 3 => topic::ATTACK_AREA,
        CMD_ATTACK => topic::ATTACK,
        CMD_GUARD => topic::GUARD,
        CMD_AISELECT => topic::AI_SELECT,
        CMD_GROUPADD => topic::GROUP_ADD,
        CMD_GROUPCLEAR => topic::GROUP_CLEAR,
        CMD_REPAIR => topic::REPAIR,
        CMD_FIRE_STATE => topic::SET_FIRE_STATE,
        CMD_MOVE_STATE => topic::SET_MOVE_STATE,
        CMD_SETBASE => topic::SET_BASE,
        CMD_SELFD => topic::SELF_DESTROY,
        CMD_SET_WANTED_MAX_SPEED => topic::SET_WANTED_MAX_SPEED,
        CMD_LOAD_UNITS if n >= 3 => topic::LOAD_UNITS_AREA,
        CMD_LOAD_UNITS => topic::LOAD_UNITS,
        CMD_LOAD_ONTO => topic::LOAD_ONTO,
        CMD_UNLOAD_UNITS => topic::UNLOAD_UNITS_AREA,
        CMD_UNLOAD_UNIT => topic::UNLOAD_UNIT,
        CMD_ONOFF => topic::SET_ON_OFF,
        CMD_RECLAIM if n < 3 || n == 5 => topic::RECLAIM,
        CMD_RECLAIM => topic::RECLAIM_AREA,
        CMD_CLOAK => topic::CLOAK,
        CMD_STOCKPILE => topic::STOCKPILE,
        CMD_MANUALFIRE if n >= 3 => topic::D_GUN_POS,
        CMD_MANUALFIRE => topic::D_GUN,
        CMD_RESTORE => topic::RESTORE_AREA,
        CMD_REPEAT => topic::SET_REPEAT,
        CMD_TRAJECTORY => topic::SET_TRAJECTORY,
        CMD_RESURRECT if n >= 3 => topic::RESURRECT_AREA,
        CMD_RESURRECT => topic::RESURRECT,
        CMD_CAPTURE if n < 3 || n == 5 => topic::CAPTURE,
        CMD_CAPTURE => topic::CAPTURE_AREA,
        CMD_AUTOREPAIRLEVEL => topic::SET_AUTO_REPAIR_LEVEL,
        CMD_IDLEMODE => topic::SET_IDLE_MODE,
        id if id < 0 => topic::BUILD,
        _ => topic::CUSTOM,
    }
}

/// Command id for a topic whose id does not depend on its parameters.
/// BUILD and CUSTOM carry their id in the parameter block, so they and unknown
/// topics yield `None`.
pub fn internal_id_for(topic: i32) -> Option<i32> {
    let id = match topic {
        topic::STOP => CMD_STOP,
        topic::WAIT => CMD_WAIT,
        topic::WAIT_TIME => CMD_TIMEWAIT,
        topic::WAIT_DEATH => CMD_DEATHWAIT,
        topic::WAIT_SQUAD => CMD_SQUADWAIT,
        topic::WAIT_GATHER => CMD_GATHERWAIT,
        topic::MOVE => CMD_MOVE,
        topic::PATROL => CMD_PATROL,
        topic::FIGHT => CMD_FIGHT,
        topic::ATTACK | topic::ATTACK_AREA => CMD_ATTACK,
        topic::GUARD => CMD_GUARD,
        topic::AI_SELECT => CMD_AISELECT,
        topic::GROUP_ADD => CMD_GROUPADD,
        topic::GROUP_CLEAR => CMD_GROUPCLEAR,
        topic::REPAIR => CMD_REPAIR,
        topic::SET_FIRE_STATE => CMD_FIRE_STATE,
        topic::SET_MOVE_STATE => CMD_MOVE_STATE,
        topic::SET_BASE => CMD_SETBASE,
        topic::SELF_DESTROY => CMD_SELFD,
        topic::SET_WANTED_MAX_SPEED => CMD_SET_WANTED_MAX_SPEED,
        topic::LOAD_UNITS | topic::LOAD_UNITS_AREA => CMD_LOAD_UNITS,
        topic::LOAD_ONTO => CMD_LOAD_ONTO,
        topic::UNLOAD_UNITS_AREA => CMD_UNLOAD_UNITS,
        topic::UNLOAD_UNIT => CMD_UNLOAD_UNIT,
        topic::SET_ON_OFF => CMD_ONOFF,
        topic::RECLAIM | topic::RECLAIM_AREA => CMD_RECLAIM,
        topic::CLOAK => CMD_CLOAK,
        topic::STOCKPILE => CMD_STOCKPILE,
        topic::D_GUN | topic::D_GUN_POS => CMD_MANUALFIRE,
        topic::RESTORE_AREA => CMD_RESTORE,
        topic::SET_REPEAT => CMD_REPEAT,
        topic::SET_TRAJECTORY => CMD_TRAJECTORY,
        topic::RESURRECT | topic::RESURRECT_AREA => CMD_RESURRECT,
        topic::CAPTURE | topic::CAPTURE_AREA => CMD_CAPTURE,
        topic::SET_AUTO_REPAIR_LEVEL => CMD_AUTOREPAIRLEVEL,
        topic::SET_IDLE_MODE => CMD_IDLEMODE,
        _ => return None,
    };
    Some(id)
}

/// A unit order in the shape a legacy plugin hands it over.
#[derive(Debug, Clone, PartialEq)]
pub enum AiUnitCommand {
    Build {
        unit_def: i32,
        pos: Option<Vec3>,
        facing: Option<i32>,
    },
    Stop,
    Wait,
    WaitTime {
        time: f32,
    },
    WaitDeath {
        unit: i32,
    },
    WaitSquad {
        units: i32,
    },
    WaitGather,
    Move {
        to: Vec3,
    },
    Patrol {
        to: Vec3,
    },
    Fight {
        to: Vec3,
    },
    Attack {
        target: i32,
    },
    AttackArea {
        pos: Vec3,
        radius: f32,
    },
    Guard {
        unit: i32,
    },
    AiSelect,
    GroupAdd {
        group: i32,
    },
    GroupClear,
    Repair {
        unit: i32,
    },
    SetFireState {
        state: i32,
    },
    SetMoveState {
        state: i32,
    },
    SetBase {
        pos: Vec3,
    },
    SelfDestroy,
    SetWantedMaxSpeed {
        speed: f32,
    },
    LoadUnits {
        units: Vec<i32>,
    },
    LoadUnitsArea {
        pos: Vec3,
        radius: f32,
    },
    LoadOnto {
        transporter: i32,
    },
    UnloadUnitsArea {
        pos: Vec3,
        radius: f32,
    },
    UnloadUnit {
        pos: Vec3,
        unit: i32,
    },
    SetOnOff {
        on: bool,
    },
    Reclaim {
        target: i32,
    },
    ReclaimArea {
        pos: Vec3,
        radius: f32,
    },
    Cloak {
        cloak: bool,
    },
    Stockpile,
    DGun {
        target: i32,
    },
    DGunPos {
        pos: Vec3,
    },
    RestoreArea {
        pos: Vec3,
        radius: f32,
    },
    SetRepeat {
        repeat: bool,
    },
    SetTrajectory {
        trajectory: i32,
    },
    Resurrect {
        feature: i32,
    },
    ResurrectArea {
        pos: Vec3,
        radius: f32,
    },
    Capture {
        unit: i32,
    },
    CaptureArea {
        pos: Vec3,
        radius: f32,
    },
    SetAutoRepairLevel {
        level: i32,
    },
    SetIdleMode {
        mode: i32,
    },
    Custom {
        id: i32,
        params: Vec<f32>,
    },
}

fn flag(on: bool) -> f32 {
    if on { 1.0 } else { 0.0 }
}

fn area(pos: Vec3, radius: f32) -> [f32; 4] {
    [pos.x, pos.y, pos.z, radius]
}

impl AiUnitCommand {
    pub fn topic(&self) -> i32 {
        use AiUnitCommand::*;
        match self {
            Build { .. } => topic::BUILD,
            Stop => topic::STOP,
            Wait => topic::WAIT,
            WaitTime { .. } => topic::WAIT_TIME,
            WaitDeath { .. } => topic::WAIT_DEATH,
            WaitSquad { .. } => topic::WAIT_SQUAD,
            WaitGather => topic::WAIT_GATHER,
            Move { .. } => topic::MOVE,
            Patrol { .. } => topic::PATROL,
            Fight { .. } => topic::FIGHT,
            Attack { .. } => topic::ATTACK,
            AttackArea { .. } => topic::ATTACK_AREA,
            Guard { .. } => topic::GUARD,
            AiSelect => topic::AI_SELECT,
            GroupAdd { .. } => topic::GROUP_ADD,
            GroupClear => topic::GROUP_CLEAR,
            Repair { .. } => topic::REPAIR,
            SetFireState { .. } => topic::SET_FIRE_STATE,
            SetMoveState { .. } => topic::SET_MOVE_STATE,
            SetBase { .. } => topic::SET_BASE,
            SelfDestroy => topic::SELF_DESTROY,
            SetWantedMaxSpeed { .. } => topic::SET_WANTED_MAX_SPEED,
            LoadUnits { .. } => topic::LOAD_UNITS,
            LoadUnitsArea { .. } => topic::LOAD_UNITS_AREA,
            LoadOnto { .. } => topic::LOAD_ONTO,
            UnloadUnitsArea { .. } => topic::UNLOAD_UNITS_AREA,
            UnloadUnit { .. } => topic::UNLOAD_UNIT,
            SetOnOff { .. } => topic::SET_ON_OFF,
            Reclaim { .. } => topic::RECLAIM,
            ReclaimArea { .. } => topic::RECLAIM_AREA,
            Cloak { .. } => topic::CLOAK,
            Stockpile => topic::STOCKPILE,
            DGun { .. } => topic::D_GUN,
            DGunPos { .. } => topic::D_GUN_POS,
            RestoreArea { .. } => topic::RESTORE_AREA,
            SetRepeat { .. } => topic::SET_REPEAT,
            SetTrajectory { .. } => topic::SET_TRAJECTORY,
            Resurrect { .. } => topic::RESURRECT,
            ResurrectArea { .. } => topic::RESURRECT_AREA,
            Capture { .. } => topic::CAPTURE,
            CaptureArea { .. } => topic::CAPTURE_AREA,
            SetAutoRepairLevel { .. } => topic::SET_AUTO_REPAIR_LEVEL,
            SetIdleMode { .. } => topic::SET_IDLE_MODE,
            Custom { .. } => topic::CUSTOM,
        }
    }

    /// Engine command id this order becomes.
    pub fn command_id(&self) -> i32 {
        match self {
            AiUnitCommand::Build { unit_def, .. } => -unit_def,
            AiUnitCommand::Custom { id, .. } => *id,
            other => internal_id_for(other.topic()).unwrap_or(-1),
        }
    }

    pub fn into_command(self, options: CommandOptions, timeout: Option<i32>) -> Command {
        use AiUnitCommand::*;
        let mut command = Command::with_options(self.command_id(), options);
        command.timeout = timeout;
        let params: Vec<f32> = match self {
            Build { pos, facing, .. } => {
                let mut params = Vec::new();
                if let Some(pos) = pos.filter(|p| *p != NO_BUILD_POS) {
                    params.extend(pos.to_array());
                }
                if let Some(facing) = facing.filter(|f| *f != BUILD_NO_FACING) {
                    params.push(facing as f32);
                }
                params
            }
            Stop | Wait | WaitGather | AiSelect | GroupClear | SelfDestroy | Stockpile => {
                Vec::new()
            }
            WaitTime { time } => vec![time],
            WaitSquad { units } => vec![units as f32],
            SetWantedMaxSpeed { speed } => vec![speed],
            WaitDeath { unit: id }
            | Attack { target: id }
            | Guard { unit: id }
            | GroupAdd { group: id }
            | Repair { unit: id }
            | LoadOnto { transporter: id }
            | Reclaim { target: id }
            | DGun { target: id }
            | Resurrect { feature: id }
            | Capture { unit: id }
            | SetFireState { state: id }
            | SetMoveState { state: id }
            | SetTrajectory { trajectory: id }
            | SetAutoRepairLevel { level: id }
            | SetIdleMode { mode: id } => vec![id as f32],
            Move { to: pos }
            | Patrol { to: pos }
            | Fight { to: pos }
            | SetBase { pos }
            | DGunPos { pos } => pos.to_array().to_vec(),
            AttackArea { pos, radius }
            | LoadUnitsArea { pos, radius }
            | UnloadUnitsArea { pos, radius }
            | ReclaimArea { pos, radius }
            | RestoreArea { pos, radius }
            | ResurrectArea { pos, radius }
            | CaptureArea { pos, radius } => area(pos, radius).to_vec(),
            UnloadUnit { pos, unit } => vec![pos.x, pos.y, pos.z, unit as f32],
            LoadUnits { units } => units.into_iter().map(|u| u as f32).collect(),
            SetOnOff { on: value } | Cloak { cloak: value } | SetRepeat { repeat: value } => {
                vec![flag(value)]
            }
            Custom { params, .. } => params,
        };
        command.params = params;
        command
    }

    /// Typed form of `command`, or `None` when its parameters are too short
    /// for the topic it maps to.
    pub fn from_command(command: &Command) -> Option<Self> {
        use AiUnitCommand::*;
        let p = command.params.as_slice();
        let id = |i: usize| p.get(i).map(|v| *v as i32);
        let pos = || match p {
            [x, y, z, ..] => Some(Vec3::new(*x, *y, *z)),
            _ => None,
        };
        let radius = || p.get(3).copied();

        let typed = match topic_for(command) {
            topic::BUILD => Build {
                unit_def: -command.id,
                pos: pos(),
                facing: id(3),
            },
            topic::STOP => Stop,
            topic::WAIT => Wait,
            topic::WAIT_TIME => WaitTime { time: *p.first()? },
            topic::WAIT_DEATH => WaitDeath { unit: id(0)? },
            topic::WAIT_SQUAD => WaitSquad { units: id(0)? },
            topic::WAIT_GATHER => WaitGather,
            topic::MOVE => Move { to: pos()? },
            topic::PATROL => Patrol { to: pos()? },
            topic::FIGHT => Fight { to: pos()? },
            topic::ATTACK => Attack { target: id(0)? },
            topic::ATTACK_AREA => AttackArea {
                pos: pos()?,
                radius: radius().unwrap_or(0.0),
            },
            topic::GUARD => Guard { unit: id(0)? },
            topic::AI_SELECT => AiSelect,
            topic::GROUP_ADD => GroupAdd { group: id(0)? },
            topic::GROUP_CLEAR => GroupClear,
            topic::REPAIR => Repair { unit: id(0)? },
            topic::SET_FIRE_STATE => SetFireState { state: id(0)? },
            topic::SET_MOVE_STATE => SetMoveState { state: id(0)? },
            topic::SET_BASE => SetBase { pos: pos()? },
            topic::SELF_DESTROY => SelfDestroy,
            topic::SET_WANTED_MAX_SPEED => SetWantedMaxSpeed { speed: *p.first()? },
            topic::LOAD_UNITS => LoadUnits {
                units: p.iter().map(|v| *v as i32).collect(),
            },
            topic::LOAD_UNITS_AREA => LoadUnitsArea {
                pos: pos()?,
                radius: radius().unwrap_or(0.0),
            },
            topic::LOAD_ONTO => LoadOnto {
                transporter: id(0)?,
            },
            topic::UNLOAD_UNITS_AREA => UnloadUnitsArea {
                pos: pos()?,
                radius: radius().unwrap_or(0.0),
            },
            topic::UNLOAD_UNIT => UnloadUnit {
                pos: pos()?,
                unit: id(3)?,
            },
            topic::SET_ON_OFF => SetOnOff { on: *p.first()? != 0.0 },
            topic::RECLAIM => Reclaim { target: id(0)? },
            topic::RECLAIM_AREA => ReclaimArea {
                pos: pos()?,
                radius: radius().unwrap_or(0.0),
            },
            topic::CLOAK => Cloak {
                cloak: *p.first()? != 0.0,
            },
            topic::STOCKPILE => Stockpile,
            topic::D_GUN => DGun { target: id(0)? },
            topic::D_GUN_POS => DGunPos { pos: pos()? },
            topic::RESTORE_AREA => RestoreArea {
                pos: pos()?,
                radius: radius().unwrap_or(0.0),
            },
            topic::SET_REPEAT => SetRepeat {
                repeat: *p.first()? != 0.0,
            },
            topic::SET_TRAJECTORY => SetTrajectory {
                trajectory: id(0)?,
            },
            topic::RESURRECT => Resurrect { feature: id(0)? },
            topic::RESURRECT_AREA => ResurrectArea {
                pos: pos()?,
                radius: radius().unwrap_or(0.0),
            },
            topic::CAPTURE => Capture { unit: id(0)? },
            topic::CAPTURE_AREA => CaptureArea {
                pos: pos()?,
                radius: radius().unwrap_or(0.0),
            },
            topic::SET_AUTO_REPAIR_LEVEL => SetAutoRepairLevel { level: id(0)? },
            topic::SET_IDLE_MODE => SetIdleMode { mode: id(0)? },
            _ => Custom {
                id: command.id,
                params: p.to_vec(),
            },
        };
        Some(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(id: i32, params: &[f32]) -> Command {
        Command::new(id).with_params(params.iter().copied())
    }

    #[test]
    fn param_count_picks_area_form() {
        assert_eq!(topic_for(&cmd(CMD_ATTACK, &[12.0])), topic::ATTACK);
        assert_eq!(
            topic_for(&cmd(CMD_ATTACK, &[1.0, 2.0, 3.0, 50.0])),
            topic::ATTACK_AREA
        );
        assert_eq!(topic_for(&cmd(CMD_MANUALFIRE, &[1.0, 2.0, 3.0])), topic::D_GUN_POS);
        assert_eq!(topic_for(&cmd(CMD_LOAD_UNITS, &[4.0, 5.0])), topic::LOAD_UNITS);
        assert_eq!(
            topic_for(&cmd(CMD_RESURRECT, &[0.0, 0.0, 0.0, 9.0])),
            topic::RESURRECT_AREA
        );
    }

    #[test]
    fn reclaim_with_five_params_targets_one_object() {
        assert_eq!(topic_for(&cmd(CMD_RECLAIM, &[3.0])), topic::RECLAIM);
        assert_eq!(
            topic_for(&cmd(CMD_RECLAIM, &[1.0, 2.0, 3.0, 4.0, 5.0])),
            topic::RECLAIM
        );
        assert_eq!(
            topic_for(&cmd(CMD_RECLAIM, &[1.0, 2.0, 3.0, 4.0])),
            topic::RECLAIM_AREA
        );
        assert_eq!(
            topic_for(&cmd(CMD_CAPTURE, &[1.0, 2.0, 3.0, 4.0])),
            topic::CAPTURE_AREA
        );
    }

    #[test]
    fn builds_customs_and_cloak() {
        assert_eq!(topic_for(&Command::build(7)), topic::BUILD);
        assert_eq!(topic_for(&cmd(31_337, &[])), topic::CUSTOM);
        assert_eq!(topic_for(&cmd(CMD_CLOAK, &[1.0])), topic::CLOAK);
        assert_eq!(topic_for(&cmd(CMD_UNLOAD_UNITS, &[])), topic::UNLOAD_UNITS_AREA);
    }

    #[test]
    fn internal_ids_fold_area_variants() {
        assert_eq!(internal_id_for(topic::ATTACK_AREA), Some(CMD_ATTACK));
        assert_eq!(internal_id_for(topic::D_GUN_POS), Some(CMD_MANUALFIRE));
        assert_eq!(internal_id_for(topic::CLOAK), Some(CMD_CLOAK));
        assert_eq!(internal_id_for(topic::BUILD), None);
        assert_eq!(internal_id_for(topic::CUSTOM), None);
        assert_eq!(internal_id_for(12), None);
    }

    #[test]
    fn build_without_position_has_no_params() {
        let order = AiUnitCommand::Build {
            unit_def: 40,
            pos: Some(NO_BUILD_POS),
            facing: Some(BUILD_NO_FACING),
        };
        let command = order.into_command(CommandOptions::SHIFT, None);
        assert_eq!(command.id, -40);
        assert!(command.params.is_empty());
        assert!(command.is_queued());

        let placed = AiUnitCommand::Build {
            unit_def: 40,
            pos: Some(Vec3::new(8.0, 0.0, 16.0)),
            facing: Some(2),
        }
        .into_command(CommandOptions::empty(), Some(900));
        assert_eq!(placed.params, vec![8.0, 0.0, 16.0, 2.0]);
        assert_eq!(placed.timeout, Some(900));
    }

    #[test]
    fn typed_orders_survive_conversion() {
        let orders = [
            AiUnitCommand::Move {
                to: Vec3::new(1.0, 2.0, 3.0),
            },
            AiUnitCommand::Attack { target: 77 },
            AiUnitCommand::ReclaimArea {
                pos: Vec3::ZERO,
                radius: 120.0,
            },
            AiUnitCommand::UnloadUnit {
                pos: Vec3::new(5.0, 0.0, 5.0),
                unit: 12,
            },
            AiUnitCommand::Cloak { cloak: true },
            AiUnitCommand::Custom {
                id: 40_000,
                params: vec![0.5],
            },
        ];
        for order in orders {
            let command = order.clone().into_command(CommandOptions::empty(), None);
            assert_eq!(topic_for(&command), order.topic());
            assert_eq!(AiUnitCommand::from_command(&command), Some(order));
        }
    }

    #[test]
    fn short_params_are_rejected() {
        assert_eq!(AiUnitCommand::from_command(&cmd(CMD_MOVE, &[1.0])), None);
        assert_eq!(AiUnitCommand::from_command(&cmd(CMD_GUARD, &[])), None);
    }
}
