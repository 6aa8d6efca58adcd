use bitflags::bitflags;

pub const CMD_STOP: i32 = 0;
pub const CMD_INSERT: i32 = 1;
pub const CMD_REMOVE: i32 = 2;
pub const CMD_WAIT: i32 = 5;
pub const CMD_TIMEWAIT: i32 = 6;
pub const CMD_DEATHWAIT: i32 = 7;
pub const CMD_SQUADWAIT: i32 = 8;
pub const CMD_GATHERWAIT: i32 = 9;
pub const CMD_MOVE: i32 = 10;
pub const CMD_PATROL: i32 = 15;
pub const CMD_FIGHT: i32 = 16;
pub const CMD_ATTACK: i32 = 20;
pub const CMD_AREA_ATTACK: i32 = 21;
pub const CMD_GUARD: i32 = 25;
pub const CMD_AISELECT: i32 = 30;
pub const CMD_GROUPSELECT: i32 = 35;
pub const CMD_GROUPADD: i32 = 36;
pub const CMD_GROUPCLEAR: i32 = 37;
pub const CMD_REPAIR: i32 = 40;
pub const CMD_FIRE_STATE: i32 = 45;
pub const CMD_MOVE_STATE: i32 = 50;
pub const CMD_SETBASE: i32 = 55;
pub const CMD_INTERNAL: i32 = 60;
pub const CMD_SELFD: i32 = 65;
pub const CMD_SET_WANTED_MAX_SPEED: i32 = 70;
pub const CMD_LOAD_UNITS: i32 = 75;
pub const CMD_LOAD_ONTO: i32 = 76;
pub const CMD_UNLOAD_UNITS: i32 = 80;
pub const CMD_UNLOAD_UNIT: i32 = 81;
pub const CMD_ONOFF: i32 = 85;
pub const CMD_RECLAIM: i32 = 90;
pub const CMD_CLOAK: i32 = 95;
pub const CMD_STOCKPILE: i32 = 100;
pub const CMD_MANUALFIRE: i32 = 105;
pub const CMD_RESTORE: i32 = 110;
pub const CMD_REPEAT: i32 = 115;
pub const CMD_TRAJECTORY: i32 = 120;
pub const CMD_RESURRECT: i32 = 125;
pub const CMD_CAPTURE: i32 = 130;
pub const CMD_AUTOREPAIRLEVEL: i32 = 135;
pub const CMD_IDLEMODE: i32 = 145;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommandOptions: u8 {
        const META = 1 << 2;
        const INTERNAL_ORDER = 1 << 3;
        const RIGHT_MOUSE = 1 << 4;
        const SHIFT = 1 << 5;
        const CONTROL = 1 << 6;
        const ALT = 1 << 7;
    }
}

/// One order for a unit or group. Only `id`, `options` and `params` travel
/// on the wire; `timeout` and `tag` are local bookkeeping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Command {
    pub id: i32,
    pub options: CommandOptions,
    pub params: Vec<f32>,
    pub timeout: Option<i32>,
    pub tag: Option<i32>,
}

impl Command {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_options(id: i32, options: CommandOptions) -> Self {
        Self {
            id,
            options,
            ..Default::default()
        }
    }

    /// Build order for the given unit type.
    pub fn build(unit_def_id: i32) -> Self {
        Self::new(-unit_def_id)
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = f32>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_timeout(mut self, frame: i32) -> Self {
        self.timeout = Some(frame);
        self
    }

    pub fn with_tag(mut self, tag: i32) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn push_param(&mut self, param: f32) {
        self.params.push(param);
    }

    pub fn param(&self, index: usize) -> Option<f32> {
        self.params.get(index).copied()
    }

    pub fn is_build(&self) -> bool {
        self.id < 0
    }

    pub fn build_target(&self) -> Option<i32> {
        self.is_build().then(|| -self.id)
    }

    pub fn is_queued(&self) -> bool {
        self.options.contains(CommandOptions::SHIFT)
    }

    pub fn has_expired(&self, frame: i32) -> bool {
        self.timeout.is_some_and(|limit| frame > limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_orders_are_negated_unit_types() {
        let cmd = Command::build(42).with_params([10.0, 0.0, 20.0]);
        assert!(cmd.is_build());
        assert_eq!(cmd.build_target(), Some(42));
        assert_eq!(Command::new(CMD_MOVE).build_target(), None);
    }

    #[test]
    fn option_bits_match_wire_values() {
        assert_eq!(CommandOptions::SHIFT.bits(), 32);
        assert_eq!(CommandOptions::ALT.bits(), 128);
        let opts = CommandOptions::from_bits_retain(32 | 64 | 1);
        assert!(Command::with_options(CMD_STOP, opts).is_queued());
        assert_eq!(opts.bits(), 97);
    }

    #[test]
    fn timeout_is_optional() {
        let cmd = Command::new(CMD_WAIT).with_timeout(300);
        assert!(!cmd.has_expired(300));
        assert!(cmd.has_expired(301));
        assert!(!Command::new(CMD_WAIT).has_expired(i32::MAX));
    }
}
