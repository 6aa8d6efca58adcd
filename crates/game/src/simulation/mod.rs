mod clock;

use std::collections::{BTreeMap, HashMap, VecDeque};

use glam::Vec3;

use crate::command::{CMD_MOVE, CMD_STOP, Command};

pub use clock::{ClientPacer, LocalLag, ServerPacer};

/// The deterministic game state a lockstep client drives. Every participant
/// feeds it the same calls in the same order, and compares the checksums
/// returned by [`Simulation::step`].
pub trait Simulation {
    /// Orders the player's current selection.
    fn apply(&mut self, player: u8, command: &Command);

    fn select(&mut self, player: u8, units: &[i16]);

    /// Orders explicit units, as AI commands do.
    fn command_units(&mut self, player: u8, units: &[i16], command: &Command);

    /// Advances one frame and returns the checksum of the resulting state.
    fn step(&mut self) -> u32;

    fn frame(&self) -> i32;
}

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;
const UNITS_PER_TEAM: u16 = 4;
const UNIT_SPEED: f32 = 2.0;
const MAX_UNITS: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Fnv1a(u32);

impl Fnv1a {
    fn new() -> Self {
        Self(FNV_OFFSET)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 ^= u32::from(byte);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    fn write_vec3(&mut self, v: Vec3) {
        for component in v.to_array() {
            self.write(&component.to_bits().to_le_bytes());
        }
    }
}

#[derive(Debug, Clone)]
struct Unit {
    team: u8,
    position: Vec3,
    orders: VecDeque<Vec3>,
}

/// Toy world used by tests and the headless client: a few units per team
/// that walk toward MOVE targets.
#[derive(Debug, Clone)]
pub struct ChecksumSimulation {
    frame: i32,
    rng: u32,
    units: BTreeMap<i16, Unit>,
    selections: HashMap<u8, Vec<i16>>,
    next_unit: i16,
}

impl ChecksumSimulation {
    pub fn new(seed: u32, teams: u8) -> Self {
        let mut sim = Self {
            frame: 0,
            rng: seed.max(1),
            units: BTreeMap::new(),
            selections: HashMap::new(),
            next_unit: 0,
        };
        for team in 0..teams {
            for _ in 0..UNITS_PER_TEAM {
                let position = Vec3::new(sim.next_coord(), 0.0, sim.next_coord());
                sim.spawn(team, position);
            }
        }
        sim
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn position(&self, unit: i16) -> Option<Vec3> {
        self.units.get(&unit).map(|u| u.position)
    }

    pub fn checksum(&self) -> u32 {
        let mut hash = Fnv1a::new();
        hash.write(&self.frame.to_le_bytes());
        hash.write(&self.rng.to_le_bytes());
        for (id, unit) in &self.units {
            hash.write(&id.to_le_bytes());
            hash.write(&[unit.team]);
            hash.write_vec3(unit.position);
            hash.write(&(unit.orders.len() as u32).to_le_bytes());
            for target in &unit.orders {
                hash.write_vec3(*target);
            }
        }
        hash.0
    }

    fn next_random(&mut self) -> u32 {
        // xorshift32
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        x
    }

    fn next_coord(&mut self) -> f32 {
        (self.next_random() % 4096) as f32
    }

    fn spawn(&mut self, team: u8, position: Vec3) -> Option<i16> {
        if self.units.len() >= MAX_UNITS || self.next_unit == i16::MAX {
            return None;
        }
        let id = self.next_unit;
        self.next_unit += 1;
        self.units.insert(
            id,
            Unit {
                team,
                position,
                orders: VecDeque::new(),
            },
        );
        Some(id)
    }

    fn order_unit(&mut self, unit: i16, command: &Command) {
        if command.is_build() {
            let Some(team) = self.units.get(&unit).map(|u| u.team) else {
                return;
            };
            let position = match command.params.as_slice() {
                [x, y, z, ..] => Vec3::new(*x, *y, *z),
                _ => return,
            };
            self.spawn(team, position);
            return;
        }

        let Some(target) = self.units.get_mut(&unit) else {
            return;
        };
        match command.id {
            CMD_STOP => target.orders.clear(),
            CMD_MOVE => {
                let [x, y, z, ..] = command.params.as_slice() else {
                    return;
                };
                if !command.is_queued() {
                    target.orders.clear();
                }
                target.orders.push_back(Vec3::new(*x, *y, *z));
            }
            _ => {}
        }
    }
}

impl Simulation for ChecksumSimulation {
    fn apply(&mut self, player: u8, command: &Command) {
        let selected = self.selections.get(&player).cloned().unwrap_or_default();
        for unit in selected {
            self.order_unit(unit, command);
        }
    }

    fn select(&mut self, player: u8, units: &[i16]) {
        let known = units
            .iter()
            .copied()
            .filter(|id| self.units.contains_key(id))
            .collect();
        self.selections.insert(player, known);
    }

    fn command_units(&mut self, _player: u8, units: &[i16], command: &Command) {
        for &unit in units {
            self.order_unit(unit, command);
        }
    }

    fn step(&mut self) -> u32 {
        self.frame += 1;
        self.next_random();
        for unit in self.units.values_mut() {
            let Some(&target) = unit.orders.front() else {
                continue;
            };
            let offset = target - unit.position;
            if offset.length() <= UNIT_SPEED {
                unit.position = target;
                unit.orders.pop_front();
            } else {
                unit.position += offset.normalize() * UNIT_SPEED;
            }
        }
        self.checksum()
    }

    fn frame(&self) -> i32 {
        self.frame
    }
}
