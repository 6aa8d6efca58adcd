//! Bookkeeping for SYNCRESPONSE checksums.
//!
//! Every generated frame is outstanding until all linked players answered it
//! or it fell behind the timeout. Verdicts are advisory: the server reports
//! desyncs, it never stops the game over them.

use std::collections::{BTreeMap, BTreeSet};

/// What the ledger needs to know about a linked player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPeer {
    pub player: u8,
    pub is_local: bool,
    /// Demo playback or an active player; spectator desyncs are reported
    /// privately instead.
    pub grouped: bool,
    /// Replayed demo slots never answer and are not waited for.
    pub is_from_demo: bool,
    pub last_frame_response: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncWarning {
    NoResponse {
        frame: i32,
        players: Vec<u8>,
    },
    Desync {
        frame: i32,
        correct: u32,
        /// Wrong checksum and the players that sent it.
        groups: Vec<(u32, Vec<u8>)>,
    },
    SpectatorDesync {
        frame: i32,
        player: u8,
        checksum: u32,
        correct: u32,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub desynced: BTreeSet<u8>,
    pub in_sync: BTreeSet<u8>,
    pub warnings: Vec<SyncWarning>,
}

#[derive(Debug, Clone)]
pub struct SyncLedger {
    outstanding: BTreeSet<i32>,
    responses: BTreeMap<i32, BTreeMap<u8, u32>>,
    warning_frame: i32,
    error_frame: i32,
    timeout: i32,
    msg_timeout: i32,
}

impl SyncLedger {
    pub fn new(timeout: i32, msg_timeout: i32) -> Self {
        Self {
            outstanding: BTreeSet::new(),
            responses: BTreeMap::new(),
            warning_frame: 0,
            error_frame: 0,
            timeout,
            msg_timeout,
        }
    }

    pub fn push_frame(&mut self, frame: i32) {
        self.outstanding.insert(frame);
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Stores a response. Answers for frames nobody waits for are ignored.
    pub fn record(&mut self, player: u8, frame: i32, checksum: u32) -> bool {
        if !self.outstanding.contains(&frame) {
            return false;
        }
        self.responses
            .entry(frame)
            .or_default()
            .insert(player, checksum);
        true
    }

    /// An unpause starts a fresh round of desync messages.
    pub fn reset_error_frame(&mut self) {
        self.error_frame = 0;
    }

    pub fn check(&mut self, server_frame: i32, peers: &[SyncPeer]) -> SyncReport {
        let mut report = SyncReport::default();
        let frames: Vec<i32> = self.outstanding.iter().copied().collect();
        let local = peers.iter().find(|p| p.is_local).map(|p| p.player);

        for frame in frames {
            let empty = BTreeMap::new();
            let answers = self.responses.get(&frame).unwrap_or(&empty);
            let correct = match local {
                Some(local) => answers.get(&local).copied(),
                None => majority(peers.iter().filter_map(|p| answers.get(&p.player).copied())),
            };

            let mut complete = true;
            let mut no_response = Vec::new();
            let mut groups: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
            let mut spectators = Vec::new();

            for peer in peers {
                match answers.get(&peer.player) {
                    None if frame >= server_frame - self.timeout => complete = false,
                    None => {
                        if frame < peer.last_frame_response && !peer.is_from_demo {
                            no_response.push(peer.player);
                        }
                    }
                    Some(&checksum) => match correct {
                        Some(correct) if checksum != correct => {
                            report.in_sync.remove(&peer.player);
                            report.desynced.insert(peer.player);
                            if peer.grouped {
                                groups.entry(checksum).or_default().push(peer.player);
                            } else {
                                spectators.push((peer.player, checksum));
                            }
                        }
                        Some(_) => {
                            report.desynced.remove(&peer.player);
                            report.in_sync.insert(peer.player);
                        }
                        None => {}
                    },
                }
            }

            if !no_response.is_empty()
                && (self.warning_frame == 0 || frame - self.warning_frame > self.msg_timeout)
            {
                self.warning_frame = frame;
                report.warnings.push(SyncWarning::NoResponse {
                    frame,
                    players: no_response,
                });
            }

            if let Some(correct) = correct
                && (!groups.is_empty() || !spectators.is_empty())
                && (self.error_frame == 0 || frame - self.error_frame > self.msg_timeout)
            {
                self.error_frame = frame;
                if !groups.is_empty() {
                    report.warnings.push(SyncWarning::Desync {
                        frame,
                        correct,
                        groups: groups.into_iter().collect(),
                    });
                }
                for (player, checksum) in spectators {
                    report.warnings.push(SyncWarning::SpectatorDesync {
                        frame,
                        player,
                        checksum,
                        correct,
                    });
                }
            }

            if complete {
                self.outstanding.remove(&frame);
                self.responses.remove(&frame);
            }
        }
        report
    }
}

/// Most common value; the first one seen wins a tie.
fn majority(values: impl Iterator<Item = u32>) -> Option<u32> {
    let mut counts: Vec<(u32, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    let best = counts.iter().map(|(_, n)| *n).max()?;
    counts.into_iter().find(|(_, n)| *n == best).map(|(v, _)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(player: u8) -> SyncPeer {
        SyncPeer {
            player,
            is_local: false,
            grouped: true,
            is_from_demo: false,
            last_frame_response: 0,
        }
    }

    #[test]
    fn majority_breaks_ties_by_first_seen() {
        assert_eq!(majority([5, 7, 7, 5].into_iter()), Some(5));
        assert_eq!(majority([1, 2, 2].into_iter()), Some(2));
        assert_eq!(majority(std::iter::empty()), None);
    }

    #[test]
    fn odd_one_out_is_flagged_and_frame_completes() {
        let mut ledger = SyncLedger::new(300, 400);
        ledger.push_frame(10);
        ledger.record(0, 10, 0xaa);
        ledger.record(1, 10, 0xaa);
        ledger.record(2, 10, 0xbb);

        let report = ledger.check(12, &[peer(0), peer(1), peer(2)]);
        assert_eq!(report.desynced, BTreeSet::from([2]));
        assert_eq!(report.in_sync, BTreeSet::from([0, 1]));
        assert_eq!(
            report.warnings,
            vec![SyncWarning::Desync {
                frame: 10,
                correct: 0xaa,
                groups: vec![(0xbb, vec![2])],
            }]
        );
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn local_client_is_the_authority() {
        let mut ledger = SyncLedger::new(300, 400);
        ledger.push_frame(3);
        ledger.record(0, 3, 1);
        ledger.record(1, 3, 1);
        ledger.record(2, 3, 9);
        let host = SyncPeer {
            is_local: true,
            ..peer(2)
        };

        let report = ledger.check(5, &[peer(0), peer(1), host]);
        assert_eq!(report.desynced, BTreeSet::from([0, 1]));
    }

    #[test]
    fn no_verdict_without_local_answer() {
        let mut ledger = SyncLedger::new(300, 400);
        ledger.push_frame(3);
        ledger.record(0, 3, 1);
        ledger.record(1, 3, 2);
        let host = SyncPeer {
            is_local: true,
            ..peer(5)
        };

        let report = ledger.check(5, &[peer(0), peer(1), host]);
        assert!(report.desynced.is_empty());
        assert!(report.warnings.is_empty());
        // still waiting for the host
        assert_eq!(ledger.outstanding(), 1);
    }

    #[test]
    fn missing_answer_past_timeout_is_reported_once() {
        let mut ledger = SyncLedger::new(10, 400);
        for frame in 1..=3 {
            ledger.push_frame(frame);
            ledger.record(0, frame, 7);
        }
        let slow = SyncPeer {
            last_frame_response: 50,
            ..peer(1)
        };

        let report = ledger.check(100, &[peer(0), slow]);
        assert_eq!(
            report.warnings,
            vec![SyncWarning::NoResponse {
                frame: 1,
                players: vec![1],
            }]
        );
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn answers_for_unknown_frames_are_dropped() {
        let mut ledger = SyncLedger::new(300, 400);
        ledger.push_frame(1);
        assert!(!ledger.record(0, 2, 1));
        assert!(ledger.record(0, 1, 1));
    }

    #[test]
    fn desync_messages_are_rate_limited() {
        let mut ledger = SyncLedger::new(300, 400);
        let peers = [peer(0), peer(1), peer(2)];
        let mut warnings = 0;
        for frame in 1..=100 {
            ledger.push_frame(frame);
            ledger.record(0, frame, 1);
            ledger.record(1, frame, 1);
            ledger.record(2, frame, 2);
            warnings += ledger.check(frame, &peers).warnings.len();
        }
        assert_eq!(warnings, 1);

        ledger.reset_error_frame();
        ledger.push_frame(101);
        ledger.record(0, 101, 1);
        ledger.record(1, 101, 1);
        ledger.record(2, 101, 2);
        assert_eq!(ledger.check(101, &peers).warnings.len(), 1);
    }
}
