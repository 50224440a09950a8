//! Device status register
//!
//! Holds the single process-wide device phase and guards every change with the
//! transition graph. Readers never block; writers check and apply inside one
//! critical section so racing callers are serialized.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};
use log::{info, warn};

/// Operational phase of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DevicePhase {
    // Boot
    Starting = 0,

    // Network association
    Joining = 1,
    Disconnected = 2,

    // Waiting for a control connection
    Idle = 3,

    // Control session active
    OffAir = 4,
    OnAir = 5,

    // Terminal failure indicator
    Error = 6,
}

impl DevicePhase {
    /// Every phase, in declaration order
    pub const ALL: [DevicePhase; 7] = [
        DevicePhase::Starting,
        DevicePhase::Joining,
        DevicePhase::Disconnected,
        DevicePhase::Idle,
        DevicePhase::OffAir,
        DevicePhase::OnAir,
        DevicePhase::Error,
    ];

    /// Whether `self -> to` is an edge of the transition graph
    pub const fn can_transition_to(self, to: DevicePhase) -> bool {
        use DevicePhase::*;

        match (self, to) {
            // Entering Error always succeeds, including from Error itself
            (_, Error) => true,

            (Starting, Joining) => true,

            (Joining, Disconnected | Idle) => true,

            (Disconnected, Joining) => true,

            // Link loss is reported from every connected phase
            (Idle, OffAir | Disconnected) => true,
            (OffAir, OnAir | Idle | Disconnected) => true,
            (OnAir, OffAir | Idle | Disconnected) => true,

            _ => false,
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => DevicePhase::Starting,
            1 => DevicePhase::Joining,
            2 => DevicePhase::Disconnected,
            3 => DevicePhase::Idle,
            4 => DevicePhase::OffAir,
            5 => DevicePhase::OnAir,
            // Only ever written through `as u8` of a valid phase
            _ => DevicePhase::Error,
        }
    }
}

/// Rejected phase change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: DevicePhase,
    pub to: DevicePhase,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid transition {:?} -> {:?}", self.from, self.to)
    }
}

/// Shared, graph-validated device phase
pub struct StatusRegister {
    phase: AtomicU8,
}

impl StatusRegister {
    /// Create a register in the `Starting` phase
    pub const fn new() -> Self {
        Self {
            phase: AtomicU8::new(DevicePhase::Starting as u8),
        }
    }

    /// Current phase. Never blocks; the value may change right after.
    pub fn read(&self) -> DevicePhase {
        DevicePhase::from_raw(self.phase.load(Ordering::Acquire))
    }

    /// Move to `to` if the graph allows it, returning the phase that was left.
    ///
    /// The check and the store happen in one critical section, so when several
    /// callers race away from the same phase exactly one of them wins.
    pub fn transition(&self, to: DevicePhase) -> Result<DevicePhase, InvalidTransition> {
        let result = critical_section::with(|_| {
            let from = self.read();
            if from.can_transition_to(to) {
                self.phase.store(to as u8, Ordering::Release);
                Ok(from)
            } else {
                Err(InvalidTransition { from, to })
            }
        });

        match result {
            Ok(from) if from != to => info!("[STATUS] {:?} -> {:?}", from, to),
            Ok(_) => {}
            Err(e) => warn!("[STATUS] Rejected {}", e),
        }

        result
    }

    /// Move from exactly `from` to `to`.
    ///
    /// Fails without side effect if the current phase is not `from` (reported
    /// with the actual phase) or if the edge is not in the graph.
    pub fn transition_from(&self, from: DevicePhase, to: DevicePhase) -> Result<(), InvalidTransition> {
        let result = critical_section::with(|_| {
            let current = self.read();
            if current == from && current.can_transition_to(to) {
                self.phase.store(to as u8, Ordering::Release);
                Ok(())
            } else {
                Err(InvalidTransition { from: current, to })
            }
        });

        match result {
            Ok(()) => info!("[STATUS] {:?} -> {:?}", from, to),
            Err(e) => warn!("[STATUS] Rejected {} (expected {:?})", e, from),
        }

        result
    }

    /// Force the `Error` phase. Always succeeds.
    pub fn fail(&self) -> DevicePhase {
        let from = critical_section::with(|_| {
            let from = self.read();
            self.phase.store(DevicePhase::Error as u8, Ordering::Release);
            from
        });

        if from != DevicePhase::Error {
            warn!("[STATUS] {:?} -> Error", from);
        }

        from
    }
}

impl Default for StatusRegister {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DevicePhase::*;

    const EDGES: &[(DevicePhase, DevicePhase)] = &[
        (Starting, Joining),
        (Joining, Disconnected),
        (Joining, Idle),
        (Disconnected, Joining),
        (Idle, OffAir),
        (Idle, Disconnected),
        (OffAir, OnAir),
        (OffAir, Idle),
        (OffAir, Disconnected),
        (OnAir, OffAir),
        (OnAir, Idle),
        (OnAir, Disconnected),
    ];

    /// Drive a fresh register into `phase` along legal edges
    fn register_in(phase: DevicePhase) -> StatusRegister {
        let register = StatusRegister::new();
        let path: &[DevicePhase] = match phase {
            Starting => &[],
            Joining => &[Joining],
            Disconnected => &[Joining, Disconnected],
            Idle => &[Joining, Idle],
            OffAir => &[Joining, Idle, OffAir],
            OnAir => &[Joining, Idle, OffAir, OnAir],
            Error => &[Error],
        };
        for &step in path {
            register.transition(step).unwrap();
        }
        assert_eq!(register.read(), phase);
        register
    }

    #[test]
    fn starts_in_starting() {
        assert_eq!(StatusRegister::new().read(), Starting);
    }

    #[test]
    fn boot_to_broadcast_walk() {
        let register = StatusRegister::new();
        assert_eq!(register.transition(Joining), Ok(Starting));
        assert_eq!(register.transition(Disconnected), Ok(Joining));
        assert_eq!(register.transition(Joining), Ok(Disconnected));
        assert_eq!(register.transition(Idle), Ok(Joining));
        assert_eq!(register.transition(OffAir), Ok(Idle));
        assert_eq!(register.transition(OnAir), Ok(OffAir));
        assert_eq!(register.transition(OffAir), Ok(OnAir));
        assert_eq!(register.transition(Idle), Ok(OffAir));
        assert_eq!(register.read(), Idle);
    }

    #[test]
    fn graph_edges_are_accepted() {
        for &(from, to) in EDGES {
            let register = register_in(from);
            assert_eq!(register.transition(to), Ok(from), "{:?} -> {:?}", from, to);
            assert_eq!(register.read(), to);
        }
    }

    #[test]
    fn every_other_pair_is_rejected_without_side_effect() {
        for from in DevicePhase::ALL {
            for to in DevicePhase::ALL {
                if to == Error || EDGES.contains(&(from, to)) {
                    continue;
                }
                let register = register_in(from);
                assert_eq!(
                    register.transition(to),
                    Err(InvalidTransition { from, to }),
                    "{:?} -> {:?}",
                    from,
                    to
                );
                assert_eq!(register.read(), from);
            }
        }
    }

    #[test]
    fn error_is_reachable_from_every_phase() {
        for from in DevicePhase::ALL {
            let register = register_in(from);
            assert_eq!(register.transition(Error), Ok(from));
            assert_eq!(register.read(), Error);

            let register = register_in(from);
            assert_eq!(register.fail(), from);
            assert_eq!(register.read(), Error);
        }
    }

    #[test]
    fn error_is_terminal() {
        let register = register_in(Error);
        for to in DevicePhase::ALL {
            if to != Error {
                assert!(register.transition(to).is_err());
            }
        }
        assert_eq!(register.read(), Error);
    }

    #[test]
    fn racing_callers_have_exactly_one_winner() {
        for _ in 0..50 {
            let register = register_in(Idle);
            let wins = std::thread::scope(|scope| {
                let handles: std::vec::Vec<_> = (0..8)
                    .map(|_| scope.spawn(|| register.transition(OffAir)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap())
                    .filter(|r| match r {
                        Ok(from) => {
                            assert_eq!(*from, Idle);
                            true
                        }
                        Err(e) => {
                            assert_eq!(*e, InvalidTransition { from: OffAir, to: OffAir });
                            false
                        }
                    })
                    .count()
            });
            assert_eq!(wins, 1);
            assert_eq!(register.read(), OffAir);
        }
    }

    #[test]
    fn transition_from_requires_the_expected_phase() {
        let register = register_in(OnAir);
        assert_eq!(
            register.transition_from(Idle, OffAir),
            Err(InvalidTransition { from: OnAir, to: OffAir })
        );
        assert_eq!(register.read(), OnAir);

        assert_eq!(register.transition_from(OnAir, Idle), Ok(()));
        assert_eq!(register.read(), Idle);

        assert_eq!(
            register.transition_from(Idle, OnAir),
            Err(InvalidTransition { from: Idle, to: OnAir })
        );
        assert_eq!(register.read(), Idle);
    }

    #[test]
    fn racing_mixed_targets_end_on_a_requested_phase() {
        for _ in 0..50 {
            let register = register_in(Joining);
            let targets = [Idle, Disconnected, Idle, Disconnected, Idle, Disconnected];
            std::thread::scope(|scope| {
                for &to in &targets {
                    let register = &register;
                    scope.spawn(move || {
                        let _ = register.transition(to);
                    });
                }
            });
            let last = register.read();
            assert!(targets.contains(&last), "unexpected final phase {:?}", last);
        }
    }
}
