use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Allows at most one operation in flight at a time.
///
/// Clones share the same gate. Prefer [`SingleFlight::try_acquire`], whose
/// permit releases the gate on drop; `try_enter`/`exit` are for callers that
/// manage the lifetime themselves.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate. Returns `false` if something is already in flight.
    pub fn try_enter(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the gate. Releasing an idle gate is a no-op.
    pub fn exit(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the gate for the lifetime of the returned permit.
    pub fn try_acquire(&self) -> Option<SingleFlightPermit> {
        if self.try_enter() {
            Some(SingleFlightPermit { gate: self.clone() })
        } else {
            None
        }
    }
}

/// Holds a [`SingleFlight`] gate; dropping it releases the gate.
#[derive(Debug)]
#[must_use = "the gate is released as soon as the permit is dropped"]
pub struct SingleFlightPermit {
    gate: SingleFlight,
}

impl Drop for SingleFlightPermit {
    fn drop(&mut self) {
        self.gate.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_enter_is_rejected() {
        let gate = SingleFlight::new();
        assert!(gate.try_enter());
        assert!(!gate.try_enter());
        gate.exit();
        assert!(gate.try_enter());
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let gate = SingleFlight::new();
        {
            let _permit = gate.try_acquire().expect("gate should be free");
            assert!(gate.is_busy());
            assert!(gate.try_acquire().is_none());
        }
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_clones_share_state() {
        let gate = SingleFlight::new();
        let other = gate.clone();
        let _permit = gate.try_acquire().unwrap();
        assert!(!other.try_enter());
    }

    #[test]
    fn test_exit_on_idle_gate_is_noop() {
        let gate = SingleFlight::new();
        gate.exit();
        assert!(!gate.is_busy());
    }
}
