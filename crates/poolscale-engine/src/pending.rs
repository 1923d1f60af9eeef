//! Per-kind pending action slot.
//!
//! ```text
//! Idle ──begin(target)──▶ Pending { target }
//!   ▲                          │
//!   └── reconcile (resolved) ──┘
//! ```
//!
//! A failed request never leaves `Idle`, so there is no transition for it.

use std::time::{Duration, Instant};

use poolscale_core::WorkerId;

/// The in-flight state of one action kind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PendingAction {
    #[default]
    Idle,
    Pending {
        /// Worker the request was issued for.
        target: WorkerId,
        /// When the request was accepted by the gateway.
        since: Instant,
    },
}

/// Result of checking a pending slot against a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Nothing was pending.
    Idle,
    /// The snapshot confirmed completion; the slot is idle again.
    Resolved(WorkerId),
    /// Still waiting on the snapshot to reflect the request.
    StillPending { target: WorkerId, age: Duration },
}

impl PendingAction {
    pub fn is_pending(&self) -> bool {
        matches!(self, PendingAction::Pending { .. })
    }

    /// The in-flight target, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            PendingAction::Idle => None,
            PendingAction::Pending { target, .. } => Some(target),
        }
    }

    /// How long the current action has been in flight.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        match self {
            PendingAction::Idle => None,
            PendingAction::Pending { since, .. } => Some(now.saturating_duration_since(*since)),
        }
    }

    /// Record an accepted request. Only valid from `Idle`.
    pub fn begin(&mut self, target: WorkerId, now: Instant) {
        debug_assert!(!self.is_pending(), "begin() on a slot that is already pending");
        *self = PendingAction::Pending { target, since: now };
    }

    /// Check the pending target with `is_resolved`; clear the slot if it
    /// reports completion.
    pub fn reconcile(
        &mut self,
        is_resolved: impl FnOnce(&str) -> bool,
        now: Instant,
    ) -> Reconciliation {
        let PendingAction::Pending { target, since } = self else {
            return Reconciliation::Idle;
        };

        if !is_resolved(target.as_str()) {
            return Reconciliation::StillPending {
                target: target.clone(),
                age: now.saturating_duration_since(*since),
            };
        }

        let target = std::mem::take(target);
        *self = PendingAction::Idle;
        Reconciliation::Resolved(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_slot_reconciles_to_idle() {
        let mut slot = PendingAction::default();
        assert_eq!(slot.reconcile(|_| true, Instant::now()), Reconciliation::Idle);
        assert!(!slot.is_pending());
    }

    #[test]
    fn unresolved_target_stays_pending() {
        let start = Instant::now();
        let mut slot = PendingAction::default();
        slot.begin("w-1".to_string(), start);

        let later = start + Duration::from_secs(5);
        assert_eq!(
            slot.reconcile(|_| false, later),
            Reconciliation::StillPending {
                target: "w-1".to_string(),
                age: Duration::from_secs(5),
            }
        );
        assert_eq!(slot.target(), Some("w-1"));
    }

    #[test]
    fn resolved_target_clears_slot() {
        let mut slot = PendingAction::default();
        slot.begin("w-1".to_string(), Instant::now());

        let outcome = slot.reconcile(|target| target == "w-1", Instant::now());
        assert_eq!(outcome, Reconciliation::Resolved("w-1".to_string()));
        assert_eq!(slot, PendingAction::Idle);
    }

    #[test]
    fn age_is_none_when_idle() {
        let start = Instant::now();
        let mut slot = PendingAction::default();
        assert_eq!(slot.age(start), None);

        slot.begin("w-1".to_string(), start);
        assert_eq!(slot.age(start + Duration::from_millis(10)), Some(Duration::from_millis(10)));
    }
}
