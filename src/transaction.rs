//! Ambient transactions for grouped commits.
//!
//! A transactional commit records the prior value of every model slot it
//! writes. If any descendant control reports an error the transaction is
//! marked for rollback, and completion restores every recorded value —
//! all-or-nothing application of a composite edit. The transaction is
//! ambient: it lives in the dispatch context, the first transactional commit
//! starts it, nested commits join it by recording into the same log, and the
//! sequencer completes it when the message dispatch finishes. Rollback is a
//! distinguishable outcome, not a failure.

use crate::binding::{SlotRef, Value};

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// All recorded writes stand.
    Committed,
    /// Every recorded write was restored to its prior value.
    RolledBack,
}

/// An undo-log transaction over model slots.
pub struct Transaction {
    undo: Vec<(SlotRef, Value)>,
    rollback: bool,
}

impl Transaction {
    /// Start an empty transaction.
    pub fn begin() -> Self {
        Self {
            undo: Vec::new(),
            rollback: false,
        }
    }

    /// Record a slot's prior value before writing it.
    pub fn record(&mut self, slot: SlotRef, prior: Value) {
        self.undo.push((slot, prior));
    }

    /// Mark the transaction for rollback.
    pub fn mark_rollback(&mut self) {
        self.rollback = true;
    }

    /// Whether rollback has been requested.
    pub fn is_marked(&self) -> bool {
        self.rollback
    }

    /// Number of recorded writes.
    pub fn recorded(&self) -> usize {
        self.undo.len()
    }

    /// Complete: restore recorded values if marked, otherwise commit.
    pub fn complete(mut self) -> Completion {
        if self.rollback {
            // Restore in reverse write order; a slot written twice ends at
            // its oldest recorded value.
            for (slot, prior) in self.undo.drain(..).rev() {
                let _ = slot.set(prior);
            }
            Completion::RolledBack
        } else {
            Completion::Committed
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindScope, Binder, MapBinder, MapModel};

    fn slot_for(model: &MapModel, key: &str) -> SlotRef {
        MapBinder::new(model.clone())
            .bind(key, &BindScope::root())
            .unwrap()
    }

    #[test]
    fn commit_keeps_writes() {
        let model = MapModel::new();
        model.set("x", Value::Int(1));
        let slot = slot_for(&model, "x");

        let mut txn = Transaction::begin();
        txn.record(slot.clone(), slot.get());
        slot.set(Value::Int(2)).unwrap();

        assert_eq!(txn.complete(), Completion::Committed);
        assert_eq!(model.get("x"), Value::Int(2));
    }

    #[test]
    fn rollback_restores_prior_values() {
        let model = MapModel::new();
        model.set("x", Value::Int(1));
        model.set("y", Value::text("a"));
        let x = slot_for(&model, "x");
        let y = slot_for(&model, "y");

        let mut txn = Transaction::begin();
        txn.record(x.clone(), x.get());
        x.set(Value::Int(2)).unwrap();
        txn.record(y.clone(), y.get());
        y.set(Value::text("b")).unwrap();
        txn.mark_rollback();

        assert_eq!(txn.complete(), Completion::RolledBack);
        assert_eq!(model.get("x"), Value::Int(1));
        assert_eq!(model.get("y"), Value::text("a"));
    }

    #[test]
    fn double_write_rolls_back_to_oldest() {
        let model = MapModel::new();
        model.set("x", Value::Int(1));
        let slot = slot_for(&model, "x");

        let mut txn = Transaction::begin();
        txn.record(slot.clone(), slot.get());
        slot.set(Value::Int(2)).unwrap();
        txn.record(slot.clone(), slot.get());
        slot.set(Value::Int(3)).unwrap();
        txn.mark_rollback();

        assert_eq!(txn.complete(), Completion::RolledBack);
        assert_eq!(model.get("x"), Value::Int(1));
    }

    #[test]
    fn empty_rollback_is_harmless() {
        let mut txn = Transaction::begin();
        txn.mark_rollback();
        assert_eq!(txn.complete(), Completion::RolledBack);
    }

    #[test]
    fn recorded_counts_writes() {
        let model = MapModel::new();
        let slot = slot_for(&model, "x");
        let mut txn = Transaction::begin();
        assert_eq!(txn.recorded(), 0);
        txn.record(slot, Value::Null);
        assert_eq!(txn.recorded(), 1);
        assert!(!txn.is_marked());
    }
}
