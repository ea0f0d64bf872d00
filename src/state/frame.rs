//! State frames and the synchronization-status algorithm.
//!
//! A [`StateFrame`] is the opaque version token stamped into every render: the
//! session advances it exactly once per cycle, every generated callback URL
//! embeds it, and the next request's supplied token is classified against the
//! current one by [`classify`]. This is the mechanism that detects back-button
//! replays and duplicate submits before they can corrupt current state.

use std::fmt;

// ---------------------------------------------------------------------------
// StateFrame
// ---------------------------------------------------------------------------

/// An opaque, ordered render-cycle token. Copied and compared, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateFrame(u64);

impl StateFrame {
    /// The frame a fresh session starts at. Never rendered: every cycle
    /// advances before markup is emitted, so the first render embeds `F1`.
    pub fn initial() -> Self {
        Self(0)
    }

    /// The next frame in sequence.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether `self` was minted after `other`.
    pub fn newer_than(self, other: StateFrame) -> bool {
        self.0 > other.0
    }

    /// Parse the wire form (`"F3"`). `None` for anything else.
    pub fn parse(token: &str) -> Option<Self> {
        let digits = token.strip_prefix('F')?;
        digits.parse::<u64>().ok().map(Self)
    }
}

impl fmt::Display for StateFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SyncStatus
// ---------------------------------------------------------------------------

/// How an inbound request relates to the session's current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// The supplied token equals the current frame: a normal response to the
    /// last render. Queued actions are honored.
    Responsive,
    /// No token supplied: the first request of a conversation. Embedded
    /// actions are not treated as stale.
    Initiated,
    /// A token was supplied but no longer matches: back button, bookmark
    /// replay, or duplicate submit. Responsive actions are discarded and the
    /// frame advances immediately; not an error.
    OutOfSync,
}

/// Classify a request's supplied frame token against the current frame.
///
/// An unparseable token is by definition not the current frame and classifies
/// as out-of-sync, the same as any other stale token.
pub fn classify(current: StateFrame, supplied: Option<&str>) -> SyncStatus {
    match supplied {
        None => SyncStatus::Initiated,
        Some(token) => match StateFrame::parse(token) {
            Some(frame) if frame == current => SyncStatus::Responsive,
            _ => SyncStatus::OutOfSync,
        },
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_advance_strictly() {
        let f1 = StateFrame::initial();
        let f2 = f1.next();
        let f3 = f2.next();
        assert!(f2.newer_than(f1));
        assert!(f3.newer_than(f2));
        assert!(f3.newer_than(f1));
        assert!(!f1.newer_than(f1));
        assert!(!f1.newer_than(f2));
    }

    #[test]
    fn wire_form_round_trip() {
        let f = StateFrame::initial().next().next();
        assert_eq!(f.to_string(), "F2");
        assert_eq!(StateFrame::parse("F2"), Some(f));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(StateFrame::parse(""), None);
        assert_eq!(StateFrame::parse("3"), None);
        assert_eq!(StateFrame::parse("Fx"), None);
        assert_eq!(StateFrame::parse("G3"), None);
    }

    #[test]
    fn classify_missing_token_is_initiated() {
        assert_eq!(
            classify(StateFrame::initial(), None),
            SyncStatus::Initiated
        );
    }

    #[test]
    fn classify_matching_token_is_responsive() {
        let current = StateFrame::initial().next().next();
        assert_eq!(
            classify(current, Some("F2")),
            SyncStatus::Responsive
        );
    }

    #[test]
    fn classify_stale_token_is_out_of_sync() {
        let current = StateFrame::initial().next().next();
        assert_eq!(classify(current, Some("F1")), SyncStatus::OutOfSync);
        // A token from the "future" is just as stale.
        assert_eq!(classify(current, Some("F9")), SyncStatus::OutOfSync);
    }

    #[test]
    fn classify_unparseable_token_is_out_of_sync() {
        let current = StateFrame::initial();
        assert_eq!(classify(current, Some("junk")), SyncStatus::OutOfSync);
    }
}
