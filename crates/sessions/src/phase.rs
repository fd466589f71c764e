//! Session lifecycle phases.

use serde::Serialize;

/// Where a tenant's connection sits in its lifecycle.
///
/// `pairing_code` on the session is non-empty only in `PairingPending`;
/// `LoggedOut` is terminal and never observed through the registry (the
/// session is evicted in the same step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    PairingPending,
    Authenticated,
    Live,
    Disconnected,
    LoggedOut,
    Error,
}

impl Phase {
    /// Canonical readiness predicate for the dispatch pipeline: only a
    /// fully open connection may send. `Authenticated` (identity known
    /// from stored credentials, socket not yet open) is not enough.
    pub fn is_sendable(self) -> bool {
        matches!(self, Phase::Live)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Uninitialized => "uninitialized",
            Phase::PairingPending => "pairing_pending",
            Phase::Authenticated => "authenticated",
            Phase::Live => "live",
            Phase::Disconnected => "disconnected",
            Phase::LoggedOut => "logged_out",
            Phase::Error => "error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_live_is_sendable() {
        for phase in [
            Phase::Uninitialized,
            Phase::PairingPending,
            Phase::Authenticated,
            Phase::Disconnected,
            Phase::LoggedOut,
            Phase::Error,
        ] {
            assert!(!phase.is_sendable(), "{phase} must not be sendable");
        }
        assert!(Phase::Live.is_sendable());
    }

    #[test]
    fn serializes_snake_case() {
        let s = serde_json::to_string(&Phase::PairingPending).unwrap();
        assert_eq!(s, "\"pairing_pending\"");
    }
}
