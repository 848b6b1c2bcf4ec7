//! Session state machine.
//!
//! The session moves through
//! `Closed → ManagerOpen → SourceOpen → SourceEnabled`, with `Transferring`
//! entered only inside the transfer loop. Every transition is a method that
//! checks its starting state, so the flag ordering
//! (`SourceEnabled ⇒ SourceOpen ⇒ ManagerOpen`) cannot be broken.

use crate::error::{TwainError, TwainResult};
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Observable session flags, derived from the state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateFlags: u8 {
        /// The manager connection is open.
        const MANAGER_OPEN = 0b0001;
        /// A source is open.
        const SOURCE_OPEN = 0b0010;
        /// The open source is enabled and owns the scan.
        const SOURCE_ENABLED = 0b0100;
        /// The transfer count has been negotiated.
        const SOURCE_READY = 0b1000;
    }
}

impl StateFlags {
    /// Whether every set flag has all its prerequisites set.
    pub fn is_consistent(self) -> bool {
        let open_ok = !self.contains(Self::SOURCE_OPEN) || self.contains(Self::MANAGER_OPEN);
        let enabled_ok = !self.contains(Self::SOURCE_ENABLED) || self.contains(Self::SOURCE_OPEN);
        let ready_ok = !self.contains(Self::SOURCE_READY) || self.contains(Self::SOURCE_OPEN);
        open_ok && enabled_ok && ready_ok
    }
}

/// Where the session is in the protocol handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No manager connection.
    #[default]
    Closed,
    /// Manager open, no source open.
    ManagerOpen,
    /// Source open; `ready` once the transfer count has been negotiated.
    SourceOpen {
        /// Transfer count negotiated.
        ready: bool,
    },
    /// Source enabled; waiting for events.
    SourceEnabled,
    /// Inside the transfer loop.
    Transferring,
}

impl SessionState {
    /// Flags observable in this state.
    pub fn flags(self) -> StateFlags {
        match self {
            SessionState::Closed => StateFlags::empty(),
            SessionState::ManagerOpen => StateFlags::MANAGER_OPEN,
            SessionState::SourceOpen { ready: false } => {
                StateFlags::MANAGER_OPEN | StateFlags::SOURCE_OPEN
            }
            SessionState::SourceOpen { ready: true } => {
                StateFlags::MANAGER_OPEN | StateFlags::SOURCE_OPEN | StateFlags::SOURCE_READY
            }
            SessionState::SourceEnabled | SessionState::Transferring => StateFlags::all(),
        }
    }

    /// Whether the manager is open.
    pub fn is_manager_open(self) -> bool {
        self.flags().contains(StateFlags::MANAGER_OPEN)
    }

    /// Whether a source is open.
    pub fn is_source_open(self) -> bool {
        self.flags().contains(StateFlags::SOURCE_OPEN)
    }

    /// Whether the open source is enabled.
    pub fn is_source_enabled(self) -> bool {
        self.flags().contains(StateFlags::SOURCE_ENABLED)
    }

    fn reject(self, event: &str) -> TwainError {
        TwainError::InvalidTransition {
            from: self.to_string(),
            event: event.to_string(),
        }
    }

    /// `Closed` to `ManagerOpen`.
    pub fn open_manager(self) -> TwainResult<Self> {
        match self {
            SessionState::Closed => Ok(SessionState::ManagerOpen),
            other => Err(other.reject("open the manager")),
        }
    }

    /// `ManagerOpen` to `SourceOpen`.
    pub fn open_source(self) -> TwainResult<Self> {
        match self {
            SessionState::ManagerOpen => Ok(SessionState::SourceOpen { ready: false }),
            other => Err(other.reject("open a source")),
        }
    }

    /// Record that the transfer count was negotiated.
    pub fn mark_ready(self) -> TwainResult<Self> {
        match self {
            SessionState::SourceOpen { .. } => Ok(SessionState::SourceOpen { ready: true }),
            other => Err(other.reject("mark the source ready")),
        }
    }

    /// A ready `SourceOpen` to `SourceEnabled`.
    pub fn enable(self) -> TwainResult<Self> {
        match self {
            SessionState::SourceOpen { ready: true } => Ok(SessionState::SourceEnabled),
            other => Err(other.reject("enable the source")),
        }
    }

    /// `SourceEnabled` to `Transferring`.
    pub fn begin_transfer(self) -> TwainResult<Self> {
        match self {
            SessionState::SourceEnabled => Ok(SessionState::Transferring),
            other => Err(other.reject("transfer images")),
        }
    }

    /// Leave the transfer loop once pending transfers are discarded.
    pub fn reset_transfers(self) -> TwainResult<Self> {
        match self {
            SessionState::Transferring => Ok(SessionState::SourceEnabled),
            other => Err(other.reject("reset pending transfers")),
        }
    }

    /// Back to a ready `SourceOpen` from an enabled source.
    pub fn disable(self) -> TwainResult<Self> {
        match self {
            SessionState::SourceEnabled | SessionState::Transferring => {
                Ok(SessionState::SourceOpen { ready: true })
            }
            other => Err(other.reject("disable the source")),
        }
    }

    /// `SourceOpen` to `ManagerOpen`.
    pub fn close_source(self) -> TwainResult<Self> {
        match self {
            SessionState::SourceOpen { .. } => Ok(SessionState::ManagerOpen),
            other => Err(other.reject("close the source")),
        }
    }

    /// `ManagerOpen` to `Closed`.
    pub fn close_manager(self) -> TwainResult<Self> {
        match self {
            SessionState::ManagerOpen => Ok(SessionState::Closed),
            other => Err(other.reject("close the manager")),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionState::Closed => "closed",
            SessionState::ManagerOpen => "manager open",
            SessionState::SourceOpen { ready: false } => "source open",
            SessionState::SourceOpen { ready: true } => "source ready",
            SessionState::SourceEnabled => "source enabled",
            SessionState::Transferring => "transferring",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        let state = SessionState::Closed
            .open_manager()
            .and_then(SessionState::open_source)
            .and_then(SessionState::mark_ready)
            .and_then(SessionState::enable)
            .and_then(SessionState::begin_transfer)
            .unwrap();
        assert_eq!(state, SessionState::Transferring);
        assert_eq!(state.flags(), StateFlags::all());
    }

    #[test]
    fn test_reset_leaves_transfer_loop() {
        let state = SessionState::Transferring.reset_transfers().unwrap();
        assert_eq!(state, SessionState::SourceEnabled);
        assert!(SessionState::SourceEnabled.reset_transfers().is_err());
    }

    #[test]
    fn test_teardown_path() {
        let state = SessionState::Transferring
            .disable()
            .and_then(SessionState::close_source)
            .and_then(SessionState::close_manager)
            .unwrap();
        assert_eq!(state, SessionState::Closed);
        assert!(state.flags().is_empty());
    }

    #[test]
    fn test_out_of_order_transitions_are_rejected() {
        assert!(SessionState::Closed.open_source().is_err());
        assert!(SessionState::ManagerOpen.enable().is_err());
        assert!(SessionState::SourceOpen { ready: false }.enable().is_err());
        assert!(SessionState::SourceEnabled.close_source().is_err());
        assert!(SessionState::SourceOpen { ready: true }.close_manager().is_err());

        let err = SessionState::Closed.begin_transfer().unwrap_err();
        assert_eq!(err.to_string(), "Cannot transfer images while closed");
    }

    #[test]
    fn test_every_state_has_consistent_flags() {
        let states = [
            SessionState::Closed,
            SessionState::ManagerOpen,
            SessionState::SourceOpen { ready: false },
            SessionState::SourceOpen { ready: true },
            SessionState::SourceEnabled,
            SessionState::Transferring,
        ];
        for state in states {
            assert!(state.flags().is_consistent(), "{state}");
        }
        assert!(!(StateFlags::SOURCE_ENABLED | StateFlags::MANAGER_OPEN).is_consistent());
    }
}
