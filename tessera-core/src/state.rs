use serde::{Deserialize, Serialize};
use std::fmt;

/// Save lifecycle of a record.
///
/// ```text
/// Clean --edit--> Dirty --will_commit--> InFlight --did_commit--> Clean
///                                           |--became_invalid--> Invalid
///                                           `--became_error--> Error
///
/// Invalid --became_valid--> Dirty
/// Error stays until retried or rolled back.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveState {
    #[default]
    Clean,
    Dirty,
    InFlight,
    Invalid,
    Error,
}

/// Events driving [`SaveState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveEvent {
    BecomeDirty,
    BecomeClean,
    WillCommit,
    DidCommit,
    BecameInvalid,
    BecameValid,
    BecameError,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event {event:?} is not valid in state {state:?}")]
pub struct InvalidTransition {
    pub state: SaveState,
    pub event: SaveEvent,
}

impl SaveState {
    /// Applies `event`, returning the next state.
    pub fn send(self, event: SaveEvent) -> Result<SaveState, InvalidTransition> {
        use SaveEvent::*;
        use SaveState::*;

        let next = match (self, event) {
            (Clean | Dirty, BecomeDirty) => Dirty,
            (Clean | Dirty, BecomeClean) => Clean,
            // Local edits while in flight, invalid or errored do not leave
            // those states; the dirty map carries them.
            (InFlight | Invalid | Error, BecomeDirty | BecomeClean) => self,

            (Clean | Dirty | Invalid | Error, WillCommit) => InFlight,
            (InFlight, DidCommit) => Clean,
            (InFlight, BecameInvalid) => Invalid,
            (Invalid, BecameValid) => Dirty,
            (InFlight | Clean | Dirty, BecameError) => Error,
            (Clean | Dirty | Invalid | Error, Rollback) => Clean,

            (state, event) => return Err(InvalidTransition { state, event }),
        };
        Ok(next)
    }

    pub fn is_in_flight(self) -> bool {
        self == SaveState::InFlight
    }

    pub fn is_dirty(self) -> bool {
        matches!(self, SaveState::Dirty | SaveState::Invalid)
    }
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SaveState::Clean => "clean",
            SaveState::Dirty => "dirty",
            SaveState::InFlight => "in-flight",
            SaveState::Invalid => "invalid",
            SaveState::Error => "error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let state = SaveState::Clean
            .send(SaveEvent::BecomeDirty)
            .and_then(|s| s.send(SaveEvent::WillCommit))
            .and_then(|s| s.send(SaveEvent::DidCommit))
            .unwrap();
        assert_eq!(state, SaveState::Clean);
    }

    #[test]
    fn rejection_returns_to_editable() {
        let state = SaveState::InFlight.send(SaveEvent::BecameInvalid).unwrap();
        assert_eq!(state, SaveState::Invalid);
        assert_eq!(state.send(SaveEvent::BecameValid).unwrap(), SaveState::Dirty);
        assert_eq!(state.send(SaveEvent::WillCommit).unwrap(), SaveState::InFlight);
    }

    #[test]
    fn error_is_sticky_until_retry_or_rollback() {
        let state = SaveState::InFlight.send(SaveEvent::BecameError).unwrap();
        assert_eq!(state, SaveState::Error);
        assert_eq!(state.send(SaveEvent::BecomeDirty).unwrap(), SaveState::Error);
        assert!(state.send(SaveEvent::DidCommit).is_err());
        assert_eq!(state.send(SaveEvent::WillCommit).unwrap(), SaveState::InFlight);
        assert_eq!(state.send(SaveEvent::Rollback).unwrap(), SaveState::Clean);
    }

    #[test]
    fn only_one_outstanding_save() {
        let err = SaveState::InFlight.send(SaveEvent::WillCommit).unwrap_err();
        assert_eq!(err.state, SaveState::InFlight);
        assert_eq!(err.event, SaveEvent::WillCommit);
    }

    #[test]
    fn edits_in_flight_keep_state() {
        assert_eq!(
            SaveState::InFlight.send(SaveEvent::BecomeDirty).unwrap(),
            SaveState::InFlight
        );
        assert!(SaveState::InFlight.send(SaveEvent::Rollback).is_err());
    }
}
