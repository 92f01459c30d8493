//! Ephemeral per-character state within one game session.
//!
//! Entries are keyed by `(session, character)`, created on first access,
//! and never persisted. The table is a sharded concurrent map so gameplay
//! handlers for different characters never contend on one lock.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ravenvault_types::{CharacterId, GameSessionId};

/// Counters and timestamps tracked for one character in one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharacterSessionState {
    /// When the character joined the session.
    pub joined: Option<DateTime<Utc>>,
    /// Last time experience was reported by the client.
    pub last_experience_update: Option<DateTime<Utc>>,
    /// Experience reported since the character joined.
    pub experience_gained: f64,
    /// Number of experience reports received.
    pub experience_updates: u64,
    /// Last full state sync sent to the client.
    pub last_state_sync: Option<DateTime<Utc>>,
    /// Consecutive rejected updates, reset on an accepted one.
    pub rejected_updates: u32,
}

/// Concurrent table of [`CharacterSessionState`].
#[derive(Debug, Default)]
pub struct SessionStates {
    states: DashMap<(GameSessionId, CharacterId), CharacterSessionState>,
}

impl SessionStates {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on the state for `(session, character)`, creating it first if
    /// absent. The entry is locked for the duration of `f`.
    pub fn with<R>(
        &self,
        session: GameSessionId,
        character: CharacterId,
        f: impl FnOnce(&mut CharacterSessionState) -> R,
    ) -> R {
        let mut entry = self.states.entry((session, character)).or_insert_with(|| {
            CharacterSessionState {
                joined: Some(Utc::now()),
                ..CharacterSessionState::default()
            }
        });
        f(entry.value_mut())
    }

    /// A copy of the state, if it exists.
    pub fn get(&self, session: GameSessionId, character: CharacterId) -> Option<CharacterSessionState> {
        self.states.get(&(session, character)).map(|entry| entry.value().clone())
    }

    /// Drop the state of one character in one session.
    pub fn remove(&self, session: GameSessionId, character: CharacterId) -> Option<CharacterSessionState> {
        self.states.remove(&(session, character)).map(|(_, state)| state)
    }

    /// Drop every state of a session. Returns how many were dropped.
    pub fn end_session(&self, session: GameSessionId) -> usize {
        let before = self.states.len();
        self.states.retain(|(s, _), _| *s != session);
        before.saturating_sub(self.states.len())
    }

    /// Number of tracked `(session, character)` pairs.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no state is tracked.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_created_lazily() {
        let states = SessionStates::new();
        let (session, character) = (GameSessionId::new(), CharacterId::new());
        assert!(states.get(session, character).is_none());

        states.with(session, character, |s| {
            s.experience_updates = s.experience_updates.saturating_add(1);
            s.experience_gained += 25.0;
        });
        let state = states.get(session, character);
        assert!(state.is_some());
        let state = state.unwrap_or_default();
        assert_eq!(state.experience_updates, 1);
        assert!(state.joined.is_some());
    }

    #[test]
    fn sessions_are_isolated() {
        let states = SessionStates::new();
        let character = CharacterId::new();
        let (a, b) = (GameSessionId::new(), GameSessionId::new());
        states.with(a, character, |s| s.rejected_updates = 2);
        states.with(b, character, |s| s.rejected_updates = 5);

        assert_eq!(states.end_session(a), 1);
        assert!(states.get(a, character).is_none());
        assert_eq!(states.get(b, character).map(|s| s.rejected_updates), Some(5));
        assert!(states.remove(b, character).is_some());
        assert!(states.is_empty());
    }
}
