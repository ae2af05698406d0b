//! Per-user session slots
//!
//! One registry per dialog kind. Each user has at most one session in a
//! registry; operations on different users never contend on the same shard
//! lock for longer than one map operation, and every read-modify-write on a
//! single user's slot is atomic.

use crate::db::UserId;
use crate::state_machine::{Effect, Transition, TransitionError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

pub struct SessionRegistry<S> {
    sessions: DashMap<UserId, S>,
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl<S: Clone + Default> SessionRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the user's session, creating an empty one if absent. An
    /// existing session is never replaced.
    #[allow(dead_code)] // Used in tests
    pub fn get_or_create(&self, user: UserId) -> S {
        self.sessions.entry(user).or_default().clone()
    }

    #[allow(dead_code)] // Used in tests
    pub fn get(&self, user: UserId) -> Option<S> {
        self.sessions.get(&user).map(|s| s.clone())
    }

    /// Install a fresh session, overwriting any previous one. Returns true
    /// if a session was replaced.
    pub fn start(&self, user: UserId, session: S) -> bool {
        self.sessions.insert(user, session).is_some()
    }

    /// Drop the user's session. Returns true if one existed.
    pub fn clear(&self, user: UserId) -> bool {
        self.sessions.remove(&user).is_some()
    }

    pub fn has_active(&self, user: UserId) -> bool {
        self.sessions.contains_key(&user)
    }

    /// Run a transition against the user's session under the slot lock.
    ///
    /// Returns `None` if the user has no session. On success the slot holds
    /// the next state, or is emptied when the transition finishes the
    /// session. On error the slot is left untouched. Effects are handed back
    /// for execution after the lock is released.
    pub fn apply<F>(&self, user: UserId, f: F) -> Option<Result<Vec<Effect>, TransitionError>>
    where
        F: FnOnce(&S) -> Result<Transition<S>, TransitionError>,
    {
        let Entry::Occupied(mut slot) = self.sessions.entry(user) else {
            return None;
        };
        let Transition { next, effects } = match f(slot.get()) {
            Ok(transition) => transition,
            Err(e) => return Some(Err(e)),
        };
        match next {
            Some(state) => {
                slot.insert(state);
            }
            None => {
                slot.remove();
            }
        }
        Some(Ok(effects))
    }

    /// Like `apply`, but an absent session is created empty first.
    pub fn apply_or_create<F>(&self, user: UserId, f: F) -> Result<Vec<Effect>, TransitionError>
    where
        F: FnOnce(&S) -> Result<Transition<S>, TransitionError>,
    {
        match self.sessions.entry(user) {
            Entry::Occupied(mut slot) => {
                let Transition { next, effects } = f(slot.get())?;
                match next {
                    Some(state) => {
                        slot.insert(state);
                    }
                    None => {
                        slot.remove();
                    }
                }
                Ok(effects)
            }
            Entry::Vacant(slot) => {
                let Transition { next, effects } = f(&S::default())?;
                if let Some(state) = next {
                    slot.insert(state);
                }
                Ok(effects)
            }
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
