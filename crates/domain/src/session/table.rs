use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::common::entity::{Binding, BindingId};
use crate::common::error::DomainError;
use crate::module::registry::ModuleRegistry;

use super::entity::Session;
use super::error::SessionError;

/// Generation-checked index into the session table.
///
/// A stale id (its slot was reused) fails lookup and destroy instead of
/// reaching another binding's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot {
    generation: u32,
    session: Option<Arc<Mutex<Session>>>,
}

/// The set of live proxy sessions.
///
/// One arena slot per session plus a by-binding index for the O(1)
/// packet-path lookup. Sessions are stored behind their own mutex so a
/// caller can release the table lock before entering a session: the
/// table lock protects membership only, never per-session state.
#[derive(Default)]
pub struct SessionTable {
    slots: Vec<Slot>,
    free: Vec<usize>,
    by_binding: HashMap<BindingId, SessionId>,
    max_sessions: usize,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of concurrent sessions. Zero means unlimited.
    #[must_use]
    pub fn with_capacity_limit(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Attach a new session to `binding`.
    ///
    /// Takes a module reference via the registry, runs the module's
    /// `on_session_create`, and links the session into the table and the
    /// by-binding index. If the hook fails, the partially constructed
    /// session is destroyed (the destroy hook runs, private data is
    /// freed, the module reference is returned) and nothing is left
    /// registered.
    pub fn create(
        &mut self,
        binding: &Binding,
        registry: &mut ModuleRegistry,
    ) -> Result<SessionId, DomainError> {
        if self.by_binding.contains_key(&binding.id) {
            return Err(SessionError::AlreadyAttached(binding.id.0).into());
        }
        if self.max_sessions != 0 && self.by_binding.len() >= self.max_sessions {
            return Err(SessionError::TableFull(self.max_sessions).into());
        }

        let handle = registry.lookup(binding.transport, &binding.module)?;
        let Some(module) = registry.get(handle) else {
            return Err(crate::module::error::ModuleError::StaleHandle.into());
        };

        let mut session = Session::new(binding, handle);
        if let Err(e) = module.on_session_create(&mut session, binding) {
            module.on_session_destroy(&mut session);
            session.clear_private();
            drop(session);
            registry.release(handle);
            return Err(e.into());
        }

        let id = self.insert(session);
        self.by_binding.insert(binding.id, id);
        Ok(id)
    }

    /// Session id attached to a binding, if any.
    pub fn lookup(&self, binding: BindingId) -> Option<SessionId> {
        self.by_binding.get(&binding).copied()
    }

    /// Shared handle to a session by id.
    pub fn get(&self, id: SessionId) -> Option<Arc<Mutex<Session>>> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.session.clone()
    }

    /// Shared handle to the session attached to a binding.
    pub fn session_for(&self, binding: BindingId) -> Option<Arc<Mutex<Session>>> {
        self.get(self.lookup(binding)?)
    }

    /// Tear a session down: unlink it, run the module's destroy hook,
    /// free private data, and return the module reference (which may
    /// trigger a deferred module finalization).
    ///
    /// A second destroy of the same id reports `SessionNotFound`.
    pub fn destroy(
        &mut self,
        id: SessionId,
        registry: &mut ModuleRegistry,
    ) -> Result<(), DomainError> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .ok_or(SessionError::NotFound)?;
        let arc = slot.session.take().ok_or(SessionError::NotFound)?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index as usize);

        let handle = {
            let mut session = arc.lock().unwrap_or_else(PoisonError::into_inner);
            self.by_binding.remove(&session.binding);
            if let Some(module) = registry.get(session.module) {
                module.on_session_destroy(&mut session);
            }
            session.clear_private();
            session.module
        };
        registry.release(handle);
        Ok(())
    }

    /// Tear down the session attached to `binding`, reporting its id.
    pub fn destroy_for_binding(
        &mut self,
        binding: BindingId,
        registry: &mut ModuleRegistry,
    ) -> Result<SessionId, DomainError> {
        let id = self.lookup(binding).ok_or(SessionError::NotFound)?;
        self.destroy(id, registry)?;
        Ok(id)
    }

    /// Tear down every session. Returns the bindings that owned one.
    pub fn destroy_all(&mut self, registry: &mut ModuleRegistry) -> Vec<BindingId> {
        let owners: Vec<BindingId> = self.by_binding.keys().copied().collect();
        for owner in &owners {
            // Entries cannot vanish between the snapshot and here; a
            // failed destroy would mean table corruption, not a race.
            let _ = self.destroy_for_binding(*owner, registry);
        }
        owners
    }

    /// Bindings that currently own a session.
    pub fn bindings(&self) -> impl Iterator<Item = BindingId> + '_ {
        self.by_binding.keys().copied()
    }

    /// Live sessions with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (SessionId, Arc<Mutex<Session>>)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let session = slot.session.clone()?;
            Some((
                SessionId {
                    index: index as u32,
                    generation: slot.generation,
                },
                session,
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.by_binding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_binding.is_empty()
    }

    fn insert(&mut self, session: Session) -> SessionId {
        let session = Arc::new(Mutex::new(session));
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.session = Some(session);
                SessionId {
                    index: index as u32,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    session: Some(session),
                });
                SessionId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }
}
