use crate::common::entity::{Binding, ModuleName, Transport};
use crate::common::packet::Packet;

use super::entity::ProxyModule;
use super::error::ModuleError;

/// Opaque handle into the registry's module arena.
///
/// Valid for as long as the holder keeps the module's reference count
/// nonzero; the slot cannot be reused while references remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(usize);

/// What `unregister` managed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// No live references; the module was finalized and freed.
    Complete,
    /// Sessions still reference the module. It stops matching and
    /// accepting new sessions; finalization happens when the last
    /// reference is released.
    Deferred,
}

struct Slot {
    module: Box<dyn ProxyModule>,
    refcount: u32,
    removing: bool,
}

/// Table of installed protocol modules.
///
/// One owned arena for built-ins and dynamically added modules alike;
/// built-ins are simply registered at startup through the same
/// [`register`](Self::register) path.
#[derive(Default)]
pub struct ModuleRegistry {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a module. Rejects a duplicate (transport, name) pair and
    /// propagates an `initialize` failure without inserting anything.
    pub fn register(&mut self, module: Box<dyn ProxyModule>) -> Result<ModuleHandle, ModuleError> {
        let info = module.info().clone();
        info.validate()?;

        if self.position(info.transport, &info.name).is_some() {
            return Err(ModuleError::Duplicate {
                transport: info.transport.to_string(),
                name: info.name.to_string(),
            });
        }

        module.initialize().map_err(|e| ModuleError::InitFailed {
            name: info.name.to_string(),
            reason: e.to_string(),
        })?;

        let slot = Slot {
            module,
            refcount: 0,
            removing: false,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                index
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        Ok(ModuleHandle(index))
    }

    /// Remove a module from future lookup and matching.
    ///
    /// Never blocks: with live references the removal is deferred and the
    /// module object persists until the last session releases it.
    pub fn unregister(
        &mut self,
        transport: Transport,
        name: &ModuleName,
    ) -> Result<Removal, ModuleError> {
        let index = self
            .position(transport, name)
            .ok_or_else(|| ModuleError::NotFound {
                name: name.to_string(),
            })?;

        let slot = match &mut self.slots[index] {
            Some(slot) => slot,
            None => {
                return Err(ModuleError::NotFound {
                    name: name.to_string(),
                });
            }
        };
        slot.removing = true;
        if slot.refcount == 0 {
            self.finalize_slot(index);
            Ok(Removal::Complete)
        } else {
            Ok(Removal::Deferred)
        }
    }

    /// Find a module by key and take a reference on it.
    ///
    /// The caller owns one reference count and must pair this with
    /// [`release`](Self::release). A module flagged for removal is not
    /// eligible and reports `BeingRemoved`.
    pub fn lookup(
        &mut self,
        transport: Transport,
        name: &ModuleName,
    ) -> Result<ModuleHandle, ModuleError> {
        if let Some(index) = self.position(transport, name) {
            if let Some(slot) = &mut self.slots[index] {
                slot.refcount += 1;
                return Ok(ModuleHandle(index));
            }
        }
        if self.position_removing(transport, name).is_some() {
            return Err(ModuleError::BeingRemoved {
                name: name.to_string(),
            });
        }
        Err(ModuleError::NotFound {
            name: name.to_string(),
        })
    }

    /// Drop one reference. Finalizes and frees a module that was flagged
    /// for removal once this was the last reference.
    pub fn release(&mut self, handle: ModuleHandle) {
        let Some(Some(slot)) = self.slots.get_mut(handle.0) else {
            return;
        };
        slot.refcount = slot.refcount.saturating_sub(1);
        if slot.removing && slot.refcount == 0 {
            self.finalize_slot(handle.0);
        }
    }

    /// Borrow the module behind a handle.
    pub fn get(&self, handle: ModuleHandle) -> Option<&dyn ProxyModule> {
        self.slots
            .get(handle.0)
            .and_then(|slot| slot.as_ref())
            .map(|slot| slot.module.as_ref())
    }

    /// Whether the binding's configured module serves this packet:
    /// transports must agree and the module's own `matches` must accept
    /// the binding. A module flagged for removal never matches.
    pub fn matches(&self, binding: &Binding, packet: &Packet) -> bool {
        let Some(index) = self.position(binding.transport, &binding.module) else {
            return false;
        };
        let Some(slot) = &self.slots[index] else {
            return false;
        };
        slot.module.info().transport == packet.flow.transport && slot.module.matches(binding)
    }

    pub fn refcount(&self, handle: ModuleHandle) -> Option<u32> {
        self.slots
            .get(handle.0)
            .and_then(|slot| slot.as_ref())
            .map(|slot| slot.refcount)
    }

    /// Installed modules, removal-flagged ones included.
    pub fn iter(&self) -> impl Iterator<Item = &dyn ProxyModule> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref())
            .map(|slot| slot.module.as_ref())
    }

    /// Number of modules still eligible for lookup.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref())
            .filter(|slot| !slot.removing)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self, transport: Transport, name: &ModuleName) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.as_ref().is_some_and(|slot| {
                !slot.removing
                    && slot.module.info().transport == transport
                    && slot.module.info().name == *name
            })
        })
    }

    fn position_removing(&self, transport: Transport, name: &ModuleName) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.as_ref().is_some_and(|slot| {
                slot.removing
                    && slot.module.info().transport == transport
                    && slot.module.info().name == *name
            })
        })
    }

    fn finalize_slot(&mut self, index: usize) {
        if let Some(slot) = self.slots[index].take() {
            slot.module.finalize();
            self.free.push(index);
        }
    }
}
