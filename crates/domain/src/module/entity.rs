use serde::{Deserialize, Serialize};

use crate::common::entity::{Binding, ModuleName, Transport};
use crate::common::packet::Packet;
use crate::session::entity::Session;

use super::error::ModuleError;

/// Descriptor of a protocol-proxy module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Stable registry identifier, unique per transport.
    pub name: ModuleName,
    /// Human-readable name for logs and operational surfaces.
    pub title: String,
    pub transport: Transport,
    /// Control port the protocol listens on. Zero for modules that are
    /// only reached through dynamically created bindings.
    pub port: u16,
}

impl ModuleInfo {
    pub fn validate(&self) -> Result<(), ModuleError> {
        self.name
            .validate()
            .map_err(|reason| ModuleError::InvalidDescriptor {
                reason: reason.to_string(),
            })
    }
}

/// Result of a directional module hook over one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Payload untouched.
    Unchanged,
    /// Payload rewritten in place; its length changed by this many bytes
    /// (may be negative or zero).
    Rewritten(i32),
    /// The segment must be discarded by the caller.
    Drop,
    /// The protocol no longer needs proxying; the session is torn down
    /// after this segment is forwarded.
    ReleaseSession,
}

/// Capability set a protocol module implements.
///
/// The registry owns the module; sessions refer to it through a
/// reference-counted handle. Hooks run under the owning session's
/// exclusive lock and must not call back into the registry, the session
/// table, or the NAT control plane; pinholes are requested through the
/// session's outbox instead.
pub trait ProxyModule: Send + Sync {
    fn info(&self) -> &ModuleInfo;

    /// Called once when the module is registered. A failure aborts the
    /// registration.
    fn initialize(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called exactly once, after the last session referencing the
    /// module released it (or at unregister time if none did).
    fn finalize(&self) {}

    /// Set up per-session private state. A failure rolls the session
    /// back; `on_session_destroy` runs on the partially built session.
    fn on_session_create(
        &self,
        _session: &mut Session,
        _binding: &Binding,
    ) -> Result<(), ModuleError> {
        Ok(())
    }

    fn on_session_destroy(&self, _session: &mut Session) {}

    fn on_outbound(
        &self,
        session: &mut Session,
        binding: &Binding,
        packet: &mut Packet,
    ) -> Result<Outcome, ModuleError>;

    fn on_inbound(
        &self,
        session: &mut Session,
        binding: &Binding,
        packet: &mut Packet,
    ) -> Result<Outcome, ModuleError>;

    /// Whether this module serves the given binding. The default matches
    /// the binding's configured listening port against the module's port.
    fn matches(&self, binding: &Binding) -> bool {
        binding.proxy_port == self.info().port
    }
}
