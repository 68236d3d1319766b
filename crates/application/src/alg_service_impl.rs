use std::sync::{Arc, PoisonError, RwLock};

use domain::common::entity::{Binding, BindingId, Direction, ModuleName, Transport};
use domain::common::error::DomainError;
use domain::common::packet::Packet;
use domain::dispatch::engine::{Disposition, process_packet};
use domain::module::entity::ProxyModule;
use domain::module::registry::{ModuleRegistry, Removal};
use domain::session::table::{SessionId, SessionTable};
use ports::secondary::metrics_port::MetricsPort;
use tokio::sync::mpsc;

use crate::pinhole_pipeline::PinholeCommand;

/// Application-level proxy service.
///
/// Owns the module registry and the session table, each behind its own
/// coarse lock; every session additionally carries its own mutex, so at
/// most one worker processes a given session at a time while unrelated
/// sessions dispatch in parallel.
///
/// Lock order on the packet path: session-table read lock (released as
/// soon as the session handle is cloned out), then the session mutex,
/// then the registry read lock. The NAT control plane is reached only
/// through the pinhole queue, outside all three.
pub struct AlgAppService {
    registry: RwLock<ModuleRegistry>,
    sessions: RwLock<SessionTable>,
    metrics: Arc<dyn MetricsPort>,
    pinhole_tx: Option<mpsc::Sender<PinholeCommand>>,
}

impl AlgAppService {
    pub fn new(metrics: Arc<dyn MetricsPort>) -> Self {
        Self {
            registry: RwLock::new(ModuleRegistry::new()),
            sessions: RwLock::new(SessionTable::new()),
            metrics,
            pinhole_tx: None,
        }
    }

    /// Cap the number of concurrent sessions. Zero means unlimited.
    #[must_use]
    pub fn with_session_limit(self, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(SessionTable::new().with_capacity_limit(max_sessions)),
            ..self
        }
    }

    /// Attach the pinhole command queue. Without one, pinhole requests
    /// are dropped and counted, for embedders that have no control
    /// plane.
    #[must_use]
    pub fn with_pinhole_queue(mut self, tx: mpsc::Sender<PinholeCommand>) -> Self {
        self.pinhole_tx = Some(tx);
        self
    }

    // ── Module management ─────────────────────────────────────────

    /// Install a protocol module. Built-ins and dynamically loaded
    /// modules go through this same path.
    pub fn register_module(&self, module: Box<dyn ProxyModule>) -> Result<(), DomainError> {
        let name = module.info().name.clone();
        let mut registry = self.write_registry();
        registry.register(module)?;
        self.metrics.set_modules_registered(registry.len() as u64);
        drop(registry);
        tracing::info!(module = %name, "proxy module registered");
        Ok(())
    }

    /// Remove a module from matching and lookup. With live sessions the
    /// removal is deferred until the last one goes away; this call never
    /// blocks on them.
    pub fn unregister_module(
        &self,
        transport: Transport,
        name: &ModuleName,
    ) -> Result<Removal, DomainError> {
        let mut registry = self.write_registry();
        let removal = registry.unregister(transport, name)?;
        self.metrics.set_modules_registered(registry.len() as u64);
        drop(registry);

        match removal {
            Removal::Complete => tracing::info!(module = %name, "proxy module removed"),
            Removal::Deferred => {
                self.metrics.record_module_removal_deferred(&name.0);
                tracing::info!(module = %name, "proxy module removal deferred until last session ends");
            }
        }
        Ok(removal)
    }

    /// Whether the binding's configured module proxies this packet.
    pub fn matches(&self, binding: &Binding, packet: &Packet) -> bool {
        self.read_registry().matches(binding, packet)
    }

    // ── Session lifecycle ─────────────────────────────────────────

    /// Attach a session to a binding that matched a proxy rule.
    pub fn attach_session(&self, binding: &Binding) -> Result<SessionId, DomainError> {
        let mut sessions = self.write_sessions();
        let mut registry = self.write_registry();
        let id = sessions.create(binding, &mut registry)?;
        let active = sessions.len() as u64;
        drop(registry);
        drop(sessions);

        self.metrics.record_session_created(&binding.module.0);
        self.metrics.set_sessions_active(active);
        tracing::debug!(binding = %binding.id, session = %id, module = %binding.module, "proxy session attached");
        Ok(id)
    }

    /// Session attached to a binding, if any.
    pub fn session_for(&self, binding: BindingId) -> Option<SessionId> {
        self.read_sessions().lookup(binding)
    }

    /// The NAT engine tore the binding down; its session goes with it.
    pub fn binding_torn_down(&self, binding: BindingId) {
        let destroyed = {
            let mut sessions = self.write_sessions();
            let mut registry = self.write_registry();
            sessions
                .destroy_for_binding(binding, &mut registry)
                .ok()
                .map(|id| (id, sessions.len() as u64))
        };

        if let Some((id, active)) = destroyed {
            self.metrics.set_sessions_active(active);
            tracing::debug!(binding = %binding, session = %id, "proxy session destroyed with binding");
            self.send_pinhole(PinholeCommand::Teardown(binding));
        }
    }

    /// Tear down every session, e.g. at shutdown.
    pub fn shutdown(&self) {
        let owners = {
            let mut sessions = self.write_sessions();
            let mut registry = self.write_registry();
            sessions.destroy_all(&mut registry)
        };
        for owner in &owners {
            self.send_pinhole(PinholeCommand::Teardown(*owner));
        }
        self.metrics.set_sessions_active(0);
        tracing::info!(sessions = owners.len(), "proxy layer shut down");
    }

    pub fn session_count(&self) -> usize {
        self.read_sessions().len()
    }

    // ── Packet path ───────────────────────────────────────────────

    /// Run one segment of a proxied binding through its module.
    ///
    /// Soft failures (`ChecksumMismatch`, missing session) surface as
    /// errors so the caller can apply its own forwarding policy;
    /// `Disposition::Drop` is authoritative.
    pub fn dispatch(&self, binding: &Binding, packet: &mut Packet) -> Result<Disposition, DomainError> {
        let direction = if packet.flow.src.addr == binding.inside.addr {
            Direction::Outbound
        } else {
            Direction::Inbound
        };

        let session_arc = self
            .read_sessions()
            .session_for(binding.id)
            .ok_or(DomainError::SessionNotFound)?;

        let (report, pinholes, module_name) = {
            let mut session = session_arc
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let registry = self.read_registry();
            let Some(module) = registry.get(session.module) else {
                return Err(DomainError::SessionNotFound);
            };
            let module_name = module.info().name.0.clone();

            let report = match process_packet(&mut session, module, binding, packet, direction) {
                Ok(report) => report,
                Err(e) => {
                    self.metrics.record_checksum_failure(&module_name);
                    tracing::debug!(binding = %binding.id, "segment failed checksum, left to caller policy");
                    return Err(e.into());
                }
            };
            (report, session.take_pinholes(), module_name)
        };

        if let Some(ref hook_error) = report.hook_error {
            self.metrics.record_hook_failure(&module_name);
            tracing::warn!(binding = %binding.id, module = %module_name, "module hook failed: {hook_error}");
        }
        if report.delta != 0 {
            self.metrics
                .record_rewrite(&module_name, i64::from(report.delta));
            tracing::debug!(binding = %binding.id, delta = report.delta, "payload rewritten");
        }

        let disposition_label = match report.disposition {
            Disposition::Forward => "forward",
            Disposition::Drop => "drop",
        };
        self.metrics
            .record_packet(&module_name, direction.as_str(), disposition_label);
        self.metrics
            .record_bytes(&module_name, direction.as_str(), packet.payload_len() as u64);

        for spec in pinholes {
            self.send_pinhole(PinholeCommand::Install(spec));
        }

        if report.release {
            tracing::debug!(binding = %binding.id, module = %module_name, "module released its session");
            self.binding_torn_down(binding.id);
        }

        Ok(report.disposition)
    }

    // ── Internals ─────────────────────────────────────────────────

    fn send_pinhole(&self, command: PinholeCommand) {
        let Some(ref tx) = self.pinhole_tx else {
            self.metrics.record_event_dropped("pinhole_queue_missing");
            return;
        };
        if tx.try_send(command).is_err() {
            // A lost pinhole request degrades the call it belongs to,
            // never the connection carrying it.
            self.metrics.record_event_dropped("pinhole_queue_full");
            tracing::warn!("pinhole queue full, request dropped");
        }
    }

    fn read_registry(&self) -> std::sync::RwLockReadGuard<'_, ModuleRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> std::sync::RwLockWriteGuard<'_, ModuleRegistry> {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_sessions(&self) -> std::sync::RwLockReadGuard<'_, SessionTable> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_sessions(&self) -> std::sync::RwLockWriteGuard<'_, SessionTable> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
