use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use domain::common::entity::{BindingId, PinholeSpec};
use ports::secondary::control_plane_port::{ControlPlanePort, PinholeHandle};
use ports::secondary::metrics_port::MetricsPort;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Commands consumed by the pinhole installer task.
#[derive(Debug, Clone)]
pub enum PinholeCommand {
    /// Create an auxiliary binding for this spec.
    Install(PinholeSpec),
    /// Remove every auxiliary binding this session requested.
    Teardown(BindingId),
}

/// Dedicated control-plane task installing pinholes requested from the
/// packet path.
///
/// The packet path never calls the control plane directly: requests
/// queue here and are handled outside any table or session lock, so the
/// path cannot deadlock against the engine's table-wide lock. A pinhole
/// becomes effective one packet later than in a synchronous design.
///
/// Installed handles are tracked per owning binding so the whole set can
/// be torn down when the session dies. Install failures are soft:
/// logged and counted, never escalated to the data path.
pub struct PinholeInstaller {
    control_plane: Arc<dyn ControlPlanePort>,
    metrics: Arc<dyn MetricsPort>,
    installed: HashMap<BindingId, Vec<(PinholeSpec, PinholeHandle)>>,
    seen: HashSet<PinholeSpec>,
}

impl PinholeInstaller {
    pub fn new(control_plane: Arc<dyn ControlPlanePort>, metrics: Arc<dyn MetricsPort>) -> Self {
        Self {
            control_plane,
            metrics,
            installed: HashMap::new(),
            seen: HashSet::new(),
        }
    }

    /// Main command loop. Receives commands from the queue and drains
    /// whatever is left when cancelled.
    pub async fn run(mut self, mut rx: mpsc::Receiver<PinholeCommand>, cancel: CancellationToken) {
        let mut count: u64 = 0;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    while let Ok(command) = rx.try_recv() {
                        count += 1;
                        self.handle(command);
                    }
                    break;
                }
                msg = rx.recv() => {
                    match msg {
                        Some(command) => {
                            count += 1;
                            self.handle(command);
                        }
                        None => break, // channel closed
                    }
                }
            }
        }

        tracing::info!(total_commands = count, "pinhole installer stopped");
    }

    /// Handle one command synchronously. Exposed for tests.
    pub fn handle(&mut self, command: PinholeCommand) {
        match command {
            PinholeCommand::Install(spec) => self.install(spec),
            PinholeCommand::Teardown(owner) => self.teardown(owner),
        }
    }

    fn install(&mut self, spec: PinholeSpec) {
        // Sessions already suppress rescans; this catches duplicates
        // across retries and module boundaries.
        if !self.seen.insert(spec.clone()) {
            return;
        }

        match self.control_plane.create_auxiliary(&spec) {
            Ok(handle) => {
                tracing::debug!(
                    owner = %spec.owner,
                    target = %spec.target,
                    "pinhole installed"
                );
                self.metrics.record_pinhole_installed(module_label(&spec));
                self.installed
                    .entry(spec.owner)
                    .or_default()
                    .push((spec, handle));
            }
            Err(e) => {
                tracing::warn!(
                    owner = %spec.owner,
                    target = %spec.target,
                    "pinhole install failed: {e}"
                );
                self.metrics.record_pinhole_failed("control_plane");
                // Let a later packet retry the same endpoint.
                self.seen.remove(&spec);
            }
        }
    }

    fn teardown(&mut self, owner: BindingId) {
        let Some(entries) = self.installed.remove(&owner) else {
            return;
        };
        for (spec, handle) in entries {
            self.seen.remove(&spec);
            if let Err(e) = self.control_plane.remove_auxiliary(handle) {
                tracing::warn!(owner = %owner, target = %spec.target, "pinhole teardown failed: {e}");
            }
        }
    }

    /// Number of live pinholes for a binding.
    pub fn installed_for(&self, owner: BindingId) -> usize {
        self.installed.get(&owner).map_or(0, Vec::len)
    }
}

fn module_label(spec: &PinholeSpec) -> &str {
    spec.module.as_ref().map_or("none", |module| &module.0)
}
