use std::sync::atomic::{AtomicU64, Ordering};

use domain::common::entity::PinholeSpec;
use domain::common::error::DomainError;

use crate::secondary::control_plane_port::{ControlPlanePort, PinholeHandle};
use crate::secondary::metrics_port::{
    EventMetrics, PacketMetrics, PinholeMetrics, RegistryMetrics, SessionMetrics,
};

/// No-op implementation of all metrics sub-traits for use in tests.
pub struct NoopMetrics;

impl PacketMetrics for NoopMetrics {}
impl SessionMetrics for NoopMetrics {}
impl RegistryMetrics for NoopMetrics {}
impl PinholeMetrics for NoopMetrics {}
impl EventMetrics for NoopMetrics {}

/// Control plane that accepts every request and mints sequential
/// handles. For tests that only care that the call happened.
#[derive(Default)]
pub struct NoopControlPlane {
    next: AtomicU64,
}

impl ControlPlanePort for NoopControlPlane {
    fn create_auxiliary(&self, _spec: &PinholeSpec) -> Result<PinholeHandle, DomainError> {
        Ok(PinholeHandle(self.next.fetch_add(1, Ordering::SeqCst)))
    }

    fn remove_auxiliary(&self, _handle: PinholeHandle) -> Result<(), DomainError> {
        Ok(())
    }
}
