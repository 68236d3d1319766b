// Focused sub-traits for recording proxy-layer metrics, grouped by
// concern.
//
// All methods take `&self`; implementations use interior mutability.
// Default implementations are no-ops, so test mocks only implement the
// sub-traits relevant to the service under test.

// ── Packet path ────────────────────────────────────────────────────

pub trait PacketMetrics: Send + Sync {
    /// Record a dispatched segment with module, direction, and
    /// disposition labels.
    fn record_packet(&self, _module: &str, _direction: &str, _disposition: &str) {}

    /// Record proxied payload bytes for a module and direction.
    fn record_bytes(&self, _module: &str, _direction: &str, _bytes: u64) {}

    /// Record a segment rejected by the transport checksum gate.
    fn record_checksum_failure(&self, _module: &str) {}

    /// Record a payload rewrite and its length delta.
    fn record_rewrite(&self, _module: &str, _delta: i64) {}

    /// Record a module hook failure absorbed as `Unchanged`.
    fn record_hook_failure(&self, _module: &str) {}
}

// ── Session lifecycle ──────────────────────────────────────────────

pub trait SessionMetrics: Send + Sync {
    /// Set the current number of live proxy sessions.
    fn set_sessions_active(&self, _count: u64) {}

    fn record_session_created(&self, _module: &str) {}

    fn record_session_destroyed(&self, _module: &str) {}
}

// ── Module registry ────────────────────────────────────────────────

pub trait RegistryMetrics: Send + Sync {
    /// Set the number of modules eligible for lookup.
    fn set_modules_registered(&self, _count: u64) {}

    /// Record a module removal deferred behind live sessions.
    fn record_module_removal_deferred(&self, _module: &str) {}
}

// ── Pinhole pipeline ───────────────────────────────────────────────

pub trait PinholeMetrics: Send + Sync {
    fn record_pinhole_installed(&self, _module: &str) {}

    fn record_pinhole_failed(&self, _reason: &str) {}
}

// ── Event pipeline ─────────────────────────────────────────────────

pub trait EventMetrics: Send + Sync {
    /// Record a dropped queue command with a reason label.
    fn record_event_dropped(&self, _reason: &str) {}
}

// ── Composite super-trait ──────────────────────────────────────────

/// Unified metrics port composing all proxy-layer sub-traits.
///
/// Services accept `Arc<dyn MetricsPort>` for full access; the no-op
/// defaults keep test mocks small.
pub trait MetricsPort:
    PacketMetrics + SessionMetrics + RegistryMetrics + PinholeMetrics + EventMetrics
{
}

/// Blanket implementation: any type implementing all sub-traits
/// automatically implements `MetricsPort`.
impl<T> MetricsPort for T where
    T: PacketMetrics + SessionMetrics + RegistryMetrics + PinholeMetrics + EventMetrics
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_port_is_object_safe() {
        fn _check(port: &dyn MetricsPort) {
            port.record_packet("h323", "outbound", "forward");
            port.record_bytes("h323", "outbound", 1500);
            port.record_checksum_failure("h323");
            port.record_rewrite("ftp", 11);
            port.record_hook_failure("ftp");
            port.set_sessions_active(3);
            port.record_session_created("h323");
            port.record_session_destroyed("h323");
            port.set_modules_registered(5);
            port.record_module_removal_deferred("ftp");
            port.record_pinhole_installed("h245");
            port.record_pinhole_failed("control_plane");
            port.record_event_dropped("pinhole_queue_full");
        }
    }

    /// A minimal mock only needs empty trait impls.
    #[test]
    fn minimal_mock_compiles() {
        struct MinimalMock;
        impl PacketMetrics for MinimalMock {}
        impl SessionMetrics for MinimalMock {}
        impl RegistryMetrics for MinimalMock {}
        impl PinholeMetrics for MinimalMock {}
        impl EventMetrics for MinimalMock {}

        let mock = MinimalMock;
        let port: &dyn MetricsPort = &mock;
        port.record_packet("h323", "inbound", "drop"); // no-op
    }
}
