use domain::common::entity::PinholeSpec;
use domain::common::error::DomainError;

/// Handle to an auxiliary binding held by the NAT control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinholeHandle(pub u64);

/// Secondary port to the embedding NAT engine's control plane.
///
/// Implementations add and remove auxiliary bindings ("pinholes") in the
/// engine's translation table. The proxy core reaches this port only
/// from the pinhole pipeline worker, never from the packet path, which
/// would reenter the engine's table lock.
///
/// Implemented by the embedding firewall/NAT engine.
pub trait ControlPlanePort: Send + Sync {
    /// Create an auxiliary binding redirecting traffic for
    /// `spec.target`, routed through `spec.module` when one is named.
    /// Must be idempotent for identical specs.
    fn create_auxiliary(&self, spec: &PinholeSpec) -> Result<PinholeHandle, DomainError>;

    /// Remove a previously created auxiliary binding.
    fn remove_auxiliary(&self, handle: PinholeHandle) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_plane_port_is_object_safe() {
        fn _check(port: &dyn ControlPlanePort) {
            let _ = port.remove_auxiliary(PinholeHandle(0));
        }
    }
}
