use std::any::Any;

use crate::common::entity::{Binding, BindingId, Direction, PinholeSpec, Transport};
use crate::module::registry::ModuleHandle;
use crate::translator::engine::SeqAckTranslator;

/// Per-binding instance of proxy state.
///
/// A session never outlives the binding that created it: the binding
/// holds its id, the global table holds the storage. Mutable access is
/// serialized by the table's per-session lock.
pub struct Session {
    /// Owning binding, held as identity only.
    pub binding: BindingId,
    /// Registry reference, paired with one module refcount.
    pub module: ModuleHandle,
    pub transport: Transport,
    /// Sequence/ack offset state, one tracker per flow direction.
    pub streams: [SeqAckTranslator; 2],
    /// Module-owned state, created by `on_session_create` and dropped
    /// after `on_session_destroy` returns.
    private: Option<Box<dyn Any + Send>>,
    /// Pinhole requests accumulated by hooks, drained by the dispatcher
    /// after the per-session critical section.
    pending_pinholes: Vec<PinholeSpec>,
    pub packets: u64,
    pub bytes: u64,
}

impl Session {
    pub fn new(binding: &Binding, module: ModuleHandle) -> Self {
        Self {
            binding: binding.id,
            module,
            transport: binding.transport,
            streams: [SeqAckTranslator::new(), SeqAckTranslator::new()],
            private: None,
            pending_pinholes: Vec::new(),
            packets: 0,
            bytes: 0,
        }
    }

    pub fn stream_mut(&mut self, direction: Direction) -> &mut SeqAckTranslator {
        &mut self.streams[direction.index()]
    }

    pub fn set_private<T: Any + Send>(&mut self, state: T) {
        self.private = Some(Box::new(state));
    }

    pub fn clear_private(&mut self) {
        self.private = None;
    }

    pub fn private_ref<T: Any + Send>(&self) -> Option<&T> {
        self.private.as_ref()?.downcast_ref()
    }

    pub fn private_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.private.as_mut()?.downcast_mut()
    }

    pub fn has_private(&self) -> bool {
        self.private.is_some()
    }

    /// Queue an auxiliary-binding request. Picked up by the dispatcher
    /// once the hook returns; never calls the control plane directly.
    pub fn request_pinhole(&mut self, spec: PinholeSpec) {
        self.pending_pinholes.push(spec);
    }

    pub fn take_pinholes(&mut self) -> Vec<PinholeSpec> {
        std::mem::take(&mut self.pending_pinholes)
    }

    pub fn pending_pinhole_count(&self) -> usize {
        self.pending_pinholes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::entity::{Endpoint, ModuleName};
    use crate::module::registry::ModuleRegistry;

    fn make_binding() -> Binding {
        Binding {
            id: BindingId(7),
            inside: Endpoint::new("10.0.0.5".parse().unwrap(), 40000),
            outside: Endpoint::new("203.0.113.9".parse().unwrap(), 40000),
            transport: Transport::Tcp,
            module: ModuleName::new("ftp"),
            proxy_port: 21,
        }
    }

    fn make_session() -> Session {
        Session::new(&make_binding(), mint_handle())
    }

    // ModuleHandle has no public constructor; mint one from a throwaway
    // registry.
    fn mint_handle() -> ModuleHandle {
        use crate::common::packet::Packet;
        use crate::module::entity::{ModuleInfo, Outcome, ProxyModule};
        use crate::module::error::ModuleError;

        struct Noop(ModuleInfo);
        impl ProxyModule for Noop {
            fn info(&self) -> &ModuleInfo {
                &self.0
            }
            fn on_outbound(
                &self,
                _s: &mut Session,
                _b: &Binding,
                _p: &mut Packet,
            ) -> Result<Outcome, ModuleError> {
                Ok(Outcome::Unchanged)
            }
            fn on_inbound(
                &self,
                _s: &mut Session,
                _b: &Binding,
                _p: &mut Packet,
            ) -> Result<Outcome, ModuleError> {
                Ok(Outcome::Unchanged)
            }
        }

        let mut reg = ModuleRegistry::new();
        reg.register(Box::new(Noop(ModuleInfo {
            name: ModuleName::new("ftp"),
            title: "ftp".to_string(),
            transport: Transport::Tcp,
            port: 21,
        })))
        .unwrap()
    }

    #[test]
    fn new_session_is_zeroed() {
        let session = make_session();
        assert_eq!(session.packets, 0);
        assert_eq!(session.bytes, 0);
        assert!(!session.has_private());
        assert_eq!(session.pending_pinhole_count(), 0);
        assert_eq!(session.streams[0].active_generation().offset, 0);
        assert_eq!(session.streams[1].active_generation().offset, 0);
    }

    #[test]
    fn private_data_downcast() {
        struct FtpState {
            port_pending: bool,
        }

        let mut session = make_session();
        session.set_private(FtpState { port_pending: true });
        assert!(session.private_ref::<FtpState>().unwrap().port_pending);

        session.private_mut::<FtpState>().unwrap().port_pending = false;
        assert!(!session.private_ref::<FtpState>().unwrap().port_pending);

        // Wrong type downcasts to nothing.
        assert!(session.private_ref::<u32>().is_none());

        session.clear_private();
        assert!(!session.has_private());
    }

    #[test]
    fn pinhole_outbox_drains() {
        let mut session = make_session();
        let spec = PinholeSpec {
            owner: BindingId(7),
            target: Endpoint::new("10.0.0.5".parse().unwrap(), 9000),
            module: Some(ModuleName::new("h245")),
        };
        session.request_pinhole(spec.clone());
        session.request_pinhole(spec.clone());
        assert_eq!(session.pending_pinhole_count(), 2);

        let drained = session.take_pinholes();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], spec);
        assert_eq!(session.pending_pinhole_count(), 0);
    }

    #[test]
    fn streams_are_independent_per_direction() {
        let mut session = make_session();
        session
            .stream_mut(Direction::Outbound)
            .record_rewrite(100, 10, 5);
        assert_eq!(session.stream_mut(Direction::Outbound).translate_seq(200), 205);
        assert_eq!(session.stream_mut(Direction::Inbound).translate_seq(200), 200);
    }
}
