#![no_main]

use libfuzzer_sys::fuzz_target;

use domain::common::entity::{Binding, BindingId, Endpoint, ModuleName, Transport};
use domain::common::packet::Packet;
use domain::module::entity::{ModuleInfo, Outcome, ProxyModule};
use domain::module::error::ModuleError;
use domain::module::registry::ModuleRegistry;
use domain::session::entity::Session;
use domain::session::table::{SessionId, SessionTable};

struct PassThrough(ModuleInfo);

impl ProxyModule for PassThrough {
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

fn make_binding(id: u64) -> Binding {
    Binding {
        id: BindingId(id),
        inside: Endpoint::new("10.0.0.1".parse().unwrap(), 40000),
        outside: Endpoint::new("203.0.113.9".parse().unwrap(), 40000),
        transport: Transport::Tcp,
        module: ModuleName::new("pass"),
        proxy_port: 21,
    }
}

// Fuzz the session table lifecycle under arbitrary create/destroy/lookup
// sequences keyed on small binding ids, checking arena consistency.
//
// Layout: chunks of 2 bytes: [op, binding_id].
fuzz_target!(|data: &[u8]| {
    let mut registry = ModuleRegistry::new();
    registry
        .register(Box::new(PassThrough(ModuleInfo {
            name: ModuleName::new("pass"),
            title: "pass".to_string(),
            transport: Transport::Tcp,
            port: 21,
        })))
        .expect("register");

    let mut table = SessionTable::new().with_capacity_limit(64);
    let mut live: Vec<(u64, SessionId)> = Vec::new();

    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        let binding_id = u64::from(chunk[1] % 16);
        match chunk[0] % 4 {
            0 => {
                let had_session = table.lookup(BindingId(binding_id)).is_some();
                match table.create(&make_binding(binding_id), &mut registry) {
                    Ok(id) => {
                        assert!(!had_session, "create must fail for an attached binding");
                        live.push((binding_id, id));
                    }
                    Err(_) => {
                        assert!(
                            had_session || table.len() >= 64,
                            "create may only fail when attached or full"
                        );
                    }
                }
            }
            1 => {
                if let Some(pos) = live.iter().position(|(b, _)| *b == binding_id) {
                    let (_, id) = live.swap_remove(pos);
                    table.destroy(id, &mut registry).expect("destroy live session");
                    // Destroying again must be rejected, never double-run.
                    assert!(table.destroy(id, &mut registry).is_err());
                }
            }
            2 => {
                let expected = live.iter().any(|(b, _)| *b == binding_id);
                assert_eq!(table.lookup(BindingId(binding_id)).is_some(), expected);
            }
            _ => {
                assert_eq!(table.len(), live.len());
                assert_eq!(table.iter().count(), live.len());
            }
        }
    }

    // Sweep: everything tears down, the module reference count drains.
    let owners = table.destroy_all(&mut registry);
    assert_eq!(owners.len(), live.len());
    assert!(table.is_empty());
});
