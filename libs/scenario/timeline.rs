//! The per-timestamp ledger of running applications and tunnels.  Every
//! mutation is a guarded contract: double registration, removal of a
//! non-member, a dangling tunnel reference or a resolution cycle is a bug in
//! the builder or a malformed scenario, and panics immediately rather than
//! being papered over.

use crate::application::{
    AppFactory, AppId, Application, GatewayApp, HostApp, RelayApp, SinkApp, Tunnel,
};
use crate::scheduler::Time;
use std::collections::{BTreeMap, BTreeSet};

/// Ordered owning map with insert-if-absent / remove-if-present semantics.
/// The single choke point for registration contracts.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    role: &'static str,
    entries: BTreeMap<AppId, T>,
}

impl<T> Registry<T> {
    pub fn new(role: &'static str) -> Registry<T> {
        Registry {
            role,
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, id: AppId, value: T) {
        if self.entries.insert(id.clone(), value).is_some() {
            panic!("{} is already a registered {}", id, self.role);
        }
    }

    pub fn remove(&mut self, id: &AppId) -> T {
        match self.entries.remove(id) {
            Some(value) => value,
            None => panic!("{} is not a registered {}", id, self.role),
        }
    }

    pub fn get(&self, id: &AppId) -> &T {
        match self.entries.get(id) {
            Some(value) => value,
            None => panic!("{} is not a registered {}", id, self.role),
        }
    }

    pub fn get_mut(&mut self, id: &AppId) -> &mut T {
        let role = self.role;
        match self.entries.get_mut(id) {
            Some(value) => value,
            None => panic!("{} is not a registered {}", id, role),
        }
    }

    pub fn try_get(&self, id: &AppId) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &AppId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The state of every running application at one instant.  Cloning it is the
/// deep copy the scheduler threads through time; snapshots never share
/// mutable structure.
#[derive(Debug, Clone)]
pub struct TimelineState {
    pub hosts: Registry<HostApp>,
    pub sinks: Registry<SinkApp>,
    pub relays: Registry<RelayApp>,
    pub gateways: Registry<GatewayApp>,
    pub tunnels: Vec<Tunnel>,
}

impl Default for TimelineState {
    fn default() -> TimelineState {
        TimelineState {
            hosts: Registry::new("host"),
            sinks: Registry::new("sink"),
            relays: Registry::new("relay"),
            gateways: Registry::new("gateway"),
            tunnels: Vec::new(),
        }
    }
}

impl TimelineState {
    pub fn schedule(&mut self, app: Application) {
        match app {
            Application::Host(host) => self.hosts.insert(host.id.clone(), host),
            Application::Sink(sink) => self.sinks.insert(sink.id.clone(), sink),
            Application::Relay(relay) => self.relays.insert(relay.id.clone(), relay),
            Application::Gateway(gateway) => self.gateways.insert(gateway.id.clone(), gateway),
        }
    }

    pub fn shutdown(&mut self, app: &Application) {
        match app {
            Application::Host(host) => {
                let live = self.hosts.get(&host.id);
                assert!(
                    live.sinks.is_empty(),
                    "{} still serves sinks {:?}",
                    host.id,
                    live.sinks
                );
                self.hosts.remove(&host.id);
            }
            Application::Sink(sink) => {
                self.sinks.remove(&sink.id);
            }
            Application::Gateway(gateway) => {
                self.gateways.remove(&gateway.id);
            }
            Application::Relay(relay) => {
                panic!("{} is torn down with its tunnel, never directly", relay.id)
            }
        }
    }

    /// Adds a sink to a host's direct-delivery set.
    pub fn join(&mut self, host_id: &AppId, sink_id: &AppId) {
        let host = self.hosts.get_mut(host_id);
        assert!(
            host.sinks.insert(sink_id.clone()),
            "{} already joined to {}",
            sink_id,
            host_id
        );
    }

    pub fn leave(&mut self, host_id: &AppId, sink_id: &AppId) {
        let host = self.hosts.get_mut(host_id);
        assert!(
            host.sinks.remove(sink_id),
            "{} never joined {}",
            sink_id,
            host_id
        );
    }

    /// Adds a sink to a gateway's served set.
    pub fn bind(&mut self, gateway_id: &AppId, sink_id: &AppId) {
        let gateway = self.gateways.get_mut(gateway_id);
        assert!(
            gateway.sinks.insert(sink_id.clone()),
            "{} already bound to {}",
            sink_id,
            gateway_id
        );
    }

    /// Removes a sink from a gateway.  When the last sink detaches, the
    /// gateway, its relay, and their tunnel are removed as one atomic step.
    pub fn unbind(&mut self, gateway_id: &AppId, sink_id: &AppId) {
        let emptied = {
            let gateway = self.gateways.get_mut(gateway_id);
            assert!(
                gateway.sinks.remove(sink_id),
                "{} is not bound to {}",
                sink_id,
                gateway_id
            );
            gateway.sinks.is_empty()
        };
        if emptied {
            let tunnel = self.take_tunnel(gateway_id);
            self.gateways.remove(gateway_id);
            self.relays.remove(&tunnel.relay_id);
            log::debug!(
                "tunnel {} -> {} -> {} released",
                tunnel.source_id,
                tunnel.relay_id,
                gateway_id
            );
        }
    }

    pub fn spawn_relay(&mut self, factory: &mut AppFactory, node: &str, source_id: AppId) -> AppId {
        let relay = factory.create_relay(node, source_id);
        let id = relay.id.clone();
        self.relays.insert(id.clone(), relay);
        id
    }

    pub fn spawn_gateway(&mut self, factory: &mut AppFactory, node: &str, relay_id: AppId) -> AppId {
        let gateway = factory.create_gateway(node, relay_id);
        let id = gateway.id.clone();
        self.gateways.insert(id.clone(), gateway);
        id
    }

    /// Registers a tunnel and binds the sink it was built for.  The entries
    /// the tunnel references must already be live.
    pub fn connect(&mut self, tunnel: Tunnel, sink_id: &AppId) {
        assert!(
            self.tunnels.iter().all(|t| t.gateway_id != tunnel.gateway_id),
            "{} already carries a tunnel",
            tunnel.gateway_id
        );
        self.hosts.get(&tunnel.source_id);
        self.relays.get(&tunnel.relay_id);
        self.bind(&tunnel.gateway_id, sink_id);
        self.tunnels.push(tunnel);
    }

    /// Looks a tunnel up by either endpoint.
    pub fn find_tunnel(&self, relay_id: Option<&AppId>, gateway_id: Option<&AppId>) -> &Tunnel {
        self.tunnels
            .iter()
            .find(|t| Some(&t.relay_id) == relay_id || Some(&t.gateway_id) == gateway_id)
            .unwrap_or_else(|| {
                panic!(
                    "no tunnel for relay {:?} / gateway {:?}",
                    relay_id.map(AppId::as_str),
                    gateway_id.map(AppId::as_str)
                )
            })
    }

    fn take_tunnel(&mut self, gateway_id: &AppId) -> Tunnel {
        let position = self
            .tunnels
            .iter()
            .position(|t| &t.gateway_id == gateway_id)
            .unwrap_or_else(|| panic!("no tunnel for gateway {}", gateway_id));
        self.tunnels.remove(position)
    }

    /// Follows a gateway's relay chain upstream to the host feeding it.
    /// The chain is finite in a well-formed ledger; a cycle or a reference
    /// to a dead entry is a contract violation.
    pub fn resolve_host(&self, gateway_id: &AppId) -> &HostApp {
        let mut visited = BTreeSet::new();
        let mut current = gateway_id.clone();
        loop {
            assert!(
                visited.insert(current.clone()),
                "upstream resolution cycles at {}",
                current
            );
            let gateway = self.gateways.get(&current);
            let relay = self.relays.get(&gateway.relay_id);
            if let Some(host) = self.hosts.try_get(&relay.source_id) {
                return host;
            }
            current = relay.source_id.clone();
        }
    }

    /// Number of tunnels whose relay sits on the given topology node.
    pub fn relay_load(&self, node: &str) -> usize {
        self.tunnels
            .iter()
            .filter(|t| self.relays.get(&t.relay_id).node == node)
            .count()
    }
}

/// All schedule/shutdown events taking effect at one timestamp.
#[derive(Debug, Clone, Default)]
pub struct TimelineAction {
    pub schedule_hosts: BTreeMap<AppId, HostApp>,
    pub schedule_sinks: BTreeMap<AppId, SinkApp>,
    pub shutdown_hosts: BTreeMap<AppId, HostApp>,
    pub shutdown_sinks: BTreeMap<AppId, SinkApp>,
}

impl TimelineAction {
    pub fn schedule(&mut self, app: Application) {
        match app {
            Application::Host(host) => {
                assert!(
                    self.schedule_hosts.insert(host.id.clone(), host).is_none(),
                    "host scheduled twice at one timestamp"
                );
            }
            Application::Sink(sink) => {
                assert!(
                    self.schedule_sinks.insert(sink.id.clone(), sink).is_none(),
                    "sink scheduled twice at one timestamp"
                );
            }
            Application::Relay(relay) => {
                panic!("{} is builder-spawned, not scheduler-driven", relay.id)
            }
            Application::Gateway(gateway) => {
                panic!("{} is builder-spawned, not scheduler-driven", gateway.id)
            }
        }
    }

    pub fn shutdown(&mut self, app: Application) {
        match app {
            Application::Host(host) => {
                assert!(
                    self.shutdown_hosts.insert(host.id.clone(), host).is_none(),
                    "host shut down twice at one timestamp"
                );
            }
            Application::Sink(sink) => {
                assert!(
                    self.shutdown_sinks.insert(sink.id.clone(), sink).is_none(),
                    "sink shut down twice at one timestamp"
                );
            }
            Application::Relay(relay) => {
                panic!("{} is builder-spawned, not scheduler-driven", relay.id)
            }
            Application::Gateway(gateway) => {
                panic!("{} is builder-spawned, not scheduler-driven", gateway.id)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.schedule_hosts.is_empty()
            && self.schedule_sinks.is_empty()
            && self.shutdown_hosts.is_empty()
            && self.shutdown_sinks.is_empty()
    }
}

/// One history entry: the action applied at `time` and the snapshot that
/// resulted from it.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub time: Time,
    pub action: TimelineAction,
    pub snapshot: TimelineState,
}
