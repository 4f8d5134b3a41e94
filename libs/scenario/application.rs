//! Application identities and the factory that mints them.  Every entity id
//! is `<role>#<n>` from a per-role counter owned by the factory; ids are
//! never reused within a run.

use std::collections::BTreeSet;
use std::fmt;

/// Opaque unique token identifying one application for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppId(String);

impl AppId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A traffic source.  `sinks` lists the sinks it delivers to directly,
/// without a tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostApp {
    pub id: AppId,
    pub node: String,
    pub address: String,
    pub sinks: BTreeSet<AppId>,
}

/// A traffic receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkApp {
    pub id: AppId,
    pub node: String,
    pub address: String,
}

/// An AMT relay.  `source_id` is its immediate upstream, a host or a
/// gateway; chains of gateways form multi-hop tunnels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayApp {
    pub id: AppId,
    pub node: String,
    pub source_id: AppId,
}

/// An AMT gateway, serving one or more sinks through its one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayApp {
    pub id: AppId,
    pub node: String,
    pub relay_id: AppId,
    pub sinks: BTreeSet<AppId>,
}

/// One active AMT path.  `source_id` is the relay's ultimate upstream host,
/// resolved through any gateway chain at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunnel {
    pub source_id: AppId,
    pub relay_id: AppId,
    pub gateway_id: AppId,
}

/// The closed set of application kinds the timeline ledger manages.
#[derive(Debug, Clone)]
pub enum Application {
    Host(HostApp),
    Sink(SinkApp),
    Relay(RelayApp),
    Gateway(GatewayApp),
}

impl Application {
    pub fn id(&self) -> &AppId {
        match self {
            Application::Host(host) => &host.id,
            Application::Sink(sink) => &sink.id,
            Application::Relay(relay) => &relay.id,
            Application::Gateway(gateway) => &gateway.id,
        }
    }

    pub fn node(&self) -> &str {
        match self {
            Application::Host(host) => &host.node,
            Application::Sink(sink) => &sink.node,
            Application::Relay(relay) => &relay.node,
            Application::Gateway(gateway) => &gateway.node,
        }
    }
}

/// Allocates ids and constructs applications.  Owned by the scheduler and
/// lent to the builder; there is no ambient global counter.
#[derive(Debug, Default)]
pub struct AppFactory {
    hosts: u64,
    sinks: u64,
    relays: u64,
    gateways: u64,
}

impl AppFactory {
    pub fn new() -> AppFactory {
        AppFactory::default()
    }

    pub fn create_host(&mut self, node: &str, address: &str) -> HostApp {
        self.hosts += 1;
        HostApp {
            id: AppId(format!("host#{}", self.hosts)),
            node: node.to_string(),
            address: address.to_string(),
            sinks: BTreeSet::new(),
        }
    }

    pub fn create_sink(&mut self, node: &str, address: &str) -> SinkApp {
        self.sinks += 1;
        SinkApp {
            id: AppId(format!("sink#{}", self.sinks)),
            node: node.to_string(),
            address: address.to_string(),
        }
    }

    pub fn create_relay(&mut self, node: &str, source_id: AppId) -> RelayApp {
        self.relays += 1;
        RelayApp {
            id: AppId(format!("relay#{}", self.relays)),
            node: node.to_string(),
            source_id,
        }
    }

    pub fn create_gateway(&mut self, node: &str, relay_id: AppId) -> GatewayApp {
        self.gateways += 1;
        GatewayApp {
            id: AppId(format!("gateway#{}", self.gateways)),
            node: node.to_string(),
            relay_id,
            sinks: BTreeSet::new(),
        }
    }

    /// Tunnels carry no id of their own; they are looked up through the
    /// relay or gateway they bind.
    pub fn create_tunnel(&self, source_id: AppId, relay_id: AppId, gateway_id: AppId) -> Tunnel {
        Tunnel {
            source_id,
            relay_id,
            gateway_id,
        }
    }
}
