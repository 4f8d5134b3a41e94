//! The topology provider.  It parses a scenario descriptor into a physical
//! connectivity graph, the multicast-capable view of that graph, the policy
//! objects, and the ordered application list the scenario builder consumes.

pub mod graph;
pub mod provider;

pub use crate::graph::{Link, Topology};
pub use crate::provider::{
    AppConfig, AppKind, ConfigError, HostPolicy, LinkPolicy, Provider, RelayPolicy, ScenarioPolicy,
};
