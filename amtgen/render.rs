//! Renders a scenario history into the simulator input document: the node
//! list, the link list keyed by subnet, and one multicast route list per
//! timestamp.  Rendering is a pure function of the history; rendering the
//! same history twice yields identical documents.

use scenario::scheduler::History;
use scenario::timeline::TimelineState;
use serde::Serialize;
use topology::Topology;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkSpec {
    pub name: String,
    pub subnet: String,
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioSpec {
    pub time: f64,
    pub multicast_routes: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatorSpec {
    pub nodes: Vec<String>,
    pub links: Vec<LinkSpec>,
    pub scenarios: Vec<ScenarioSpec>,
}

pub struct ScenarioRender<'a> {
    topology: &'a Topology,
    history: &'a History,
}

impl<'a> ScenarioRender<'a> {
    pub fn new(topology: &'a Topology, history: &'a History) -> ScenarioRender<'a> {
        ScenarioRender { topology, history }
    }

    pub fn render(&self) -> SimulatorSpec {
        SimulatorSpec {
            nodes: self.topology.nodes(),
            links: self.links(),
            scenarios: self.scenarios(),
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.render())
    }

    fn links(&self) -> Vec<LinkSpec> {
        let mut links: Vec<LinkSpec> = self
            .topology
            .links()
            .map(|(left, right, link)| LinkSpec {
                name: format!("{}-{}-{}", link.subnet, left, right),
                subnet: link.subnet.clone(),
                nodes: vec![left, right],
            })
            .collect();
        links.sort_by(|a, b| a.subnet.cmp(&b.subnet).then_with(|| a.name.cmp(&b.name)));
        links
    }

    fn scenarios(&self) -> Vec<ScenarioSpec> {
        self.history
            .values()
            .map(|timeline| ScenarioSpec {
                time: timeline.time.0,
                multicast_routes: self.routes(&timeline.snapshot),
            })
            .collect()
    }

    /// One path per direct host-to-sink join, and per tunnel the
    /// upstream-to-relay segment plus one gateway-to-sink segment per bound
    /// sink.
    fn routes(&self, snapshot: &TimelineState) -> Vec<Vec<String>> {
        let mut routes = Vec::new();

        for host in snapshot.hosts.values() {
            for sink_id in &host.sinks {
                let sink = snapshot.sinks.get(sink_id);
                routes.push(self.route(&host.node, &sink.node));
            }
        }

        for tunnel in &snapshot.tunnels {
            let relay = snapshot.relays.get(&tunnel.relay_id);
            let gateway = snapshot.gateways.get(&tunnel.gateway_id);
            // the relay's immediate upstream is a host or, in a chained
            // tunnel, another gateway; the segment starts at its node
            let upstream_node = match snapshot.hosts.try_get(&relay.source_id) {
                Some(host) => host.node.clone(),
                None => snapshot.gateways.get(&relay.source_id).node.clone(),
            };
            routes.push(self.route(&upstream_node, &relay.node));
            for sink_id in &gateway.sinks {
                let sink = snapshot.sinks.get(sink_id);
                routes.push(self.route(&gateway.node, &sink.node));
            }
        }
        routes
    }

    fn route(&self, from: &str, to: &str) -> Vec<String> {
        // fallback-placed relays can sit beyond the multicast subgraph
        self.topology
            .mcast_path(from, to)
            .or_else(|| self.topology.path(from, to))
            .unwrap_or_else(|| panic!("no route between {} and {}", from, to))
    }
}
