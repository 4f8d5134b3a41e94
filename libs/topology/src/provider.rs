//! Parses the TOML scenario descriptor.  A descriptor has three sections: a
//! topology (node chains joined by ` - ` for multicast-enabled links and
//! ` -- ` for multicast-disabled ones), a policy block, and the application
//! list.  Everything is validated here, before the simulation starts; a
//! malformed descriptor never produces partial output.

use crate::graph::{Link, Topology};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("descriptor is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required section `{0}`")]
    MissingSection(&'static str),
    #[error("malformed topology chain `{0}`")]
    MalformedChain(String),
    #[error("malformed link policy key `{0}` (expected `<type>-<type>`)")]
    MalformedLinkKey(String),
    #[error("no link policy for node types `{0}-{1}`")]
    MissingLinkPolicy(String, String),
    #[error("unknown application type `{0}` (expected `source` or `sink`)")]
    UnknownAppType(String),
    #[error("application references unknown node `{0}`")]
    UnknownNode(String),
}

/// Traffic shape of every host application.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostPolicy {
    pub size: u32,
    pub byte: u64,
    pub rate: String,
    pub on: f64,
    pub off: f64,
}

/// Relay admission policy.  `max_connections` bounds the number of tunnels
/// whose relay sits on one topology node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelayPolicy {
    pub max_connections: usize,
    pub mode: String,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinkPolicy {
    pub rate: String,
    pub delay: String,
}

#[derive(Debug, Clone)]
pub struct ScenarioPolicy {
    pub host: HostPolicy,
    pub relay: RelayPolicy,
    pub link: BTreeMap<(String, String), LinkPolicy>,
}

impl ScenarioPolicy {
    pub fn link_policy(&self, left: &str, right: &str) -> Option<&LinkPolicy> {
        self.link.get(&(left.to_string(), right.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppKind {
    Source,
    Sink,
}

/// One application lifecycle entry from the descriptor.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub kind: AppKind,
    pub node: String,
    pub address: String,
    pub start: f64,
    pub stop: f64,
}

/// The parsed descriptor bundle, read-only to the scheduler and builder.
#[derive(Debug, Clone)]
pub struct Provider {
    pub topology: Topology,
    pub policy: ScenarioPolicy,
    pub applications: Vec<AppConfig>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    topology: Option<BTreeMap<String, Vec<String>>>,
    policy: Option<RawPolicy>,
    application: Option<Vec<RawApp>>,
}

#[derive(Debug, Deserialize)]
struct RawPolicy {
    host: HostPolicy,
    relay: RelayPolicy,
    link: BTreeMap<String, LinkPolicy>,
}

#[derive(Debug, Deserialize)]
struct RawApp {
    #[serde(rename = "type")]
    kind: String,
    node: String,
    address: String,
    start: f64,
    stop: f64,
}

impl Provider {
    pub fn from_path(path: &str) -> Result<Provider, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Provider::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Provider, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        let policy = build_policy(raw.policy.ok_or(ConfigError::MissingSection("policy"))?)?;
        let sections = raw.topology.ok_or(ConfigError::MissingSection("topology"))?;
        let topology = build_topology(&sections, &policy)?;
        let raw_apps = raw
            .application
            .ok_or(ConfigError::MissingSection("application"))?;
        let applications = build_applications(raw_apps, &topology)?;
        log::debug!(
            "descriptor parsed: {} nodes, {} applications",
            topology.nodes().len(),
            applications.len()
        );
        Ok(Provider {
            topology,
            policy,
            applications,
        })
    }
}

fn build_policy(raw: RawPolicy) -> Result<ScenarioPolicy, ConfigError> {
    let mut link = BTreeMap::new();
    for (key, policy) in raw.link {
        let parts: Vec<&str> = key.split('-').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(ConfigError::MalformedLinkKey(key));
        }
        link.insert((parts[0].to_string(), parts[1].to_string()), policy.clone());
        link.insert((parts[1].to_string(), parts[0].to_string()), policy);
    }
    Ok(ScenarioPolicy {
        host: raw.host,
        relay: raw.relay,
        link,
    })
}

fn build_topology(
    sections: &BTreeMap<String, Vec<String>>,
    policy: &ScenarioPolicy,
) -> Result<Topology, ConfigError> {
    // ` -- ` must come first so it is not consumed as ` - `
    let separator = Regex::new(r" -- | - ").unwrap();
    let mut topology = Topology::default();

    for (j, chains) in sections.values().enumerate() {
        for (k, chain) in chains.iter().enumerate() {
            let tokens = tokenize_chain(&separator, chain)?;
            for (i, index) in (0..tokens.len() - 2).step_by(2).enumerate() {
                let left = tokens[index];
                let right = tokens[index + 2];
                let edge = tokens[index + 1];
                let link_policy = policy
                    .link_policy(node_type(left), node_type(right))
                    .ok_or_else(|| {
                        ConfigError::MissingLinkPolicy(
                            node_type(left).to_string(),
                            node_type(right).to_string(),
                        )
                    })?;
                topology.add_link(
                    left,
                    right,
                    Link {
                        multicast: edge == " - ",
                        subnet: format!("{}.{}.{}.0", 10 + k, 10 + j, i + 1),
                        rate: link_policy.rate.clone(),
                        delay: link_policy.delay.clone(),
                    },
                );
            }
        }
    }
    Ok(topology)
}

/// Splits a chain into alternating node and separator tokens.
fn tokenize_chain<'a>(
    separator: &Regex,
    chain: &'a str,
) -> Result<Vec<&'a str>, ConfigError> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for found in separator.find_iter(chain) {
        tokens.push(&chain[last..found.start()]);
        tokens.push(found.as_str());
        last = found.end();
    }
    tokens.push(&chain[last..]);

    let well_formed = tokens.len() >= 3
        && tokens.len() % 2 == 1
        && tokens.iter().step_by(2).all(|node| !node.is_empty());
    if !well_formed {
        return Err(ConfigError::MalformedChain(chain.to_string()));
    }
    Ok(tokens)
}

fn node_type(node: &str) -> &'static str {
    for kind in &["host", "sink", "relay", "gateway"] {
        if node.starts_with(kind) {
            return kind;
        }
    }
    "router"
}

fn build_applications(
    raw: Vec<RawApp>,
    topology: &Topology,
) -> Result<Vec<AppConfig>, ConfigError> {
    raw.into_iter()
        .map(|app| {
            let kind = match app.kind.as_str() {
                "source" => AppKind::Source,
                "sink" => AppKind::Sink,
                other => return Err(ConfigError::UnknownAppType(other.to_string())),
            };
            if !topology.contains(&app.node) {
                return Err(ConfigError::UnknownNode(app.node));
            }
            Ok(AppConfig {
                kind,
                node: app.node,
                address: app.address,
                start: app.start,
                stop: app.stop,
            })
        })
        .collect()
}
