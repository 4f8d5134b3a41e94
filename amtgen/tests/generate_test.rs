use amtgen::render::ScenarioRender;
use assert_cmd::prelude::*;
use scenario::builder::{RelayMode, ScenarioBuilder};
use std::fs;
use std::process::Command;
use topology::Provider;

const DESCRIPTOR: &str = r#"
[topology]
west = ["host0 - relay0", "relay0 -- core"]
east = ["core -- gateway0", "gateway0 - sinkA", "gateway0 - sinkB"]

[policy.host]
size = 512
byte = 0
rate = "5Mbps"
on = 1.0
off = 0.5

[policy.relay]
max_connections = 2
mode = "multi"
max = 8

[policy.link.host-relay]
rate = "1Gbps"
delay = "1ms"

[policy.link.relay-router]
rate = "1Gbps"
delay = "1ms"

[policy.link.router-gateway]
rate = "1Gbps"
delay = "1ms"

[policy.link.gateway-sink]
rate = "100Mbps"
delay = "2ms"

[[application]]
type = "source"
node = "host0"
address = "239.0.0.1"
start = 1.0
stop = 20.0

[[application]]
type = "sink"
node = "sinkA"
address = "239.0.0.1"
start = 2.0
stop = 10.0

[[application]]
type = "sink"
node = "sinkB"
address = "239.0.0.1"
start = 4.0
stop = 15.0
"#;

#[test]
fn test_end_to_end_generation() {
    let provider = Provider::from_toml(DESCRIPTOR).unwrap();
    let history = ScenarioBuilder::new(&provider, RelayMode::MultiHop).build();
    let spec = ScenarioRender::new(&provider.topology, &history).render();

    assert_eq!(
        spec.nodes,
        vec!["core", "gateway0", "host0", "relay0", "sinkA", "sinkB"]
    );
    assert_eq!(spec.links.len(), 5);

    let times: Vec<f64> = spec.scenarios.iter().map(|s| s.time).collect();
    assert_eq!(times, vec![1.0, 2.0, 4.0, 10.0, 15.0, 20.0]);

    // sinkA tunnels at t=2; sinkB shares the gateway at t=4
    let at_two = &spec.scenarios[1];
    assert_eq!(
        at_two.multicast_routes,
        vec![
            vec!["host0".to_string(), "relay0".to_string()],
            vec!["gateway0".to_string(), "sinkA".to_string()],
        ]
    );
    let at_four = &spec.scenarios[2];
    assert_eq!(at_four.multicast_routes.len(), 3);

    // sinkA leaves at t=10, the shared tunnel stays for sinkB
    let at_ten = &spec.scenarios[3];
    assert_eq!(
        at_ten.multicast_routes,
        vec![
            vec!["host0".to_string(), "relay0".to_string()],
            vec!["gateway0".to_string(), "sinkB".to_string()],
        ]
    );

    // the last sink takes the overlay down with it
    let at_fifteen = &spec.scenarios[4];
    assert!(at_fifteen.multicast_routes.is_empty());
}

#[test]
fn test_cli_writes_output_file() {
    let dir = std::env::temp_dir();
    let config = dir.join("amtgen_cli_ok.toml");
    let out = dir.join("amtgen_cli_ok.yaml");
    fs::write(&config, DESCRIPTOR).unwrap();
    let _ = fs::remove_file(&out);

    Command::cargo_bin("amtgen")
        .unwrap()
        .arg(&config)
        .arg("-o")
        .arg(&out)
        .arg("--multihop")
        .assert()
        .success();

    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("multicast_routes"));
    assert!(text.contains("gateway0"));
}

#[test]
fn test_cli_rejects_malformed_descriptor() {
    let dir = std::env::temp_dir();
    let config = dir.join("amtgen_cli_bad.toml");
    let out = dir.join("amtgen_cli_bad.yaml");
    fs::write(&config, DESCRIPTOR.replace("\"source\"", "\"OnOff\"")).unwrap();
    let _ = fs::remove_file(&out);

    Command::cargo_bin("amtgen")
        .unwrap()
        .arg(&config)
        .arg("-o")
        .arg(&out)
        .assert()
        .failure();

    // a rejected descriptor produces no partial output
    assert!(!out.exists());
}
