//! Command-line entry point: reads a TOML scenario descriptor, runs the
//! scenario builder over it, and writes the simulator input document.

use amtgen::render::ScenarioRender;
use clap::{App, Arg};
use scenario::builder::{RelayMode, ScenarioBuilder};
use topology::Provider;

fn main() {
    env_logger::init();

    let matches = App::new("AMT Scenario Generator")
        .arg(
            Arg::with_name("meta")
                .value_name("META")
                .required(true)
                .index(1)
                .help("Input TOML scenario descriptor"),
        )
        .arg(
            Arg::with_name("out")
                .short("o")
                .long("out")
                .value_name("OUT")
                .takes_value(true)
                .help("Output YAML file; written to stdout when absent"),
        )
        .arg(
            Arg::with_name("multihop")
                .long("multihop")
                .help("Use the capacity-aware multi-hop relay selection policy"),
        )
        .get_matches();

    let meta = matches.value_of("meta").unwrap();
    let provider = match Provider::from_path(meta) {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("{}: {}", meta, err);
            std::process::exit(1);
        }
    };

    let mode = if matches.is_present("multihop") {
        RelayMode::MultiHop
    } else {
        RelayMode::SingleHop
    };
    log::info!("generating with relay mode {:?}", mode);

    let builder = ScenarioBuilder::new(&provider, mode);
    let history = builder.build();

    let render = ScenarioRender::new(&provider.topology, &history);
    let document = match render.to_yaml() {
        Ok(document) => document,
        Err(err) => {
            eprintln!("failed to serialize output: {}", err);
            std::process::exit(1);
        }
    };

    match matches.value_of("out") {
        Some(path) => {
            if let Err(err) = std::fs::write(path, &document) {
                eprintln!("failed to write {}: {}", path, err);
                std::process::exit(1);
            }
        }
        None => print!("{}", document),
    }
}
