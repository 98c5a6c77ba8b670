//! Gatekeeper scenario harness
//!
//! Replays a JSON scenario (topology, endpoint attachments, packet trace)
//! through the gatekeeper core against an in-memory data plane, logging the
//! verdict for every packet. With `--stdin`, keeps reading packet events as
//! JSON lines until EOF or a termination signal, which makes it usable as
//! an interactive probe:
//!
//! ```text
//! gate-sim --scenario demo.json
//! gate-sim --scenario topo.json --stdin < trace.jsonl
//! ```

use std::fs::File;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flow_gate::{ApplicationId, GateConfig, Gatekeeper, PlatformServices};

mod scenario;
mod sim;

use scenario::{PacketSpec, Scenario};
use sim::SimPlatform;

/// Application identity the harness registers rules and paths under
const APP_ID: &str = "gate-sim";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    // --scenario <path>  JSON scenario to replay
    // --config <path>    gate configuration (JSON, optional)
    // --stdin            read further packet events from stdin, one JSON
    //                    object per line

    let scenario_path = parse_arg(&args, "--scenario");
    let config_path = parse_arg(&args, "--config");
    let stdin_mode = args.iter().any(|arg| arg == "--stdin");

    if scenario_path.is_none() && !stdin_mode {
        eprintln!("usage: gate-sim [--scenario <file>] [--config <file>] [--stdin]");
        return Err("nothing to replay: give --scenario and/or --stdin".into());
    }

    let config = match &config_path {
        Some(path) => serde_json::from_reader(File::open(path)?)?,
        None => GateConfig::default(),
    };

    let scenario = match &scenario_path {
        Some(path) => Scenario::from_reader(File::open(path)?)?,
        None => Scenario::default(),
    };

    log::info!("gate-sim starting");
    log::info!("  scenario: {}", scenario_path.as_deref().unwrap_or("(none)"));
    log::info!("  config:   {}", config_path.as_deref().unwrap_or("(defaults)"));
    log::info!(
        "  network:  {} endpoints, {} broadcast points, {} preset paths",
        scenario.endpoints.len(),
        scenario.broadcast_points.len(),
        scenario.preset_paths.len(),
    );

    let app = ApplicationId::new(APP_ID);
    let platform = Arc::new(SimPlatform::from_scenario(&app, &scenario));
    let services = PlatformServices {
        paths: platform.clone(),
        rules: platform.clone(),
        topology: platform.clone(),
        endpoints: platform.clone(),
        packets: platform.clone(),
    };
    let gate = Gatekeeper::new(app, config, services)?;

    for (index, spec) in scenario.packets.iter().enumerate() {
        replay_packet(&gate, index, spec);
    }

    if stdin_mode {
        stream_stdin(&gate, scenario.packets.len())?;
    }

    platform.log_summary();
    Ok(())
}

/// Feed one packet spec through the gate and log its verdict.
fn replay_packet(gate: &Gatekeeper, index: usize, spec: &PacketSpec) {
    let mut event = spec.to_event();
    let verdict = gate.process(&mut event);
    log::info!(
        "packet {:>3}: {} -> {} at {}: {}",
        index,
        event.src,
        event.dst,
        event.ingress,
        verdict,
    );
}

/// Read JSON packet events from stdin until EOF or SIGINT/SIGTERM.
fn stream_stdin(gate: &Gatekeeper, start_index: usize) -> io::Result<()> {
    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, term.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, term.clone())?;

    log::info!("reading packet events from stdin (one JSON object per line)");

    let stdin = io::stdin();
    let mut index = start_index;
    for line in stdin.lock().lines() {
        if term.load(Ordering::Relaxed) {
            log::info!("termination signal received, stopping");
            break;
        }

        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<PacketSpec>(&line) {
            Ok(spec) => {
                replay_packet(gate, index, &spec);
                index += 1;
            }
            Err(err) => log::warn!("skipping malformed packet event: {}", err),
        }
    }

    Ok(())
}

fn parse_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
