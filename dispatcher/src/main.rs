mod cluster;
mod config;
mod shard;
mod signals;

use std::process;
use std::str::FromStr;
use std::time::{Duration, Instant};

use clap::{App, Arg};
use rtlog::{info, Level};

use cluster::Cluster;
use config::DispatcherConfig;
use shard::Shard;

fn main() {
    let matches = App::new("dispatcher")
        .arg(Arg::with_name("gid").long("gid").takes_value(true).required(true))
        .arg(Arg::with_name("configfile").long("configfile").takes_value(true))
        .arg(Arg::with_name("log").long("log").takes_value(true).default_value("info"))
        .arg(Arg::with_name("d").short("d").long("daemonize"))
        .get_matches();

    let gid: u16 = match matches.value_of("gid").and_then(|v| u16::from_str(v).ok()) {
        Some(v) if v > 0 => v,
        _ => {
            eprintln!("error: -gid must be a positive 16-bit integer");
            process::exit(1);
        }
    };

    let level = Level::from_str(matches.value_of("log").unwrap_or("info")).unwrap_or(Level::Info);
    let log = rtlog::logging::init("dispatcher", level);

    if matches.is_present("d") {
        if cfg!(windows) {
            rtlog::warn!(log, "daemonize (-d) is a no-op on windows");
        } else {
            rtlog::warn!(log, "daemonize requested; running in foreground (out of scope)");
        }
    }

    let cfg = match matches.value_of("configfile") {
        Some(path) => DispatcherConfig::load(path).unwrap_or_else(|e| {
            eprintln!("error: failed to load config {}: {}", path, e);
            process::exit(1);
        }),
        None => DispatcherConfig::default(),
    };

    let signal_state = signals::setup().expect("failed to install signal handlers");

    let bind_addr = format!("{}:{}", cfg.server.bind, cfg.server.port + gid);
    let now = Instant::now();
    let shard = Shard::new(gid, cfg.cluster.shard_count, cfg.cluster.expected_games);

    let mut cluster = Cluster::new(&bind_addr, &cfg.cluster.peers, shard, now, log.clone())
        .unwrap_or_else(|e| {
            eprintln!("error: failed to bind {}: {}", bind_addr, e);
            process::exit(1);
        });

    info!(log, "dispatcher shard started"; "shard_id" => gid, "bind" => %bind_addr);

    let mut iterations: u64 = 0;
    loop {
        if signal_state.terminating.load(std::sync::atomic::Ordering::SeqCst) {
            info!(log, "dispatcher shard terminating");
            break;
        }

        let now = Instant::now();
        if let Err(e) = cluster.sync(now) {
            rtlog::warn!(log, "sync error"; "error" => %e);
        }

        iterations += 1;
        if iterations % 100 == 0 {
            info!(log, "dispatcher tick"; "deployment_ready" => cluster.shard.deployment_ready());
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    process::exit(0);
}
