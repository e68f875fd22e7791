mod client_proxy;
mod config;
mod service;
mod signals;

use std::process;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use clap::{App, Arg};
use rtlog::{info, warn, Level};

use config::GateConfig;
use service::GateService;

fn main() {
    let matches = App::new("gate")
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
    let log = rtlog::logging::init("gate", level);

    if matches.is_present("d") {
        if cfg!(windows) {
            warn!(log, "daemonize (-d) is a no-op on windows");
        } else {
            warn!(log, "daemonize requested; running in foreground (out of scope)");
        }
    }

    let cfg = match matches.value_of("configfile") {
        Some(path) => GateConfig::load(path).unwrap_or_else(|e| {
            eprintln!("error: failed to load config {}: {}", path, e);
            process::exit(1);
        }),
        None => GateConfig::default(),
    };

    let signal_state = signals::setup().expect("failed to install signal handlers");

    let now = Instant::now();
    let bind_addr = format!("{}:{}", cfg.server.bind, cfg.server.port);
    let heart_interval = Duration::from_secs(cfg.gate.heart_interval_secs);

    let mut service = match GateService::new(gid, &bind_addr, &cfg.dispatcher.shard_addrs, heart_interval, log.clone(), now) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("error: failed to bind {}: {}", bind_addr, e);
            process::exit(1);
        }
    };

    info!(log, "gate started"; "gid" => gid, "bind" => %bind_addr);

    let mut iterations: u64 = 0;
    loop {
        let now = Instant::now();

        if signal_state.terminating.load(Ordering::SeqCst) {
            service.request_terminate();
        }

        if service.dispatcher_cluster_lost() {
            warn!(log, "lost every dispatcher shard connection; gate has no entity state to preserve, exiting");
            process::exit(1);
        }

        service.tick(now);

        if service.is_terminated() {
            info!(log, "gate exiting");
            break;
        }

        iterations += 1;
        if iterations % 100 == 0 {
            info!(log, "gate tick");
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    process::exit(0);
}
