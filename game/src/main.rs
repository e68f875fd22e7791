mod call;
mod config;
mod freeze;
mod lbc;
mod persistence;
mod reconcile;
mod service;
mod signals;
mod storage_backend;

use std::process;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use clap::{App, Arg};
use rtlog::{info, warn, Level};

use config::GameConfig;
use service::GameService;
use storage_backend::FileEntityStore;

const LBC_INTERVAL: Duration = Duration::from_secs(5);

fn main() {
    let matches = App::new("game")
        .arg(Arg::with_name("gid").long("gid").takes_value(true).required(true))
        .arg(Arg::with_name("configfile").long("configfile").takes_value(true))
        .arg(Arg::with_name("log").long("log").takes_value(true).default_value("info"))
        .arg(Arg::with_name("d").short("d").long("daemonize"))
        .arg(Arg::with_name("restore").long("restore"))
        .get_matches();

    let gid: u16 = match matches.value_of("gid").and_then(|v| u16::from_str(v).ok()) {
        Some(v) if v > 0 => v,
        _ => {
            eprintln!("error: -gid must be a positive 16-bit integer");
            process::exit(1);
        }
    };

    let level = Level::from_str(matches.value_of("log").unwrap_or("info")).unwrap_or(Level::Info);
    let log = rtlog::logging::init("game", level);

    if matches.is_present("d") {
        if cfg!(windows) {
            warn!(log, "daemonize (-d) is a no-op on windows");
        } else {
            warn!(log, "daemonize requested; running in foreground (out of scope)");
        }
    }

    let cfg = match matches.value_of("configfile") {
        Some(path) => GameConfig::load(path).unwrap_or_else(|e| {
            eprintln!("error: failed to load config {}: {}", path, e);
            process::exit(1);
        }),
        None => GameConfig::default(),
    };

    let signal_state = signals::setup().expect("failed to install signal handlers");

    let now = Instant::now();
    let storage_root = std::path::PathBuf::from(&cfg.game.freeze_dir).join("storage");
    let storage = Box::new(FileEntityStore::new(storage_root));
    let freeze_dir = std::path::PathBuf::from(&cfg.game.freeze_dir);
    let save_interval = Duration::from_secs(cfg.game.save_interval_secs);

    let mut service = GameService::new(
        gid,
        &cfg.dispatcher.shard_addrs,
        freeze_dir.clone(),
        save_interval,
        LBC_INTERVAL,
        storage,
        log.clone(),
        now,
    );

    for entity_type in &cfg.game.entity_types {
        let name: &'static str = Box::leak(entity_type.name.clone().into_boxed_str());
        if entity_type.service {
            service.register_service_type(name, entity_type.persistent);
        } else {
            service.register_type(name, entity_type.persistent);
        }
    }

    if matches.is_present("restore") {
        let path = freeze_dir.join(format!("game{}.freeze", gid));
        match service.restore_from_file(&path) {
            Ok(count) => info!(log, "restore complete"; "entities" => count),
            Err(e) => {
                eprintln!("error: failed to restore from {}: {}", path.display(), e);
                process::exit(1);
            }
        }
    }

    service.begin_running();
    info!(log, "game started"; "gid" => gid);

    let mut iterations: u64 = 0;
    loop {
        let now = Instant::now();

        if signal_state.freezing.swap(false, Ordering::SeqCst) {
            info!(log, "freeze requested");
            service.request_freeze();
        }
        if signal_state.terminating.load(Ordering::SeqCst) {
            service.request_terminate();
        }

        service.tick(now);

        if service.is_terminated() {
            info!(log, "game exiting"; "state" => ?service.state());
            break;
        }

        iterations += 1;
        if iterations % 100 == 0 {
            info!(log, "game tick"; "state" => ?service.state());
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    process::exit(0);
}
