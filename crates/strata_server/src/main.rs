mod config;
mod net;
mod physics;
mod registry;
mod router;
mod server;
mod session;
mod view;
mod world;

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use config::ServerConfig;
use server::ServerState;

fn parse_value<T: FromStr>(flag: &str, args: &mut impl Iterator<Item = String>) -> T
where
    T::Err: std::fmt::Display,
{
    let Some(value) = args.next() else {
        eprintln!("{flag} expects an argument");
        std::process::exit(2);
    };
    match value.parse::<T>() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("invalid value '{value}' for {flag}: {err}");
            std::process::exit(2);
        }
    }
}

fn parse_args() -> ServerConfig {
    let mut config = ServerConfig::default();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--host" => config.host = parse_value("--host", &mut args),
            "--port" => config.port = parse_value("--port", &mut args),
            "--seed" => config.seed = parse_value("--seed", &mut args),
            "--size" => config.world_size = parse_value("--size", &mut args),
            "--tick-rate" => config.tick_rate = parse_value("--tick-rate", &mut args),
            "--max-speed" => config.max_speed = parse_value("--max-speed", &mut args),
            "--session-ttl" => {
                config.session_ttl = Duration::from_secs(parse_value("--session-ttl", &mut args));
            }
            "--help" | "-h" => {
                println!(
                    "Usage: strata_server [--host <addr>] [--port <u16>] [--seed <u64>] \
                     [--size <blocks>] [--tick-rate <hz>] [--max-speed <blocks/s>] \
                     [--session-ttl <secs>]"
                );
                std::process::exit(0);
            }
            other => {
                eprintln!("unknown argument: {other}");
                std::process::exit(2);
            }
        }
    }

    config
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();

    let config = parse_args();
    let state = match ServerState::shared(config) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("failed to initialize world: {err}");
            std::process::exit(1);
        }
    };

    tokio::spawn(server::run_physics_loop(state.clone()));

    tokio::select! {
        result = net::run(state) => {
            if let Err(err) = result {
                eprintln!("server failed: {err}");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }
}
