//! Entry point: logging, config, engine connection, signal handling,
//! then the Main Loop. Everything the core needs is assembled here and
//! handed to `plancton::main_loop::MainLoop`; this file owns nothing
//! the spec calls a component in its own right.

use std::process::ExitCode;

use chrono::Utc;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use plancton::config::ConfigStore;
use plancton::control_plane::FsControlPlane;
use plancton::docker::DockerClient;
use plancton::engine::live::LiveEngine;
use plancton::error::FatalError;
use plancton::host::HostProbe;
use plancton::main_loop::MainLoop;
use plancton::telemetry::build_sink;

const RUNTIME_DIR_ENV: &str = "PLANCTON_RUNTIME_DIR";
const DEFAULT_RUNTIME_DIR: &str = "/var/run/plancton";
const DOCKER_SOCKET_ENV: &str = "DOCKER_HOST";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("plancton=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    match run().await {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            tracing::error!(error = %e, "fatal error during initialisation");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run() -> Result<(), FatalError> {
    let host_probe = HostProbe::new()?;
    let ncpus = host_probe.ncpus();
    tracing::info!(ncpus, "host probe ready");

    let runtime_dir =
        std::env::var(RUNTIME_DIR_ENV).unwrap_or_else(|_| DEFAULT_RUNTIME_DIR.to_string());
    let control_plane = FsControlPlane::new(&runtime_dir)?;

    let socket_path = std::env::var(DOCKER_SOCKET_ENV).unwrap_or_default();
    let docker_client = DockerClient::connect(&socket_path).map_err(FatalError::EngineConnect)?;
    docker_client
        .system_info()
        .await
        .map_err(FatalError::EngineConnect)?;
    let engine = LiveEngine::new(docker_client);

    let config_store = ConfigStore::load(ncpus);
    let telemetry = build_sink(config_store.current().telemetry_url.as_deref());

    let mut main_loop = MainLoop::new(
        Box::new(engine),
        config_store,
        Box::new(control_plane),
        host_probe,
        telemetry,
        Utc::now(),
    );

    let mut sigterm = signal(SignalKind::terminate()).map_err(FatalError::RuntimeDir)?;
    let mut sighup = signal(SignalKind::hangup()).map_err(FatalError::RuntimeDir)?;
    let mut sigquit = signal(SignalKind::quit()).map_err(FatalError::RuntimeDir)?;

    tracing::info!("plancton main loop starting");

    while !main_loop.should_stop() {
        main_loop.run_tick(Utc::now()).await;

        let sleep_s = main_loop.main_sleep_s().max(0) as u64;
        if sleep_with_signal_poll(&mut main_loop, sleep_s, &mut sigterm, &mut sighup, &mut sigquit).await {
            break;
        }
    }

    tracing::info!("plancton exiting gracefully");
    Ok(())
}

/// Sleeps in 1-second increments, checking for termination signals and
/// `should_stop()` each second so a SIGTERM/SIGINT/SIGHUP/SIGQUIT or an
/// operator-driven stop takes effect within ≤1 s (spec.md §4.9 step 10,
/// §5's cancellation rules). Returns `true` if the loop should exit.
async fn sleep_with_signal_poll(
    main_loop: &mut MainLoop,
    sleep_s: u64,
    sigterm: &mut tokio::signal::unix::Signal,
    sighup: &mut tokio::signal::unix::Signal,
    sigquit: &mut tokio::signal::unix::Signal,
) -> bool {
    for _ in 0..sleep_s {
        if main_loop.should_stop() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received interrupt signal, stopping");
                main_loop.request_stop();
                return true;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, stopping");
                main_loop.request_stop();
                return true;
            }
            _ = sighup.recv() => {
                tracing::info!("received SIGHUP, stopping");
                main_loop.request_stop();
                return true;
            }
            _ = sigquit.recv() => {
                tracing::info!("received SIGQUIT, stopping");
                main_loop.request_stop();
                return true;
            }
        }
    }
    false
}
