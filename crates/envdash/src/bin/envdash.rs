//! Envdash
//!
//! Polls the garage device and the weather and air-quality feeds, and serves
//! the merged snapshot as JSON.

use argh::FromArgs;
use envdash::server;
use envdash::{Config, HttpFeedClient, PollingController, TriggerReason};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(FromArgs)]
/// Envdash - garage sensor, weather and air-quality dashboard aggregator
struct Args {
    /// path to the YAML config (default: ~/.envdash/config.yaml)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// HTTP listen port, overriding the configured address
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// run one refresh cycle, print the snapshot as JSON and exit
    #[argh(switch)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    let config = Config::load(args.config.as_deref())?;
    let mut addr = config.listen_addr()?;
    if let Some(port) = args.port {
        addr.set_port(port);
    }

    let client = HttpFeedClient::new(&config.user_agent)?;
    let controller = Arc::new(PollingController::new(client, config)?);

    if args.once {
        let outcome = controller.trigger(TriggerReason::UserRefresh).await;
        return match controller.latest() {
            Some(snapshot) => {
                println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
                Ok(())
            }
            None => Err(format!("refresh failed: {:?}", outcome).into()),
        };
    }

    log::info!("Starting envdash...");

    let (shutdown_tx, shutdown_rx) = watch::channel(());

    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            shutdown_tx.send(()).ok();
        }
    })?;

    let poller = tokio::spawn(Arc::clone(&controller).run(shutdown_rx.clone()));

    server::serve(controller, addr, shutdown_rx).await?;
    poller.await?;

    log::info!("envdash stopped");
    Ok(())
}
