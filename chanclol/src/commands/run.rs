use anyhow::Result;
use chanclol_core::scheduler::CheckOutcome;
use chanclol_core::Services;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::config::load_config;

pub(crate) async fn command(cli: &crate::Cli) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    info!(%version, "chanclol");

    let config = load_config(&cli.config)?;
    let shutdown = CancellationToken::new();
    let services = Services::new(config, shutdown.clone()).await?;

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutting down"),
                Err(error) => error!(?error, "Failed to listen for ctrl-c"),
            }
            shutdown.cancel();
        }
    });

    let mut housekeeping = services.housekeeping_task();
    let mut registry_sync = services.registry_sync_task();
    let main_cycle = services.config.store.scheduler.main_cycle;
    let mut interval = tokio::time::interval(main_cycle);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if console::user_attended() {
        info!("--------------------------------------------");
        info!("chanclol is now running.");
        let (players, guilds) = {
            let registry = services.registry.lock().await;
            (registry.players.len(), registry.guilds.len())
        };
        info!("Tracking {players} players across {guilds} guilds");
        info!("--------------------------------------------");
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                housekeeping.tick().await;
                registry_sync.tick().await;
                match services.scheduler.tick().await {
                    Ok(CheckOutcome::Checked { puuid, in_game, .. }) => {
                        debug!(%puuid, in_game, "Checked player");
                    }
                    Ok(CheckOutcome::Skipped(puuid)) => debug!(%puuid, "Check skipped"),
                    Ok(CheckOutcome::Idle) => (),
                    Err(error) => error!(?error, "Scheduler tick failed"),
                }
            }
        }
    }

    info!("Exiting");
    Ok(())
}
