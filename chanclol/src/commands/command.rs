use anyhow::Result;
use chanclol_common::{ChannelId, GuildId};
use chanclol_core::Services;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::load_config;

pub(crate) async fn command(
    cli: &crate::Cli,
    guild: &str,
    channel: &str,
    message: &str,
) -> Result<()> {
    let config = load_config(&cli.config)?;
    let services = Services::new(config, CancellationToken::new()).await?;
    debug!(
        sync_interval = ?services.config.store.scheduler.registry_sync_interval,
        "Quota accounting is per process, a running instance sees these changes after its next registry sync"
    );

    let responses = services
        .commands
        .handle_message(&GuildId::from(guild), &ChannelId::from(channel), message)
        .await?;

    for response in responses {
        println!("{response}");
    }
    Ok(())
}
