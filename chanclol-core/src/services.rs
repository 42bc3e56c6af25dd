use std::sync::Arc;

use anyhow::Result;
use chanclol_common::ChanclolConfig;
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::commands::CommandHandler;
use crate::db::{connect_to_db, DatabaseStateStore};
use crate::gateway::{HttpStatusProvider, RequestGateway, StatusProvider};
use crate::notify::{DiscordNotificationSink, LogNotificationSink, NotificationSink};
use crate::periodic::PeriodicTask;
use crate::rate_limiting::AdmissionController;
use crate::riotapi::RiotApi;
use crate::scheduler::{Cadence, PollScheduler, Registry};
use crate::store::StateStore;

#[derive(Clone)]
pub struct Services {
    pub config: Arc<ChanclolConfig>,
    pub store: Arc<dyn StateStore>,
    pub admission: AdmissionController,
    pub riot_api: Arc<RiotApi>,
    pub registry: Arc<Mutex<Registry>>,
    pub scheduler: Arc<PollScheduler>,
    pub commands: Arc<CommandHandler>,
    pub shutdown: CancellationToken,
}

impl Services {
    pub async fn new(config: ChanclolConfig, shutdown: CancellationToken) -> Result<Self> {
        config.store.validate()?;
        let db = connect_to_db(&config).await?;
        let store = Arc::new(DatabaseStateStore::new(Arc::new(Mutex::new(db))));
        let provider = Arc::new(HttpStatusProvider::new(&config.store.riot_api)?);

        let sink: Arc<dyn NotificationSink> = match &config.store.discord.token {
            Some(token) => Arc::new(DiscordNotificationSink::new(
                &config.store.discord,
                token.clone(),
            )?),
            None => {
                info!("No discord token configured, notifications will only be logged");
                Arc::new(LogNotificationSink)
            }
        };

        Self::from_parts(config, store, provider, sink, shutdown).await
    }

    /// Wires everything around an existing store and collaborators, then
    /// loads the persisted registry.
    pub async fn from_parts(
        config: ChanclolConfig,
        store: Arc<dyn StateStore>,
        provider: Arc<dyn StatusProvider>,
        sink: Arc<dyn NotificationSink>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let admission = AdmissionController::from_config(&config.store.riot_api, shutdown.clone())?;
        let gateway = RequestGateway::new(admission.clone(), provider);

        let riot_api = Arc::new(RiotApi::new(
            &config.store.riot_api,
            gateway,
            store.clone(),
        )?);
        riot_api.load_cache().await?;

        let cadence = Cadence::from(&config.store.scheduler);
        let registry = Arc::new(Mutex::new(Registry::default()));
        let scheduler = Arc::new(PollScheduler::new(
            registry.clone(),
            riot_api.clone(),
            store.clone(),
            sink,
            cadence,
        ));
        scheduler.load().await?;

        let commands = Arc::new(CommandHandler::new(
            registry.clone(),
            riot_api.clone(),
            store.clone(),
            cadence,
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            admission,
            riot_api,
            registry,
            scheduler,
            commands,
            shutdown,
        })
    }

    /// Prunes cached identities of players nobody tracks any more
    pub fn housekeeping_task(&self) -> PeriodicTask {
        let riot_api = self.riot_api.clone();
        let registry = self.registry.clone();
        PeriodicTask::new(
            "housekeeping",
            self.config.store.scheduler.housekeeping_interval,
            move || {
                let riot_api = riot_api.clone();
                let registry = registry.clone();
                async move {
                    let keep = registry.lock().await.tracked();
                    if let Err(error) = riot_api.housekeeping(&keep).await {
                        warn!(?error, "Housekeeping failed");
                    }
                }
                .boxed()
            },
        )
    }

    /// Picks up players registered through `chanclol command` while running
    pub fn registry_sync_task(&self) -> PeriodicTask {
        let scheduler = self.scheduler.clone();
        PeriodicTask::new(
            "registry sync",
            self.config.store.scheduler.registry_sync_interval,
            move || {
                let scheduler = scheduler.clone();
                async move {
                    if let Err(error) = scheduler.sync().await {
                        warn!(?error, "Registry sync failed");
                    }
                }
                .boxed()
            },
        )
    }
}
