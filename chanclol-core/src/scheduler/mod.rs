mod guild;
mod player;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chanclol_common::{ChanclolError, ChannelId, GuildId, Puuid};
use chrono::{DateTime, Utc};
pub use guild::Guild;
pub use player::{Cadence, Mode, Player};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::*;

use crate::notify::{GameNotification, NotificationSink};
use crate::riotapi::{RiotApi, Spectator, SpectatorOutcome};
use crate::store::StateStore;
use crate::timer::Readiness;

/// Every tracked player and every guild, keyed by id
#[derive(Debug, Default)]
pub struct Registry {
    pub players: BTreeMap<Puuid, Player>,
    pub guilds: HashMap<GuildId, Guild>,
}

impl Registry {
    /// The most overdue player. Ties go to the lowest puuid.
    pub fn select_next(&self, now: Instant) -> Option<Puuid> {
        let mut best: Option<(&Puuid, std::time::Duration)> = None;
        for (puuid, player) in &self.players {
            if let Readiness::Overdue(overdue) = player.due_at(now) {
                if best.map_or(true, |(_, most)| overdue > most) {
                    best = Some((puuid, overdue));
                }
            }
        }
        best.map(|(puuid, _)| puuid.clone())
    }

    pub fn tracked(&self) -> HashSet<Puuid> {
        self.players.keys().cloned().collect()
    }

    pub fn is_tracked_by_any_guild(&self, puuid: &Puuid) -> bool {
        self.guilds.values().any(|guild| guild.has_player(puuid))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Nobody was due
    Idle,
    /// A player was due but the request was not made, it stays due
    Skipped(Puuid),
    Checked {
        puuid: Puuid,
        in_game: bool,
        mode: Mode,
        notified: usize,
    },
}

struct CheckInFlight<'a> {
    slot: &'a std::sync::Mutex<Option<Puuid>>,
}

impl Drop for CheckInFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

/// Picks at most one due player per tick and checks whether they are in game.
pub struct PollScheduler {
    registry: Arc<Mutex<Registry>>,
    riot_api: Arc<RiotApi>,
    store: Arc<dyn StateStore>,
    sink: Arc<dyn NotificationSink>,
    cadence: Cadence,
    in_flight: std::sync::Mutex<Option<Puuid>>,
}

impl PollScheduler {
    pub fn new(
        registry: Arc<Mutex<Registry>>,
        riot_api: Arc<RiotApi>,
        store: Arc<dyn StateStore>,
        sink: Arc<dyn NotificationSink>,
        cadence: Cadence,
    ) -> Self {
        Self {
            registry,
            riot_api,
            store,
            sink,
            cadence,
            in_flight: std::sync::Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<Mutex<Registry>> {
        &self.registry
    }

    pub fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    /// Replaces the registry contents with the persisted state.
    pub async fn load(&self) -> Result<(), ChanclolError> {
        let players = self.store.load_players().await?;
        let guilds = self.store.load_guilds().await?;

        let mut registry = self.registry.lock().await;
        registry.players = players
            .into_iter()
            .map(|snapshot| (snapshot.puuid.clone(), Player::restore(snapshot, &self.cadence)))
            .collect();
        registry.guilds = guilds
            .into_iter()
            .map(|snapshot| (snapshot.id.clone(), Guild::from(snapshot)))
            .collect();

        let orphans = registry
            .guilds
            .values()
            .flat_map(|guild| guild.players())
            .filter(|puuid| !registry.players.contains_key(*puuid))
            .cloned()
            .collect::<Vec<_>>();
        for puuid in orphans {
            warn!(%puuid, "Guild member has no stored state, starting it offline");
            let player = Player::new(puuid.clone(), &self.cadence);
            registry.players.insert(puuid, player);
        }

        info!(
            players = registry.players.len(),
            guilds = registry.guilds.len(),
            "Loaded registry"
        );
        Ok(())
    }

    /// Reconciles the registry with the store, picking up registrations made
    /// by other processes. Players already known keep their timers.
    pub async fn sync(&self) -> Result<(), ChanclolError> {
        let players = self.store.load_players().await?;
        let guilds = self.store.load_guilds().await?;

        let mut stored = players
            .into_iter()
            .map(|snapshot| (snapshot.puuid.clone(), snapshot))
            .collect::<BTreeMap<_, _>>();
        let wanted = guilds
            .iter()
            .flat_map(|guild| guild.last_informed.keys())
            .chain(stored.keys())
            .cloned()
            .collect::<HashSet<_>>();

        let mut registry = self.registry.lock().await;
        let before = registry.players.len();
        registry.players.retain(|puuid, _| wanted.contains(puuid));
        let removed = before - registry.players.len();

        let mut added = 0;
        for puuid in wanted {
            if registry.players.contains_key(&puuid) {
                continue;
            }
            let player = match stored.remove(&puuid) {
                Some(snapshot) => Player::resume(snapshot, &self.cadence),
                None => Player::new(puuid.clone(), &self.cadence),
            };
            registry.players.insert(puuid, player);
            added += 1;
        }

        let guild_ids = guilds.iter().map(|g| g.id.clone()).collect::<HashSet<_>>();
        registry.guilds.retain(|id, _| guild_ids.contains(id));
        for snapshot in guilds {
            match registry.guilds.get_mut(&snapshot.id) {
                Some(guild) => guild.merge(snapshot),
                None => {
                    registry.guilds.insert(snapshot.id.clone(), Guild::from(snapshot));
                }
            }
        }

        if added > 0 || removed > 0 {
            info!(added, removed, "Synchronized registry with the store");
        }
        Ok(())
    }

    fn begin_check(&self, puuid: &Puuid) -> Result<CheckInFlight<'_>, ChanclolError> {
        let mut slot = self.in_flight.lock()?;
        if let Some(current) = slot.as_ref() {
            return Err(ChanclolError::InconsistentState(format!(
                "check of {puuid} started while {current} is still in flight"
            )));
        }
        *slot = Some(puuid.clone());
        Ok(CheckInFlight {
            slot: &self.in_flight,
        })
    }

    pub async fn tick(&self) -> Result<CheckOutcome, ChanclolError> {
        let next = self.registry.lock().await.select_next(Instant::now());
        let Some(puuid) = next else {
            return Ok(CheckOutcome::Idle);
        };
        let _in_flight = self.begin_check(&puuid)?;

        let spectator = match self.riot_api.spectator(&puuid).await {
            Ok(SpectatorOutcome::InGame(spectator)) => Some(spectator),
            Ok(SpectatorOutcome::NotInGame) => None,
            Ok(SpectatorOutcome::Skipped) => {
                debug!(%puuid, "Check skipped");
                return Ok(CheckOutcome::Skipped(puuid));
            }
            Err(error) => {
                warn!(%puuid, ?error, "Check failed, treating player as not in game");
                None
            }
        };

        self.apply_check(&puuid, spectator, Utc::now()).await
    }

    async fn apply_check(
        &self,
        puuid: &Puuid,
        spectator: Option<Spectator>,
        now: DateTime<Utc>,
    ) -> Result<CheckOutcome, ChanclolError> {
        let in_game = spectator.is_some();
        let (mode, changed, snapshot, to_inform) = {
            let mut registry = self.registry.lock().await;
            let Some(player) = registry.players.get_mut(puuid) else {
                debug!(%puuid, "Player was unregistered during the check");
                return Ok(CheckOutcome::Idle);
            };
            let changed = player.record_check(in_game, now, &self.cadence);
            // last_seen_online moves on every sighting and must survive a restart
            let snapshot = (changed || in_game).then(|| player.snapshot());
            let mode = player.mode();

            let mut to_inform: Vec<(GuildId, ChannelId)> = vec![];
            if let Some(spectator) = &spectator {
                for guild in registry.guilds.values_mut() {
                    if guild.should_inform(puuid, spectator.game_id) {
                        guild.set_last_informed(puuid, spectator.game_id);
                        to_inform.push((guild.id.clone(), guild.channel_id.clone()));
                    }
                }
            }
            (mode, changed, snapshot, to_inform)
        };

        if changed {
            info!(%puuid, ?mode, "Player changed mode");
        }
        if let Some(snapshot) = snapshot {
            if let Err(error) = self.store.save_player_state(&snapshot).await {
                warn!(%puuid, ?error, "Failed to persist player state");
            }
        }

        let notified = to_inform.len();
        if let Some(spectator) = spectator {
            self.inform(puuid, spectator, to_inform).await;
        }

        Ok(CheckOutcome::Checked {
            puuid: puuid.clone(),
            in_game,
            mode,
            notified,
        })
    }

    async fn inform(&self, puuid: &Puuid, spectator: Spectator, targets: Vec<(GuildId, ChannelId)>) {
        if targets.is_empty() {
            return;
        }
        let riot_id = match self.riot_api.riot_id(puuid).await {
            Ok(riot_id) => Some(riot_id),
            Err(error) => {
                warn!(%puuid, ?error, "Could not resolve riot id for notification");
                None
            }
        };

        for (guild_id, channel_id) in targets {
            let notification = GameNotification {
                guild_id: guild_id.clone(),
                puuid: puuid.clone(),
                riot_id: riot_id.clone(),
                spectator: spectator.clone(),
            };
            if let Err(error) = self.sink.notify(&channel_id, &notification).await {
                warn!(guild = %guild_id, %puuid, ?error, "Failed to send notification");
            }
            if let Err(error) = self
                .store
                .set_last_informed_game(&guild_id, puuid, Some(spectator.game_id))
                .await
            {
                warn!(guild = %guild_id, %puuid, ?error, "Failed to persist last informed game");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chanclol_common::{GameId, RiotApiConfig};
    use chrono::TimeZone;
    use reqwest::StatusCode;

    use super::*;
    use crate::store::tests::memory_store;
    use crate::gateway::tests::{gateway, ScriptedProvider};
    use crate::notify::tests::{spectator, RecordingSink};

    const MINUTE: Duration = Duration::from_secs(60);

    fn cadence() -> Cadence {
        Cadence {
            online_timeout: MINUTE,
            offline_timeout: MINUTE * 5,
            offline_threshold: MINUTE * 30,
        }
    }

    struct Fixture {
        scheduler: PollScheduler,
        riot_api: Arc<RiotApi>,
        provider: Arc<ScriptedProvider>,
        sink: Arc<RecordingSink>,
        store: Arc<dyn StateStore>,
    }

    async fn fixture(max_requests: u32) -> Fixture {
        let provider = Arc::new(ScriptedProvider::default());
        let store: Arc<dyn StateStore> = memory_store();
        let config = RiotApiConfig {
            regional_url: "https://europe.example.invalid".into(),
            platform_url: "https://euw1.example.invalid".into(),
            game_roster: false,
            ..Default::default()
        };
        let riot_api = Arc::new(
            RiotApi::new(&config, gateway(provider.clone(), max_requests), store.clone()).unwrap(),
        );
        let sink = Arc::new(RecordingSink::default());
        let scheduler = PollScheduler::new(
            Arc::new(Mutex::new(Registry::default())),
            riot_api.clone(),
            store.clone(),
            sink.clone(),
            cadence(),
        );
        Fixture {
            scheduler,
            riot_api,
            provider,
            sink,
            store,
        }
    }

    async fn track(fixture: &Fixture, guild_id: &str, puuid: &str) {
        let guild_id = GuildId::from(guild_id);
        let puuid = Puuid::from(puuid);
        let mut registry = fixture.scheduler.registry().lock().await;
        let player = Player::new(puuid.clone(), &cadence());
        fixture
            .store
            .save_player_state(&player.snapshot())
            .await
            .unwrap();
        registry.players.insert(puuid.clone(), player);

        let guild = registry
            .guilds
            .entry(guild_id.clone())
            .or_insert_with(|| Guild::new(guild_id.clone(), "c1".into()));
        guild.add_player(puuid.clone());
        fixture.store.add_guild(&guild_id, &"c1".into()).await.unwrap();
        fixture
            .store
            .add_player_to_guild(&guild_id, &puuid)
            .await
            .unwrap();
    }

    fn push_game(provider: &ScriptedProvider, game_id: i64, puuid: &str) {
        provider.push(
            StatusCode::OK,
            &format!(
                r#"{{"gameId": {game_id}, "gameMode": "CLASSIC", "gameLength": 120,
                    "participants": [{{"puuid": "{puuid}", "championId": 1, "teamId": 100}}]}}"#
            ),
        );
    }

    fn push_account(provider: &ScriptedProvider, puuid: &str, name: &str) {
        provider.push(
            StatusCode::OK,
            &format!(r#"{{"puuid": "{puuid}", "gameName": "{name}", "tagLine": "EUW"}}"#),
        );
    }

    #[test]
    fn test_select_most_overdue() {
        let cadence = cadence();
        let t0 = Instant::now();
        let mut registry = Registry::default();
        for (name, timeout) in [("a", 10), ("b", 3), ("c", 100)] {
            let mut player = Player::new(name.into(), &cadence);
            player.timer_mut().set_timeout(Duration::from_secs(timeout));
            player.timer_mut().arm_at(t0);
            registry.players.insert(name.into(), player);
        }

        // a is 5s overdue, b 12s, c not due
        assert_eq!(
            registry.select_next(t0 + Duration::from_secs(15)),
            Some("b".into())
        );
        assert_eq!(registry.select_next(t0 + Duration::from_secs(1)), None);
        assert_eq!(Registry::default().select_next(t0), None);
    }

    #[test]
    fn test_ties_go_to_lowest_puuid() {
        let cadence = cadence();
        let mut registry = Registry::default();
        for name in ["c", "a", "b"] {
            registry
                .players
                .insert(name.into(), Player::new(name.into(), &cadence));
        }
        assert_eq!(registry.select_next(Instant::now()), Some("a".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_check_per_tick_and_single_notification_per_game() {
        let fixture = fixture(100).await;
        track(&fixture, "g1", "p1").await;

        push_game(&fixture.provider, 11, "p1");
        push_account(&fixture.provider, "p1", "Name");
        assert_eq!(
            fixture.scheduler.tick().await.unwrap(),
            CheckOutcome::Checked {
                puuid: "p1".into(),
                in_game: true,
                mode: Mode::Online,
                notified: 1,
            }
        );
        {
            let delivered = fixture.sink.delivered.lock().unwrap();
            assert_eq!(delivered.len(), 1);
            assert_eq!(delivered[0].0, ChannelId::from("c1"));
            assert_eq!(
                delivered[0].1.to_string().lines().next(),
                Some("Name#EUW is in game (CLASSIC, 2 min in)")
            );
        }

        // just checked, nobody is due
        assert_eq!(fixture.scheduler.tick().await.unwrap(), CheckOutcome::Idle);

        tokio::time::advance(MINUTE).await;
        push_game(&fixture.provider, 11, "p1");
        assert!(matches!(
            fixture.scheduler.tick().await.unwrap(),
            CheckOutcome::Checked { notified: 0, .. }
        ));
        assert_eq!(fixture.sink.delivered.lock().unwrap().len(), 1);

        tokio::time::advance(MINUTE).await;
        fixture.provider.push(StatusCode::NOT_FOUND, "");
        assert_eq!(
            fixture.scheduler.tick().await.unwrap(),
            CheckOutcome::Checked {
                puuid: "p1".into(),
                in_game: false,
                mode: Mode::Online,
                notified: 0,
            }
        );
        assert_eq!(fixture.provider.request_count(), 4);

        let guilds = fixture.store.load_guilds().await.unwrap();
        assert_eq!(guilds[0].last_informed[&Puuid::from("p1")], Some(GameId(11)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_check_leaves_player_due() {
        let fixture = fixture(1).await;
        track(&fixture, "g1", "p1").await;
        track(&fixture, "g1", "p2").await;

        fixture.provider.push(StatusCode::NOT_FOUND, "");
        assert!(matches!(
            fixture.scheduler.tick().await.unwrap(),
            CheckOutcome::Checked { in_game: false, mode: Mode::Offline, .. }
        ));
        assert_eq!(
            fixture.scheduler.tick().await.unwrap(),
            CheckOutcome::Skipped("p2".into())
        );

        let registry = fixture.scheduler.registry().lock().await;
        assert_eq!(registry.select_next(Instant::now()), Some("p2".into()));
        assert_eq!(fixture.provider.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_restores_mode_and_cadence() {
        let fixture = fixture(100).await;
        track(&fixture, "g1", "p1").await;
        push_game(&fixture.provider, 11, "p1");
        push_account(&fixture.provider, "p1", "Name");
        fixture.scheduler.tick().await.unwrap();

        let reloaded = PollScheduler::new(
            Arc::new(Mutex::new(Registry::default())),
            fixture.riot_api.clone(),
            fixture.store.clone(),
            fixture.sink.clone(),
            cadence(),
        );
        reloaded.load().await.unwrap();

        let registry = reloaded.registry().lock().await;
        let player = &registry.players[&Puuid::from("p1")];
        assert_eq!(player.mode(), Mode::Online);
        assert_eq!(player.timer().timeout(), MINUTE);
        let now = Instant::now();
        assert!(!player.due_at(now).is_due());
        assert!(player.due_at(now + MINUTE).is_due());
        assert_eq!(
            registry.guilds[&GuildId::from("g1")].last_informed(&"p1".into()),
            Some(GameId(11))
        );
    }

    #[tokio::test]
    async fn test_overlapping_checks_are_rejected() {
        let fixture = fixture(100).await;
        let first = fixture.scheduler.begin_check(&"p1".into()).unwrap();
        assert!(matches!(
            fixture.scheduler.begin_check(&"p2".into()),
            Err(ChanclolError::InconsistentState(_))
        ));
        drop(first);
        assert!(fixture.scheduler.begin_check(&"p2".into()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_checks_count_as_not_in_game() {
        let fixture = fixture(100).await;
        track(&fixture, "g1", "p1").await;
        let t0 = Utc::now();
        fixture
            .scheduler
            .apply_check(&"p1".into(), Some(spectator(11)), t0)
            .await
            .unwrap();

        // transport failure, then a body that does not decode
        fixture.provider.push_transport_error();
        fixture.provider.push(StatusCode::OK, "<html>maintenance</html>");
        for _ in 0..2 {
            tokio::time::advance(MINUTE).await;
            assert_eq!(
                fixture.scheduler.tick().await.unwrap(),
                CheckOutcome::Checked {
                    puuid: "p1".into(),
                    in_game: false,
                    mode: Mode::Online,
                    notified: 0,
                }
            );
            // the check was recorded, the player is not due again right away
            assert_eq!(fixture.scheduler.tick().await.unwrap(), CheckOutcome::Idle);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_sighting_is_persisted() {
        let fixture = fixture(100).await;
        track(&fixture, "g1", "p1").await;
        push_account(&fixture.provider, "p1", "Name");
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap();
        let later = t0 + chrono::TimeDelta::minutes(25);

        fixture
            .scheduler
            .apply_check(&"p1".into(), Some(spectator(11)), t0)
            .await
            .unwrap();
        // same game, same mode
        fixture
            .scheduler
            .apply_check(&"p1".into(), Some(spectator(11)), later)
            .await
            .unwrap();

        let stored = fixture.store.load_players().await.unwrap();
        assert_eq!(stored[0].mode, Mode::Online);
        assert_eq!(stored[0].last_seen_online, Some(later));

        // a restart does not demote a player who was seen recently
        let reloaded = PollScheduler::new(
            Arc::new(Mutex::new(Registry::default())),
            fixture.riot_api.clone(),
            fixture.store.clone(),
            fixture.sink.clone(),
            cadence(),
        );
        reloaded.load().await.unwrap();
        assert!(matches!(
            reloaded
                .apply_check(&"p1".into(), None, t0 + chrono::TimeDelta::minutes(40))
                .await
                .unwrap(),
            CheckOutcome::Checked { mode: Mode::Online, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_picks_up_changes_from_the_store() {
        let fixture = fixture(100).await;
        track(&fixture, "g1", "p1").await;
        fixture.provider.push(StatusCode::NOT_FOUND, "");
        fixture.scheduler.tick().await.unwrap();

        // another process registers p2 in a new guild and drops p1
        let store = &fixture.store;
        store.add_guild(&"g2".into(), &"c2".into()).await.unwrap();
        store
            .save_player_state(&Player::new("p2".into(), &cadence()).snapshot())
            .await
            .unwrap();
        store.add_player_to_guild(&"g2".into(), &"p2".into()).await.unwrap();
        store.remove_player(&"p1".into()).await.unwrap();

        fixture.scheduler.sync().await.unwrap();
        {
            let registry = fixture.scheduler.registry().lock().await;
            assert_eq!(registry.tracked(), HashSet::from([Puuid::from("p2")]));
            assert!(!registry.guilds[&GuildId::from("g1")].has_player(&"p1".into()));
            assert!(registry.guilds[&GuildId::from("g2")].has_player(&"p2".into()));
        }

        // p2 is checked right away
        fixture.provider.push(StatusCode::NOT_FOUND, "");
        assert!(matches!(
            fixture.scheduler.tick().await.unwrap(),
            CheckOutcome::Checked { ref puuid, .. } if *puuid == Puuid::from("p2")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_keeps_timers_of_known_players() {
        let fixture = fixture(100).await;
        track(&fixture, "g1", "p1").await;
        fixture.provider.push(StatusCode::NOT_FOUND, "");
        fixture.scheduler.tick().await.unwrap();

        fixture.scheduler.sync().await.unwrap();
        assert_eq!(fixture.scheduler.tick().await.unwrap(), CheckOutcome::Idle);
        assert_eq!(fixture.provider.request_count(), 1);
    }
}
