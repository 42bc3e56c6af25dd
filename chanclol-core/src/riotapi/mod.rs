mod types;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use chanclol_common::{ChanclolError, GameId, Puuid, RiotApiConfig, RiotId, SummonerId};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::*;
pub use types::{League, Mastery, Participant, Spectator, SpectatorOutcome};
use types::{AccountDto, ChampionsDto, GameIdDto, MasteryDto, SpectatorDto, SummonerDto};
use url::Url;

use crate::consts::{QUEUE_RANKED_FLEX, QUEUE_RANKED_SOLO};
use crate::gateway::{EndpointClass, FetchOutcome, RequestGateway};
use crate::store::StateStore;

fn route(base: &Url, segments: &[&str]) -> Result<Url, ChanclolError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ChanclolError::InconsistentState(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, ChanclolError> {
    Ok(serde_json::from_slice(body)?)
}

/// Client for the game-status API. Identity data is cached in memory and in the store.
pub struct RiotApi {
    gateway: RequestGateway,
    store: Arc<dyn StateStore>,
    regional_url: Url,
    platform_url: Url,
    data_dragon_url: Url,
    game_roster: bool,
    riot_ids: RwLock<HashMap<Puuid, RiotId>>,
    summoner_ids: RwLock<HashMap<Puuid, SummonerId>>,
    /// Champion id to name, from the latest Data Dragon release
    champions: RwLock<HashMap<i64, String>>,
    spectator_cache: RwLock<HashMap<GameId, Spectator>>,
}

impl RiotApi {
    pub fn new(
        config: &RiotApiConfig,
        gateway: RequestGateway,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, ChanclolError> {
        Ok(Self {
            gateway,
            store,
            regional_url: Url::parse(&config.regional_url)?,
            platform_url: Url::parse(&config.platform_url)?,
            data_dragon_url: Url::parse(&config.data_dragon_url)?,
            game_roster: config.game_roster,
            riot_ids: RwLock::new(HashMap::new()),
            summoner_ids: RwLock::new(HashMap::new()),
            champions: RwLock::new(HashMap::new()),
            spectator_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    /// Fill the identity caches from the store
    pub async fn load_cache(&self) -> Result<(), ChanclolError> {
        let records = self.store.load_identities().await?;
        let mut riot_ids = self.riot_ids.write().await;
        let mut summoner_ids = self.summoner_ids.write().await;
        for record in records {
            if let Some(summoner_id) = record.summoner_id {
                summoner_ids.insert(record.puuid.clone(), summoner_id);
            }
            riot_ids.insert(record.puuid, record.riot_id);
        }
        debug!(count = riot_ids.len(), "Loaded cached identities");
        Ok(())
    }

    /// `Ok(None)` if no account has this riot id
    pub async fn puuid(&self, riot_id: &RiotId) -> Result<Option<Puuid>, ChanclolError> {
        {
            let riot_ids = self.riot_ids.read().await;
            if let Some((puuid, _)) = riot_ids.iter().find(|(_, cached)| *cached == riot_id) {
                return Ok(Some(puuid.clone()));
            }
        }

        let url = route(
            &self.regional_url,
            &[
                "riot",
                "account",
                "v1",
                "accounts",
                "by-riot-id",
                &riot_id.game_name,
                &riot_id.tag_line,
            ],
        )?;
        let body = match self.gateway.fetch_vital(&url).await {
            Ok(body) => body,
            Err(ChanclolError::RemoteStatus(StatusCode::NOT_FOUND)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let account: AccountDto = decode(&body)?;
        // the API may answer with a differently capitalised riot id
        self.remember_riot_id(&account.puuid, account.riot_id()).await;
        Ok(Some(account.puuid))
    }

    pub async fn riot_id(&self, puuid: &Puuid) -> Result<RiotId, ChanclolError> {
        if let Some(riot_id) = self.riot_ids.read().await.get(puuid) {
            return Ok(riot_id.clone());
        }

        let url = route(
            &self.regional_url,
            &["riot", "account", "v1", "accounts", "by-puuid", &puuid.0],
        )?;
        let account: AccountDto = decode(&self.gateway.fetch_vital(&url).await?)?;
        let riot_id = account.riot_id();
        self.remember_riot_id(puuid, riot_id.clone()).await;
        Ok(riot_id)
    }

    async fn remember_riot_id(&self, puuid: &Puuid, riot_id: RiotId) {
        let previous = self
            .riot_ids
            .write()
            .await
            .insert(puuid.clone(), riot_id.clone());
        match previous {
            Some(previous) if previous != riot_id => {
                info!(%puuid, %previous, %riot_id, "Riot id changed")
            }
            Some(_) => return,
            None => debug!(%puuid, %riot_id, "Found riot id"),
        }
        if let Err(error) = self.store.save_riot_id(puuid, &riot_id).await {
            warn!(%puuid, ?error, "Failed to persist riot id");
        }
    }

    pub async fn summoner_id(&self, puuid: &Puuid) -> Result<SummonerId, ChanclolError> {
        if let Some(summoner_id) = self.summoner_ids.read().await.get(puuid) {
            return Ok(summoner_id.clone());
        }

        let url = route(
            &self.platform_url,
            &["lol", "summoner", "v4", "summoners", "by-puuid", &puuid.0],
        )?;
        let summoner: SummonerDto = decode(&self.gateway.fetch_vital(&url).await?)?;
        debug!(%puuid, summoner_id = %summoner.id, "Found summoner id");

        self.summoner_ids
            .write()
            .await
            .insert(puuid.clone(), summoner.id.clone());
        if let Err(error) = self.store.save_summoner_id(puuid, &summoner.id).await {
            warn!(%puuid, ?error, "Failed to persist summoner id");
        }
        Ok(summoner.id)
    }

    /// Ranked solo and flex standings
    pub async fn leagues(&self, puuid: &Puuid) -> Result<Vec<League>, ChanclolError> {
        let summoner_id = self.summoner_id(puuid).await?;
        let url = route(
            &self.platform_url,
            &["lol", "league", "v4", "entries", "by-summoner", &summoner_id.0],
        )?;
        let leagues: Vec<League> = decode(&self.gateway.fetch_vital(&url).await?)?;
        Ok(leagues
            .into_iter()
            .filter(|l| l.queue_type == QUEUE_RANKED_SOLO || l.queue_type == QUEUE_RANKED_FLEX)
            .collect())
    }

    /// `Ok(None)` if the player never played the champion
    pub async fn mastery(
        &self,
        puuid: &Puuid,
        champion_id: i64,
    ) -> Result<Option<Mastery>, ChanclolError> {
        let url = route(
            &self.platform_url,
            &[
                "lol",
                "champion-mastery",
                "v4",
                "champion-masteries",
                "by-puuid",
                &puuid.0,
                "by-champion",
                &champion_id.to_string(),
            ],
        )?;
        let body = match self.gateway.fetch_vital(&url).await {
            Ok(body) => body,
            Err(ChanclolError::RemoteStatus(StatusCode::NOT_FOUND)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let mastery: MasteryDto = decode(&body)?;
        Ok(mastery.into_mastery())
    }

    pub async fn champion_name(&self, champion_id: i64) -> Result<Option<String>, ChanclolError> {
        if self.champions.read().await.is_empty() {
            self.load_champions().await?;
        }
        Ok(self.champions.read().await.get(&champion_id).cloned())
    }

    async fn load_champions(&self) -> Result<(), ChanclolError> {
        let url = route(&self.data_dragon_url, &["api", "versions.json"])?;
        let versions: Vec<String> = decode(&self.gateway.fetch_vital(&url).await?)?;
        let version = versions
            .first()
            .ok_or_else(|| ChanclolError::NotFound("data dragon version".into()))?;

        let url = route(
            &self.data_dragon_url,
            &["cdn", version, "data", "en_US", "champion.json"],
        )?;
        let champions: ChampionsDto = decode(&self.gateway.fetch_vital(&url).await?)?;

        let mut cache = self.champions.write().await;
        for champion in champions.data.into_values() {
            match champion.key.parse() {
                Ok(key) => {
                    cache.insert(key, champion.id);
                }
                Err(_) => warn!(key = %champion.key, "Ignoring champion with a non-numeric key"),
            }
        }
        info!(%version, count = cache.len(), "Loaded champion names");
        Ok(())
    }

    /// Looks up champion, mastery and ranks of every participant. Failures
    /// leave the affected fields empty.
    async fn fill_roster(&self, spectator: &mut Spectator) {
        for participant in &mut spectator.participants {
            match self.champion_name(participant.champion_id).await {
                Ok(name) => participant.champion_name = name,
                Err(error) => {
                    warn!(champion_id = participant.champion_id, ?error, "Could not resolve champion")
                }
            }

            let Some(puuid) = participant.puuid.clone() else {
                continue;
            };
            match self.riot_id(&puuid).await {
                Ok(riot_id) => participant.riot_id = Some(riot_id),
                Err(error) => warn!(%puuid, ?error, "Could not resolve participant riot id"),
            }
            match self.mastery(&puuid, participant.champion_id).await {
                Ok(mastery) => participant.mastery = mastery,
                Err(error) => warn!(%puuid, ?error, "Could not fetch mastery"),
            }
            match self.leagues(&puuid).await {
                Ok(leagues) => participant.leagues = leagues,
                Err(error) => warn!(%puuid, ?error, "Could not fetch participant leagues"),
            }
        }
    }

    pub async fn spectator(&self, puuid: &Puuid) -> Result<SpectatorOutcome, ChanclolError> {
        let url = route(
            &self.platform_url,
            &["lol", "spectator", "v5", "active-games", "by-summoner", &puuid.0],
        )?;
        let body = match self.gateway.fetch(EndpointClass::StatusPoll, &url).await? {
            FetchOutcome::Payload(body) => body,
            FetchOutcome::NotAttempted | FetchOutcome::Throttled => {
                return Ok(SpectatorOutcome::Skipped)
            }
            FetchOutcome::NoData(_) => {
                self.trim_spectator_cache(puuid).await;
                return Ok(SpectatorOutcome::NotInGame);
            }
        };

        let GameIdDto { game_id } = decode(&body)?;
        if let Some(spectator) = self.spectator_cache.read().await.get(&game_id) {
            debug!(%puuid, %game_id, "Player is in a cached game");
            return Ok(SpectatorOutcome::InGame(spectator.clone()));
        }

        let mut spectator = Spectator::from(decode::<SpectatorDto>(&body)?);
        if self.game_roster {
            info!(%puuid, %game_id, "Player is in a new game, looking up the roster");
            self.fill_roster(&mut spectator).await;
        }
        self.spectator_cache
            .write()
            .await
            .insert(game_id, spectator.clone());
        Ok(SpectatorOutcome::InGame(spectator))
    }

    /// Drop cached games the player took part in
    async fn trim_spectator_cache(&self, puuid: &Puuid) {
        self.spectator_cache
            .write()
            .await
            .retain(|_, spectator| !spectator.has_participant(puuid));
    }

    /// Forget identities of players nobody tracks any more
    pub async fn housekeeping(&self, keep: &HashSet<Puuid>) -> Result<(), ChanclolError> {
        self.riot_ids
            .write()
            .await
            .retain(|puuid, _| keep.contains(puuid));
        self.summoner_ids
            .write()
            .await
            .retain(|puuid, _| keep.contains(puuid));
        let pruned = self.store.prune_identities(keep).await?;
        info!(pruned, "Pruned cached identities");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::memory_store;
    use crate::gateway::tests::{gateway, ScriptedProvider};

    fn config(game_roster: bool) -> RiotApiConfig {
        RiotApiConfig {
            regional_url: "https://europe.example.invalid".into(),
            platform_url: "https://euw1.example.invalid".into(),
            data_dragon_url: "https://ddragon.example.invalid".into(),
            game_roster,
            ..Default::default()
        }
    }

    fn api(provider: Arc<ScriptedProvider>) -> RiotApi {
        RiotApi::new(&config(false), gateway(provider, 100), memory_store()).unwrap()
    }

    #[test]
    fn test_route_escapes_segments() {
        let base = Url::parse("https://europe.example.invalid").unwrap();
        let url = route(&base, &["by-riot-id", "Some Name", "EUW"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://europe.example.invalid/by-riot-id/Some%20Name/EUW"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_puuid_is_cached_and_persisted() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push(
            StatusCode::OK,
            r#"{"puuid": "p1", "gameName": "Name", "tagLine": "EUW"}"#,
        );
        let api = api(provider.clone());
        let riot_id = RiotId::new("Name", "EUW");

        assert_eq!(api.puuid(&riot_id).await.unwrap(), Some("p1".into()));
        assert_eq!(api.puuid(&riot_id).await.unwrap(), Some("p1".into()));
        assert_eq!(api.riot_id(&"p1".into()).await.unwrap(), riot_id);
        assert_eq!(provider.request_count(), 1);
        assert_eq!(api.store.load_identities().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_riot_id() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push(StatusCode::NOT_FOUND, "");
        let api = api(provider);

        assert_eq!(api.puuid(&RiotId::new("Nobody", "EUW")).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leagues_are_filtered_to_ranked_queues() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push(StatusCode::OK, r#"{"id": "s1", "puuid": "p1"}"#);
        provider.push(
            StatusCode::OK,
            r#"[
                {"queueType": "RANKED_SOLO_5x5", "tier": "GOLD", "rank": "II", "leaguePoints": 40, "wins": 3, "losses": 1},
                {"queueType": "CHERRY", "tier": "", "rank": "", "leaguePoints": 0, "wins": 9, "losses": 9}
            ]"#,
        );
        let api = api(provider.clone());

        let leagues = api.leagues(&"p1".into()).await.unwrap();
        assert_eq!(leagues.len(), 1);
        assert_eq!(leagues[0].tier, "GOLD");
        assert!(provider.requests.lock().unwrap()[1].ends_with("/by-summoner/s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spectator_outcomes() {
        let provider = Arc::new(ScriptedProvider::default());
        let game = r#"{"gameId": 11, "gameMode": "CLASSIC", "gameLength": 60,
            "participants": [{"puuid": "p1", "championId": 1, "teamId": 100}]}"#;
        provider.push(StatusCode::OK, game);
        provider.push(StatusCode::OK, game);
        provider.push(StatusCode::NOT_FOUND, "");
        provider.push(StatusCode::TOO_MANY_REQUESTS, "");
        let api = api(provider);
        let puuid = Puuid::from("p1");

        let SpectatorOutcome::InGame(spectator) = api.spectator(&puuid).await.unwrap() else {
            panic!("expected a game");
        };
        assert_eq!(spectator.game_id, GameId(11));
        assert!(matches!(
            api.spectator(&puuid).await.unwrap(),
            SpectatorOutcome::InGame(_)
        ));
        assert_eq!(api.spectator_cache.read().await.len(), 1);

        assert_eq!(
            api.spectator(&puuid).await.unwrap(),
            SpectatorOutcome::NotInGame
        );
        assert!(api.spectator_cache.read().await.is_empty());

        assert_eq!(
            api.spectator(&puuid).await.unwrap(),
            SpectatorOutcome::Skipped
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_housekeeping_forgets_untracked() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push(
            StatusCode::OK,
            r#"{"puuid": "p1", "gameName": "One", "tagLine": "EUW"}"#,
        );
        provider.push(
            StatusCode::OK,
            r#"{"puuid": "p2", "gameName": "Two", "tagLine": "EUW"}"#,
        );
        let api = api(provider);
        api.riot_id(&"p1".into()).await.unwrap();
        api.riot_id(&"p2".into()).await.unwrap();

        api.housekeeping(&HashSet::from([Puuid::from("p1")]))
            .await
            .unwrap();

        assert_eq!(api.riot_ids.read().await.len(), 1);
        let stored = api.store.load_identities().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].puuid, Puuid::from("p1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_game_roster_is_looked_up_once() {
        let provider = Arc::new(ScriptedProvider::default());
        let game = r#"{"gameId": 11, "gameMode": "CLASSIC", "gameLength": 60,
            "participants": [
                {"puuid": "p1", "championId": 1, "teamId": 100},
                {"puuid": null, "championId": 2, "teamId": 200}
            ]}"#;
        provider.push(StatusCode::OK, game);
        provider.push(StatusCode::OK, r#"["14.10.1", "14.9.1"]"#);
        provider.push(
            StatusCode::OK,
            r#"{"data": {"Annie": {"id": "Annie", "key": "1"}, "Olaf": {"id": "Olaf", "key": "2"}}}"#,
        );
        provider.push(
            StatusCode::OK,
            r#"{"puuid": "p1", "gameName": "One", "tagLine": "EUW"}"#,
        );
        provider.push(
            StatusCode::OK,
            r#"{"championLevel": 5, "lastPlayTime": 1714593600000}"#,
        );
        provider.push(StatusCode::OK, r#"{"id": "s1"}"#);
        provider.push(
            StatusCode::OK,
            r#"[{"queueType": "RANKED_FLEX_SR", "tier": "SILVER", "rank": "I", "leaguePoints": 12, "wins": 1, "losses": 1}]"#,
        );
        provider.push(StatusCode::OK, game);
        let api = RiotApi::new(&config(true), gateway(provider.clone(), 100), memory_store()).unwrap();

        let SpectatorOutcome::InGame(spectator) = api.spectator(&"p1".into()).await.unwrap() else {
            panic!("expected a game");
        };
        let own = &spectator.participants[0];
        assert_eq!(own.champion_name.as_deref(), Some("Annie"));
        assert_eq!(own.riot_id, Some(RiotId::new("One", "EUW")));
        assert_eq!(own.mastery.as_ref().map(|m| m.level), Some(5));
        assert_eq!(own.leagues.len(), 1);
        let hidden = &spectator.participants[1];
        assert_eq!(hidden.champion_name.as_deref(), Some("Olaf"));
        assert_eq!(hidden.riot_id, None);

        let requests = provider.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 7);
        assert_eq!(requests[1], "https://ddragon.example.invalid/api/versions.json");
        assert_eq!(
            requests[2],
            "https://ddragon.example.invalid/cdn/14.10.1/data/en_US/champion.json"
        );
        assert!(requests[4].ends_with("/by-puuid/p1/by-champion/1"));

        // same game again is served from the cache without another roster lookup
        assert_eq!(
            api.spectator(&"p1".into()).await.unwrap(),
            SpectatorOutcome::InGame(spectator)
        );
        assert_eq!(provider.request_count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_roster_failures_leave_fields_empty() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push(
            StatusCode::OK,
            r#"{"gameId": 11, "participants": [{"puuid": "p1", "championId": 1, "teamId": 100}]}"#,
        );
        // everything else answers 404
        let api = RiotApi::new(&config(true), gateway(provider.clone(), 100), memory_store()).unwrap();

        let SpectatorOutcome::InGame(spectator) = api.spectator(&"p1".into()).await.unwrap() else {
            panic!("expected a game");
        };
        let participant = &spectator.participants[0];
        assert_eq!(participant.champion_name, None);
        assert_eq!(participant.riot_id, None);
        assert_eq!(participant.mastery, None);
        assert!(participant.leagues.is_empty());
    }
}
