use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;

use crate::settings::ReputationSettings;

/// A ban-list service that can vouch against a user id.
#[async_trait]
pub trait ReputationService: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(true)` when the service lists the user as a spammer.
    async fn check(&self, user_id: u64) -> Result<bool>;
}

/// Response of the Combot Anti-Spam API. `ok` is true only for listed users.
#[derive(Debug, Clone, Deserialize)]
pub struct CasResponse {
    pub ok: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Response of the lols.bot account API.
#[derive(Debug, Clone, Deserialize)]
pub struct LolsResponse {
    pub banned: bool,
    #[serde(default)]
    pub offenses: u32,
    #[serde(default)]
    pub spam_factor: f32,
}

/// Combot Anti-Spam (`cas.chat`).
pub struct CasService {
    client: Client,
    pub base_url: String,
}

impl CasService {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ReputationService for CasService {
    fn name(&self) -> &str {
        "cas"
    }

    async fn check(&self, user_id: u64) -> Result<bool> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("user_id", user_id)])
            .send()
            .await?
            .error_for_status()?;
        let body: CasResponse = response.json().await?;
        if body.ok {
            log::info!(
                "User {} is CAS banned: {}",
                user_id,
                body.description.as_deref().unwrap_or("no description")
            );
        }
        Ok(body.ok)
    }
}

/// lols.bot spam database.
pub struct LolsService {
    client: Client,
    pub base_url: String,
}

impl LolsService {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ReputationService for LolsService {
    fn name(&self) -> &str {
        "lols"
    }

    async fn check(&self, user_id: u64) -> Result<bool> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("id", user_id)])
            .send()
            .await?
            .error_for_status()?;
        let body: LolsResponse = response.json().await?;
        if body.banned {
            log::info!(
                "User {} is LOLS banned: offenses={} spam_factor={:.2}",
                user_id,
                body.offenses,
                body.spam_factor
            );
        }
        Ok(body.banned)
    }
}

/// Reduces every configured service to one verdict with logical OR.
///
/// Sub-checks run concurrently and fail open: a network error, a non-success
/// status or an undecodable body counts as "not banned" for that service.
pub struct ReputationGate {
    services: Vec<Box<dyn ReputationService>>,
}

impl ReputationGate {
    pub fn new(services: Vec<Box<dyn ReputationService>>) -> Self {
        Self { services }
    }

    /// CAS + LOLS sharing one HTTP client with the configured per-call timeout.
    pub fn from_settings(settings: &ReputationSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self::new(vec![
            Box::new(CasService::new(client.clone(), settings.cas_url.clone())),
            Box::new(LolsService::new(client, settings.lols_url.clone())),
        ]))
    }

    pub async fn is_banned(&self, user_id: u64) -> bool {
        let checks = self.services.iter().map(|service| async move {
            match service.check(user_id).await {
                Ok(banned) => {
                    log::debug!("{}: user {} banned={}", service.name(), user_id, banned);
                    banned
                }
                Err(e) => {
                    log::warn!("{} check failed for user {}: {:#}", service.name(), user_id, e);
                    false
                }
            }
        });
        join_all(checks).await.into_iter().any(|banned| banned)
    }
}
