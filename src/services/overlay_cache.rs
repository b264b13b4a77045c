use std::collections::HashMap;
use std::sync::Arc;

use metrics::gauge;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};

use crate::models::UserOverlay;

/// Read-through cache of per-user execution parameters. The external user
/// registry owns the data; this core only reads it.
#[derive(Clone, Default)]
pub struct OverlayCache {
    inner: Arc<RwLock<HashMap<i64, UserOverlay>>>,
}

impl OverlayCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, user_id: i64) -> Option<UserOverlay> {
        self.inner.read().await.get(&user_id).cloned()
    }

    /// Snapshot of all eligible users, taken once per fan-out so a refresh
    /// mid-signal never mixes old and new overlays.
    pub async fn snapshot(&self) -> Vec<UserOverlay> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn replace_all(&self, overlays: Vec<UserOverlay>) {
        let mut map = HashMap::with_capacity(overlays.len());
        for overlay in overlays {
            map.insert(overlay.user_id, overlay);
        }
        gauge!("eligible_users").set(map.len() as f64);
        *self.inner.write().await = map;
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// HTTP client for the user-registry collaborator.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl RegistryClient {
    pub fn new(base_url: String, api_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_token,
        }
    }

    /// Fetch the current set of dispatch-eligible overlays. Eligibility
    /// (tier gating against shield classification) is decided upstream.
    pub async fn fetch_overlays(&self) -> anyhow::Result<Vec<UserOverlay>> {
        let url = format!("{}/api/overlays", self.base_url.trim_end_matches('/'));
        let mut req = self.http.get(&url);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("user registry returned {}", resp.status());
        }
        Ok(resp.json::<Vec<UserOverlay>>().await?)
    }
}

/// Periodic refresher loop. A failed refresh keeps the previous cache —
/// stale overlays beat an empty fleet.
pub async fn run_overlay_refresher(
    client: RegistryClient,
    cache: OverlayCache,
    refresh_secs: u64,
) {
    let mut ticker = interval(Duration::from_secs(refresh_secs));
    tracing::info!(refresh_secs, "Overlay refresher started");

    loop {
        ticker.tick().await;
        match client.fetch_overlays().await {
            Ok(overlays) => {
                let count = overlays.len();
                cache.replace_all(overlays).await;
                tracing::debug!(count, "Overlay cache refreshed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Overlay refresh failed — keeping cached set");
            }
        }
    }
}
