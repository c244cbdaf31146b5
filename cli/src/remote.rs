use std::future::Future;

use anyhow::{Context, Result, bail};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RemoteSettings;
use intake_core::models::{Entry, Goals};

const ENTRY_COLUMNS: &str = "id,user_id,date,time,protein,water,note,created_at";

/// Client for the hosted `PostgREST` backend (`<url>/rest/v1/<table>`).
///
/// Every request carries the project's anon key and the user's access token,
/// and every query is filtered by the configured user id.
pub struct RemoteClient {
    client: reqwest::Client,
    settings: RemoteSettings,
}

#[derive(Serialize)]
struct GoalsRow<'a> {
    user_id: &'a str,
    daily_protein: f64,
    daily_water: f64,
}

#[derive(Serialize)]
struct EntryChanges<'a> {
    date: &'a str,
    time: &'a str,
    protein: f64,
    water: f64,
    note: Option<&'a str>,
}

#[derive(Deserialize)]
struct GoalsColumns {
    daily_protein: f64,
    daily_water: f64,
}

impl RemoteClient {
    pub fn new(settings: RemoteSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "intake-cli/{} (protein and water tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, settings })
    }

    pub fn user_id(&self) -> &str {
        &self.settings.user_id
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.settings.url)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.settings.anon_key)
            .bearer_auth(&self.settings.access_token)
    }

    fn owner_filter(&self) -> (&'static str, String) {
        ("user_id", format!("eq.{}", self.settings.user_id))
    }

    /// Stamp the configured user id on outgoing rows.
    fn owned(&self, entries: &[Entry]) -> Vec<Entry> {
        entries
            .iter()
            .map(|e| Entry {
                owner: Some(self.settings.user_id.clone()),
                ..e.clone()
            })
            .collect()
    }

    // --- Entries ---

    pub async fn load_all(&self) -> Result<Vec<Entry>> {
        let resp = self
            .request(Method::GET, "entries")
            .query(&[
                ("select", ENTRY_COLUMNS.to_string()),
                self.owner_filter(),
                ("order", "date.asc,time.asc".to_string()),
            ])
            .send()
            .await
            .context("Failed to reach backend")?;
        let resp = check(resp, "Loading entries").await?;
        let entries: Vec<Entry> = resp
            .json()
            .await
            .context("Failed to parse entries from backend")?;
        debug!(count = entries.len(), "loaded remote entries");
        Ok(entries)
    }

    /// Bulk insert, keeping the local ids.
    pub async fn append(&self, entries: &[Entry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let resp = self
            .request(Method::POST, "entries")
            .header("Prefer", "return=minimal")
            .json(&self.owned(entries))
            .send()
            .await
            .context("Failed to reach backend")?;
        check(resp, "Saving entries").await?;
        debug!(count = entries.len(), "inserted remote entries");
        Ok(())
    }

    pub async fn update(&self, entry: &Entry) -> Result<()> {
        let changes = EntryChanges {
            date: &entry.date,
            time: &entry.time,
            protein: entry.protein_g,
            water: entry.water_l,
            note: entry.note.as_deref(),
        };
        let resp = self
            .request(Method::PATCH, "entries")
            .query(&[("id", format!("eq.{}", entry.id)), self.owner_filter()])
            .header("Prefer", "return=minimal")
            .json(&changes)
            .send()
            .await
            .context("Failed to reach backend")?;
        check(resp, "Updating entry").await?;
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Result<bool> {
        let resp = self
            .request(Method::DELETE, "entries")
            .query(&[("id", format!("eq.{id}")), self.owner_filter()])
            .header("Prefer", "return=representation")
            .send()
            .await
            .context("Failed to reach backend")?;
        let resp = check(resp, "Deleting entry").await?;
        let rows: Vec<serde_json::Value> = resp
            .json()
            .await
            .context("Failed to parse delete response")?;
        Ok(!rows.is_empty())
    }

    pub async fn clear(&self) -> Result<usize> {
        let resp = self
            .request(Method::DELETE, "entries")
            .query(&[self.owner_filter()])
            .header("Prefer", "return=representation")
            .send()
            .await
            .context("Failed to reach backend")?;
        let resp = check(resp, "Deleting entries").await?;
        let rows: Vec<serde_json::Value> = resp
            .json()
            .await
            .context("Failed to parse delete response")?;
        Ok(rows.len())
    }

    // --- Goals ---

    pub async fn load_goals(&self) -> Result<Option<Goals>> {
        let resp = self
            .request(Method::GET, "goals")
            .query(&[
                ("select", "daily_protein,daily_water".to_string()),
                self.owner_filter(),
                ("limit", "1".to_string()),
            ])
            .send()
            .await
            .context("Failed to reach backend")?;
        let resp = check(resp, "Loading goals").await?;
        let rows: Vec<GoalsColumns> = resp
            .json()
            .await
            .context("Failed to parse goals from backend")?;
        Ok(rows.into_iter().next().map(|g| Goals {
            owner: Some(self.settings.user_id.clone()),
            daily_protein_g: g.daily_protein,
            daily_water_l: g.daily_water,
        }))
    }

    pub async fn save_goals(&self, goals: &Goals) -> Result<()> {
        let row = GoalsRow {
            user_id: &self.settings.user_id,
            daily_protein: goals.daily_protein_g,
            daily_water: goals.daily_water_l,
        };
        let resp = self
            .request(Method::POST, "goals")
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await
            .context("Failed to reach backend")?;
        check(resp, "Saving goals").await?;
        Ok(())
    }
}

async fn check(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("{what} failed: HTTP {status}: {}", body.trim());
}

/// Await a backend write that follows a successful local one.
///
/// The local store is the source of truth, so a failed mirror is logged and
/// swallowed. Returns `None` on failure.
pub async fn mirror<T>(what: &str, write: impl Future<Output = Result<T>>) -> Option<T> {
    match write.await {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "{what}: saved locally, backend sync failed");
            None
        }
    }
}
