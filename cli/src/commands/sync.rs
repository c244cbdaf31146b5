use anyhow::{Context, Result, bail};

use super::Service;
use crate::config::{ENV_ACCESS_TOKEN, ENV_SUPABASE_ANON_KEY, ENV_SUPABASE_URL, ENV_USER_ID};
use crate::remote::RemoteClient;

fn require(remote: Option<&RemoteClient>) -> Result<&RemoteClient> {
    match remote {
        Some(r) => Ok(r),
        None => bail!(
            "Cloud sync is not configured. Set {ENV_SUPABASE_URL}, {ENV_SUPABASE_ANON_KEY}, {ENV_ACCESS_TOKEN} and {ENV_USER_ID}"
        ),
    }
}

/// Replace the local log with the backend's copy.
pub(crate) async fn cmd_sync_pull(
    svc: &Service,
    remote: Option<&RemoteClient>,
    json: bool,
) -> Result<()> {
    let remote = require(remote)?;

    let entries = remote
        .load_all()
        .await
        .context("Failed to load entries from backend")?;
    let goals = remote
        .load_goals()
        .await
        .context("Failed to load goals from backend")?;

    svc.replace_from_remote(&entries, goals.as_ref())?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "entries": entries.len(),
                "goals": goals,
            })
        );
    } else {
        println!("Pulled {} entries from the backend", entries.len());
        if goals.is_some() {
            println!("Goals updated from the backend");
        }
    }
    Ok(())
}

pub(crate) fn cmd_sync_status(
    svc: &Service,
    remote: Option<&RemoteClient>,
    json: bool,
) -> Result<()> {
    let local = svc.entries()?.len();
    let user = remote.map(RemoteClient::user_id);

    if json {
        println!(
            "{}",
            serde_json::json!({
                "synced": user.is_some(),
                "user_id": user,
                "local_entries": local,
            })
        );
    } else {
        match user {
            Some(user) => println!("Synced to cloud (user {user})"),
            None => println!("Local mode"),
        }
        println!("{local} entries stored locally");
    }
    Ok(())
}
