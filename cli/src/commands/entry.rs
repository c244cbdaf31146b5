use anyhow::{Result, bail};
use std::process;

use intake_core::models::{Entry, NewEntry, UpdateEntry};

use super::Service;
use super::helpers::{json_error, parse_amount, parse_date};
use crate::remote::{RemoteClient, mirror};

pub(crate) struct EntryArgs {
    pub protein: Option<String>,
    pub water: Option<String>,
    pub time: Option<String>,
    pub date: Option<String>,
    pub note: Option<String>,
}

fn describe(e: &Entry) -> String {
    let mut parts = Vec::new();
    if e.protein_g > 0.0 {
        parts.push(format!("{}g protein", e.protein_g));
    }
    if e.water_l > 0.0 {
        parts.push(format!("{}L water", e.water_l));
    }
    let note = e
        .note
        .as_ref()
        .map(|n| format!(" ({n})"))
        .unwrap_or_default();
    format!("{} on {} at {}{note}", parts.join(" + "), e.date, e.time)
}

pub(crate) async fn cmd_add(
    svc: &Service,
    remote: Option<&RemoteClient>,
    args: EntryArgs,
    json: bool,
) -> Result<()> {
    if args.protein.is_none() && args.water.is_none() {
        bail!("Nothing to log. Provide --protein and/or --water");
    }
    let protein_g = args
        .protein
        .as_deref()
        .map(|p| parse_amount("Protein", p, "g"))
        .transpose()?
        .unwrap_or(0.0);
    let water_l = args
        .water
        .as_deref()
        .map(|w| parse_amount("Water", w, "l"))
        .transpose()?
        .unwrap_or(0.0);

    let entry = svc.log_entry(&NewEntry {
        date: parse_date(args.date)?,
        time: args.time.unwrap_or_default(),
        protein_g,
        water_l,
        note: args.note,
        owner: None,
    })?;

    if let Some(remote) = remote {
        mirror("add", remote.append(std::slice::from_ref(&entry))).await;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("Logged {} [{}]", describe(&entry), entry.id);
    }
    Ok(())
}

pub(crate) async fn cmd_edit(
    svc: &Service,
    remote: Option<&RemoteClient>,
    id: &str,
    args: EntryArgs,
    json: bool,
) -> Result<()> {
    let update = UpdateEntry {
        date: args.date.map(Some).map(parse_date).transpose()?,
        time: args.time,
        protein_g: args
            .protein
            .as_deref()
            .map(|p| parse_amount("Protein", p, "g"))
            .transpose()?,
        water_l: args
            .water
            .as_deref()
            .map(|w| parse_amount("Water", w, "l"))
            .transpose()?,
        // An empty --note clears the note.
        note: args.note.map(|n| Some(n).filter(|n| !n.trim().is_empty())),
    };
    if update.is_empty() {
        bail!("Nothing to update. Provide at least one of --protein, --water, --time, --date or --note");
    }

    let entry = svc.update_entry(id, &update)?;

    if let Some(remote) = remote {
        mirror("edit", remote.update(&entry)).await;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("Updated entry {id}: {}", describe(&entry));
    }
    Ok(())
}

pub(crate) async fn cmd_delete(
    svc: &Service,
    remote: Option<&RemoteClient>,
    id: &str,
    json: bool,
) -> Result<()> {
    if svc.delete_entry(id)? {
        if let Some(remote) = remote {
            mirror("delete", remote.remove(id)).await;
        }
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted entry {id}");
        }
        Ok(())
    } else {
        if json {
            println!("{}", json_error(&format!("Entry {id} not found")));
        } else {
            eprintln!("Entry {id} not found");
        }
        process::exit(2);
    }
}

pub(crate) async fn cmd_reset(
    svc: &Service,
    remote: Option<&RemoteClient>,
    yes: bool,
    json: bool,
) -> Result<()> {
    if !yes {
        bail!("This deletes every entry. Re-run with --yes to confirm");
    }
    let deleted = svc.reset()?;
    let remote_deleted = match remote {
        Some(remote) => mirror("reset", remote.clear()).await,
        None => None,
    };

    if json {
        println!(
            "{}",
            serde_json::json!({ "deleted": deleted, "remote_deleted": remote_deleted })
        );
    } else {
        println!("Deleted {deleted} entries");
        if let Some(n) = remote_deleted {
            println!("Deleted {n} entries from the backend");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::db::Database;
    use intake_core::service::IntakeService;

    fn svc() -> Service {
        IntakeService::new(Database::open_in_memory().unwrap())
    }

    fn args(protein: Option<&str>, water: Option<&str>) -> EntryArgs {
        EntryArgs {
            protein: protein.map(str::to_string),
            water: water.map(str::to_string),
            time: Some("8:30 am".to_string()),
            date: Some("2024-01-01".to_string()),
            note: None,
        }
    }

    #[tokio::test]
    async fn test_add_local_only() {
        let svc = svc();
        cmd_add(&svc, None, args(Some("30g"), Some("500ml")), true)
            .await
            .unwrap();

        let all = svc.entries().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].time, "08:30");
        assert!((all[0].water_l - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_add_requires_amount() {
        let svc = svc();
        assert!(cmd_add(&svc, None, args(None, None), false).await.is_err());
        assert!(
            cmd_add(&svc, None, args(Some("0"), None), false)
                .await
                .is_err()
        );
        assert!(svc.entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_clears_note() {
        let svc = svc();
        let mut a = args(Some("30"), None);
        a.note = Some("shake".to_string());
        cmd_add(&svc, None, a, true).await.unwrap();
        let id = svc.entries().unwrap()[0].id.clone();

        let edit = EntryArgs {
            protein: None,
            water: None,
            time: None,
            date: None,
            note: Some(String::new()),
        };
        cmd_edit(&svc, None, &id, edit, true).await.unwrap();
        assert!(svc.get_entry(&id).unwrap().note.is_none());
    }

    #[tokio::test]
    async fn test_edit_nothing() {
        let svc = svc();
        let edit = EntryArgs {
            protein: None,
            water: None,
            time: None,
            date: None,
            note: None,
        };
        assert!(cmd_edit(&svc, None, "x", edit, false).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_requires_confirmation() {
        let svc = svc();
        cmd_add(&svc, None, args(Some("30"), None), true)
            .await
            .unwrap();
        assert!(cmd_reset(&svc, None, false, false).await.is_err());
        assert_eq!(svc.entries().unwrap().len(), 1);

        cmd_reset(&svc, None, true, true).await.unwrap();
        assert!(svc.entries().unwrap().is_empty());
    }

    #[test]
    fn test_describe() {
        let e = Entry {
            id: "a".to_string(),
            owner: None,
            date: "2024-01-01".to_string(),
            time: "08:00".to_string(),
            protein_g: 30.0,
            water_l: 0.5,
            note: Some("shake".to_string()),
            created_at: None,
        };
        assert_eq!(
            describe(&e),
            "30g protein + 0.5L water on 2024-01-01 at 08:00 (shake)"
        );
    }
}
