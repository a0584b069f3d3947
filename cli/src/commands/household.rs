use anyhow::Result;

use larder_core::db::Database;
use larder_core::household::HouseholdResolver;
use larder_core::sync::{SyncClient, SyncReport, SyncTransport};

use super::sync::sync_failure_hint;

pub(crate) fn cmd_household_show(db: &Database, json: bool) -> Result<()> {
    let resolver = HouseholdResolver::new(db);
    let household = resolver.current()?;
    let namespace = resolver.resolve()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "household": household,
                "namespace": namespace,
            }))?
        );
    } else if let Some(h) = household {
        println!("Household: {h}");
    } else {
        println!("Not in a household; syncing as device {namespace}");
    }
    Ok(())
}

/// Joins, then syncs right away when a transport is given. A failed sync is
/// reported but the membership is kept.
pub(crate) async fn cmd_household_join<T: SyncTransport>(
    db: &Database,
    id: &str,
    transport: Option<T>,
    json: bool,
) -> Result<()> {
    let namespace = HouseholdResolver::new(db).join(id)?;

    let mut synced: Option<SyncReport> = None;
    let mut sync_error: Option<String> = None;
    if let Some(transport) = transport {
        match SyncClient::new(db, transport).synchronize().await {
            Ok(report) => synced = Some(report),
            Err(e) => {
                tracing::warn!(household = %namespace, error = %e, "sync after join failed");
                sync_error = Some(format!("{e} ({})", sync_failure_hint(&e)));
            }
        }
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "household": namespace,
                "sync": synced,
                "sync_error": sync_error,
            }))?
        );
    } else {
        println!("Joined household {namespace}");
        match (&synced, &sync_error) {
            (Some(report), _) => println!(
                "Synced: pushed {}, pulled {} ({} new, {} updated)",
                report.pushed, report.pulled, report.inserted, report.updated
            ),
            (None, Some(err)) => {
                eprintln!("Sync failed: {err}. Run `larder sync` to retry.");
            }
            (None, None) => println!("Run `larder sync` to share items."),
        }
    }
    Ok(())
}

pub(crate) fn cmd_household_leave(db: &Database, json: bool) -> Result<()> {
    let resolver = HouseholdResolver::new(db);
    let left = resolver.leave()?;
    let namespace = resolver.resolve()?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "left": left, "namespace": namespace })
        );
    } else if left {
        println!("Left household; syncing as device {namespace}");
    } else {
        println!("Not in a household");
    }
    Ok(())
}
