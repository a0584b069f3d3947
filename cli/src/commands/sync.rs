use anyhow::{Context, Result};

use larder_core::db::Database;
use larder_core::sync::{StatsSource, SyncClient, SyncError, SyncTransport, local_stats};

use super::helpers::exit_not_found;

/// What the user can do about a failed sync.
pub(crate) fn sync_failure_hint(err: &SyncError) -> &'static str {
    if err.is_retryable() {
        "the server may be down or unreachable; try again later"
    } else {
        "the server rejected the request; retrying will not help"
    }
}

pub(crate) async fn cmd_sync<T: SyncTransport>(db: &Database, transport: T, json: bool) -> Result<()> {
    let mut client = SyncClient::new(db, transport);
    let report = match client.synchronize().await {
        Ok(report) => report,
        Err(e) => {
            let hint = sync_failure_hint(&e);
            return Err(e).context(format!("Sync failed; local items are unchanged ({hint})"));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Synced with {}: pushed {}, pulled {} ({} new, {} updated)",
            report.namespace, report.pushed, report.pulled, report.inserted, report.updated
        );
    }
    Ok(())
}

/// Stats from the server when a transport is given, else from this device only.
pub(crate) async fn cmd_stats<T: SyncTransport>(
    db: &Database,
    transport: Option<T>,
    json: bool,
) -> Result<()> {
    let report = match transport {
        Some(transport) => SyncClient::new(db, transport).stats().await?,
        None => local_stats(db)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let stats = report.stats;
        println!("Total:          {}", stats.total);
        println!("Expiring soon:  {}", stats.expiring_soon);
        println!("Expired:        {}", stats.expired);
        println!("Saved:          {}", stats.saved);
        println!("Saved %:        {}%", stats.saved_percent());
        if report.source == StatsSource::Local {
            eprintln!("(computed from this device only)");
        }
    }
    Ok(())
}

/// Without a transport only the local row is deleted.
pub(crate) async fn cmd_delete<T: SyncTransport>(
    db: &Database,
    transport: Option<T>,
    id: i64,
    json: bool,
) -> Result<()> {
    if db.get_item(id)?.is_none() {
        exit_not_found(&format!("Item {id} not found"), json);
    }

    match transport {
        Some(transport) => {
            let mut client = SyncClient::new(db, transport);
            client.delete_item(id).await.with_context(|| {
                format!("Could not delete item {id} on the server; nothing was deleted")
            })?;
        }
        None => {
            db.delete_item(id)?;
            eprintln!("Deleted locally only; the server copy will come back on the next sync.");
        }
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted item {id}");
    }
    Ok(())
}
