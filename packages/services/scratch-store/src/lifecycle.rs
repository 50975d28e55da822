use std::time::Duration;

use scratch_core::error::Result;
use scratch_core::model::EvictionPolicy;
use uuid::Uuid;

use crate::codec::PadRow;
use crate::engine::{self, Engine};
use crate::pads;

/// What `enforce_on_create` decided should happen before a new pad is
/// written (`§4.D`).
pub enum CapacityOutcome {
    Proceed,
    ProceedWithEvictions(Vec<Uuid>),
    Reject,
}

async fn tenant_pad_rows(engine: &Engine, tenant: &str) -> Result<Vec<PadRow>> {
    let predicate = format!("tenant_id = '{}'", engine::quote(tenant));
    let batches = engine::query_rows(&engine.pads().await, &predicate).await?;
    let mut rows = Vec::new();
    for batch in &batches {
        rows.extend(crate::codec::batch_to_pad_rows(batch)?);
    }
    Ok(rows)
}

/// Decides whether a pad creation may proceed under the configured
/// `EvictionPolicy`, given `max_scratchpads` (0 = unlimited). Victims are
/// selected by **ascending `last_access_at`, ties broken by ascending
/// `created_at`** (`§4.D`/GLOSSARY "LRU eviction (discard)").
pub async fn enforce_on_create(
    engine: &Engine,
    tenant: &str,
    policy: EvictionPolicy,
    max_scratchpads: u64,
) -> Result<CapacityOutcome> {
    if max_scratchpads == 0 {
        return Ok(CapacityOutcome::Proceed);
    }
    let mut rows = tenant_pad_rows(engine, tenant).await?;
    if (rows.len() as u64) < max_scratchpads {
        return Ok(CapacityOutcome::Proceed);
    }

    match policy {
        EvictionPolicy::Fail => Ok(CapacityOutcome::Reject),
        EvictionPolicy::Preempt => {
            // `discard`-at-creation semantics are disabled under `preempt`
            // (`§4.D`): capacity pressure is relieved only by the sweeper.
            Ok(CapacityOutcome::Reject)
        }
        EvictionPolicy::Discard => {
            rows.sort_by(|a, b| {
                a.last_access_at
                    .cmp(&b.last_access_at)
                    .then(a.created_at.cmp(&b.created_at))
            });
            let need_to_evict = (rows.len() as u64 + 1).saturating_sub(max_scratchpads) as usize;
            let victims = rows.into_iter().take(need_to_evict).map(|r| r.scratch_id).collect();
            Ok(CapacityOutcome::ProceedWithEvictions(victims))
        }
    }
}

pub async fn evict(engine: &Engine, tenant: &str, victims: &[Uuid]) -> Result<()> {
    for scratch_id in victims {
        pads::delete_pad(engine, tenant, *scratch_id).await?;
    }
    Ok(())
}

/// One sweeper tick under the `preempt` policy (`§4.D`): deletes every pad
/// whose `now - last_access_at > preempt_age`, regardless of capacity
/// pressure, grouping deletions by tenant so no lock is ever held across
/// tenants (`§5`).
pub async fn sweep_once(engine: &Engine, preempt_age: Duration) -> Result<usize> {
    let batches = engine::query_rows(&engine.pads().await, "true").await?;
    let mut rows = Vec::new();
    for batch in &batches {
        rows.extend(crate::codec::batch_to_pad_rows(batch)?);
    }

    let now = chrono::Utc::now();
    let expired: Vec<PadRow> = rows
        .into_iter()
        .filter(|row| {
            let age = now.signed_duration_since(row.last_access_at);
            age.to_std().map(|d| d > preempt_age).unwrap_or(false)
        })
        .collect();

    let mut by_tenant: std::collections::HashMap<String, Vec<Uuid>> = std::collections::HashMap::new();
    for row in expired {
        by_tenant.entry(row.tenant_id.clone()).or_default().push(row.scratch_id);
    }

    let mut deleted = 0usize;
    for (tenant, ids) in by_tenant {
        let _guard = engine.tenant_guard(&tenant).await;
        for scratch_id in ids {
            if pads::delete_pad(engine, &tenant, scratch_id).await? {
                deleted += 1;
            }
        }
    }
    if deleted > 0 {
        tracing::info!(deleted, "preempt sweeper removed expired scratchpads");
    }
    Ok(deleted)
}

/// Runs `sweep_once` on a `tokio::time::interval`, grounded on the
/// teacher's ingestion-service interval scheduling
/// (`packages/services/ingestion/src/sync/engine.rs`), generalized to a
/// plain interval loop since the sweep has no cron-expression requirement.
/// Stops as soon as `shutdown.changed()` observes `DRAINING` or later
/// (`§4.D`: "MUST respect the shutdown drain").
pub async fn run_sweeper(
    engine: std::sync::Arc<Engine>,
    preempt_age: Duration,
    preempt_interval: Duration,
    mut shutdown: tokio::sync::watch::Receiver<scratch_core::ServerState>,
) {
    let mut ticker = tokio::time::interval(preempt_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *shutdown.borrow() != scratch_core::ServerState::Running {
                    break;
                }
                if let Err(e) = sweep_once(&engine, preempt_age).await {
                    tracing::warn!(error = %e, "preempt sweeper tick failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() != scratch_core::ServerState::Running {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(id: Uuid, last_access_secs_ago: i64, created_secs_ago: i64) -> PadRow {
        let now = Utc::now();
        PadRow {
            tenant_id: "t".to_string(),
            scratch_id: id,
            namespace: "default".to_string(),
            tags: Default::default(),
            metadata: Default::default(),
            created_at: now - chrono::Duration::seconds(created_secs_ago),
            last_access_at: now - chrono::Duration::seconds(last_access_secs_ago),
        }
    }

    #[test]
    fn eviction_order_is_ascending_last_access_then_created() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let mut rows = vec![row(a, 10, 100), row(b, 30, 50), row(c, 30, 10)];
        rows.sort_by(|x, y| x.last_access_at.cmp(&y.last_access_at).then(x.created_at.cmp(&y.created_at)));
        assert_eq!(rows[0].scratch_id, c);
        assert_eq!(rows[1].scratch_id, b);
        assert_eq!(rows[2].scratch_id, a);
    }
}
