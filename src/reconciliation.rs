use crate::errors::AppError;
use crate::lytex_client::{InvoiceStatus, LytexClient};
use crate::models::{Contribution, ContributionStatus};
use crate::store::ContributionStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// What the sync sweep should do with one record after comparing it against
/// the provider's report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Provider confirmed payment of the expected amount.
    MarkPaid {
        paid_value: i64,
        paid_at: Option<DateTime<Utc>>,
    },
    /// Provider reports an amount different from the local value.
    MarkDivergent,
    /// Nothing to converge.
    Skip,
}

/// Decides how one local record converges toward the provider's report.
///
/// Amounts are never auto-corrected: a mismatch only raises the divergence
/// flag for human review (partial payment, fee deduction, rounding).
pub fn sync_action(local: &Contribution, remote: &InvoiceStatus) -> SyncAction {
    let expected = match local.value {
        Some(v) => v,
        // An invoiced record without a value should not exist; surface it
        // rather than guessing an amount.
        None => return SyncAction::MarkDivergent,
    };

    match remote.paid_value {
        Some(reported) if reported != expected => SyncAction::MarkDivergent,
        Some(reported) => {
            if remote.status == "paid" && local.status != ContributionStatus::Paid {
                SyncAction::MarkPaid {
                    paid_value: reported,
                    paid_at: remote.paid_at,
                }
            } else {
                SyncAction::Skip
            }
        }
        // Paid with no reported amount cannot be verified; leave it for the
        // next sweep rather than recording an unconfirmed payment.
        None => SyncAction::Skip,
    }
}

/// Converges local contribution state with the external ledger and applies
/// manual reconciliation marks.
pub struct ReconciliationEngine {
    store: ContributionStore,
    lytex: Arc<LytexClient>,
}

impl ReconciliationEngine {
    pub fn new(store: ContributionStore, lytex: Arc<LytexClient>) -> Self {
        Self { store, lytex }
    }

    /// Pulls provider state for every invoiced, unreconciled contribution of
    /// a clinic and converges local records. Per-record provider failures
    /// are logged and skipped so one bad invoice never aborts the sweep.
    ///
    /// Returns the number of records actually updated.
    pub async fn sync_pending(&self, clinic_id: Uuid) -> Result<u64, AppError> {
        let contributions = self.store.list_unreconciled_invoiced(clinic_id).await?;
        tracing::info!(
            "Syncing {} invoiced contributions for clinic {}",
            contributions.len(),
            clinic_id
        );

        let mut updated: u64 = 0;
        for contribution in &contributions {
            let invoice_id = match &contribution.lytex_invoice_id {
                Some(id) => id,
                None => continue,
            };

            let remote = match self.lytex.get_invoice(invoice_id).await {
                Ok(remote) => remote,
                Err(e) => {
                    tracing::warn!(
                        "Skipping contribution {}: invoice {} lookup failed: {}",
                        contribution.id,
                        invoice_id,
                        e
                    );
                    continue;
                }
            };

            match sync_action(contribution, &remote) {
                SyncAction::MarkPaid { paid_value, paid_at } => {
                    updated += self
                        .store
                        .mark_paid(contribution.id, paid_value, paid_at)
                        .await?;
                }
                SyncAction::MarkDivergent => {
                    let changed = self.store.mark_divergent(contribution.id).await?;
                    if changed > 0 {
                        tracing::warn!(
                            "Divergence detected on contribution {}: local value {:?}, provider reported {:?}",
                            contribution.id,
                            contribution.value,
                            remote.paid_value
                        );
                    }
                    updated += changed;
                }
                SyncAction::Skip => {}
            }
        }

        tracing::info!(
            "Sync for clinic {} updated {} of {} records",
            clinic_id,
            updated,
            contributions.len()
        );
        Ok(updated)
    }

    /// Marks one paid, non-divergent record as reconciled. Already
    /// reconciled or divergent records are a silent no-op, which makes
    /// retries after a partial network failure always safe.
    pub async fn reconcile_one(&self, contribution_id: Uuid, actor: Uuid) -> Result<u64, AppError> {
        let changed = self.store.mark_reconciled(contribution_id, actor).await?;
        if changed > 0 {
            tracing::info!("Contribution {} reconciled by {}", contribution_id, actor);
        } else {
            tracing::debug!(
                "Reconcile no-op for contribution {} (already reconciled, divergent or unpaid)",
                contribution_id
            );
        }
        Ok(changed)
    }

    /// Applies the reconcile mark to a batch in a single statement. The
    /// returned count is rows actually changed; ids that were already
    /// reconciled or divergent are no-ops and do not count.
    pub async fn reconcile_batch(&self, ids: &[Uuid], actor: Uuid) -> Result<u64, AppError> {
        let changed = self.store.mark_reconciled_batch(ids, actor).await?;
        tracing::info!(
            "Batch reconciliation by {}: {} of {} ids changed",
            actor,
            changed,
            ids.len()
        );
        Ok(changed)
    }
}
