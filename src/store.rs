use crate::errors::AppError;
use crate::lytex_client::NewInvoice;
use crate::models::{Contribution, ContributionDetail, Employer};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// Clinic fields needed for manager notification.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClinicContact {
    pub name: String,
    pub manager_email: Option<String>,
}

/// Data access for contribution records.
///
/// Uses sequential queries instead of joins-into-one-row for better sqlx
/// compatibility with the nested relation shape.
pub struct ContributionStore {
    pool: PgPool,
}

impl ContributionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads a contribution with its employer and contribution-type name.
    pub async fn fetch_with_relations(&self, id: Uuid) -> Result<ContributionDetail, AppError> {
        let contribution =
            sqlx::query_as::<_, Contribution>("SELECT * FROM contributions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Contribution {} not found", id)))?;

        let employer = sqlx::query_as::<_, Employer>(
            "SELECT id, clinic_id, name, cnpj_cpf, email, phone FROM employers WHERE id = $1",
        )
        .bind(contribution.employer_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Employer {} for contribution {} not found",
                contribution.employer_id, id
            ))
        })?;

        let contribution_type_name = sqlx::query_as::<_, (String,)>(
            "SELECT name FROM contribution_types WHERE id = $1",
        )
        .bind(contribution.contribution_type_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| row.0)
        .unwrap_or_else(|| "Contribuição".to_string());

        Ok(ContributionDetail {
            contribution,
            employer,
            contribution_type_name,
        })
    }

    /// Persists the assigned value and every invoice field in one statement,
    /// transitioning the status to `pending`.
    ///
    /// The update is conditioned on the status still being `awaiting_value`
    /// at write time. The workflow's earlier fetch is only a snapshot, so
    /// this compare-and-swap is what actually enforces at-most-once pricing
    /// under concurrent calls.
    pub async fn assign_value_and_invoice(
        &self,
        id: Uuid,
        value_cents: i64,
        invoice: &NewInvoice,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE contributions
            SET value = $2,
                status = 'pending',
                lytex_invoice_id = $3,
                lytex_invoice_url = $4,
                lytex_barcode = $5,
                lytex_digitable_line = $6,
                lytex_pix_code = $7,
                lytex_pix_qr = $8,
                updated_at = now()
            WHERE id = $1 AND status = 'awaiting_value'
            "#,
        )
        .bind(id)
        .bind(value_cents)
        .bind(&invoice.invoice_id)
        .bind(&invoice.invoice_url)
        .bind(&invoice.barcode)
        .bind(&invoice.digitable_line)
        .bind(&invoice.pix_code)
        .bind(&invoice.pix_qr)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // A concurrent assignment won the race between fetch and write.
            return Err(AppError::InvalidState(
                "Contribution already has a value assigned".to_string(),
            ));
        }
        Ok(())
    }

    /// Records a provider-confirmed payment. No-op when the record is
    /// already `paid`, so the sync sweep's update count stays exact.
    pub async fn mark_paid(
        &self,
        id: Uuid,
        paid_value_cents: i64,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE contributions
            SET status = 'paid',
                paid_value = $2,
                paid_at = COALESCE($3, now()),
                updated_at = now()
            WHERE id = $1 AND status <> 'paid'
            "#,
        )
        .bind(id)
        .bind(paid_value_cents)
        .bind(paid_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Flags an amount mismatch with the external ledger. Only ever sets the
    /// flag; clearing it requires explicit human reconciliation.
    pub async fn mark_divergent(&self, id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE contributions
            SET has_divergence = true,
                updated_at = now()
            WHERE id = $1 AND has_divergence = false
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Marks one clean paid record as reconciled. Returns rows affected;
    /// zero means the record was already reconciled, divergent or not paid,
    /// which callers treat as a no-op rather than an error.
    pub async fn mark_reconciled(&self, id: Uuid, actor: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE contributions
            SET is_reconciled = true,
                reconciled_at = now(),
                reconciled_by = $2,
                has_divergence = false,
                updated_at = now()
            WHERE id = $1
              AND status = 'paid'
              AND is_reconciled = false
              AND has_divergence = false
            "#,
        )
        .bind(id)
        .bind(actor)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Batch variant of [`mark_reconciled`](Self::mark_reconciled): one
    /// statement over all ids, same guard per row. Returns rows changed.
    pub async fn mark_reconciled_batch(
        &self,
        ids: &[Uuid],
        actor: Uuid,
    ) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE contributions
            SET is_reconciled = true,
                reconciled_at = now(),
                reconciled_by = $2,
                has_divergence = false,
                updated_at = now()
            WHERE id = ANY($1)
              AND status = 'paid'
              AND is_reconciled = false
              AND has_divergence = false
            "#,
        )
        .bind(ids)
        .bind(actor)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Contributions of a clinic with an issued invoice that are not yet
    /// reconciled; the input set for the status-sync sweep.
    pub async fn list_unreconciled_invoiced(
        &self,
        clinic_id: Uuid,
    ) -> Result<Vec<Contribution>, AppError> {
        let rows = sqlx::query_as::<_, Contribution>(
            r#"
            SELECT * FROM contributions
            WHERE clinic_id = $1
              AND lytex_invoice_id IS NOT NULL
              AND is_reconciled = false
            ORDER BY due_date ASC
            "#,
        )
        .bind(clinic_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Whether an accounting office is linked to an employer.
    pub async fn accounting_office_manages(
        &self,
        office_id: Uuid,
        employer_id: Uuid,
    ) -> Result<bool, AppError> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM accounting_office_employers
                WHERE accounting_office_id = $1 AND employer_id = $2
            )
            "#,
        )
        .bind(office_id)
        .bind(employer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Clinic name and manager notification address.
    pub async fn clinic_contact(&self, clinic_id: Uuid) -> Result<Option<ClinicContact>, AppError> {
        let contact = sqlx::query_as::<_, ClinicContact>(
            "SELECT name, manager_email FROM clinics WHERE id = $1",
        )
        .bind(clinic_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(contact)
    }

    /// Best-effort portal audit entry. Failures are logged and swallowed;
    /// an audit hiccup must never fail the business operation.
    pub async fn log_portal_action(
        &self,
        portal_type: &str,
        portal_id: Option<Uuid>,
        action: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        details: Value,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO portal_access_logs
                (id, portal_type, portal_id, action, ip_address, user_agent, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(portal_type)
        .bind(portal_id)
        .bind(action)
        .bind(ip_address)
        .bind(user_agent)
        .bind(details)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to write portal access log for {}: {:?}", action, e);
        }
    }
}
