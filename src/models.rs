use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============ Database Models ============

/// Lifecycle status of a contribution.
///
/// `cancelled` and `overdue` are set by out-of-scope billing processes;
/// this service only ever writes `pending` (value assignment) and `paid`
/// (status sync). Reconciliation and divergence are flags on the record,
/// not statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContributionStatus {
    AwaitingValue,
    Pending,
    Paid,
    Cancelled,
    Overdue,
}

impl ContributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributionStatus::AwaitingValue => "awaiting_value",
            ContributionStatus::Pending => "pending",
            ContributionStatus::Paid => "paid",
            ContributionStatus::Cancelled => "cancelled",
            ContributionStatus::Overdue => "overdue",
        }
    }
}

/// One employer's monetary obligation for one competence period (month/year).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contribution {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning clinic/union tenant.
    pub clinic_id: Uuid,
    /// Employer that owes this contribution.
    pub employer_id: Uuid,
    /// Contribution type (e.g. monthly dues, assistance fee).
    pub contribution_type_id: Uuid,
    /// Competence month (1-12).
    pub competence_month: i32,
    /// Competence year (four digits).
    pub competence_year: i32,
    /// Assigned value in cents; null while status is `awaiting_value`.
    pub value: Option<i64>,
    /// Lifecycle status.
    pub status: ContributionStatus,
    /// Invoice due date.
    pub due_date: NaiveDate,
    /// Lytex invoice identifier; null until issued.
    pub lytex_invoice_id: Option<String>,
    /// Checkout/boleto URL returned by Lytex.
    pub lytex_invoice_url: Option<String>,
    /// Boleto barcode.
    pub lytex_barcode: Option<String>,
    /// Boleto digitable line.
    pub lytex_digitable_line: Option<String>,
    /// PIX copy-and-paste code.
    pub lytex_pix_code: Option<String>,
    /// PIX QR payload.
    pub lytex_pix_qr: Option<String>,
    /// When the provider reported the invoice paid.
    pub paid_at: Option<DateTime<Utc>>,
    /// Amount the provider reported as paid, in cents.
    pub paid_value: Option<i64>,
    /// Local and provider amounts disagree; requires human review.
    pub has_divergence: bool,
    /// Payment confirmed against the external ledger.
    pub is_reconciled: bool,
    /// When the record was reconciled.
    pub reconciled_at: Option<DateTime<Utc>>,
    /// User who reconciled the record.
    pub reconciled_by: Option<Uuid>,
    /// Token granting unauthenticated portal access to this contribution.
    pub public_access_token: Option<String>,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp of last update.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Employer (read-only from this service's perspective).
///
/// Carries the payer data forwarded to the invoicing provider.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Employer {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning clinic/union tenant.
    pub clinic_id: Uuid,
    /// Legal name.
    pub name: String,
    /// CNPJ or CPF, digits only.
    pub cnpj_cpf: String,
    /// Billing contact email.
    pub email: Option<String>,
    /// Billing contact phone.
    pub phone: Option<String>,
}

/// A contribution joined with its employer and contribution-type name.
#[derive(Debug, Clone)]
pub struct ContributionDetail {
    pub contribution: Contribution,
    pub employer: Employer,
    pub contribution_type_name: String,
}

// ============ Portal Context ============

/// Identity/channel through which an external actor calls into the
/// value-assignment workflow. Each variant carries what its authorization
/// predicate needs; adding a portal type forces every match site to handle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalContext {
    /// Unauthenticated public link carrying the contribution's access token.
    PublicToken { token: String },
    /// Employer self-service portal.
    EmployerPortal { employer_id: Uuid },
    /// Accounting office acting on behalf of linked employers.
    AccountingOfficePortal { office_id: Uuid },
    /// Internal/admin access; bypasses portal authorization.
    InternalAdmin,
}

impl PortalContext {
    /// Portal type label used for audit logging.
    pub fn type_str(&self) -> &'static str {
        match self {
            PortalContext::PublicToken { .. } => "public_token",
            PortalContext::EmployerPortal { .. } => "employer",
            PortalContext::AccountingOfficePortal { .. } => "accounting_office",
            PortalContext::InternalAdmin => "internal",
        }
    }

    /// Portal identity for audit logging, when the variant has one.
    pub fn portal_id(&self) -> Option<Uuid> {
        match self {
            PortalContext::EmployerPortal { employer_id } => Some(*employer_id),
            PortalContext::AccountingOfficePortal { office_id } => Some(*office_id),
            PortalContext::PublicToken { .. } | PortalContext::InternalAdmin => None,
        }
    }
}

// ============ Request / Response DTOs ============

/// Body of POST /api/v1/contributions/:id/assign-value.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignValueRequest {
    /// Contribution value in cents. Fractional input is rounded.
    pub value: f64,
    /// Originating portal: "public_token", "employer" or "accounting_office".
    /// Absent or unrecognized means internal/admin access.
    pub portal_type: Option<String>,
    /// Portal identity (employer or accounting-office id).
    pub portal_id: Option<Uuid>,
    /// Public access token, required when portal_type is "public_token".
    pub portal_token: Option<String>,
}

impl AssignValueRequest {
    /// Resolves the request's portal fields into a [`PortalContext`].
    ///
    /// A recognized portal type with its identity field missing is a
    /// malformed request, not an admin bypass.
    pub fn portal_context(&self) -> Result<PortalContext, crate::errors::AppError> {
        use crate::errors::AppError;

        match self.portal_type.as_deref() {
            Some("public_token") => {
                let token = self.portal_token.clone().ok_or_else(|| {
                    AppError::InvalidValue("portal_token required for public_token access".into())
                })?;
                Ok(PortalContext::PublicToken { token })
            }
            Some("employer") => {
                let employer_id = self.portal_id.ok_or_else(|| {
                    AppError::InvalidValue("portal_id required for employer access".into())
                })?;
                Ok(PortalContext::EmployerPortal { employer_id })
            }
            Some("accounting_office") => {
                let office_id = self.portal_id.ok_or_else(|| {
                    AppError::InvalidValue("portal_id required for accounting_office access".into())
                })?;
                Ok(PortalContext::AccountingOfficePortal { office_id })
            }
            _ => Ok(PortalContext::InternalAdmin),
        }
    }
}

/// Successful response of the assign-value endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AssignValueResponse {
    pub success: bool,
    pub lytex_invoice_url: String,
}

/// Response of the status-sync endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    /// Number of contributions actually updated by the sweep.
    pub updated: u64,
}

/// Body of the single-record reconcile endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileRequest {
    /// User performing the reconciliation.
    pub actor_id: Uuid,
}

/// Body of the batch reconcile endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileBatchRequest {
    pub contribution_ids: Vec<Uuid>,
    pub actor_id: Uuid,
}

/// Response of both reconcile endpoints: rows actually changed.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResponse {
    pub reconciled: u64,
}
