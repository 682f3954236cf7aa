use crate::errors::AppError;
use crate::lytex_client::{InvoicePayer, LytexClient};
use crate::models::{Contribution, ContributionStatus, PortalContext};
use crate::notifications::{ManagerNotification, ManagerNotifier};
use crate::store::ContributionStore;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Client metadata captured for the portal audit log.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Outcome of the pure part of portal authorization. The accounting-office
/// arm needs a link-record lookup, which the workflow resolves separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalAuthorization {
    Granted,
    NeedsOfficeLink { office_id: Uuid },
}

/// Normalizes a caller-submitted value into positive integer cents.
///
/// Fails before any external call; retrying with the same input can never
/// succeed, so the caller must correct it.
pub fn normalize_value_cents(raw: f64) -> Result<i64, AppError> {
    if !raw.is_finite() {
        return Err(AppError::InvalidValue("Value must be a number".to_string()));
    }
    let rounded = raw.round();
    if rounded < 1.0 {
        return Err(AppError::InvalidValue(
            "Value must be a positive amount in cents".to_string(),
        ));
    }
    if rounded > i64::MAX as f64 {
        return Err(AppError::InvalidValue("Value is too large".to_string()));
    }
    Ok(rounded as i64)
}

/// Portuguese competence label, e.g. `Março/2025`.
pub fn competence_label(month: i32, year: i32) -> String {
    let name = match month {
        1 => "Janeiro",
        2 => "Fevereiro",
        3 => "Março",
        4 => "Abril",
        5 => "Maio",
        6 => "Junho",
        7 => "Julho",
        8 => "Agosto",
        9 => "Setembro",
        10 => "Outubro",
        11 => "Novembro",
        12 => "Dezembro",
        _ => return format!("{}/{}", month, year),
    };
    format!("{}/{}", name, year)
}

/// Per-variant portal authorization predicates.
///
/// - `PublicToken`: supplied token must equal the contribution's stored
///   access token (a record without one is never publicly accessible);
/// - `EmployerPortal`: portal identity must own the contribution;
/// - `AccountingOfficePortal`: deferred to the link-record lookup;
/// - `InternalAdmin`: bypasses the guard.
pub fn authorize_portal(
    ctx: &PortalContext,
    contribution: &Contribution,
) -> Result<PortalAuthorization, AppError> {
    match ctx {
        PortalContext::PublicToken { token } => match &contribution.public_access_token {
            Some(stored) if stored == token => Ok(PortalAuthorization::Granted),
            _ => Err(AppError::Forbidden(
                "Invalid public access token".to_string(),
            )),
        },
        PortalContext::EmployerPortal { employer_id } => {
            if *employer_id == contribution.employer_id {
                Ok(PortalAuthorization::Granted)
            } else {
                Err(AppError::Forbidden(
                    "Contribution belongs to another employer".to_string(),
                ))
            }
        }
        PortalContext::AccountingOfficePortal { office_id } => {
            Ok(PortalAuthorization::NeedsOfficeLink {
                office_id: *office_id,
            })
        }
        PortalContext::InternalAdmin => Ok(PortalAuthorization::Granted),
    }
}

/// Orchestrates value assignment: validation, state and authorization
/// guards, invoice issuance, persistence, audit log and notification.
pub struct AssignmentWorkflow {
    store: ContributionStore,
    lytex: Arc<LytexClient>,
    notifier: ManagerNotifier,
}

impl AssignmentWorkflow {
    pub fn new(store: ContributionStore, lytex: Arc<LytexClient>, notifier: ManagerNotifier) -> Self {
        Self {
            store,
            lytex,
            notifier,
        }
    }

    /// Assigns a value to an `awaiting_value` contribution, issuing the
    /// external invoice and transitioning the record to `pending`.
    ///
    /// Returns the invoice checkout URL. Steps up to the provider call are
    /// pure local checks with no side effects; a provider failure leaves the
    /// contribution untouched and safe to retry.
    pub async fn assign_value(
        &self,
        contribution_id: Uuid,
        raw_value: f64,
        ctx: PortalContext,
        meta: &ClientMeta,
    ) -> Result<String, AppError> {
        let value_cents = normalize_value_cents(raw_value)?;

        let detail = self.store.fetch_with_relations(contribution_id).await?;
        let contribution = &detail.contribution;

        // At-most-once pricing: a value may only be assigned while the
        // contribution has never been priced.
        if contribution.status != ContributionStatus::AwaitingValue {
            return Err(AppError::InvalidState(format!(
                "Contribution is {} and can no longer receive a value",
                contribution.status.as_str()
            )));
        }

        match authorize_portal(&ctx, contribution)? {
            PortalAuthorization::Granted => {}
            PortalAuthorization::NeedsOfficeLink { office_id } => {
                let linked = self
                    .store
                    .accounting_office_manages(office_id, contribution.employer_id)
                    .await?;
                if !linked {
                    return Err(AppError::Forbidden(
                        "Accounting office is not linked to this employer".to_string(),
                    ));
                }
            }
        }

        let competence =
            competence_label(contribution.competence_month, contribution.competence_year);
        let description = format!("{} - {}", detail.contribution_type_name, competence);
        let payer = InvoicePayer {
            name: detail.employer.name.clone(),
            tax_id: detail.employer.cnpj_cpf.clone(),
            email: detail.employer.email.clone(),
            cellphone: detail.employer.phone.clone(),
        };

        let invoice = self
            .lytex
            .create_invoice(
                &payer,
                value_cents,
                contribution.due_date,
                &description,
                &contribution_id.to_string(),
            )
            .await?;

        if let Err(e) = self
            .store
            .assign_value_and_invoice(contribution_id, value_cents, &invoice)
            .await
        {
            // The one inconsistency window: the external invoice exists but
            // is not recorded locally, and the provider has no cancel step.
            // Log everything needed for manual reconciliation; a retry
            // should recover the persistence write, not re-issue.
            tracing::error!(
                "Invoice {} issued for contribution {} but local persistence failed: {}",
                invoice.invoice_id,
                contribution_id,
                e
            );
            return Err(e);
        }

        self.store
            .log_portal_action(
                ctx.type_str(),
                ctx.portal_id(),
                "assign_value",
                meta.ip_address.as_deref(),
                meta.user_agent.as_deref(),
                json!({
                    "contribution_id": contribution_id,
                    "value_cents": value_cents,
                    "lytex_invoice_id": invoice.invoice_id,
                }),
            )
            .await;

        if matches!(ctx, PortalContext::PublicToken { .. }) {
            match self.store.clinic_contact(contribution.clinic_id).await {
                Ok(Some(clinic)) => {
                    if let Some(email) = clinic.manager_email {
                        self.notifier.notify_manager(ManagerNotification {
                            to: email,
                            clinic_name: clinic.name,
                            employer_name: detail.employer.name.clone(),
                            contribution_type: detail.contribution_type_name.clone(),
                            competence,
                            due_date: contribution.due_date,
                            value_cents,
                            invoice_url: invoice.invoice_url.clone(),
                        });
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    // Issuance already succeeded; a notification lookup
                    // failure must not undo it.
                    tracing::warn!(
                        "Could not load clinic contact for {}: {}",
                        contribution.clinic_id,
                        e
                    );
                }
            }
        }

        tracing::info!(
            "Assigned {} cents to contribution {} via {} portal (invoice {})",
            value_cents,
            contribution_id,
            ctx.type_str(),
            invoice.invoice_id
        );

        Ok(invoice.invoice_url)
    }
}
