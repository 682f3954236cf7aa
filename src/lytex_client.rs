use crate::config::Config;
use crate::errors::AppError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

/// Tokens are refreshed when their expiry is closer than this.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// Bounded timeout for all provider calls.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Payer data forwarded to Lytex when issuing an invoice.
#[derive(Debug, Clone, Serialize)]
pub struct InvoicePayer {
    pub name: String,
    /// CNPJ or CPF, digits only.
    pub tax_id: String,
    pub email: Option<String>,
    pub cellphone: Option<String>,
}

/// Normalized shape of a freshly created Lytex invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub invoice_id: String,
    /// First non-null of linkCheckout / linkBoleto / invoiceUrl.
    pub invoice_url: String,
    pub barcode: Option<String>,
    pub digitable_line: Option<String>,
    pub pix_code: Option<String>,
    pub pix_qr: Option<String>,
}

/// Normalized invoice state as reported by Lytex.
#[derive(Debug, Clone)]
pub struct InvoiceStatus {
    /// Provider status string ("paid", "pending", "overdue", ...).
    pub status: String,
    /// Amount the provider reports as paid/charged, in cents.
    pub paid_value: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Client for the Lytex invoicing provider.
///
/// Holds the process-wide access-token cache. Concurrent requests may race
/// to refresh the token; multiple valid tokens can coexist on the provider
/// side, so whichever refresh lands last simply wins.
pub struct LytexClient {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token_cache: RwLock<Option<CachedToken>>,
}

impl LytexClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.lytex_base_url.clone(),
            client_id: config.lytex_client_id.clone(),
            client_secret: config.lytex_client_secret.clone(),
            token_cache: RwLock::new(None),
        })
    }

    /// Returns a bearer token, reusing the cached one while its expiry is
    /// more than five minutes away.
    pub async fn get_access_token(&self) -> Result<String, AppError> {
        if let Some(cached) = self.token_cache.read().await.as_ref() {
            if cached.expires_at - Utc::now() > Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) {
                return Ok(cached.access_token.clone());
            }
        }

        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(AppError::Authentication(
                "Lytex credentials not configured".to_string(),
            ));
        }

        let url = format!("{}/auth/obtain_token", self.base_url);
        tracing::debug!("Requesting Lytex access token");

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "clientId": self.client_id,
                "clientSecret": self.client_secret,
            }))
            .send()
            .await
            .map_err(|e| AppError::Authentication(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Authentication(format!(
                "Lytex token endpoint returned status {}: {}",
                status, error_text
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            AppError::Authentication(format!("Failed to parse token response: {}", e))
        })?;

        let access_token = body
            .get("accessToken")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AppError::Authentication("Token response missing accessToken".to_string())
            })?
            .to_string();
        let expires_in = body.get("expiresIn").and_then(|v| v.as_i64()).unwrap_or(0);

        let token = CachedToken {
            access_token: access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        };
        *self.token_cache.write().await = Some(token);

        tracing::info!("Lytex access token refreshed (expires in {}s)", expires_in);
        Ok(access_token)
    }

    /// Issues an invoice for one contribution.
    ///
    /// Enables PIX and boleto, disables card payment, and tags the request
    /// with `reference_id` (the contribution id) so the provider can
    /// correlate retries. No local state is mutated.
    pub async fn create_invoice(
        &self,
        payer: &InvoicePayer,
        amount_cents: i64,
        due_date: NaiveDate,
        description: &str,
        reference_id: &str,
    ) -> Result<NewInvoice, AppError> {
        let token = self.get_access_token().await?;

        let mut payer_body = json!({
            "type": payer_type(&payer.tax_id),
            "name": payer.name,
            "cpfCnpj": payer.tax_id,
        });
        if let Some(ref email) = payer.email {
            payer_body["email"] = json!(email);
        }
        if let Some(ref phone) = payer.cellphone {
            payer_body["cellphone"] = json!(phone);
        }

        let payload = json!({
            "payer": payer_body,
            "items": [{
                "name": description,
                "quantity": 1,
                "value": amount_cents,
            }],
            "dueDate": due_date.format("%Y-%m-%d").to_string(),
            "paymentMethods": {
                "pix": { "enable": true },
                "boleto": { "enable": true },
                "creditCard": { "enable": false },
            },
            "referenceId": reference_id,
        });

        tracing::info!(
            "Creating Lytex invoice for reference {} ({} cents)",
            reference_id,
            amount_cents
        );

        let response = self
            .client
            .post(format!("{}/invoices", self.base_url))
            .header("Authorization", format!("Bearer {}", token))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::InvoiceCreation { status, message });
        }

        let body: Value = response.json().await.map_err(|e| {
            AppError::ProviderUnavailable(format!("Failed to parse invoice response: {}", e))
        })?;

        let invoice = normalize_new_invoice(&body)?;
        tracing::info!(
            "Lytex invoice {} created for reference {}",
            invoice.invoice_id,
            reference_id
        );
        Ok(invoice)
    }

    /// Fetches the current state of one invoice.
    pub async fn get_invoice(&self, invoice_id: &str) -> Result<InvoiceStatus, AppError> {
        let token = self.get_access_token().await?;

        let response = self
            .client
            .get(format!("{}/invoices/{}", self.base_url, invoice_id))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ProviderUnavailable(format!(
                "Lytex invoice lookup returned status {}: {}",
                status, error_text
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            AppError::ProviderUnavailable(format!("Failed to parse invoice status: {}", e))
        })?;

        Ok(InvoiceStatus {
            status: body
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            paid_value: body
                .get("paidValue")
                .or_else(|| body.get("totalValue"))
                .and_then(|v| v.as_i64()),
            paid_at: body
                .get("paidAt")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }
}

/// Lytex payer type from the tax identifier: 14 digits is a CNPJ
/// (organization, "pj"), anything else is treated as a CPF ("pf").
pub fn payer_type(tax_id: &str) -> &'static str {
    let digits = tax_id.chars().filter(|c| c.is_ascii_digit()).count();
    if digits == 14 {
        "pj"
    } else {
        "pf"
    }
}

fn normalize_new_invoice(body: &Value) -> Result<NewInvoice, AppError> {
    let invoice_id = body
        .get("id")
        .or_else(|| body.get("_id"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            AppError::ProviderUnavailable("Invoice response missing id".to_string())
        })?
        .to_string();

    let invoice_url = body
        .get("linkCheckout")
        .or_else(|| body.get("linkBoleto"))
        .or_else(|| body.get("invoiceUrl"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            AppError::ProviderUnavailable("Invoice response missing checkout URL".to_string())
        })?
        .to_string();

    let boleto = body.get("boleto");
    let pix = body.get("pix");

    Ok(NewInvoice {
        invoice_id,
        invoice_url,
        barcode: boleto
            .and_then(|b| b.get("barCode"))
            .and_then(|v| v.as_str())
            .map(String::from),
        digitable_line: boleto
            .and_then(|b| b.get("digitableLine"))
            .and_then(|v| v.as_str())
            .map(String::from),
        pix_code: pix
            .and_then(|p| p.get("code"))
            .and_then(|v| v.as_str())
            .map(String::from),
        pix_qr: pix
            .and_then(|p| p.get("qrCode"))
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}
