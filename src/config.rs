use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub lytex_base_url: String,
    pub lytex_client_id: String,
    pub lytex_client_secret: String,
    /// Platform messaging endpoint for manager notifications; notifications
    /// are disabled when unset.
    pub notify_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            lytex_base_url: std::env::var("LYTEX_BASE_URL")
                .map_err(|_| anyhow::anyhow!("LYTEX_BASE_URL environment variable required"))
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("LYTEX_BASE_URL cannot be empty");
                    }
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("LYTEX_BASE_URL must start with http:// or https://");
                    }
                    Ok(url.trim_end_matches('/').to_string())
                })?,
            lytex_client_id: std::env::var("LYTEX_CLIENT_ID")
                .map_err(|_| anyhow::anyhow!("LYTEX_CLIENT_ID environment variable required"))
                .and_then(|id| {
                    if id.trim().is_empty() {
                        anyhow::bail!("LYTEX_CLIENT_ID cannot be empty");
                    }
                    Ok(id)
                })?,
            lytex_client_secret: std::env::var("LYTEX_CLIENT_SECRET")
                .map_err(|_| anyhow::anyhow!("LYTEX_CLIENT_SECRET environment variable required"))
                .and_then(|secret| {
                    if secret.trim().is_empty() {
                        anyhow::bail!("LYTEX_CLIENT_SECRET cannot be empty");
                    }
                    Ok(secret)
                })?,
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Lytex base URL: {}", config.lytex_base_url);
        if let Some(ref url) = config.notify_webhook_url {
            tracing::info!("Manager notification webhook configured: {}", url);
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
