use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origin: Option<String>,
    pub max_body_bytes: usize,
    pub uploads_dir: PathBuf,
    pub generated_dir: PathBuf,
    pub upload_admin_token: Option<String>,
    pub admin_email: String,
    pub smtp: SmtpConfig,
    pub chromium_bin: String,
    pub render_timeout: Duration,
    pub payment: PaymentConfig,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub starttls: bool,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct PaymentConfig {
    pub settlement_delay: Duration,
    pub iban: String,
    pub bic: String,
    pub beneficiary: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let max_body_bytes = env::var("MAX_BODY_BYTES")
            .ok()
            .map(|value| value.parse())
            .transpose()
            .context("MAX_BODY_BYTES must be an integer")?
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        let public_dir = PathBuf::from(env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".into()));
        let uploads_dir = env::var("UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| public_dir.join("uploads"));
        let generated_dir = env::var("GENERATED_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| public_dir.join("generated"));
        let upload_admin_token = env::var("UPLOAD_ADMIN_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        let admin_email =
            env::var("ADMIN_EMAIL").unwrap_or_else(|_| "support@mindgraphix.com".to_string());

        let smtp = SmtpConfig {
            host: env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "1025".to_string())
                .parse()
                .context("SMTP_PORT must be a valid u16")?,
            from: env::var("SMTP_FROM")
                .unwrap_or_else(|_| "no-reply@mindgraphix.local".to_string()),
            username: env::var("SMTP_USERNAME").ok(),
            password: env::var("SMTP_PASSWORD").ok(),
            starttls: env_flag("SMTP_STARTTLS"),
            timeout: Duration::from_secs(
                env::var("SMTP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .context("SMTP_TIMEOUT_SECS must be an integer")?,
            ),
        };

        let chromium_bin = env::var("CHROMIUM_BIN").unwrap_or_else(|_| "chromium".to_string());
        let render_timeout = Duration::from_secs(
            env::var("RENDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("RENDER_TIMEOUT_SECS must be an integer")?,
        );

        let payment = PaymentConfig {
            settlement_delay: Duration::from_millis(
                env::var("PAYMENT_SETTLEMENT_MS")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .context("PAYMENT_SETTLEMENT_MS must be an integer")?,
            ),
            iban: env::var("PAYMENT_IBAN")
                .unwrap_or_else(|_| "FR76 1234 5678 9012 3456 7890 123".to_string()),
            bic: env::var("PAYMENT_BIC").unwrap_or_else(|_| "BANKFRPP".to_string()),
            beneficiary: env::var("PAYMENT_BENEFICIARY")
                .unwrap_or_else(|_| "Mind Graphix Solution".to_string()),
        };

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            cors_allowed_origin,
            max_body_bytes,
            uploads_dir,
            generated_dir,
            upload_admin_token,
            admin_email,
            smtp,
            chromium_bin,
            render_timeout,
            payment,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
