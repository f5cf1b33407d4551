//! Configuration module
//!
//! Engine settings (capacity threshold, deadline window, scan cadence) and the
//! database/logging settings the CLI needs, loaded from the environment.

use std::env;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const WORKLOAD_THRESHOLD: u32 = 10;
const DEADLINE_DAYS_THRESHOLD: i64 = 3;
const DEADLINE_SCAN_INTERVAL_SECS: u64 = 3600;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Upper bound for any single storage call
    pub db_timeout_seconds: u64,
    pub environment: String,
    /// Concurrent active assignments that count as 100% workload
    pub workload_threshold: u32,
    pub deadline_days_threshold: i64,
    pub deadline_scan_interval_secs: u64,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            environment: "development".to_string(),
            workload_threshold: WORKLOAD_THRESHOLD,
            deadline_days_threshold: DEADLINE_DAYS_THRESHOLD,
            deadline_scan_interval_secs: DEADLINE_SCAN_INTERVAL_SECS,
            log_format: LogFormat::Pretty,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let log_format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "pretty".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "pretty" | "text" => LogFormat::Pretty,
            other => {
                return Err(anyhow::anyhow!(
                    "LOG_FORMAT must be 'pretty' or 'json', got '{}'",
                    other
                ))
            }
        };

        Ok(Self {
            database_url: env::var("FLOWDESK_DATABASE_URL")
                .or_else(|_| env::var("DATABASE_URL"))
                .ok(),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            environment,
            workload_threshold: env::var("WORKLOAD_THRESHOLD")
                .unwrap_or_else(|_| WORKLOAD_THRESHOLD.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKLOAD_THRESHOLD must be a positive integer"))?,
            deadline_days_threshold: env::var("DEADLINE_DAYS_THRESHOLD")
                .unwrap_or_else(|_| DEADLINE_DAYS_THRESHOLD.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DEADLINE_DAYS_THRESHOLD must be an integer"))?,
            deadline_scan_interval_secs: env::var("DEADLINE_SCAN_INTERVAL_SECS")
                .unwrap_or_else(|_| DEADLINE_SCAN_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(DEADLINE_SCAN_INTERVAL_SECS),
            log_format,
        })
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.workload_threshold == 0 {
            return Err(anyhow::anyhow!("WORKLOAD_THRESHOLD must be greater than 0"));
        }
        if self.deadline_days_threshold < 0 {
            return Err(anyhow::anyhow!("DEADLINE_DAYS_THRESHOLD cannot be negative"));
        }
        if self.deadline_scan_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "DEADLINE_SCAN_INTERVAL_SECS must be greater than 0"
            ));
        }
        if let Some(ref url) = self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }
        Ok(())
    }

    pub fn database_url(&self) -> Result<&str, anyhow::Error> {
        self.database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("FLOWDESK_DATABASE_URL or DATABASE_URL must be set"))
    }
}
