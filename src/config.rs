use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Which ledger store backs the services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Postgres,
    Memory,
}

/// Which payment gateway adapter is injected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    Live,
    Simulated,
}

/// Payment gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub mode: GatewayMode,
    pub base_url: String,
    pub secret_key: String,
    pub merchant_id: String,
    pub webhook_secret: String,
    pub callback_url: String,
    pub timeout_secs: u64,
}

/// Minimum amounts enforced before any ledger mutation
#[derive(Debug, Clone)]
pub struct LedgerLimits {
    pub min_deposit: Decimal,
    pub min_withdrawal: Decimal,
    pub min_transfer: Decimal,
}

/// Background reconciliation settings
#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub stale_after_secs: u64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_mode: StoreMode,
    pub database: Option<DatabaseConfig>,
    pub gateway: GatewayConfig,
    pub limits: LedgerLimits,
    pub reconciliation: ReconciliationConfig,
    pub audit_log_dir: Option<String>,
    pub log_level: String,
    pub log_format: String,
    pub environment: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_decimal(key: &str, default: Decimal) -> Result<Decimal, String> {
    match env::var(key) {
        Ok(raw) => Decimal::from_str(raw.trim())
            .map_err(|e| format!("{} must be a decimal amount: {}", key, e)),
        Err(_) => Ok(default),
    }
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is required")?;

        let max_connections = env_or("DATABASE_MAX_CONNECTIONS", 10u32);
        let acquire_timeout_secs = env_or("DATABASE_ACQUIRE_TIMEOUT_SECS", 30u64);
        let idle_timeout_secs = env_or("DATABASE_IDLE_TIMEOUT_SECS", 600u64); // 10 minutes
        let max_lifetime_secs = env_or("DATABASE_MAX_LIFETIME_SECS", 1800u64); // 30 minutes
        let test_before_acquire = env_or("DATABASE_TEST_BEFORE_ACQUIRE", true);

        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        })
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/moneyflow".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

impl GatewayConfig {
    /// Create gateway config from environment variables.
    ///
    /// Live mode requires `GATEWAY_SECRET_KEY` and `GATEWAY_MERCHANT_ID`.
    pub fn from_env() -> Result<Self, String> {
        let mode = match env::var("PAYMENT_GATEWAY_MODE")
            .unwrap_or_else(|_| "simulated".to_string())
            .to_lowercase()
            .as_str()
        {
            "live" => GatewayMode::Live,
            "simulated" | "mock" => GatewayMode::Simulated,
            other => {
                return Err(format!(
                    "Invalid PAYMENT_GATEWAY_MODE: {}. Must be one of: live, simulated",
                    other
                ))
            }
        };

        let defaults = Self::default();
        let secret_key = env::var("GATEWAY_SECRET_KEY").unwrap_or_default();
        let merchant_id = env::var("GATEWAY_MERCHANT_ID").unwrap_or(defaults.merchant_id);

        if mode == GatewayMode::Live && secret_key.is_empty() {
            return Err("GATEWAY_SECRET_KEY is required when PAYMENT_GATEWAY_MODE=live".to_string());
        }

        let timeout_secs = env_or("GATEWAY_TIMEOUT_SECS", defaults.timeout_secs);
        if timeout_secs == 0 {
            return Err("GATEWAY_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            mode,
            base_url: env::var("GATEWAY_BASE_URL").unwrap_or(defaults.base_url),
            webhook_secret: env::var("GATEWAY_WEBHOOK_SECRET").unwrap_or_else(|_| secret_key.clone()),
            secret_key,
            merchant_id,
            callback_url: env::var("GATEWAY_CALLBACK_URL").unwrap_or(defaults.callback_url),
            timeout_secs,
        })
    }

    /// Client-side bound on every gateway call
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Simulated,
            base_url: "https://sandbox-api-d.squadco.com".to_string(),
            secret_key: String::new(),
            merchant_id: "MFSIM".to_string(),
            webhook_secret: String::new(),
            callback_url: "http://localhost:3000/payments/callback".to_string(),
            timeout_secs: 15,
        }
    }
}

impl LedgerLimits {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let limits = Self {
            min_deposit: env_decimal("MIN_DEPOSIT_AMOUNT", defaults.min_deposit)?,
            min_withdrawal: env_decimal("MIN_WITHDRAWAL_AMOUNT", defaults.min_withdrawal)?,
            min_transfer: env_decimal("MIN_TRANSFER_AMOUNT", defaults.min_transfer)?,
        };

        for (name, value) in [
            ("MIN_DEPOSIT_AMOUNT", limits.min_deposit),
            ("MIN_WITHDRAWAL_AMOUNT", limits.min_withdrawal),
            ("MIN_TRANSFER_AMOUNT", limits.min_transfer),
        ] {
            if value <= Decimal::ZERO {
                return Err(format!("{} must be greater than 0", name));
            }
        }

        Ok(limits)
    }
}

impl Default for LedgerLimits {
    fn default() -> Self {
        Self {
            min_deposit: Decimal::new(100, 0),
            min_withdrawal: Decimal::new(100, 0),
            min_transfer: Decimal::new(10, 0),
        }
    }
}

impl ReconciliationConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_or("RECONCILIATION_ENABLED", defaults.enabled),
            interval_secs: env_or("RECONCILIATION_INTERVAL_SECS", defaults.interval_secs).max(1),
            stale_after_secs: env_or("RECONCILIATION_STALE_AFTER_SECS", defaults.stale_after_secs),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            stale_after_secs: 900, // 15 minutes
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let store_mode = match env::var("LEDGER_STORE")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StoreMode::Postgres,
            "memory" => StoreMode::Memory,
            other => {
                return Err(format!(
                    "Invalid LEDGER_STORE: {}. Must be one of: postgres, memory",
                    other
                ))
            }
        };

        let database = match store_mode {
            StoreMode::Postgres => Some(DatabaseConfig::from_env()?),
            StoreMode::Memory => None,
        };

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_FORMAT: {}. Must be one of: {:?}",
                log_format, valid_log_formats
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        let gateway = GatewayConfig::from_env()?;
        if environment.eq_ignore_ascii_case("production") && gateway.mode == GatewayMode::Simulated {
            return Err("PAYMENT_GATEWAY_MODE=simulated is not allowed in production".to_string());
        }

        Ok(Self {
            store_mode,
            database,
            gateway,
            limits: LedgerLimits::from_env()?,
            reconciliation: ReconciliationConfig::from_env(),
            audit_log_dir: env::var("AUDIT_LOG_DIR").ok(),
            log_level: log_level.to_lowercase(),
            log_format: log_format.to_lowercase(),
            environment: environment.to_lowercase(),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_mode: StoreMode::Memory,
            database: None,
            gateway: GatewayConfig::default(),
            limits: LedgerLimits::default(),
            reconciliation: ReconciliationConfig::default(),
            audit_log_dir: None,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            environment: "development".to_string(),
        }
    }
}
