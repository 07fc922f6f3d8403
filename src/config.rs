use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Hard clamp range for the performance fee, in basis points.
pub const MIN_FEE_BPS: u32 = 500;
pub const MAX_FEE_BPS: u32 = 2000;
pub const DEFAULT_FEE_BPS: u32 = 500;

/// Floor for the autonomy loop interval, to prevent pathological tight loops.
pub const MIN_CYCLE_INTERVAL_SECS: u64 = 10;

/// Main configuration structure, resolved once at process start.
///
/// Components never read environment variables at call time; everything they
/// need is passed in from here.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub features: FeatureConfig,
    pub chain: ChainConfig,
    pub session: SessionConfig,
    pub scheduler: SchedulerConfig,
    pub fees: FeeConfig,
    pub guardrails: GuardrailConfig,
    #[serde(default)]
    pub dedupe: DedupeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Feature gates read at startup
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfig {
    /// Master switch for any value-moving execution
    pub execution_enabled: bool,
    /// Switch for delegated session-key issuance
    pub session_keys_enabled: bool,
    /// Testnet vs mainnet allowlists and chain defaults
    #[serde(default)]
    pub testnet: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Chain ID all sessions and intents are bound to
    pub chain_id: u64,
    /// Account-state RPC endpoint (balances, signer, op nonce)
    pub rpc_url: String,
    /// Relay/bundler JSON-RPC endpoint
    pub bundler_url: String,
    /// Entry point contract the bundler verifies operations against
    pub entry_point: String,
    /// RPC call timeout in milliseconds
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Hard cap on requested session duration (seconds)
    #[serde(default = "default_max_session_secs")]
    pub max_duration_secs: u64,
    /// Default spend cap in input-token base units, as a decimal string
    pub default_max_amount_in: String,
    /// Default slippage tolerance (basis points)
    #[serde(default = "default_slippage_bps")]
    pub default_max_slippage_bps: u32,
    /// Default price impact tolerance (basis points)
    #[serde(default = "default_impact_bps")]
    pub default_max_price_impact_bps: u32,
}

fn default_max_session_secs() -> u64 {
    86_400 // 24 hours
}

fn default_slippage_bps() -> u32 {
    100
}

fn default_impact_bps() -> u32 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between autonomy cycles (seconds); floored at
    /// MIN_CYCLE_INTERVAL_SECS
    pub interval_secs: u64,
}

impl SchedulerConfig {
    /// Effective interval after the floor is applied
    pub fn effective_interval_secs(&self) -> u64 {
        self.interval_secs.max(MIN_CYCLE_INTERVAL_SECS)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    /// Performance fee in basis points, as a string so malformed deployments
    /// degrade to the default instead of failing the cycle
    #[serde(default = "default_fee_bps_raw")]
    pub fee_bps: String,
    /// Dry-run mode: sweep instructions are built but never executable
    #[serde(default)]
    pub dry_run: bool,
    /// Whether the operator has approved automatic fee sweeps
    #[serde(default)]
    pub sweep_approved: bool,
    /// Fee recipient address
    #[serde(default)]
    pub recipient: String,
    /// Token the fee is denominated in
    #[serde(default)]
    pub fee_token: String,
}

fn default_fee_bps_raw() -> String {
    DEFAULT_FEE_BPS.to_string()
}

impl FeeConfig {
    /// Resolve the configured fee, clamping to the hard range.
    ///
    /// Unparseable or out-of-range values silently fall back to the default;
    /// a bad fee setting must never fail an accounting cycle.
    pub fn effective_fee_bps(&self) -> u32 {
        match self.fee_bps.trim().parse::<u32>() {
            Ok(bps) if (MIN_FEE_BPS..=MAX_FEE_BPS).contains(&bps) => bps,
            _ => DEFAULT_FEE_BPS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardrailConfig {
    /// Maximum age of a quote-derived deadline before it is considered stale
    #[serde(default = "default_quote_max_age_secs")]
    pub quote_max_age_secs: u64,
}

fn default_quote_max_age_secs() -> u64 {
    120
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            quote_max_age_secs: default_quote_max_age_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupeConfig {
    /// Default TTL for dedupe claims (seconds)
    #[serde(default = "default_dedupe_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Hard cap on stored dedupe entries
    #[serde(default = "default_dedupe_max_entries")]
    pub max_entries: usize,
}

fn default_dedupe_ttl_secs() -> u64 {
    600
}

fn default_dedupe_max_entries() -> usize {
    10_000
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_dedupe_ttl_secs(),
            max_entries: default_dedupe_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("features.testnet", false)?
            .set_default("chain.rpc_timeout_ms", 10_000)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("STEWARD_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (STEWARD_CHAIN__RPC_URL, etc.)
            .add_source(
                Environment::with_prefix("STEWARD")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.chain.chain_id == 0 {
            errors.push("chain_id must be non-zero".to_string());
        }

        if self.chain.rpc_url.is_empty() {
            errors.push("rpc_url must be set".to_string());
        }

        if self.chain.bundler_url.is_empty() {
            errors.push("bundler_url must be set".to_string());
        }

        if self.chain.entry_point.parse::<ethers::types::Address>().is_err() {
            errors.push(format!("entry_point is not an address: {}", self.chain.entry_point));
        }

        if self.session.max_duration_secs == 0 {
            errors.push("session.max_duration_secs must be positive".to_string());
        }

        if self.session.default_max_amount_in.parse::<u128>().is_err() {
            errors.push(format!(
                "session.default_max_amount_in is not an integer amount: {}",
                self.session.default_max_amount_in
            ));
        }

        if self.scheduler.interval_secs == 0 {
            errors.push("scheduler.interval_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
