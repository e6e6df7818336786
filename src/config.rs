use clap::Parser;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_CLIENT_URL: &str = "http://localhost:3000";
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8000";
pub const DEFAULT_CURRENCY: &str = "eur";
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com";
pub const DEFAULT_ALMA_API_URL: &str = "https://api.getalma.eu/v1/payments";
pub const DEFAULT_ALMA_MAX_AMOUNT: Decimal = Decimal::from_parts(2000, 0, 0, false, 0);
pub const DEFAULT_ALMA_INSTALLMENTS: u8 = 3;
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Runtime configuration. Every option can be given as a flag or through the environment.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Order payment orchestration service", long_about = None)]
pub struct Settings {
    /// Port the HTTP server listens on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "DATABASE_PATH")]
    pub db_path: Option<PathBuf>,

    /// Storefront base URL, used for return and success links
    #[arg(long, env = "CLIENT_URL", default_value = DEFAULT_CLIENT_URL)]
    pub client_url: String,

    /// Base URL this server is reachable at, used for demo checkout links
    #[arg(long, env = "PUBLIC_URL", default_value = DEFAULT_PUBLIC_URL)]
    pub public_url: String,

    /// Currency applied when a payment request does not name one
    #[arg(long, env = "DEFAULT_CURRENCY", default_value = DEFAULT_CURRENCY)]
    pub default_currency: String,

    /// Upper bound for a single outbound provider call
    #[arg(long, env = "PROVIDER_TIMEOUT_MS", default_value_t = DEFAULT_PROVIDER_TIMEOUT_MS)]
    pub provider_timeout_ms: u64,

    #[arg(long, env = "STRIPE_API_URL", default_value = DEFAULT_STRIPE_API_URL)]
    pub stripe_api_url: String,

    #[arg(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    pub stripe_secret_key: Option<String>,

    #[arg(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true)]
    pub stripe_webhook_secret: Option<String>,

    /// Maximum age of a signed webhook before it is refused as a replay
    #[arg(long, env = "WEBHOOK_TOLERANCE_SECS", default_value_t = DEFAULT_WEBHOOK_TOLERANCE_SECS)]
    pub webhook_tolerance_secs: i64,

    #[arg(long, env = "ALMA_API_URL", default_value = DEFAULT_ALMA_API_URL)]
    pub alma_api_url: String,

    #[arg(long, env = "ALMA_MERCHANT")]
    pub alma_merchant: Option<String>,

    #[arg(long, env = "ALMA_SECRET_KEY", hide_env_values = true)]
    pub alma_secret_key: Option<String>,

    /// Largest amount Alma may finance, in major currency units
    #[arg(long, env = "ALMA_MAX_AMOUNT", default_value_t = DEFAULT_ALMA_MAX_AMOUNT)]
    pub alma_max_amount: Decimal,

    #[arg(long, env = "ALMA_INSTALLMENTS", default_value_t = DEFAULT_ALMA_INSTALLMENTS)]
    pub alma_installments: u8,

    /// Serve the simulated Alma checkout pages. Never enable in production.
    #[arg(long, env = "ENABLE_DEMO_CHECKOUT")]
    pub enable_demo_checkout: bool,

    /// Accept webhooks when no signing secret is configured (logged as unverified)
    #[arg(long, env = "ALLOW_UNSIGNED_WEBHOOKS")]
    pub allow_unsigned_webhooks: bool,
}

impl Settings {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn client_url(&self) -> &str {
        self.client_url.trim_end_matches('/')
    }

    pub fn public_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: None,
            client_url: DEFAULT_CLIENT_URL.to_string(),
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            default_currency: DEFAULT_CURRENCY.to_string(),
            provider_timeout_ms: DEFAULT_PROVIDER_TIMEOUT_MS,
            stripe_api_url: DEFAULT_STRIPE_API_URL.to_string(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
            alma_api_url: DEFAULT_ALMA_API_URL.to_string(),
            alma_merchant: None,
            alma_secret_key: None,
            alma_max_amount: DEFAULT_ALMA_MAX_AMOUNT,
            alma_installments: DEFAULT_ALMA_INSTALLMENTS,
            enable_demo_checkout: false,
            allow_unsigned_webhooks: false,
        }
    }
}
