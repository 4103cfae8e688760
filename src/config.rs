use clap::{Args, Parser};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_STARTUP_PROBE_DELAY_MS: u64 = 1_500;
const DEFAULT_LOGIN_ROUTE: &str = "/login";
const DEFAULT_PUBLIC_ROUTES: &[&str] = &[
    "/",
    "/login",
    "/register",
    "/forgot-password",
    "/reset-password",
    "/services",
    "/tours",
    "/about",
    "/contact",
];
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_INITIAL_POLL_DELAY_MS: u64 = 1_000;
const DEFAULT_STORAGE_DIR: &str = ".esce";

/// Configuration flags shared by every CLI command.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE", global = true)]
    pub config: Option<String>,

    /// Base URL of the REST API
    #[arg(long, env = "API_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Directory holding the durable store
    #[arg(long, env = "STORAGE_DIR", global = true)]
    pub storage_dir: Option<String>,

    /// Badge poll interval in seconds
    #[arg(long, global = true)]
    pub poll_interval_secs: Option<u64>,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct ConfigCli {
    #[command(flatten)]
    args: ConfigArgs,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub badges: BadgeConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub probe_timeout_ms: u64,
    pub startup_probe_delay_ms: u64,
    pub login_route: String,
    pub public_routes: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BadgeConfig {
    pub poll_interval_secs: u64,
    pub initial_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub dir: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            startup_probe_delay_ms: DEFAULT_STARTUP_PROBE_DELAY_MS,
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            public_routes: DEFAULT_PUBLIC_ROUTES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            initial_delay_ms: DEFAULT_INITIAL_POLL_DELAY_MS,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: DEFAULT_STORAGE_DIR.to_string(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl SessionConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn startup_probe_delay(&self) -> Duration {
        Duration::from_millis(self.startup_probe_delay_ms)
    }
}

impl BadgeConfig {
    pub fn poll_interval(&self) -> Duration {
        // A zero period would spin the poller.
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

impl StorageConfig {
    /// File backing the durable store.
    pub fn durable_path(&self) -> PathBuf {
        PathBuf::from(&self.dir).join("durable.json")
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = ConfigCli::try_parse_from(args)
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::load_with(&cli.args)
    }

    /// Layer defaults, config file, `ESCE_` environment and CLI flags.
    ///
    /// Priority: CLI flag > CLI env var > `ESCE_` env var > config file > defaults.
    pub fn load_with(cli: &ConfigArgs) -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("api.base_url", defaults.api.base_url)?
            .set_default("api.request_timeout_ms", defaults.api.request_timeout_ms)?
            .set_default("session.probe_timeout_ms", defaults.session.probe_timeout_ms)?
            .set_default(
                "session.startup_probe_delay_ms",
                defaults.session.startup_probe_delay_ms,
            )?
            .set_default("session.login_route", defaults.session.login_route)?
            .set_default("session.public_routes", defaults.session.public_routes)?
            .set_default("badges.poll_interval_secs", defaults.badges.poll_interval_secs)?
            .set_default("badges.initial_delay_ms", defaults.badges.initial_delay_ms)?
            .set_default("storage.dir", defaults.storage.dir)?;

        // 2. Config file: explicit path must exist, ./esce.* is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("esce").required(false)),
        };

        // 3. Environment variables (prefixed with ESCE_)
        // E.g. ESCE_API__BASE_URL=https://api.esce.vn/api
        builder = builder.add_source(
            Environment::with_prefix("ESCE")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI overrides (clap already folded in their env vars)
        if let Some(url) = &cli.base_url {
            builder = builder.set_override("api.base_url", url.as_str())?;
        }
        if let Some(dir) = &cli.storage_dir {
            builder = builder.set_override("storage.dir", dir.as_str())?;
        }
        if let Some(secs) = cli.poll_interval_secs {
            builder = builder.set_override("badges.poll_interval_secs", secs)?;
        }
        if let Ok(val) = env::var("ESCE_SESSION__PUBLIC_ROUTES") {
            let routes: Vec<String> = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            builder = builder.set_override("session.public_routes", routes)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}
