use std::path::PathBuf;

use crate::model::ModelRoutes;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONCURRENT_RUNS: usize = 8;
const DEFAULT_MODEL_TIMEOUT: u64 = 120;
const DEFAULT_MODEL_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL_ROUTES: &str = "default=gpt-4o,mini=gpt-4o-mini";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub max_concurrent_runs: usize,
    pub model_timeout_secs: u64,
    pub model_base_url: String,
    pub model_api_key: Option<String>,
    pub model_routes: String,
    pub assembly_seed_file: Option<PathBuf>,
    pub event_channel_capacity: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` reads the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            port: env_parse(&lookup, "PORT", DEFAULT_PORT),
            max_concurrent_runs: env_parse(&lookup, "MAX_CONCURRENT_RUNS", DEFAULT_MAX_CONCURRENT_RUNS)
                .max(1),
            model_timeout_secs: env_parse(&lookup, "MODEL_TIMEOUT_SECS", DEFAULT_MODEL_TIMEOUT).max(1),
            model_base_url: lookup("MODEL_BASE_URL")
                .unwrap_or_else(|| DEFAULT_MODEL_BASE_URL.into()),
            model_api_key: lookup("MODEL_API_KEY").filter(|k| !k.is_empty()),
            model_routes: lookup("MODEL_ROUTES").unwrap_or_else(|| DEFAULT_MODEL_ROUTES.into()),
            assembly_seed_file: lookup("ASSEMBLY_SEED_FILE").map(PathBuf::from),
            event_channel_capacity: env_parse(
                &lookup,
                "EVENT_CHANNEL_CAPACITY",
                DEFAULT_EVENT_CHANNEL_CAPACITY,
            )
            .max(1),
        }
    }

    pub fn model_routes(&self) -> ModelRoutes {
        ModelRoutes::parse(&self.model_routes)
    }

    pub fn print_banner(&self) {
        let routes = self.model_routes();
        tracing::info!("╔══════════════════════════════════════════════════╗");
        tracing::info!("║         grader-orchestrator v{:<20}║", env!("CARGO_PKG_VERSION"));
        tracing::info!("╠══════════════════════════════════════════════════╣");
        tracing::info!("║  Port:              {:<28}║", self.port);
        tracing::info!("║  Max runs:          {:<28}║", self.max_concurrent_runs);
        tracing::info!("║  Model timeout:     {:<25}s ║", self.model_timeout_secs);
        tracing::info!("║  Model endpoint:    {:<28}║", self.model_base_url);
        tracing::info!("║  Model auth:        {:<28}║", if self.model_api_key.is_some() { "bearer" } else { "none" });
        tracing::info!("║  Routes:            {:<28}║", format!("{} ({})", routes.len(), routes.ids().join(",")));
        tracing::info!("║  Seed file:         {:<28}║", self.assembly_seed_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "-".into()));
        tracing::info!("╚══════════════════════════════════════════════════╝");
    }
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
