use std::time::Duration;

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| v.trim() != "0")
}

/// Tunable knobs for the extraction engine.
///
/// Defaults are reasonable for an unattended daily run; every wait and retry
/// bound can be overridden via `FAREWATCH_*` environment variables so field
/// tuning never needs a rebuild.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded wait for the result container after loading a query.
    pub results_timeout: Duration,
    /// Bounded wait per overlay before giving up on dismissing it.
    pub overlay_wait: Duration,
    /// Poll interval while waiting for an overlay to disappear.
    pub overlay_poll: Duration,
    /// Short wait to detect whether an overlay is present at all.
    pub overlay_detect: Duration,
    /// Settle time after each expansion or sort interaction.
    pub interaction_settle: Duration,
    /// Maximum number of "show more" expansions per search.
    pub max_expansions: u32,
    /// Retries per search for transient failures, session reset in between.
    pub max_retries: u32,
    /// Click the cheapest-sort toggle once results are up.
    pub sort_cheapest: bool,
    /// Currency assumed when a rendered price carries no symbol or code.
    pub default_currency: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            results_timeout: Duration::from_secs(15),
            overlay_wait: Duration::from_secs(5),
            overlay_poll: Duration::from_millis(250),
            overlay_detect: Duration::from_millis(1500),
            interaction_settle: Duration::from_millis(2000),
            max_expansions: 3,
            max_retries: 2,
            sort_cheapest: true,
            default_currency: "EUR".to_string(),
            viewport_width: 1920,
            viewport_height: 1080,
        }
    }
}

impl EngineConfig {
    /// Defaults with `FAREWATCH_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(s) = env_u64("FAREWATCH_RESULTS_TIMEOUT_SECS") {
            cfg.results_timeout = Duration::from_secs(s);
        }
        if let Some(ms) = env_u64("FAREWATCH_OVERLAY_WAIT_MS") {
            cfg.overlay_wait = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("FAREWATCH_SETTLE_MS") {
            cfg.interaction_settle = Duration::from_millis(ms);
        }
        if let Some(n) = env_u32("FAREWATCH_MAX_EXPANSIONS") {
            cfg.max_expansions = n;
        }
        if let Some(n) = env_u32("FAREWATCH_MAX_RETRIES") {
            cfg.max_retries = n;
        }
        if let Some(b) = env_bool("FAREWATCH_SORT_CHEAPEST") {
            cfg.sort_cheapest = b;
        }
        if let Ok(c) = std::env::var("FAREWATCH_DEFAULT_CURRENCY") {
            let c = c.trim().to_uppercase();
            if !c.is_empty() {
                cfg.default_currency = c;
            }
        }
        cfg
    }
}
