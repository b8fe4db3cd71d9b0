//! Resource controller module configuration.
//!
//! Module-wide settings are loaded once; [`ControllerConfig::options_for`]
//! derives the request-scoped [`ConfigOptions`] from them.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use resource_controller_sdk::{ConfigOptions, SortOrder};
use serde::{Deserialize, Deserializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::api::{ControllerMethod, QueryParams};

/// Environment variables with this prefix override file settings
/// (`RESOURCE_CONTROLLER__CACHE__TTL=5m`).
pub const ENV_PREFIX: &str = "RESOURCE_CONTROLLER__";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub query: QueryConfig,
    pub jwt: JwtConfig,
    pub cache: CacheConfig,
    /// Validate state attribute transitions on create/update.
    pub state_machine: bool,
    /// Check free-text attributes against the dictionary.
    pub spell_check: bool,
    /// Pack declared boolean flags into their integer attribute.
    pub bit_mask: bool,
    /// Upper bound for every persistence call.
    #[serde(default = "default_store_timeout", with = "humantime_duration")]
    pub store_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            query: QueryConfig::default(),
            jwt: JwtConfig::default(),
            cache: CacheConfig::default(),
            state_machine: false,
            spell_check: false,
            bit_mask: false,
            store_timeout: default_store_timeout(),
        }
    }
}

/// Listing defaults used when a request does not specify them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Requests asking for more are capped to this many records per page.
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,
    #[serde(default = "default_page")]
    pub page: u64,
    pub sort: SortOrder,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            max_limit: default_max_limit(),
            page: default_page(),
            sort: SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JwtConfig {
    pub enabled: bool,
    /// Table (resource type) holding the principals tokens are issued to.
    #[serde(default = "default_jwt_table")]
    pub table: String,
    /// HS256 signing secret.
    pub secret: JwtSecret,
    #[serde(default = "default_leeway_seconds")]
    pub leeway_seconds: u64,
    /// Token-issuing methods; exempt from token verification.
    pub token_actions: Vec<String>,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            table: default_jwt_table(),
            secret: JwtSecret::default(),
            leeway_seconds: default_leeway_seconds(),
            token_actions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Probabilistic early recomputation instead of plain TTL expiry.
    pub xfetch: bool,
    #[serde(default = "default_cache_ttl", with = "humantime_duration")]
    pub ttl: Duration,
    /// Early recomputation eagerness; `0` disables it.
    #[serde(default = "default_cache_beta")]
    pub beta: f64,
    /// How long a recompute claim blocks other callers from recomputing.
    #[serde(default = "default_claim_timeout", with = "humantime_duration")]
    pub claim_timeout: Duration,
    /// Upper bound for every cache backend call.
    #[serde(default = "default_cache_timeout", with = "humantime_duration")]
    pub timeout: Duration,
    /// Read methods whose results are cached.
    #[serde(default = "default_cached_methods")]
    pub methods: Vec<String>,
    /// Capacity of the in-memory backend.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// How long past its TTL an entry stays available for stale serving
    /// before the in-memory backend evicts it.
    #[serde(default = "default_stale_grace", with = "humantime_duration")]
    pub stale_grace: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            xfetch: false,
            ttl: default_cache_ttl(),
            beta: default_cache_beta(),
            claim_timeout: default_claim_timeout(),
            timeout: default_cache_timeout(),
            methods: default_cached_methods(),
            max_entries: default_max_entries(),
            stale_grace: default_stale_grace(),
        }
    }
}

/// Signing secret. `Debug` never prints the value; the buffer is zeroed on drop.
#[derive(Clone, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct JwtSecret(String);

impl JwtSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Callers must not log or persist the returned slice.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

fn default_limit() -> u64 {
    resource_controller_sdk::config::DEFAULT_QUERY_LIMIT
}

fn default_max_limit() -> u64 {
    1000
}

fn default_page() -> u64 {
    resource_controller_sdk::config::DEFAULT_QUERY_PAGE
}

fn default_jwt_table() -> String {
    "users".to_owned()
}

fn default_leeway_seconds() -> u64 {
    60
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(resource_controller_sdk::config::DEFAULT_CACHE_TTL_SECS)
}

fn default_cache_beta() -> f64 {
    resource_controller_sdk::config::DEFAULT_CACHE_BETA
}

fn default_claim_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_cache_timeout() -> Duration {
    Duration::from_millis(200)
}

fn default_cached_methods() -> Vec<String> {
    vec!["index".to_owned(), "view".to_owned()]
}

fn default_max_entries() -> usize {
    10_000
}

fn default_stale_grace() -> Duration {
    Duration::from_secs(60)
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(5)
}

impl ControllerConfig {
    /// Extract the configuration from an already assembled figment.
    ///
    /// # Errors
    ///
    /// Fails when a value has the wrong type or an unknown key is present.
    pub fn from_figment(figment: &Figment) -> anyhow::Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file, then apply `RESOURCE_CONTROLLER__*` overrides.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be parsed or the result is invalid.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let figment = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.query.limit == 0 || self.query.max_limit == 0 {
            anyhow::bail!("query.limit and query.max_limit must be positive");
        }
        if self.query.limit > self.query.max_limit {
            anyhow::bail!(
                "query.limit ({}) exceeds query.max_limit ({})",
                self.query.limit,
                self.query.max_limit
            );
        }
        if !self.cache.beta.is_finite() || self.cache.beta < 0.0 {
            anyhow::bail!("cache.beta must be a non-negative number");
        }
        // Request options carry the TTL in whole seconds.
        if self.cache.ttl < Duration::from_secs(1) {
            anyhow::bail!("cache.ttl must be at least one second");
        }
        if self.cache.max_entries == 0 {
            anyhow::bail!("cache.max_entries must be positive");
        }
        if self.jwt.enabled && self.jwt.table.trim().is_empty() {
            anyhow::bail!("jwt.table must be set when jwt is enabled");
        }
        Ok(())
    }

    /// Build the request-scoped options for one invocation of `method`.
    #[must_use]
    pub fn options_for(&self, method: ControllerMethod, query: &QueryParams) -> ConfigOptions {
        let mut options = ConfigOptions::new();
        options.set_called_method(method.as_str());
        options.set_query_limit(self.query.limit);
        options.set_query_page(self.query.page);
        options.set_query_sort(self.query.sort);
        if let Some(token) = query.get("access_token") {
            options.set_query_access_token(token);
        }

        options.set_jwt_is_enabled(self.jwt.enabled);
        options.set_jwt_table(self.jwt.table.clone());
        options.set_is_jwt_action(self.jwt.token_actions.iter().any(|a| a == method.as_str()));

        options.set_state_machine(self.state_machine);
        options.set_spell_check(self.spell_check);
        options.set_bit_mask(self.bit_mask);

        let cached = self.cache.enabled
            && method.is_read()
            && self.cache.methods.iter().any(|m| m == method.as_str());
        options.set_is_cached(cached);
        options.set_is_xfetch(self.cache.xfetch);
        options.set_cache_ttl(self.cache.ttl.as_secs());
        options.set_cache_beta(self.cache.beta);
        options
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::Deserialize;

    use super::Deserializer;

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}
