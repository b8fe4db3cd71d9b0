//! Per-request pipeline settings.
//!
//! A `ConfigOptions` value is built once per controller instantiation
//! (effectively per request) and is never shared between concurrent
//! requests. Setters always succeed; getters fall back to defaults.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_QUERY_LIMIT: u64 = 20;
pub const DEFAULT_QUERY_PAGE: u64 = 1;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_CACHE_BETA: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order '{other}'")),
        }
    }
}

/// Pipeline switches and query defaults consulted by every stage of a request.
///
/// `cache_beta` only matters when `is_xfetch` is set; `jwt_table` and
/// `is_jwt_action` only matter when `jwt_is_enabled` is set.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::struct_excessive_bools)] // independent pipeline switches
pub struct ConfigOptions {
    query_access_token: Option<String>,
    query_limit: u64,
    query_sort: SortOrder,
    query_page: u64,
    jwt_is_enabled: bool,
    jwt_table: String,
    is_jwt_action: bool,
    state_machine: bool,
    spell_check: bool,
    bit_mask: bool,
    is_cached: bool,
    is_xfetch: bool,
    cache_ttl: u64,
    cache_beta: f64,
    called_method: String,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            query_access_token: None,
            query_limit: DEFAULT_QUERY_LIMIT,
            query_sort: SortOrder::Asc,
            query_page: DEFAULT_QUERY_PAGE,
            jwt_is_enabled: false,
            jwt_table: String::new(),
            is_jwt_action: false,
            state_machine: false,
            spell_check: false,
            bit_mask: false,
            is_cached: false,
            is_xfetch: false,
            cache_ttl: DEFAULT_CACHE_TTL_SECS,
            cache_beta: DEFAULT_CACHE_BETA,
            called_method: String::new(),
        }
    }
}

impl ConfigOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query_access_token(&self) -> Option<&str> {
        self.query_access_token.as_deref()
    }

    pub fn set_query_access_token(&mut self, token: impl Into<String>) {
        self.query_access_token = Some(token.into());
    }

    #[must_use]
    pub fn query_limit(&self) -> u64 {
        self.query_limit
    }

    /// A zero limit falls back to the default.
    pub fn set_query_limit(&mut self, limit: u64) {
        self.query_limit = if limit == 0 { DEFAULT_QUERY_LIMIT } else { limit };
    }

    #[must_use]
    pub fn query_sort(&self) -> SortOrder {
        self.query_sort
    }

    pub fn set_query_sort(&mut self, sort: SortOrder) {
        self.query_sort = sort;
    }

    #[must_use]
    pub fn query_page(&self) -> u64 {
        self.query_page
    }

    /// Pages are 1-based; zero falls back to the first page.
    pub fn set_query_page(&mut self, page: u64) {
        self.query_page = page.max(DEFAULT_QUERY_PAGE);
    }

    #[must_use]
    pub fn jwt_is_enabled(&self) -> bool {
        self.jwt_is_enabled
    }

    pub fn set_jwt_is_enabled(&mut self, enabled: bool) {
        self.jwt_is_enabled = enabled;
    }

    #[must_use]
    pub fn jwt_table(&self) -> &str {
        &self.jwt_table
    }

    pub fn set_jwt_table(&mut self, table: impl Into<String>) {
        self.jwt_table = table.into();
    }

    #[must_use]
    pub fn is_jwt_action(&self) -> bool {
        self.is_jwt_action
    }

    pub fn set_is_jwt_action(&mut self, is_jwt_action: bool) {
        self.is_jwt_action = is_jwt_action;
    }

    #[must_use]
    pub fn is_state_machine(&self) -> bool {
        self.state_machine
    }

    pub fn set_state_machine(&mut self, enabled: bool) {
        self.state_machine = enabled;
    }

    #[must_use]
    pub fn is_spell_check(&self) -> bool {
        self.spell_check
    }

    pub fn set_spell_check(&mut self, enabled: bool) {
        self.spell_check = enabled;
    }

    #[must_use]
    pub fn is_bit_mask(&self) -> bool {
        self.bit_mask
    }

    pub fn set_bit_mask(&mut self, enabled: bool) {
        self.bit_mask = enabled;
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.is_cached
    }

    pub fn set_is_cached(&mut self, enabled: bool) {
        self.is_cached = enabled;
    }

    #[must_use]
    pub fn is_xfetch(&self) -> bool {
        self.is_xfetch
    }

    pub fn set_is_xfetch(&mut self, enabled: bool) {
        self.is_xfetch = enabled;
    }

    /// Cache time-to-live in seconds.
    #[must_use]
    pub fn cache_ttl(&self) -> u64 {
        self.cache_ttl
    }

    pub fn set_cache_ttl(&mut self, ttl_secs: u64) {
        self.cache_ttl = ttl_secs;
    }

    #[must_use]
    pub fn cache_beta(&self) -> f64 {
        self.cache_beta
    }

    /// Negative and non-finite values are clamped to `0.0`.
    pub fn set_cache_beta(&mut self, beta: f64) {
        self.cache_beta = if beta.is_finite() && beta > 0.0 {
            beta
        } else {
            0.0
        };
    }

    #[must_use]
    pub fn called_method(&self) -> &str {
        &self.called_method
    }

    pub fn set_called_method(&mut self, method: impl Into<String>) {
        self.called_method = method.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let options = ConfigOptions::new();
        assert_eq!(options.query_access_token(), None);
        assert_eq!(options.query_limit(), DEFAULT_QUERY_LIMIT);
        assert_eq!(options.query_sort(), SortOrder::Asc);
        assert_eq!(options.query_page(), 1);
        assert!(!options.jwt_is_enabled());
        assert!(!options.is_jwt_action());
        assert!(!options.is_state_machine());
        assert!(!options.is_spell_check());
        assert!(!options.is_bit_mask());
        assert!(!options.is_cached());
        assert!(!options.is_xfetch());
        assert_eq!(options.cache_ttl(), DEFAULT_CACHE_TTL_SECS);
        assert_eq!(options.called_method(), "");
    }

    #[test]
    fn sets_configuration_options() {
        let mut options = ConfigOptions::new();

        options.set_query_access_token("0f1e2d3c4b5a");
        assert_eq!(options.query_access_token(), Some("0f1e2d3c4b5a"));

        options.set_query_limit(7);
        assert_eq!(options.query_limit(), 7);

        options.set_query_sort(SortOrder::Desc);
        assert_eq!(options.query_sort(), SortOrder::Desc);

        options.set_query_page(1);
        assert_eq!(options.query_page(), 1);

        options.set_jwt_is_enabled(true);
        assert!(options.jwt_is_enabled());

        options.set_jwt_table("users");
        assert_eq!(options.jwt_table(), "users");

        options.set_is_jwt_action(true);
        assert!(options.is_jwt_action());

        options.set_state_machine(true);
        assert!(options.is_state_machine());

        options.set_spell_check(true);
        assert!(options.is_spell_check());

        options.set_bit_mask(true);
        assert!(options.is_bit_mask());

        options.set_is_cached(true);
        assert!(options.is_cached());

        options.set_is_xfetch(true);
        assert!(options.is_xfetch());

        options.set_cache_ttl(3600);
        assert_eq!(options.cache_ttl(), 3600);

        options.set_cache_beta(1.1);
        assert!((options.cache_beta() - 1.1).abs() < f64::EPSILON);

        options.set_called_method("index");
        assert_eq!(options.called_method(), "index");
    }

    #[test]
    fn setters_clamp_out_of_range_values() {
        let mut options = ConfigOptions::new();

        options.set_query_limit(0);
        assert_eq!(options.query_limit(), DEFAULT_QUERY_LIMIT);

        options.set_query_page(0);
        assert_eq!(options.query_page(), 1);

        options.set_cache_beta(-2.5);
        assert!(options.cache_beta().abs() < f64::EPSILON);

        options.set_cache_beta(f64::NAN);
        assert!(options.cache_beta().abs() < f64::EPSILON);
    }

    #[test]
    fn sort_order_parses_case_insensitively() {
        assert_eq!("DESC".parse::<SortOrder>(), Ok(SortOrder::Desc));
        assert_eq!(" asc ".parse::<SortOrder>(), Ok(SortOrder::Asc));
        assert!("sideways".parse::<SortOrder>().is_err());
    }
}
