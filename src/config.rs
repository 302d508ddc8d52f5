//! Framework configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Unset variables fall back to defaults;
//! a variable that is set but malformed is an error.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::router::ContextKey;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-field lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// Top-level configuration.
///
/// Loaded once at startup via [`FrameworkConfig::from_env`].
#[derive(Debug, Clone)]
pub struct FrameworkConfig {
    /// Log output format.
    pub log_format: LogFormat,

    /// Tracing filter directive (`RUST_LOG` syntax).
    pub log_filter: String,

    /// Bounded mailbox capacity of every store.
    pub store_mailbox_capacity: usize,

    /// Router contexts created empty at startup, in key order.
    pub router_contexts: Vec<ContextKey>,

    /// Maximum depth of a router stack.
    pub router_max_depth: usize,

    /// Maximum dependents per user.
    pub user_max_dependents: usize,

    /// Base monthly premium of the in-memory rate table.
    pub insurance_base_premium_cents: u64,

    /// Premium added per dependent by the in-memory rate table.
    pub insurance_dependent_premium_cents: u64,

    /// Upper bound on a single rate quote.
    pub insurance_quote_timeout: Duration,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_filter: "info".to_string(),
            store_mailbox_capacity: 1024,
            router_contexts: ["home", "documents", "profile"]
                .into_iter()
                .filter_map(|key| ContextKey::new(key).ok())
                .collect(),
            router_max_depth: 32,
            user_max_dependents: 16,
            insurance_base_premium_cents: 12_000,
            insurance_dependent_premium_cents: 4_500,
            insurance_quote_timeout: Duration::from_millis(2_000),
        }
    }
}

impl FrameworkConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is set but
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a present value cannot be
    /// parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let log_format = match lookup("LOG_FORMAT") {
            Some(raw) => raw
                .parse()
                .map_err(|()| ConfigError::invalid("LOG_FORMAT", raw))?,
            None => defaults.log_format,
        };
        let log_filter = lookup("RUST_LOG").unwrap_or(defaults.log_filter);

        let router_contexts = match lookup("ROUTER_CONTEXTS") {
            Some(raw) => parse_contexts(&raw)
                .ok_or_else(|| ConfigError::invalid("ROUTER_CONTEXTS", raw))?,
            None => defaults.router_contexts,
        };

        Ok(Self {
            log_format,
            log_filter,
            store_mailbox_capacity: parse_positive(
                &lookup,
                "STORE_MAILBOX_CAPACITY",
                defaults.store_mailbox_capacity,
            )?,
            router_contexts,
            router_max_depth: parse_positive(&lookup, "ROUTER_MAX_DEPTH", defaults.router_max_depth)?,
            user_max_dependents: parse_key(
                &lookup,
                "USER_MAX_DEPENDENTS",
                defaults.user_max_dependents,
            )?,
            insurance_base_premium_cents: parse_key(
                &lookup,
                "INSURANCE_BASE_PREMIUM_CENTS",
                defaults.insurance_base_premium_cents,
            )?,
            insurance_dependent_premium_cents: parse_key(
                &lookup,
                "INSURANCE_DEPENDENT_PREMIUM_CENTS",
                defaults.insurance_dependent_premium_cents,
            )?,
            insurance_quote_timeout: parse_millis(
                &lookup,
                "INSURANCE_QUOTE_TIMEOUT_MS",
                defaults.insurance_quote_timeout,
            )?,
        })
    }
}

/// Parses `key` as `T`, returning `default` when unset.
fn parse_key<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(key, raw)),
        None => Ok(default),
    }
}

/// Like [`parse_key`] but rejects zero.
fn parse_positive<F>(lookup: &F, key: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_key(lookup, key, default)?;
    if value == 0 {
        return Err(ConfigError::invalid(key, "0"));
    }
    Ok(value)
}

/// Reads `key` as whole milliseconds, returning `default` when unset.
fn parse_millis<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if lookup(key).is_none() {
        return Ok(default);
    }
    parse_key(lookup, key, 0_u64).map(Duration::from_millis)
}

/// Comma-separated context list; `None` if empty or any entry is blank.
fn parse_contexts(raw: &str) -> Option<Vec<ContextKey>> {
    let contexts = raw
        .split(',')
        .map(|part| ContextKey::new(part).ok())
        .collect::<Option<Vec<_>>>()?;
    (!contexts.is_empty()).then_some(contexts)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<FrameworkConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        FrameworkConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let Ok(config) = from_pairs(&[]) else {
            panic!("empty environment must load");
        };
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.store_mailbox_capacity, 1024);
        assert_eq!(config.router_max_depth, 32);
        assert_eq!(config.insurance_quote_timeout, Duration::from_secs(2));
        let names: Vec<&str> = config.router_contexts.iter().map(ContextKey::as_str).collect();
        assert_eq!(names, vec!["home", "documents", "profile"]);
    }

    #[test]
    fn unset_keys_fall_back_to_struct_defaults() {
        let Ok(config) = from_pairs(&[]) else {
            panic!("empty environment must load");
        };
        let defaults = FrameworkConfig::default();
        assert_eq!(config.insurance_quote_timeout, defaults.insurance_quote_timeout);
        assert_eq!(config.store_mailbox_capacity, defaults.store_mailbox_capacity);
        assert_eq!(config.router_max_depth, defaults.router_max_depth);
        assert_eq!(config.user_max_dependents, defaults.user_max_dependents);
    }

    #[test]
    fn overrides_are_parsed() {
        let Ok(config) = from_pairs(&[
            ("LOG_FORMAT", "JSON"),
            ("RUST_LOG", "storewire=debug"),
            ("STORE_MAILBOX_CAPACITY", "8"),
            ("ROUTER_CONTEXTS", "inbox, settings"),
            ("USER_MAX_DEPENDENTS", "2"),
            ("INSURANCE_QUOTE_TIMEOUT_MS", "150"),
        ]) else {
            panic!("valid overrides must load");
        };
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_filter, "storewire=debug");
        assert_eq!(config.store_mailbox_capacity, 8);
        assert_eq!(config.user_max_dependents, 2);
        assert_eq!(config.insurance_quote_timeout, Duration::from_millis(150));
        let names: Vec<&str> = config.router_contexts.iter().map(ContextKey::as_str).collect();
        assert_eq!(names, vec!["inbox", "settings"]);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let bad = [
            ("LOG_FORMAT", "xml"),
            ("STORE_MAILBOX_CAPACITY", "lots"),
            ("STORE_MAILBOX_CAPACITY", "0"),
            ("ROUTER_CONTEXTS", "home,,profile"),
            ("INSURANCE_BASE_PREMIUM_CENTS", "-5"),
        ];
        for (key, value) in bad {
            let Err(ConfigError::InvalidValue { key: reported, .. }) = from_pairs(&[(key, value)])
            else {
                panic!("{key}={value} should be rejected");
            };
            assert_eq!(reported, key);
        }
        assert!(from_pairs(&[("INSURANCE_QUOTE_TIMEOUT_MS", "soon")]).is_err());
    }
}
