use flora_api::FamilyListContract;
use flora_chat::SecretLookup;
use flora_store::StoreOptions;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const API_URL_VAR: &str = "FLORA_API_URL";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
    /// Google Cloud Logging structured JSON
    Stackdriver,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "stackdriver" | "gcp" => Ok(Self::Stackdriver),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { var: &'static str, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "{} is required", var),
            ConfigError::Invalid { var, message } => write!(f, "invalid {}: {}", var, message),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Client configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Url,
    pub family_list_contract: FamilyListContract,
    pub secret_lookup: SecretLookup,
    pub http_timeout: Option<Duration>,
    pub usage_ttl: Duration,
    pub cache_capacity: u64,
    pub log_format: LogFormat,
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from any key lookup, e.g. the environment with
    /// command line overrides layered on top
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = get(API_URL_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(API_URL_VAR))?;
        let api_url = parse_api_url(&api_url)?;

        let family_list_contract = parse_or_default(&get, "FLORA_FAMILY_LIST_CONTRACT")?;
        let secret_lookup = parse_or_default(&get, "FLORA_CHAT_SECRET_ORDER")?;
        let log_format = parse_or_default(&get, "FLORA_LOG_FORMAT")?;

        let http_timeout = parse_opt::<u64>(&get, "FLORA_HTTP_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let usage_ttl = parse_opt::<u64>(&get, "FLORA_USAGE_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(StoreOptions::DEFAULT_USAGE_TTL);

        let cache_capacity = parse_opt(&get, "FLORA_CACHE_CAPACITY")?
            .unwrap_or(StoreOptions::DEFAULT_CAPACITY);

        Ok(Self {
            api_url,
            family_list_contract,
            secret_lookup,
            http_timeout,
            usage_ttl,
            cache_capacity,
            log_format,
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            usage_ttl: self.usage_ttl,
            max_capacity: self.cache_capacity,
        }
    }
}

fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
        var: API_URL_VAR,
        message: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            var: API_URL_VAR,
            message: format!("unsupported scheme {}", other),
        }),
    }
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(var).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn parse_or_default<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<T, ConfigError>
where
    T: FromStr + Default,
    T::Err: fmt::Display,
{
    Ok(parse_opt(get, var)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flora_chat::SecretSource;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[(API_URL_VAR, "http://localhost:3000")]).unwrap();
        assert_eq!(config.api_url.as_str(), "http://localhost:3000/");
        assert_eq!(config.family_list_contract, FamilyListContract::ServerPaginated);
        assert_eq!(config.secret_lookup, SecretLookup::default());
        assert_eq!(config.http_timeout, None);
        assert_eq!(config.usage_ttl, Duration::from_secs(60));
        assert_eq!(config.cache_capacity, 1000);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_missing_api_url_fails_fast() {
        assert_eq!(config(&[]).unwrap_err(), ConfigError::Missing(API_URL_VAR));
        assert_eq!(
            config(&[(API_URL_VAR, "  ")]).unwrap_err(),
            ConfigError::Missing(API_URL_VAR)
        );
    }

    #[test]
    fn test_malformed_api_url() {
        let err = config(&[(API_URL_VAR, "not a url")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: API_URL_VAR, .. }));

        let err = config(&[(API_URL_VAR, "ftp://example.com")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid FLORA_API_URL: unsupported scheme ftp"
        );
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            (API_URL_VAR, "https://api.example.com/v1"),
            ("FLORA_FAMILY_LIST_CONTRACT", "client"),
            ("FLORA_CHAT_SECRET_ORDER", "access_token,secret"),
            ("FLORA_HTTP_TIMEOUT_SECS", "15"),
            ("FLORA_USAGE_TTL_SECS", "5"),
            ("FLORA_CACHE_CAPACITY", "10"),
            ("FLORA_LOG_FORMAT", "stackdriver"),
        ])
        .unwrap();
        assert_eq!(config.family_list_contract, FamilyListContract::ClientFabricated);
        assert_eq!(
            config.secret_lookup.order(),
            &[SecretSource::ApiAccessToken, SecretSource::TopLevel]
        );
        assert_eq!(config.http_timeout, Some(Duration::from_secs(15)));
        assert_eq!(config.store_options().usage_ttl, Duration::from_secs(5));
        assert_eq!(config.store_options().max_capacity, 10);
        assert_eq!(config.log_format, LogFormat::Stackdriver);
    }

    #[test]
    fn test_invalid_number() {
        let err = config(&[
            (API_URL_VAR, "http://localhost:3000"),
            ("FLORA_USAGE_TTL_SECS", "soon"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "FLORA_USAGE_TTL_SECS",
                ..
            }
        ));
    }
}
