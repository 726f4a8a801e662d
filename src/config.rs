use {
    crate::domain::money::{CommissionPolicy, Currency},
    std::{net::SocketAddr, time::Duration},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_url: String,
    pub shop_id: Option<String>,
    pub secret_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.yookassa.ru/v3".into(),
            shop_id: None,
            secret_key: None,
            timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub webhook_secret: String,
    pub return_url: String,
    pub commission: CommissionPolicy,
    pub currency: Currency,
    pub gateway: GatewayConfig,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));
        let invalid = |key: &'static str, reason: String| ConfigError::Invalid { key, reason };

        let bind_addr = match var("BIND_ADDR") {
            Some(raw) => raw
                .parse::<SocketAddr>()
                .map_err(|e| invalid("BIND_ADDR", format!("{e}")))?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let commission = match var("COMMISSION_FRACTION") {
            Some(raw) => raw
                .parse::<CommissionPolicy>()
                .map_err(|e| invalid("COMMISSION_FRACTION", format!("{e}")))?,
            None => CommissionPolicy::default(),
        };

        let currency = match var("CURRENCY") {
            Some(raw) => Currency::try_from(raw.as_str())
                .map_err(|e| invalid("CURRENCY", e.to_string()))?,
            None => Currency::Rub,
        };

        let defaults = GatewayConfig::default();
        let timeout = match var("GATEWAY_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .map_err(|e| invalid("GATEWAY_TIMEOUT_SECS", format!("{e}")))?,
            ),
            None => defaults.timeout,
        };
        let max_retries = match var("GATEWAY_MAX_RETRIES") {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|e| invalid("GATEWAY_MAX_RETRIES", format!("{e}")))?,
            None => defaults.max_retries,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_addr,
            jwt_secret: required("JWT_SECRET")?,
            webhook_secret: required("WEBHOOK_SECRET")?,
            return_url: var("RETURN_URL").unwrap_or_else(|| "http://localhost:3000/return".into()),
            commission,
            currency,
            gateway: GatewayConfig {
                api_url: var("GATEWAY_API_URL").unwrap_or(defaults.api_url),
                shop_id: var("SHOP_ID"),
                secret_key: var("SECRET_KEY"),
                timeout,
                max_retries,
                retry_backoff: defaults.retry_backoff,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::collections::HashMap};

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DATABASE_URL", "postgres://localhost/pay"),
        ("JWT_SECRET", "jwt"),
        ("WEBHOOK_SECRET", "whsec"),
    ];

    #[test]
    fn defaults_apply() {
        let cfg = load(&REQUIRED).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.currency, Currency::Rub);
        assert_eq!(cfg.commission, CommissionPolicy::one_third());
        assert_eq!(cfg.gateway.max_retries, 2);
        assert_eq!(cfg.gateway.timeout, Duration::from_secs(10));
        assert!(cfg.gateway.shop_id.is_none());
    }

    #[test]
    fn missing_required_is_reported() {
        let err = load(&REQUIRED[..2]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("WEBHOOK_SECRET")));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("COMMISSION_FRACTION", "2/1"));
        assert!(matches!(
            load(&vars).unwrap_err(),
            ConfigError::Invalid {
                key: "COMMISSION_FRACTION",
                ..
            }
        ));

        let mut vars = REQUIRED.to_vec();
        vars.push(("GATEWAY_TIMEOUT_SECS", "soon"));
        assert!(load(&vars).is_err());
    }
}
