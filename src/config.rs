use std::env;
use std::fmt::Display;
use std::str::FromStr;

use log::info;
use thiserror::Error;

use crate::pricing::Pricing;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_name: String,
    pub host: String,
    pub port: u16,
    pub stripe_secret_key: String,
    pub stripe_api_base: String,
    pub currency: String,
    pub require_payment: bool,
    pub jwt_secret: String,
    pub pricing: Pricing,
}

impl Config {
    /// Reads settings from the process environment. Call `dotenv` first to
    /// pick up a local `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Pricing::default();
        let pricing = Pricing {
            free_shipping_threshold: parsed(&lookup, "FREE_SHIPPING_THRESHOLD", defaults.free_shipping_threshold)?,
            flat_shipping_fee: parsed(&lookup, "FLAT_SHIPPING_FEE", defaults.flat_shipping_fee)?,
            tax_rate: parsed(&lookup, "TAX_RATE", defaults.tax_rate)?,
        };
        if !(0.0..1.0).contains(&pricing.tax_rate) {
            return Err(ConfigError::Invalid {
                key: "TAX_RATE",
                reason: "must be in [0, 1)".to_string(),
            });
        }

        Ok(Config {
            database_url: required(&lookup, "DATABASE_URL")?,
            database_name: or_default(&lookup, "DATABASE_NAME", "polymart"),
            host: or_default(&lookup, "HOST", "127.0.0.1"),
            port: parsed(&lookup, "PORT", 8080)?,
            stripe_secret_key: required(&lookup, "STRIPE_SECRET_KEY")?,
            stripe_api_base: or_default(&lookup, "STRIPE_API_BASE", "https://api.stripe.com"),
            currency: or_default(&lookup, "PAYMENT_CURRENCY", "lkr").to_ascii_lowercase(),
            require_payment: parsed(&lookup, "REQUIRE_PAYMENT", true)?,
            jwt_secret: required(&lookup, "JWT_SECRET")?,
            pricing,
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn or_default<F>(lookup: &F, key: &'static str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn parsed<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
