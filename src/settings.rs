use chrono::NaiveTime;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub debug: bool,
    pub admin_token: String,
    pub enable_swagger: bool,
    pub port: u16,
    /// Daily booking window, "HH:MM" in UTC.
    pub business_open: String,
    pub business_close: String,
    pub waitlist_enabled: bool,
    /// Maximum CONFIRMED bookings a single user may hold at once.
    pub max_active_bookings: u32,
    /// Payment collaborator; bookings confirm without charge when unset.
    pub payment_url: Option<Url>,
    /// Flat per-class price in cents, charged on confirmation.
    pub class_price_cents: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            // Load from environment variables with APP_ prefix
            .add_source(Environment::with_prefix("APP").separator("_"))
            .set_default("debug", false)?
            .set_default("admin_token", "default-token-change-me")?
            .set_default("enable_swagger", true)?
            .set_default("port", 8080)?
            .set_default("business_open", "06:00")?
            .set_default("business_close", "22:00")?
            .set_default("waitlist_enabled", true)?
            .set_default("max_active_bookings", 10)?
            .set_default("class_price_cents", 1500)?
            .build()?;

        config.try_deserialize()
    }

    pub fn business_hours(&self) -> Result<BusinessHours, ConfigError> {
        let parse = |value: &str, key: &str| {
            NaiveTime::parse_from_str(value, "%H:%M")
                .map_err(|err| ConfigError::Message(format!("invalid {key}: {err}")))
        };
        Ok(BusinessHours {
            open: parse(&self.business_open, "business_open")?,
            close: parse(&self.business_close, "business_close")?,
        })
    }
}

/// The studio's daily bookable window, interpreted in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(6, 0, 0).expect("valid time"),
            close: NaiveTime::from_hms_opt(22, 0, 0).expect("valid time"),
        }
    }
}
