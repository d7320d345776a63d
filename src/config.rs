//! Typed configuration persisted in `local_settings`.
//!
//! Each section lives under its own setting category. Missing or unparsable
//! values fall back to the defaults, with a warning for the latter.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::db;
use crate::error::{Error, Result};

const RATE_LIMIT_CATEGORY: &str = "rate_limit";
const DUPLICATES_CATEGORY: &str = "duplicates";
const NOTIFICATIONS_CATEGORY: &str = "notifications";

/// Client-side chat send limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_per_minute: usize,
    pub max_per_hour: usize,
    pub minute_window: Duration,
    pub hour_window: Duration,
    pub sweep_interval: Duration,
    /// Block length used when the remote endpoint throttles without a hint.
    pub default_retry_after: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 5,
            max_per_hour: 30,
            minute_window: Duration::from_secs(60),
            hour_window: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(1),
            default_retry_after: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateConfig {
    /// Maximum delivery-date distance, in days, for a combined match.
    pub date_window_days: i64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            date_window_days: 3,
        }
    }
}

/// Outbound customer notification settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Base URL of the remote functions host. Empty disables sending.
    pub functions_url: String,
    pub api_key: String,
    pub function_name: String,
    /// Notification phase values the customer opted into.
    pub enabled_phases: Vec<String>,
}

impl NotificationConfig {
    pub const DEFAULT_FUNCTION: &'static str = "ai-agent-notify";

    pub fn is_configured(&self) -> bool {
        !self.functions_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub rate_limit: RateLimitConfig,
    pub duplicates: DuplicateConfig,
    pub notifications: NotificationConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limit;
        if rl.max_per_minute == 0 || rl.max_per_hour == 0 {
            return Err(Error::Config("rate limits must be positive".into()));
        }
        if rl.minute_window.is_zero() || rl.hour_window.is_zero() || rl.sweep_interval.is_zero() {
            return Err(Error::Config("rate limit windows must be positive".into()));
        }
        if self.duplicates.date_window_days < 0 {
            return Err(Error::Config(
                "duplicate date window cannot be negative".into(),
            ));
        }
        Ok(())
    }
}

fn read_parsed<T: FromStr>(conn: &Connection, category: &str, key: &str, default: T) -> T {
    match db::get_setting(conn, category, key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(category = category, key = key, value = %raw, "Ignoring unparsable setting");
                default
            }
        },
        None => default,
    }
}

fn read_secs(conn: &Connection, category: &str, key: &str, default: Duration) -> Duration {
    Duration::from_secs(read_parsed(conn, category, key, default.as_secs()))
}

/// Load configuration, falling back to defaults per value.
pub fn load(conn: &Connection) -> Result<AppConfig> {
    let d = AppConfig::default();

    let rate_limit = RateLimitConfig {
        max_per_minute: read_parsed(
            conn,
            RATE_LIMIT_CATEGORY,
            "max_per_minute",
            d.rate_limit.max_per_minute,
        ),
        max_per_hour: read_parsed(
            conn,
            RATE_LIMIT_CATEGORY,
            "max_per_hour",
            d.rate_limit.max_per_hour,
        ),
        minute_window: read_secs(
            conn,
            RATE_LIMIT_CATEGORY,
            "minute_window_secs",
            d.rate_limit.minute_window,
        ),
        hour_window: read_secs(
            conn,
            RATE_LIMIT_CATEGORY,
            "hour_window_secs",
            d.rate_limit.hour_window,
        ),
        sweep_interval: read_secs(
            conn,
            RATE_LIMIT_CATEGORY,
            "sweep_interval_secs",
            d.rate_limit.sweep_interval,
        ),
        default_retry_after: read_secs(
            conn,
            RATE_LIMIT_CATEGORY,
            "default_retry_after_secs",
            d.rate_limit.default_retry_after,
        ),
    };

    let duplicates = DuplicateConfig {
        date_window_days: read_parsed(
            conn,
            DUPLICATES_CATEGORY,
            "date_window_days",
            d.duplicates.date_window_days,
        ),
    };

    let enabled_phases = db::get_setting(conn, NOTIFICATIONS_CATEGORY, "enabled_phases")
        .and_then(|raw| match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed notifications.enabled_phases");
                None
            }
        })
        .unwrap_or_default();

    let notifications = NotificationConfig {
        functions_url: db::get_setting(conn, NOTIFICATIONS_CATEGORY, "functions_url")
            .unwrap_or_default(),
        api_key: db::get_setting(conn, NOTIFICATIONS_CATEGORY, "api_key").unwrap_or_default(),
        function_name: db::get_setting(conn, NOTIFICATIONS_CATEGORY, "function_name")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| NotificationConfig::DEFAULT_FUNCTION.to_string()),
        enabled_phases,
    };

    let config = AppConfig {
        rate_limit,
        duplicates,
        notifications,
    };
    config.validate()?;
    Ok(config)
}

/// Persist every value of `config`.
pub fn save(conn: &Connection, config: &AppConfig) -> Result<()> {
    config.validate()?;

    let rl = &config.rate_limit;
    let rate_values = [
        ("max_per_minute", rl.max_per_minute.to_string()),
        ("max_per_hour", rl.max_per_hour.to_string()),
        ("minute_window_secs", rl.minute_window.as_secs().to_string()),
        ("hour_window_secs", rl.hour_window.as_secs().to_string()),
        ("sweep_interval_secs", rl.sweep_interval.as_secs().to_string()),
        (
            "default_retry_after_secs",
            rl.default_retry_after.as_secs().to_string(),
        ),
    ];
    for (key, value) in &rate_values {
        db::set_setting(conn, RATE_LIMIT_CATEGORY, key, value)?;
    }

    db::set_setting(
        conn,
        DUPLICATES_CATEGORY,
        "date_window_days",
        &config.duplicates.date_window_days.to_string(),
    )?;

    let n = &config.notifications;
    db::set_setting(conn, NOTIFICATIONS_CATEGORY, "functions_url", &n.functions_url)?;
    db::set_setting(conn, NOTIFICATIONS_CATEGORY, "api_key", &n.api_key)?;
    db::set_setting(conn, NOTIFICATIONS_CATEGORY, "function_name", &n.function_name)?;
    db::set_setting(
        conn,
        NOTIFICATIONS_CATEGORY,
        "enabled_phases",
        &serde_json::to_string(&n.enabled_phases)?,
    )?;
    Ok(())
}
