use crate::domain::stats::{parse_weekday, StatsCalendar};
use crate::domain::timer::TimerConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notification::NotificationKind;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const TIMER_JSON: &str = "timer.json";
const API_JSON: &str = "api.json";

const API_BASE_URL_KEYS: &[&str] = &["POMOTASK_API_BASE_URL"];
const API_TOKEN_KEYS: &[&str] = &["POMOTASK_API_TOKEN"];

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub timer: serde_json::Value,
    pub api: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub base_url: Option<String>,
    pub token: Option<String>,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "pomotask",
                "timezone": "UTC",
                "weekStartsOn": "Sunday"
            }),
        ),
        (
            TIMER_JSON,
            serde_json::json!({
                "schema": 1,
                "workDurationMinutes": 25,
                "breakDurationMinutes": 5,
                "notification": "bell"
            }),
        ),
        (
            API_JSON,
            serde_json::json!({
                "schema": 1,
                "sessionApiBaseUrl": null
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        timer: read_config(&config_dir.join(TIMER_JSON))?,
        api: read_config(&config_dir.join(API_JSON))?,
    })
}

fn trimmed_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn read_stats_calendar(config_dir: &Path) -> Result<StatsCalendar, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let mut calendar = StatsCalendar::default();

    if let Some(timezone) = trimmed_str(&app, "timezone") {
        calendar.timezone = timezone.parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!("unknown timezone '{timezone}': {error}"))
        })?;
    }
    if let Some(week_start) = trimmed_str(&app, "weekStartsOn") {
        calendar.week_starts_on = parse_weekday(week_start).ok_or_else(|| {
            InfraError::InvalidConfig(format!("weekStartsOn must be a weekday name: {week_start}"))
        })?;
    }
    Ok(calendar)
}

pub fn read_timer_config(config_dir: &Path) -> Result<TimerConfig, InfraError> {
    let timer = read_config(&config_dir.join(TIMER_JSON))?;
    let defaults = TimerConfig::default();
    let minutes = |key: &str, fallback: u32| {
        timer
            .get(key)
            .and_then(serde_json::Value::as_u64)
            .map(|value| u32::try_from(value).unwrap_or(u32::MAX))
            .unwrap_or(fallback)
    };
    Ok(TimerConfig::new(
        minutes("workDurationMinutes", defaults.work_duration_minutes),
        minutes("breakDurationMinutes", defaults.break_duration_minutes),
    ))
}

pub fn read_notification_kind(config_dir: &Path) -> Result<NotificationKind, InfraError> {
    let timer = read_config(&config_dir.join(TIMER_JSON))?;
    match trimmed_str(&timer, "notification") {
        None => Ok(NotificationKind::Bell),
        Some(raw) => raw.parse(),
    }
}

pub fn read_api_settings(config_dir: &Path) -> Result<ApiSettings, InfraError> {
    let api = read_config(&config_dir.join(API_JSON))?;
    Ok(resolve_api_settings(&api, |key| std::env::var(key).ok()))
}

/// Environment values win over the file; blank values count as unset.
pub fn resolve_api_settings<F>(api: &serde_json::Value, lookup: F) -> ApiSettings
where
    F: Fn(&str) -> Option<String>,
{
    let base_url = optional_lookup_value(&lookup, API_BASE_URL_KEYS)
        .or_else(|| trimmed_str(api, "sessionApiBaseUrl").map(ToOwned::to_owned));
    let token = optional_lookup_value(&lookup, API_TOKEN_KEYS);
    ApiSettings { base_url, token }
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomotask-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp config dir");
            ensure_default_configs(&path).expect("write default configs");
            Self { path }
        }

        fn write(&self, name: &str, value: serde_json::Value) {
            fs::write(self.path.join(name), value.to_string()).expect("write config");
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn defaults_load_and_resolve() {
        let dir = TempConfigDir::new();
        assert!(load_configs(&dir.path).is_ok());
        assert_eq!(read_timer_config(&dir.path).expect("timer"), TimerConfig::default());
        assert_eq!(
            read_stats_calendar(&dir.path).expect("calendar"),
            StatsCalendar::default()
        );
        assert_eq!(
            read_notification_kind(&dir.path).expect("notification"),
            NotificationKind::Bell
        );
    }

    #[test]
    fn ensure_defaults_keeps_existing_files() {
        let dir = TempConfigDir::new();
        dir.write(
            TIMER_JSON,
            serde_json::json!({"schema": 1, "workDurationMinutes": 50, "breakDurationMinutes": 0}),
        );
        ensure_default_configs(&dir.path).expect("ensure defaults");
        assert_eq!(
            read_timer_config(&dir.path).expect("timer"),
            TimerConfig::new(50, 1)
        );
    }

    #[test]
    fn custom_timezone_and_week_start_are_parsed() {
        let dir = TempConfigDir::new();
        dir.write(
            APP_JSON,
            serde_json::json!({"schema": 1, "timezone": "Europe/Berlin", "weekStartsOn": "monday"}),
        );
        let calendar = read_stats_calendar(&dir.path).expect("calendar");
        assert_eq!(calendar.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(calendar.week_starts_on, Weekday::Mon);
    }

    #[test]
    fn desktop_notification_is_selectable() {
        let dir = TempConfigDir::new();
        dir.write(TIMER_JSON, serde_json::json!({"schema": 1, "notification": "desktop"}));
        assert_eq!(
            read_notification_kind(&dir.path).expect("notification"),
            NotificationKind::Desktop
        );
    }

    #[test]
    fn invalid_values_are_reported() {
        let dir = TempConfigDir::new();
        dir.write(APP_JSON, serde_json::json!({"schema": 1, "timezone": "Mars/Olympus"}));
        assert!(matches!(
            read_stats_calendar(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));

        dir.write(TIMER_JSON, serde_json::json!({"schema": 2}));
        assert!(matches!(
            read_timer_config(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn environment_overrides_api_file_settings() {
        let file = serde_json::json!({"schema": 1, "sessionApiBaseUrl": "http://file.local/api"});

        let from_file = resolve_api_settings(&file, |_| None);
        assert_eq!(from_file.base_url.as_deref(), Some("http://file.local/api"));
        assert_eq!(from_file.token, None);

        let from_env = resolve_api_settings(&file, |key| match key {
            "POMOTASK_API_BASE_URL" => Some(" http://env.local/api ".to_string()),
            "POMOTASK_API_TOKEN" => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(from_env.base_url.as_deref(), Some("http://env.local/api"));
        assert_eq!(from_env.token.as_deref(), Some("secret"));

        let blank_env = resolve_api_settings(&file, |_| Some("   ".to_string()));
        assert_eq!(blank_env.base_url.as_deref(), Some("http://file.local/api"));
    }
}
