//! Listener configuration

use std::time::Duration;

use anyhow::{bail, Context, Result};
use erwin_shared_config::{get_env_or_default, get_optional_env, parse_env};
use url::Url;
use uuid::Uuid;

use crate::reconciler::{ReconcilerSettings, EXTERNAL_DRIFT_TOLERANCE_SECS};

/// Reconciliation tick
pub const TICK_INTERVAL: Duration = Duration::from_millis(400);
/// Heartbeat cadence
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);
/// Clock sync ping cadence
pub const TIME_SYNC_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Base url of the session server (default: http://127.0.0.1:3000)
    pub server_url: Url,
    /// Stable identity reported in HELLO
    pub client_id: String,
    /// Drift tolerated before seeking streamed audio
    pub drift_tolerance_secs: f64,
    pub stall_threshold: Duration,
    pub tick_interval: Duration,
    pub heartbeat_interval: Duration,
    pub time_sync_interval: Duration,
}

impl ListenerConfig {
    pub fn from_env() -> Result<Self> {
        let raw_url = get_env_or_default("ERWIN_SERVER_URL", "http://127.0.0.1:3000");
        let server_url = Url::parse(&raw_url)
            .with_context(|| format!("ERWIN_SERVER_URL is not a valid url: {raw_url}"))?;
        if !matches!(server_url.scheme(), "http" | "https") {
            bail!("ERWIN_SERVER_URL must use http or https, got {}", server_url.scheme());
        }

        let client_id =
            get_optional_env("ERWIN_CLIENT_ID").unwrap_or_else(|| Uuid::new_v4().to_string());

        let drift_tolerance_secs = parse_env("ERWIN_DRIFT_TOLERANCE_SECONDS", 1.2_f64)?;
        if drift_tolerance_secs.is_nan() || drift_tolerance_secs <= 0.0 {
            bail!("ERWIN_DRIFT_TOLERANCE_SECONDS must be positive");
        }
        let stall_threshold_ms = parse_env("ERWIN_STALL_THRESHOLD_MS", 7_000_u64)?;

        Ok(Self {
            server_url,
            client_id,
            drift_tolerance_secs,
            stall_threshold: Duration::from_millis(stall_threshold_ms),
            tick_interval: TICK_INTERVAL,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            time_sync_interval: TIME_SYNC_INTERVAL,
        })
    }

    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            audio_tolerance_secs: self.drift_tolerance_secs,
            external_tolerance_secs: EXTERNAL_DRIFT_TOLERANCE_SECS.max(self.drift_tolerance_secs),
            stall_threshold: self.stall_threshold,
            ..ReconcilerSettings::new(self.server_url.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn set(vars: &[(&str, Option<&str>)]) -> Self {
            let saved = vars
                .iter()
                .map(|(k, v)| {
                    let old = env::var(*k).ok();
                    match v {
                        Some(v) => env::set_var(*k, *v),
                        None => env::remove_var(*k),
                    }
                    (k.to_string(), old)
                })
                .collect();
            Self { vars: saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in &self.vars {
                match v {
                    Some(val) => env::set_var(k, val),
                    None => env::remove_var(k),
                }
            }
        }
    }

    const VARS: [&str; 4] = [
        "ERWIN_SERVER_URL",
        "ERWIN_CLIENT_ID",
        "ERWIN_DRIFT_TOLERANCE_SECONDS",
        "ERWIN_STALL_THRESHOLD_MS",
    ];

    #[test]
    fn test_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::set(&VARS.map(|k| (k, None)));

        let config = ListenerConfig::from_env().unwrap();
        assert_eq!(config.server_url.as_str(), "http://127.0.0.1:3000/");
        assert!(Uuid::parse_str(&config.client_id).is_ok());
        assert_eq!(config.drift_tolerance_secs, 1.2);
        assert_eq!(config.stall_threshold, Duration::from_millis(7_000));
        assert_eq!(config.tick_interval, Duration::from_millis(400));
    }

    #[test]
    fn test_overrides_flow_into_reconciler_settings() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::set(&[
            ("ERWIN_SERVER_URL", Some("https://radio.example.org")),
            ("ERWIN_CLIENT_ID", Some("kitchen")),
            ("ERWIN_DRIFT_TOLERANCE_SECONDS", Some("0.8")),
            ("ERWIN_STALL_THRESHOLD_MS", Some("5000")),
        ]);

        let config = ListenerConfig::from_env().unwrap();
        assert_eq!(config.client_id, "kitchen");
        let settings = config.reconciler_settings();
        assert_eq!(settings.audio_tolerance_secs, 0.8);
        assert_eq!(settings.external_tolerance_secs, 2.5);
        assert_eq!(settings.stall_threshold, Duration::from_millis(5_000));
        assert_eq!(settings.server_url.host_str(), Some("radio.example.org"));
    }

    #[test]
    fn test_invalid_values_fail() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::set(&[
            ("ERWIN_SERVER_URL", Some("ws://127.0.0.1:3000")),
            ("ERWIN_DRIFT_TOLERANCE_SECONDS", None),
        ]);
        assert!(ListenerConfig::from_env().is_err());

        let _guard = EnvGuard::set(&[
            ("ERWIN_SERVER_URL", None),
            ("ERWIN_DRIFT_TOLERANCE_SECONDS", Some("soon")),
        ]);
        let err = ListenerConfig::from_env().unwrap_err().to_string();
        assert!(err.contains("ERWIN_DRIFT_TOLERANCE_SECONDS"));
    }
}
