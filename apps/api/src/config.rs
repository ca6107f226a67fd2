//! API server configuration

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use erwin_shared_config::{
    get_env_or_default, get_optional_env, parse_env, CommonConfig, DatabaseConfig, Environment,
};

/// Bounds on the number of options presented in one vote round
pub const MIN_VOTE_OPTIONS: usize = 2;
pub const MAX_VOTE_OPTIONS: usize = 5;

/// API server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Server port (default: 3000)
    pub port: u16,

    /// CORS allowed origins (optional)
    pub cors_allowed_origins: Option<Vec<String>>,

    pub vote: VoteConfig,

    pub acquisition: AcquisitionConfig,

    pub realtime: RealtimeConfig,
}

/// Timing and size of audience vote rounds
#[derive(Debug, Clone)]
pub struct VoteConfig {
    /// Seconds before a track ends at which a round may open
    pub lead_time_secs: f64,
    /// How long a round accepts votes
    pub round_duration: Duration,
    /// Options per round, clamped to [MIN_VOTE_OPTIONS, MAX_VOTE_OPTIONS]
    pub option_count: usize,
    /// Scheduler tick
    pub tick_interval: Duration,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            lead_time_secs: 20.0,
            round_duration: Duration::from_secs(15),
            option_count: 3,
            tick_interval: Duration::from_millis(1000),
        }
    }
}

/// Background acquisition worker settings
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub poll_interval: Duration,
    /// First retry delay; doubles with every attempt
    pub backoff_base: Duration,
    /// Ceiling for the retry delay
    pub backoff_max: Duration,
    pub ytdlp: YtDlpConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            backoff_base: Duration::from_secs(60),
            backoff_max: Duration::from_secs(30 * 60),
            ytdlp: YtDlpConfig::default(),
        }
    }
}

/// How to invoke the external yt-dlp binary
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub binary: PathBuf,
    pub cookie_file: Option<PathBuf>,
    /// Raw `Cookie` header value, passed with `--add-header`
    pub cookie_header: Option<String>,
    pub js_runtime: Option<String>,
    pub ffmpeg_location: Option<String>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            cookie_file: None,
            cookie_header: None,
            js_runtime: None,
            ffmpeg_location: None,
        }
    }
}

/// WebSocket liveness and drift correction
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Interval between server-initiated pings
    pub ping_interval: Duration,
    /// A connection silent for this long is evicted
    pub idle_timeout: Duration,
    /// Heartbeat drift beyond which the server pushes CLIENT_ADJUST
    pub adjust_threshold_secs: f64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(45),
            adjust_threshold_secs: 3.0,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// In production `DATABASE_URL` must be set explicitly; elsewhere a local
    /// SQLite file is used.
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_str(
            &env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        )
        .unwrap_or_default();

        if environment.is_production() {
            Self::validate_database_url()?;
        }

        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        Ok(Self {
            common,

            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("Invalid PORT value")?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok().map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),

            vote: Self::load_vote_config()?,
            acquisition: Self::load_acquisition_config()?,
            realtime: Self::load_realtime_config()?,
        })
    }

    fn load_vote_config() -> Result<VoteConfig> {
        let lead_time_secs: f64 =
            parse_env("ERWIN_VOTE_LEAD_SECONDS", 20.0).context("Invalid vote lead time")?;
        if !lead_time_secs.is_finite() || lead_time_secs <= 0.0 {
            bail!("ERWIN_VOTE_LEAD_SECONDS must be a positive number");
        }
        let duration_secs: u64 =
            parse_env("ERWIN_VOTE_DURATION_SECONDS", 15).context("Invalid vote duration")?;
        if duration_secs == 0 {
            bail!("ERWIN_VOTE_DURATION_SECONDS must be at least 1");
        }
        let option_count: usize =
            parse_env("ERWIN_VOTE_OPTIONS", 3).context("Invalid vote option count")?;

        Ok(VoteConfig {
            lead_time_secs,
            round_duration: Duration::from_secs(duration_secs),
            option_count: option_count.clamp(MIN_VOTE_OPTIONS, MAX_VOTE_OPTIONS),
            tick_interval: Duration::from_millis(
                parse_env("ERWIN_VOTE_TICK_MS", 1000).context("Invalid vote tick")?,
            ),
        })
    }

    fn load_acquisition_config() -> Result<AcquisitionConfig> {
        let backoff_base: u64 = parse_env("ERWIN_ACQUIRE_BACKOFF_BASE_SECONDS", 60)
            .context("Invalid acquisition backoff base")?;
        let backoff_max: u64 = parse_env("ERWIN_ACQUIRE_BACKOFF_MAX_SECONDS", 1800)
            .context("Invalid acquisition backoff ceiling")?;
        if backoff_max < backoff_base {
            bail!("ERWIN_ACQUIRE_BACKOFF_MAX_SECONDS must not be below the backoff base");
        }

        Ok(AcquisitionConfig {
            poll_interval: Duration::from_secs(
                parse_env("ERWIN_ACQUIRE_POLL_SECONDS", 5).context("Invalid acquisition poll interval")?,
            ),
            backoff_base: Duration::from_secs(backoff_base),
            backoff_max: Duration::from_secs(backoff_max),
            ytdlp: YtDlpConfig {
                binary: PathBuf::from(get_env_or_default("ERWIN_YTDLP_BIN", "yt-dlp")),
                cookie_file: get_optional_env("ERWIN_YTDL_COOKIE_FILE").map(PathBuf::from),
                cookie_header: get_optional_env("ERWIN_YTDL_COOKIE"),
                js_runtime: get_optional_env("ERWIN_YTDL_JS_RUNTIME"),
                ffmpeg_location: get_optional_env("ERWIN_YTDL_FFMPEG_LOCATION"),
            },
        })
    }

    fn load_realtime_config() -> Result<RealtimeConfig> {
        let ping: u64 = parse_env("ERWIN_WS_PING_SECONDS", 15).context("Invalid ping interval")?;
        let idle: u64 =
            parse_env("ERWIN_WS_IDLE_TIMEOUT_SECONDS", 45).context("Invalid idle timeout")?;
        if idle <= ping {
            bail!("ERWIN_WS_IDLE_TIMEOUT_SECONDS must exceed ERWIN_WS_PING_SECONDS");
        }
        Ok(RealtimeConfig {
            ping_interval: Duration::from_secs(ping),
            idle_timeout: Duration::from_secs(idle),
            adjust_threshold_secs: parse_env("ERWIN_ADJUST_THRESHOLD_SECONDS", 3.0)
                .context("Invalid adjust threshold")?,
        })
    }

    /// Validate that DATABASE_URL is explicitly set in production
    fn validate_database_url() -> Result<()> {
        match env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => Ok(()),
            _ => {
                bail!(
                    "DATABASE_URL environment variable is required in production. \
                     Please point it at the session database."
                );
            }
        }
    }

    /// Get database configuration
    pub fn database(&self) -> &DatabaseConfig {
        &self.common.database
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}
