//! Configuration and CLI argument handling

use std::str::FromStr;

use clap::Parser;
use serde::Serialize;

use crate::error::Error;

/// Warning-phase setting: disabled, or enabled with a duration in seconds.
///
/// Parses from the strings a host would pass on a command line: `"0"`,
/// `"false"` and `"off"` disable the phase, a positive integer enables it,
/// anything else is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutSetting {
    /// No warning phase; the session stays idle until explicitly resumed.
    Disabled,
    /// Warning phase of the given number of seconds.
    After(u64),
}

impl TimeoutSetting {
    /// Duration of the warning phase in seconds; 0 when disabled.
    pub fn seconds(&self) -> u64 {
        match self {
            Self::Disabled => 0,
            Self::After(secs) => *secs,
        }
    }
}

impl From<u64> for TimeoutSetting {
    fn from(secs: u64) -> Self {
        if secs == 0 {
            Self::Disabled
        } else {
            Self::After(secs)
        }
    }
}

impl FromStr for TimeoutSetting {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "false" | "off" => Ok(Self::Disabled),
            value => value
                .parse::<u64>()
                .map(Self::from)
                .map_err(|_| Error::InvalidTimeoutDuration),
        }
    }
}

/// Normalized HTTP request configuration for the keepalive ping.
///
/// The method is uppercased and validated at construction; response caching
/// is never used, so `cache` is always `false` regardless of what the host
/// asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpTarget {
    pub url: String,
    pub method: String,
    pub cache: bool,
}

impl HttpTarget {
    /// Target the given URL with a GET request.
    pub fn get(url: &str) -> Result<Self, Error> {
        Self::new(url, "GET")
    }

    /// Target the given URL with an explicit method.
    pub fn new(url: &str, method: &str) -> Result<Self, Error> {
        if url.trim().is_empty() {
            return Err(Error::InvalidHttpTarget);
        }
        let method = method.to_uppercase();
        reqwest::Method::from_bytes(method.as_bytes()).map_err(|_| Error::InvalidHttpTarget)?;
        Ok(Self {
            url: url.to_string(),
            method,
            cache: false,
        })
    }
}

/// Options for the idle monitor, built once before construction.
#[derive(Debug, Clone, Serialize)]
pub struct IdleOptions {
    idle_secs: u64,
    timeout_secs: u64,
    interrupt_events: Vec<String>,
    auto_resume: bool,
    keepalive: bool,
}

impl Default for IdleOptions {
    fn default() -> Self {
        Self {
            idle_secs: 20 * 60,
            timeout_secs: 30,
            interrupt_events: vec!["stdin".to_string()],
            auto_resume: true,
            keepalive: true,
        }
    }
}

impl IdleOptions {
    /// Set the idle duration in seconds; must be positive.
    pub fn idle(mut self, secs: u64) -> Result<Self, Error> {
        if secs == 0 {
            return Err(Error::InvalidIdleDuration);
        }
        self.idle_secs = secs;
        Ok(self)
    }

    /// Set or disable the warning phase.
    pub fn timeout(mut self, timeout: impl Into<TimeoutSetting>) -> Self {
        self.timeout_secs = timeout.into().seconds();
        self
    }

    /// Name the host activity signals that should feed `interrupt()`.
    /// Advisory metadata for the host's binding layer; not enforced here.
    pub fn interrupt_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interrupt_events = events.into_iter().map(Into::into).collect();
        self
    }

    /// Whether an interrupt received while idling resumes the session.
    pub fn auto_resume(mut self, auto_resume: bool) -> Self {
        self.auto_resume = auto_resume;
        self
    }

    /// Whether the idle monitor drives the keepalive monitor.
    pub fn keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Idle duration in seconds.
    pub fn idle_secs(&self) -> u64 {
        self.idle_secs
    }

    /// Warning phase duration in seconds; 0 means disabled.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Advisory activity-signal names.
    pub fn interrupt_event_names(&self) -> &[String] {
        &self.interrupt_events
    }

    /// Whether idling interrupts auto-resume the session.
    pub fn auto_resume_enabled(&self) -> bool {
        self.auto_resume
    }

    /// Whether keepalive integration is enabled.
    pub fn keepalive_enabled(&self) -> bool {
        self.keepalive
    }

    pub(crate) fn set_idle_secs(&mut self, secs: u64) {
        self.idle_secs = secs;
    }

    pub(crate) fn set_timeout_secs(&mut self, secs: u64) {
        self.timeout_secs = secs;
    }
}

/// Options for the keepalive monitor.
#[derive(Debug, Clone, Serialize)]
pub struct KeepaliveOptions {
    interval_secs: u64,
    http: Option<HttpTarget>,
}

impl Default for KeepaliveOptions {
    fn default() -> Self {
        Self {
            interval_secs: 10 * 60,
            http: None,
        }
    }
}

impl KeepaliveOptions {
    /// Set the heartbeat interval in seconds; must be positive.
    pub fn interval(mut self, secs: u64) -> Result<Self, Error> {
        if secs == 0 {
            return Err(Error::InvalidKeepaliveInterval);
        }
        self.interval_secs = secs;
        Ok(self)
    }

    /// Attach an HTTP target to ping on each heartbeat.
    pub fn http(mut self, target: HttpTarget) -> Self {
        self.http = Some(target);
        self
    }

    /// Heartbeat interval in seconds.
    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// The configured HTTP target, if any.
    pub fn http_target(&self) -> Option<&HttpTarget> {
        self.http.as_ref()
    }

    pub(crate) fn set_interval_secs(&mut self, secs: u64) {
        self.interval_secs = secs;
    }
}

/// CLI argument parsing structure
#[derive(Parser, Debug)]
#[command(name = "idlewatch")]
#[command(about = "Watch an interactive session for inactivity and keep it alive while active")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Seconds of inactivity before the session is considered idle
    #[arg(long, default_value = "1200", value_parser = parse_idle_seconds)]
    pub idle: u64,

    /// Warning countdown in seconds before timeout; 0, "false" or "off" disables
    #[arg(long, default_value = "30")]
    pub timeout: TimeoutSetting,

    /// URL to ping on each keepalive heartbeat
    #[arg(long)]
    pub keepalive_url: Option<String>,

    /// Seconds between keepalive heartbeats
    #[arg(long, default_value = "600", value_parser = parse_interval_seconds)]
    pub keepalive_interval: u64,

    /// Disable the keepalive heartbeat entirely
    #[arg(long)]
    pub no_keepalive: bool,

    /// Print monitor events as JSON lines on stdout
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_idle_seconds(raw: &str) -> Result<u64, Error> {
    raw.parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .ok_or(Error::InvalidIdleDuration)
}

fn parse_interval_seconds(raw: &str) -> Result<u64, Error> {
    raw.parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .ok_or(Error::InvalidKeepaliveInterval)
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Idle monitor options derived from the CLI flags.
    pub fn idle_options(&self) -> Result<IdleOptions, Error> {
        Ok(IdleOptions::default()
            .idle(self.idle)?
            .timeout(self.timeout.clone())
            .keepalive(!self.no_keepalive))
    }

    /// Keepalive monitor options derived from the CLI flags.
    pub fn keepalive_options(&self) -> Result<KeepaliveOptions, Error> {
        let mut options = KeepaliveOptions::default().interval(self.keepalive_interval)?;
        if let Some(url) = &self.keepalive_url {
            options = options.http(HttpTarget::get(url)?);
        }
        Ok(options)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
