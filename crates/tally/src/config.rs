// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tally_common_http::RetryConfig;
use tally_core::{Event, LogEntry};

use crate::context::{
	BotDetector, CiBotDetector, ContextProvider, DoNotTrack, EnvDoNotTrack, RuntimeContext,
};
use crate::error::{ErrorCallback, Result, TallyError};
use crate::identity::{IdGenerator, UuidGenerator};
use crate::pipeline::BeforeSend;
use crate::session::DEFAULT_SESSION_TIMEOUT;
use crate::storage::PersistenceMode;

pub const DEFAULT_ENDPOINT: &str = "https://api.tally.dev";
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

/// Configuration for [`Tally`](crate::Tally).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tally::TallyConfig;
///
/// let config = TallyConfig::new("0123456789abcdef0123456789abcdef")
///     .endpoint("https://collector.example.com")
///     .batch_size(20)
///     .flush_interval(Duration::from_secs(2))
///     .service("checkout");
/// ```
#[derive(Clone)]
pub struct TallyConfig {
	pub(crate) api_key: String,
	pub(crate) endpoint: String,
	pub(crate) batch_size: usize,
	pub(crate) flush_interval: Duration,
	pub(crate) retry: RetryConfig,
	pub(crate) close_timeout: Duration,
	pub(crate) network_timeout: Duration,
	pub(crate) source: Option<String>,
	pub(crate) service: Option<String>,
	pub(crate) disabled: bool,
	pub(crate) max_queue_size: usize,
	pub(crate) gzip: bool,
	pub(crate) session_timeout: Duration,
	pub(crate) persistence: PersistenceMode,
	pub(crate) respect_do_not_track: bool,
	pub(crate) detect_bots: bool,
	pub(crate) on_error: Option<ErrorCallback>,
	pub(crate) before_send: Vec<BeforeSend<Event>>,
	pub(crate) before_send_log: Vec<BeforeSend<LogEntry>>,
	pub(crate) id_generator: Arc<dyn IdGenerator>,
	pub(crate) context_provider: Arc<dyn ContextProvider>,
	pub(crate) bot_detector: Arc<dyn BotDetector>,
	pub(crate) do_not_track: Arc<dyn DoNotTrack>,
}

impl Default for TallyConfig {
	fn default() -> Self {
		Self {
			api_key: String::new(),
			endpoint: DEFAULT_ENDPOINT.to_string(),
			batch_size: DEFAULT_BATCH_SIZE,
			flush_interval: DEFAULT_FLUSH_INTERVAL,
			retry: RetryConfig {
				max_retries: DEFAULT_MAX_RETRIES,
				..RetryConfig::default()
			},
			close_timeout: DEFAULT_CLOSE_TIMEOUT,
			network_timeout: DEFAULT_NETWORK_TIMEOUT,
			source: Some("rust".to_string()),
			service: None,
			disabled: false,
			max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
			gzip: true,
			session_timeout: DEFAULT_SESSION_TIMEOUT,
			persistence: PersistenceMode::default(),
			respect_do_not_track: true,
			detect_bots: false,
			on_error: None,
			before_send: Vec::new(),
			before_send_log: Vec::new(),
			id_generator: Arc::new(UuidGenerator),
			context_provider: Arc::new(RuntimeContext),
			bot_detector: Arc::new(CiBotDetector),
			do_not_track: Arc::new(EnvDoNotTrack),
		}
	}
}

impl TallyConfig {
	/// Creates a configuration with defaults and the given API key.
	///
	/// The key is validated when the client is configured.
	pub fn new(api_key: impl Into<String>) -> Self {
		Self {
			api_key: api_key.into(),
			..Self::default()
		}
	}

	/// Reads configuration from `TALLY_*` environment variables.
	///
	/// Unset variables keep their defaults; malformed values are errors.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
		let mut config = Self::default();

		if let Some(key) = lookup("TALLY_API_KEY") {
			config.api_key = key;
		}
		if let Some(endpoint) = lookup("TALLY_ENDPOINT") {
			config.endpoint = endpoint;
		}
		if let Some(raw) = lookup("TALLY_BATCH_SIZE") {
			config.batch_size = parse_number("TALLY_BATCH_SIZE", &raw)?;
		}
		if let Some(raw) = lookup("TALLY_FLUSH_INTERVAL_MS") {
			config.flush_interval =
				Duration::from_millis(parse_number("TALLY_FLUSH_INTERVAL_MS", &raw)?);
		}
		if let Some(raw) = lookup("TALLY_DISABLED") {
			config.disabled = parse_bool("TALLY_DISABLED", &raw)?;
		}
		if let Some(raw) = lookup("TALLY_GZIP") {
			config.gzip = parse_bool("TALLY_GZIP", &raw)?;
		}

		Ok(config)
	}

	pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
		self.api_key = api_key.into();
		self
	}

	/// Collector base URL, without the `/v1/...` path.
	pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.endpoint = endpoint.into();
		self
	}

	pub fn batch_size(mut self, size: usize) -> Self {
		self.batch_size = size;
		self
	}

	pub fn flush_interval(mut self, interval: Duration) -> Self {
		self.flush_interval = interval;
		self
	}

	/// Retries after the first attempt of each batch send.
	pub fn max_retries(mut self, retries: u32) -> Self {
		self.retry.max_retries = retries;
		self
	}

	/// Replaces the whole backoff schedule.
	pub fn retry_config(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;
		self
	}

	/// Deadline for [`Tally::close`](crate::Tally::close).
	pub fn close_timeout(mut self, timeout: Duration) -> Self {
		self.close_timeout = timeout;
		self
	}

	/// Per-request HTTP timeout.
	pub fn network_timeout(mut self, timeout: Duration) -> Self {
		self.network_timeout = timeout;
		self
	}

	/// Tag attached to every log entry as `source`.
	pub fn source(mut self, source: impl Into<String>) -> Self {
		self.source = Some(source.into());
		self
	}

	/// Tag attached to every log entry as `service`.
	pub fn service(mut self, service: impl Into<String>) -> Self {
		self.service = Some(service.into());
		self
	}

	pub fn disabled(mut self, disabled: bool) -> Self {
		self.disabled = disabled;
		self
	}

	pub fn max_queue_size(mut self, size: usize) -> Self {
		self.max_queue_size = size;
		self
	}

	pub fn gzip(mut self, enabled: bool) -> Self {
		self.gzip = enabled;
		self
	}

	/// Idle gap after which a new session starts.
	pub fn session_timeout(mut self, timeout: Duration) -> Self {
		self.session_timeout = timeout;
		self
	}

	pub fn persistence(mut self, mode: PersistenceMode) -> Self {
		self.persistence = mode;
		self
	}

	/// Disables the client when the do-not-track signal is on. Default: true.
	pub fn respect_do_not_track(mut self, respect: bool) -> Self {
		self.respect_do_not_track = respect;
		self
	}

	/// Disables the client when the bot detector fires. Default: false.
	pub fn detect_bots(mut self, detect: bool) -> Self {
		self.detect_bots = detect;
		self
	}

	/// Receives every per-call and delivery failure.
	pub fn on_error(mut self, callback: impl Fn(&TallyError) + Send + Sync + 'static) -> Self {
		self.on_error = Some(Arc::new(callback));
		self
	}

	/// Appends an event hook; hooks run in the order they were added.
	pub fn before_send(mut self, hook: BeforeSend<Event>) -> Self {
		self.before_send.push(hook);
		self
	}

	/// Appends a log hook; hooks run in the order they were added.
	pub fn before_send_log(mut self, hook: BeforeSend<LogEntry>) -> Self {
		self.before_send_log.push(hook);
		self
	}

	pub fn id_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
		self.id_generator = generator;
		self
	}

	pub fn context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
		self.context_provider = provider;
		self
	}

	pub fn bot_detector(mut self, detector: Arc<dyn BotDetector>) -> Self {
		self.bot_detector = detector;
		self
	}

	pub fn do_not_track(mut self, signal: Arc<dyn DoNotTrack>) -> Self {
		self.do_not_track = signal;
		self
	}

	/// True when the disabled flag, do-not-track or bot detection rules the
	/// client out from the start.
	pub(crate) fn starts_disabled(&self) -> bool {
		self.disabled
			|| (self.respect_do_not_track && self.do_not_track.do_not_track())
			|| (self.detect_bots && self.bot_detector.is_bot())
	}
}

impl fmt::Debug for TallyConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let key = if self.api_key.chars().count() > 6 {
			format!("{}…", self.api_key.chars().take(6).collect::<String>())
		} else {
			"<unset>".to_string()
		};
		f.debug_struct("TallyConfig")
			.field("api_key", &key)
			.field("endpoint", &self.endpoint)
			.field("batch_size", &self.batch_size)
			.field("flush_interval", &self.flush_interval)
			.field("retry", &self.retry)
			.field("close_timeout", &self.close_timeout)
			.field("network_timeout", &self.network_timeout)
			.field("source", &self.source)
			.field("service", &self.service)
			.field("disabled", &self.disabled)
			.field("max_queue_size", &self.max_queue_size)
			.field("gzip", &self.gzip)
			.field("session_timeout", &self.session_timeout)
			.field("persistence", &self.persistence)
			.field("before_send", &self.before_send.len())
			.field("before_send_log", &self.before_send_log.len())
			.finish_non_exhaustive()
	}
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
	raw.trim()
		.parse()
		.map_err(|_| TallyError::Configuration(format!("{name} must be a number, got {raw:?}")))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
	match raw.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(TallyError::Configuration(format!(
			"{name} must be a boolean, got {raw:?}"
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::StaticSignal;
	use std::collections::HashMap;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn test_defaults() {
		let config = TallyConfig::default();
		assert_eq!(config.endpoint, "https://api.tally.dev");
		assert_eq!(config.batch_size, 50);
		assert_eq!(config.flush_interval, Duration::from_secs(5));
		assert_eq!(config.retry.max_retries, 3);
		assert_eq!(config.close_timeout, Duration::from_secs(5));
		assert_eq!(config.network_timeout, Duration::from_secs(10));
		assert_eq!(config.max_queue_size, 1000);
		assert!(config.gzip);
		assert_eq!(config.session_timeout, Duration::from_secs(1800));
		assert!(!config.disabled);
	}

	#[test]
	fn test_from_env_overrides() {
		let config = TallyConfig::from_lookup(lookup(&[
			("TALLY_API_KEY", "0123456789abcdef0123456789abcdef"),
			("TALLY_ENDPOINT", "http://localhost:8080"),
			("TALLY_BATCH_SIZE", "10"),
			("TALLY_FLUSH_INTERVAL_MS", "250"),
			("TALLY_DISABLED", "true"),
			("TALLY_GZIP", "0"),
		]))
		.unwrap();

		assert_eq!(config.api_key, "0123456789abcdef0123456789abcdef");
		assert_eq!(config.endpoint, "http://localhost:8080");
		assert_eq!(config.batch_size, 10);
		assert_eq!(config.flush_interval, Duration::from_millis(250));
		assert!(config.disabled);
		assert!(!config.gzip);
	}

	#[test]
	fn test_from_env_empty_keeps_defaults() {
		let config = TallyConfig::from_lookup(lookup(&[])).unwrap();
		assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
		assert!(config.gzip);
	}

	#[test]
	fn test_from_env_rejects_malformed_values() {
		let err = TallyConfig::from_lookup(lookup(&[("TALLY_BATCH_SIZE", "lots")])).unwrap_err();
		assert!(matches!(err, TallyError::Configuration(_)));

		let err = TallyConfig::from_lookup(lookup(&[("TALLY_GZIP", "maybe")])).unwrap_err();
		assert!(matches!(err, TallyError::Configuration(_)));
	}

	#[test]
	fn test_debug_masks_api_key() {
		let config = TallyConfig::new("0123456789abcdef0123456789abcdef");
		let debug = format!("{config:?}");
		assert!(debug.contains("012345"));
		assert!(!debug.contains("0123456789abcdef0123456789abcdef"));
	}

	#[test]
	fn test_starts_disabled_signals() {
		let base = TallyConfig::new("k").do_not_track(Arc::new(StaticSignal(false)));
		assert!(!base.starts_disabled());
		assert!(base.clone().disabled(true).starts_disabled());

		let dnt = base.clone().do_not_track(Arc::new(StaticSignal(true)));
		assert!(dnt.starts_disabled());
		assert!(!dnt.respect_do_not_track(false).starts_disabled());

		let bot = base.bot_detector(Arc::new(StaticSignal(true)));
		assert!(!bot.starts_disabled());
		assert!(bot.detect_bots(true).starts_disabled());
	}
}
