// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The Tally client facade.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tally_core::{validate, ApiKey, Event, LogEntry, LogLevel, Properties};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use crate::batcher::{BatchSender, Batcher, BatcherConfig};
use crate::beacon::Beacon;
use crate::config::TallyConfig;
use crate::context::ContextProvider;
use crate::deferred::{DeferredCall, DeferredQueue};
use crate::error::{ErrorReporter, Result, TallyError};
use crate::identity::Identity;
use crate::pipeline::{run_before_send, BeforeSend};
use crate::session::{Rotation, SessionReason, SessionTracker, MARKER_COOLDOWN};
use crate::transport::{Transport, TransportOptions};

/// Lifecycle of a [`Tally`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	/// Created but not configured; calls are queued for replay.
	Unconfigured,
	/// Delivering.
	Configured,
	/// Terminal; a new instance is needed to send again.
	Closed,
}

/// Everything that exists only once the client is configured.
struct Runtime {
	identity: Identity,
	session: SessionTracker,
	events: Batcher<Event>,
	logs: Batcher<LogEntry>,
	beacon: Beacon,
	before_send: Vec<BeforeSend<Event>>,
	before_send_log: Vec<BeforeSend<LogEntry>>,
	context_provider: Arc<dyn ContextProvider>,
	source: Option<String>,
	service: Option<String>,
	close_timeout: Duration,
	session_task: Mutex<Option<JoinHandle<()>>>,
}

impl Runtime {
	fn build(config: TallyConfig, api_key: ApiKey, reporter: ErrorReporter) -> Result<Self> {
		let transport = Arc::new(Transport::with_reporter(
			TransportOptions {
				endpoint: config.endpoint.clone(),
				api_key: api_key.clone(),
				retry: config.retry.clone(),
				gzip: config.gzip,
				timeout: config.network_timeout,
			},
			reporter,
		)?);

		let batcher_config = BatcherConfig {
			size: config.batch_size,
			interval: config.flush_interval,
			max_queue_size: config.max_queue_size,
		};
		let event_sender: Arc<dyn BatchSender<Event>> = transport.clone();
		let log_sender: Arc<dyn BatchSender<LogEntry>> = transport.clone();
		let events = Batcher::new("events", batcher_config.clone(), event_sender, None);
		let logs = Batcher::new("logs", batcher_config, log_sender, None);

		let weak_events = events.downgrade();
		let weak_logs = logs.downgrade();
		transport.set_payload_too_large_hook(Arc::new(move || {
			if let Some(events) = weak_events.upgrade() {
				events.halve_batch_size();
			}
			if let Some(logs) = weak_logs.upgrade() {
				logs.halve_batch_size();
			}
		}));

		let storage = config.persistence.open();
		let identity = Identity::load(storage, config.id_generator.clone());

		Ok(Self {
			identity,
			session: SessionTracker::new(config.session_timeout, MARKER_COOLDOWN),
			events,
			logs,
			beacon: Beacon::new(config.endpoint, api_key, config.network_timeout),
			before_send: config.before_send,
			before_send_log: config.before_send_log,
			context_provider: config.context_provider,
			source: config.source,
			service: config.service,
			close_timeout: config.close_timeout,
			session_task: Mutex::new(None),
		})
	}

	fn stop_session_task(&self) {
		if let Some(task) = self.session_task.lock().take() {
			task.abort();
		}
	}
}

impl Drop for Runtime {
	fn drop(&mut self) {
		self.stop_session_task();
	}
}

enum ClientState {
	Unconfigured,
	Configured(Arc<Runtime>),
	/// Keeps the runtime so `flush_on_unload` can still drain after close.
	Closed(Option<Arc<Runtime>>),
}

struct TallyInner {
	state: RwLock<ClientState>,
	deferred: Mutex<DeferredQueue>,
	super_properties: RwLock<Properties>,
	config_enabled: AtomicBool,
	enabled_override: RwLock<Option<bool>>,
	reporter: RwLock<ErrorReporter>,
}

/// Analytics and structured-log client.
///
/// `Tally` is a cheap, cloneable handle. Every tracking call is synchronous
/// and never fails: problems go to the configured error callback. Calls made
/// before [`Tally::configure`] are queued and replayed once configured.
///
/// # Example
///
/// ```no_run
/// use tally::{Properties, Tally, TallyConfig};
///
/// # async fn run() -> tally::Result<()> {
/// let tally = Tally::init(
///     TallyConfig::new("0123456789abcdef0123456789abcdef")
///         .on_error(|e| eprintln!("tally: {e}")),
/// )?;
///
/// tally.register(Properties::new().insert("plan", "pro"));
/// tally.track("Checkout Started", Properties::new().insert("items", 3));
/// tally.info("checkout started", None);
///
/// tally.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Tally {
	inner: Arc<TallyInner>,
}

impl Default for Tally {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Tally {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Tally")
			.field("state", &self.state())
			.field("enabled", &self.is_enabled())
			.finish_non_exhaustive()
	}
}

impl Tally {
	/// Creates an unconfigured client.
	pub fn new() -> Self {
		Self {
			inner: Arc::new(TallyInner {
				state: RwLock::new(ClientState::Unconfigured),
				deferred: Mutex::new(DeferredQueue::default()),
				super_properties: RwLock::new(Properties::new()),
				config_enabled: AtomicBool::new(true),
				enabled_override: RwLock::new(None),
				reporter: RwLock::new(ErrorReporter::default()),
			}),
		}
	}

	/// Creates and configures a client.
	pub fn init(config: TallyConfig) -> Result<Self> {
		let tally = Self::new();
		tally.configure(config)?;
		Ok(tally)
	}

	/// Validates `config`, starts delivery and replays queued calls.
	///
	/// Background flushing and idle-session checks need a tokio runtime;
	/// outside one, items are only sent by explicit `flush`/`close`.
	pub fn configure(&self, config: TallyConfig) -> Result<()> {
		let runtime = {
			let mut state = self.inner.state.write();
			let rejection = match &*state {
				ClientState::Configured(_) => Some(("client is already configured", true)),
				ClientState::Closed(_) => Some(("client has been closed; create a new instance", false)),
				ClientState::Unconfigured => None,
			};
			if let Some((message, report)) = rejection {
				drop(state);
				let err = TallyError::Configuration(message.to_string());
				if report {
					self.report(&err);
				}
				return Err(err);
			}

			let api_key = ApiKey::parse(&config.api_key)?;
			let reporter = ErrorReporter::new(config.on_error.clone());
			let enabled = !config.starts_disabled();
			let endpoint = config.endpoint.clone();

			let runtime = Arc::new(Runtime::build(config, api_key.clone(), reporter.clone())?);
			self.inner.config_enabled.store(enabled, Ordering::SeqCst);
			*self.inner.reporter.write() = reporter;
			*state = ClientState::Configured(runtime.clone());

			info!(
				endpoint = %endpoint,
				api_key = api_key.prefix(),
				device_id = runtime.identity.device_id(),
				enabled = self.is_enabled(),
				"Tally client configured"
			);
			runtime
		};

		let rotation = runtime
			.session
			.start(runtime.identity.generate_id(), SessionReason::SessionStart);
		self.emit_marker(&runtime, &rotation);

		let deferred = self.inner.deferred.lock().take();
		if !self.is_enabled() {
			debug!(dropped = deferred.len(), "Client disabled, discarding deferred calls");
		} else {
			if !deferred.is_empty() {
				debug!(count = deferred.len(), "Replaying calls made before configuration");
			}
			for deferred in deferred {
				self.apply(&runtime, deferred.call, Some(deferred.recorded_at));
			}
		}

		let task = spawn_session_task(Arc::downgrade(&self.inner), runtime.session.check_period());
		*runtime.session_task.lock() = task;

		Ok(())
	}

	/// Records a named user action.
	pub fn track(&self, name: impl Into<String>, properties: Properties) {
		self.dispatch(DeferredCall::Track {
			name: name.into(),
			properties,
		});
	}

	/// Identifies the current user; the id is persisted and attached to
	/// later events.
	pub fn identify(&self, user_id: impl Into<String>, traits: Properties) {
		self.dispatch(DeferredCall::Identify {
			user_id: user_id.into(),
			traits,
		});
	}

	/// Associates the user with a group.
	pub fn group(&self, group_id: impl Into<String>, traits: Properties) {
		self.dispatch(DeferredCall::Group {
			group_id: group_id.into(),
			traits,
		});
	}

	/// Links `previous_id` to `user_id` without changing the current user.
	pub fn alias(&self, previous_id: impl Into<String>, user_id: impl Into<String>) {
		self.dispatch(DeferredCall::Alias {
			previous_id: previous_id.into(),
			user_id: user_id.into(),
		});
	}

	/// Records a purchase as a `revenue` track event.
	pub fn revenue(
		&self,
		amount: f64,
		currency: impl Into<String>,
		order_id: impl Into<String>,
		properties: Properties,
	) {
		self.dispatch(DeferredCall::Revenue {
			amount,
			currency: currency.into(),
			order_id: order_id.into(),
			properties,
		});
	}

	/// Records a structured log entry.
	pub fn log(&self, level: LogLevel, message: impl Into<String>, data: Option<Properties>) {
		self.dispatch(DeferredCall::Log {
			level,
			message: message.into(),
			data,
		});
	}

	pub fn emergency(&self, message: impl Into<String>, data: Option<Properties>) {
		self.log(LogLevel::Emergency, message, data);
	}

	pub fn alert(&self, message: impl Into<String>, data: Option<Properties>) {
		self.log(LogLevel::Alert, message, data);
	}

	pub fn critical(&self, message: impl Into<String>, data: Option<Properties>) {
		self.log(LogLevel::Critical, message, data);
	}

	pub fn error(&self, message: impl Into<String>, data: Option<Properties>) {
		self.log(LogLevel::Error, message, data);
	}

	pub fn warning(&self, message: impl Into<String>, data: Option<Properties>) {
		self.log(LogLevel::Warning, message, data);
	}

	pub fn notice(&self, message: impl Into<String>, data: Option<Properties>) {
		self.log(LogLevel::Notice, message, data);
	}

	pub fn info(&self, message: impl Into<String>, data: Option<Properties>) {
		self.log(LogLevel::Info, message, data);
	}

	pub fn debug(&self, message: impl Into<String>, data: Option<Properties>) {
		self.log(LogLevel::Debug, message, data);
	}

	pub fn trace(&self, message: impl Into<String>, data: Option<Properties>) {
		self.log(LogLevel::Trace, message, data);
	}

	/// Sets super-properties, overwriting existing keys.
	pub fn register(&self, properties: Properties) {
		self.dispatch(DeferredCall::Register(properties));
	}

	/// Sets super-properties whose keys are not registered yet.
	pub fn register_once(&self, properties: Properties) {
		self.dispatch(DeferredCall::RegisterOnce(properties));
	}

	/// Removes a super-property.
	pub fn unregister(&self, key: impl Into<String>) {
		self.dispatch(DeferredCall::Unregister(key.into()));
	}

	/// Snapshot of the current super-properties.
	pub fn super_properties(&self) -> Properties {
		self.inner.super_properties.read().clone()
	}

	/// Forgets the user and super-properties and starts a new session.
	pub fn reset(&self) {
		*self.inner.super_properties.write() = Properties::new();
		match self.state_snapshot() {
			Snapshot::Configured(runtime) => {
				runtime.identity.clear_user_id();
				let rotation = runtime
					.session
					.start(runtime.identity.generate_id(), SessionReason::SessionStart);
				self.emit_marker(&runtime, &rotation);
			}
			Snapshot::Unconfigured => {}
			Snapshot::Closed => self.report(&TallyError::Closed),
		}
	}

	/// Turns collection on or off at runtime. Queued items are kept.
	///
	/// Overrides the `disabled` flag, do-not-track and bot detection.
	pub fn set_enabled(&self, enabled: bool) {
		*self.inner.enabled_override.write() = Some(enabled);
		info!(enabled, "Tally collection toggled");
	}

	pub fn is_enabled(&self) -> bool {
		self
			.inner
			.enabled_override
			.read()
			.unwrap_or_else(|| self.inner.config_enabled.load(Ordering::SeqCst))
	}

	/// Tells the client the host application returned to the foreground.
	pub fn notify_foreground(&self) {
		if let Snapshot::Configured(runtime) = self.state_snapshot() {
			if let Some(rotation) = runtime
				.session
				.foreground(|| runtime.identity.generate_id())
			{
				self.emit_marker(&runtime, &rotation);
			}
		}
	}

	pub fn state(&self) -> LifecycleState {
		match &*self.inner.state.read() {
			ClientState::Unconfigured => LifecycleState::Unconfigured,
			ClientState::Configured(_) => LifecycleState::Configured,
			ClientState::Closed(_) => LifecycleState::Closed,
		}
	}

	pub fn device_id(&self) -> Option<String> {
		self
			.any_runtime()
			.map(|runtime| runtime.identity.device_id().to_string())
	}

	pub fn user_id(&self) -> Option<String> {
		self.any_runtime().and_then(|runtime| runtime.identity.user_id())
	}

	pub fn session_id(&self) -> Option<String> {
		self.any_runtime().and_then(|runtime| runtime.session.current())
	}

	/// Sends everything queued on both channels. No-op unless configured.
	pub async fn flush(&self) {
		if let Snapshot::Configured(runtime) = self.state_snapshot() {
			tokio::join!(runtime.events.flush(), runtime.logs.flush());
		}
	}

	/// Stops the client, delivering what it can before the close timeout.
	///
	/// Idempotent. On timeout the error is reported and returned; the final
	/// flush keeps running in the background.
	pub async fn close(&self) -> Result<()> {
		let runtime = {
			let mut state = self.inner.state.write();
			match std::mem::replace(&mut *state, ClientState::Closed(None)) {
				ClientState::Closed(runtime) => {
					*state = ClientState::Closed(runtime);
					return Ok(());
				}
				ClientState::Unconfigured => {
					let dropped = self.inner.deferred.lock().take().len();
					debug!(dropped, "Closed unconfigured client");
					return Ok(());
				}
				ClientState::Configured(runtime) => {
					*state = ClientState::Closed(Some(runtime.clone()));
					runtime
				}
			}
		};

		runtime.stop_session_task();
		let deadline = runtime.close_timeout;
		let closing = async {
			tokio::join!(runtime.events.close(), runtime.logs.close());
		};

		match tokio::time::timeout(deadline, closing).await {
			Ok(()) => {
				info!(
					pending_events = runtime.events.pending(),
					pending_logs = runtime.logs.pending(),
					"Tally client closed"
				);
				Ok(())
			}
			Err(_) => {
				let err = TallyError::Timeout { after: deadline };
				self.report(&err);
				Err(err)
			}
		}
	}

	/// Hands every queued item to the beacon for best-effort delivery.
	///
	/// Meant for process teardown, when awaiting a flush is not possible.
	pub fn flush_on_unload(&self) {
		let Some(runtime) = self.any_runtime() else {
			return;
		};
		let events = runtime.events.drain();
		let logs = runtime.logs.drain();
		debug!(events = events.len(), logs = logs.len(), "Flushing via beacon");
		runtime.beacon.send_events(events);
		runtime.beacon.send_logs(logs);
	}

	fn dispatch(&self, call: DeferredCall) {
		if !self.is_enabled() {
			trace!("Tally disabled, ignoring call");
			return;
		}

		let runtime = {
			let state = self.inner.state.read();
			match &*state {
				ClientState::Unconfigured => {
					self.inner.deferred.lock().push(call);
					return;
				}
				ClientState::Configured(runtime) => Some(runtime.clone()),
				ClientState::Closed(_) => None,
			}
		};

		match runtime {
			Some(runtime) => self.apply(&runtime, call, None),
			None => self.report(&TallyError::Closed),
		}
	}

	/// Runs one call; `recorded_at` overrides the timestamp of replayed items.
	fn apply(&self, runtime: &Runtime, call: DeferredCall, recorded_at: Option<i64>) {
		if let Err(e) = self.apply_call(runtime, call, recorded_at) {
			self.report(&e);
		}
	}

	fn apply_call(
		&self,
		runtime: &Runtime,
		call: DeferredCall,
		recorded_at: Option<i64>,
	) -> Result<()> {
		match call {
			DeferredCall::Track { name, properties } => {
				validate::event_name(&name)?;
				let event = Event::track(runtime.identity.device_id(), name, properties);
				self.emit(runtime, event, recorded_at);
			}
			DeferredCall::Identify { user_id, traits } => {
				validate::require("user_id", &user_id)?;
				runtime.identity.set_user_id(&user_id);
				let event = Event::identify(runtime.identity.device_id(), user_id, traits);
				self.emit(runtime, event, recorded_at);
			}
			DeferredCall::Group { group_id, traits } => {
				validate::require("group_id", &group_id)?;
				let event = Event::group(runtime.identity.device_id(), group_id, traits);
				self.emit(runtime, event, recorded_at);
			}
			DeferredCall::Alias {
				previous_id,
				user_id,
			} => {
				validate::require("previous_id", &previous_id)?;
				validate::require("user_id", &user_id)?;
				let event = Event::alias(runtime.identity.device_id(), previous_id, user_id);
				self.emit(runtime, event, recorded_at);
			}
			DeferredCall::Revenue {
				amount,
				currency,
				order_id,
				properties,
			} => {
				validate::amount(amount)?;
				validate::require("currency", &currency)?;
				validate::require("order_id", &order_id)?;
				let properties = properties
					.insert("amount", amount)
					.insert("currency", currency)
					.insert("order_id", order_id);
				let event = Event::track(runtime.identity.device_id(), "revenue", properties);
				self.emit(runtime, event, recorded_at);
			}
			DeferredCall::Log {
				level,
				message,
				data,
			} => {
				validate::log_message(&message)?;
				let session_id = self.touch_session(runtime);
				let mut entry = LogEntry::new(level, message)
					.with_service(runtime.service.clone())
					.with_source(runtime.source.clone())
					.with_session(session_id);
				if let Some(data) = data {
					entry = entry.with_data(data);
				}
				if let Some(timestamp) = recorded_at {
					entry.timestamp = timestamp;
				}
				match run_before_send(entry, &runtime.before_send_log) {
					Some(entry) => runtime.logs.add(entry),
					None => trace!("Log entry dropped by before_send_log"),
				}
			}
			DeferredCall::Register(properties) => {
				let mut supers = self.inner.super_properties.write();
				let current = std::mem::take(&mut *supers);
				*supers = current.merge(properties);
			}
			DeferredCall::RegisterOnce(properties) => {
				let mut supers = self.inner.super_properties.write();
				for (key, value) in properties.iter() {
					if !supers.contains_key(key) {
						supers.set(key.clone(), value.clone());
					}
				}
			}
			DeferredCall::Unregister(key) => {
				self.inner.super_properties.write().remove(&key);
			}
		}
		Ok(())
	}

	/// Attaches session, user and super-properties, then enqueues.
	fn emit(&self, runtime: &Runtime, mut event: Event, recorded_at: Option<i64>) {
		if let Some(timestamp) = recorded_at {
			event.timestamp = timestamp;
		}
		let session_id = self.touch_session(runtime);
		self.enqueue_event(runtime, event, session_id);
	}

	fn enqueue_event(&self, runtime: &Runtime, event: Event, session_id: Option<String>) {
		let mut event = event
			.with_session(session_id)
			.with_user(runtime.identity.user_id());
		let own = std::mem::take(&mut event.properties);
		event.properties = Properties::layered(&self.inner.super_properties.read(), own);

		match run_before_send(event, &runtime.before_send) {
			Some(event) => runtime.events.add(event),
			None => trace!("Event dropped by before_send"),
		}
	}

	/// Records activity and returns the session id to stamp on the item.
	fn touch_session(&self, runtime: &Runtime) -> Option<String> {
		if let Some(rotation) = runtime.session.touch(|| runtime.identity.generate_id()) {
			self.emit_marker(runtime, &rotation);
		}
		runtime.session.current()
	}

	fn emit_marker(&self, runtime: &Runtime, rotation: &Rotation) {
		if !rotation.emit_marker || !self.is_enabled() {
			return;
		}
		let mut properties = runtime
			.context_provider
			.context()
			.insert("reason", rotation.reason.as_str());
		if let Some(previous) = &rotation.previous {
			properties.set("previous_session_id", previous.clone());
		}
		let marker = Event::context(runtime.identity.device_id(), properties);
		self.enqueue_event(runtime, marker, Some(rotation.session_id.clone()));
	}

	fn report(&self, err: &TallyError) {
		let reporter = self.inner.reporter.read().clone();
		reporter.report(err);
	}

	fn state_snapshot(&self) -> Snapshot {
		match &*self.inner.state.read() {
			ClientState::Unconfigured => Snapshot::Unconfigured,
			ClientState::Configured(runtime) => Snapshot::Configured(runtime.clone()),
			ClientState::Closed(_) => Snapshot::Closed,
		}
	}

	/// The runtime while configured or after a configured client closed.
	fn any_runtime(&self) -> Option<Arc<Runtime>> {
		match &*self.inner.state.read() {
			ClientState::Configured(runtime) => Some(runtime.clone()),
			ClientState::Closed(runtime) => runtime.clone(),
			ClientState::Unconfigured => None,
		}
	}
}

enum Snapshot {
	Unconfigured,
	Configured(Arc<Runtime>),
	Closed,
}

fn spawn_session_task(inner: Weak<TallyInner>, period: Duration) -> Option<JoinHandle<()>> {
	let handle = Handle::try_current().ok()?;

	Some(handle.spawn(async move {
		let mut ticker = tokio::time::interval(period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		ticker.tick().await;

		loop {
			ticker.tick().await;
			let Some(inner) = inner.upgrade() else {
				break;
			};
			let client = Tally { inner };
			let Snapshot::Configured(runtime) = client.state_snapshot() else {
				break;
			};
			if let Some(rotation) = runtime
				.session
				.check_idle(|| runtime.identity.generate_id())
			{
				client.emit_marker(&runtime, &rotation);
			}
		}
		debug!("Session check task stopped");
	}))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::{EmptyContext, StaticSignal};
	use serde_json::{json, Value};
	use tally_core::{now_millis, EventKind};

	const KEY: &str = "0123456789abcdef0123456789abcdef";

	fn config() -> TallyConfig {
		TallyConfig::new(KEY)
			.endpoint("http://127.0.0.1:9")
			.batch_size(100)
			.flush_interval(Duration::from_secs(3600))
			.max_retries(0)
			.respect_do_not_track(false)
			.context_provider(Arc::new(EmptyContext))
	}

	fn error_sink(config: TallyConfig) -> (TallyConfig, Arc<Mutex<Vec<TallyError>>>) {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();
		let config = config.on_error(move |e| sink.lock().push(e.clone()));
		(config, seen)
	}

	fn events(tally: &Tally) -> Vec<Event> {
		tally.any_runtime().unwrap().events.drain()
	}

	fn tracked(tally: &Tally) -> Vec<Event> {
		events(tally)
			.into_iter()
			.filter(|e| e.kind() == EventKind::Track)
			.collect()
	}

	fn markers(events: &[Event]) -> Vec<String> {
		events
			.iter()
			.filter(|e| e.kind() == EventKind::Context)
			.filter_map(|e| e.properties.get("reason"))
			.filter_map(|reason| reason.as_str().map(str::to_string))
			.collect()
	}

	#[test]
	fn test_configure_emits_session_start_marker() {
		let tally = Tally::init(config()).unwrap();
		assert_eq!(tally.state(), LifecycleState::Configured);

		let queued = events(&tally);
		assert_eq!(queued.len(), 1);
		let marker = &queued[0];
		assert_eq!(marker.kind(), EventKind::Context);
		assert_eq!(marker.properties.get("reason"), Some(&json!("session_start")));
		assert_eq!(marker.session_id, tally.session_id());
		assert_eq!(marker.device_id, tally.device_id().unwrap());
	}

	#[test]
	fn test_event_properties_override_super_properties() {
		let tally = Tally::init(config()).unwrap();
		tally.register(Properties::new().insert("plan", "pro").insert("region", "eu"));
		tally.track("Upgrade", Properties::new().insert("plan", "team"));

		let event = tracked(&tally).remove(0);
		assert_eq!(event.event.as_deref(), Some("Upgrade"));
		assert_eq!(event.properties.get("plan"), Some(&json!("team")));
		assert_eq!(event.properties.get("region"), Some(&json!("eu")));
		assert_eq!(event.session_id, tally.session_id());
	}

	#[test]
	fn test_register_once_keeps_existing_and_unregister_removes() {
		let tally = Tally::init(config()).unwrap();
		tally.register(Properties::new().insert("plan", "pro"));
		tally.register_once(Properties::new().insert("plan", "free").insert("theme", "dark"));
		assert_eq!(tally.super_properties().get("plan"), Some(&json!("pro")));
		assert_eq!(tally.super_properties().get("theme"), Some(&json!("dark")));

		tally.unregister("plan");
		assert!(!tally.super_properties().contains_key("plan"));
	}

	#[test]
	fn test_calls_before_configure_are_replayed_in_order() {
		let tally = Tally::new();
		tally.register(Properties::new().insert("plan", "pro"));
		tally.track("First", Properties::new());
		tally.info("queued log", None);
		tally.track("Second", Properties::new());
		assert_eq!(tally.state(), LifecycleState::Unconfigured);

		tally.configure(config()).unwrap();

		let names: Vec<_> = tracked(&tally)
			.into_iter()
			.map(|e| {
				assert_eq!(e.properties.get("plan"), Some(&json!("pro")));
				e.event.unwrap_or_default()
			})
			.collect();
		assert_eq!(names, ["First", "Second"]);
		assert_eq!(tally.any_runtime().unwrap().logs.pending(), 1);
	}

	#[test]
	fn test_double_configure_is_reported() {
		let (config, seen) = error_sink(config());
		let tally = Tally::init(config).unwrap();

		let err = tally.configure(super::tests::config()).unwrap_err();
		assert!(matches!(err, TallyError::Configuration(_)));
		assert_eq!(seen.lock().len(), 1);
	}

	#[test]
	fn test_invalid_api_key_is_rejected() {
		let tally = Tally::new();
		let err = tally.configure(TallyConfig::new("short")).unwrap_err();
		assert!(matches!(err, TallyError::Configuration(_)));
		assert_eq!(tally.state(), LifecycleState::Unconfigured);
	}

	#[test]
	fn test_validation_errors_are_reported_and_dropped() {
		let (config, seen) = error_sink(config());
		let tally = Tally::init(config).unwrap();

		tally.track("", Properties::new());
		tally.identify("", Properties::new());
		tally.revenue(-1.0, "USD", "o-1", Properties::new());
		tally.error("", None);

		assert!(tracked(&tally).is_empty());
		let seen = seen.lock();
		assert_eq!(seen.len(), 4);
		assert!(seen.iter().all(|e| matches!(e, TallyError::Validation { .. })));
	}

	#[test]
	fn test_disabled_client_ignores_calls_until_enabled() {
		let tally = Tally::init(config().disabled(true)).unwrap();
		assert!(!tally.is_enabled());
		assert!(events(&tally).is_empty());

		tally.track("Ignored", Properties::new());
		assert!(tracked(&tally).is_empty());

		tally.set_enabled(true);
		tally.track("Counted", Properties::new());
		assert_eq!(tracked(&tally).len(), 1);
	}

	#[test]
	fn test_do_not_track_disables_collection() {
		let tally = Tally::init(
			config()
				.respect_do_not_track(true)
				.do_not_track(Arc::new(StaticSignal(true))),
		)
		.unwrap();
		assert!(!tally.is_enabled());
	}

	#[test]
	fn test_identify_alias_and_reset() {
		let tally = Tally::init(config()).unwrap();
		tally.identify("user-1", Properties::new().insert("email", "a@example.com"));
		assert_eq!(tally.user_id().as_deref(), Some("user-1"));

		tally.alias("anon-7", "user-2");
		assert_eq!(tally.user_id().as_deref(), Some("user-1"));

		tally.track("After", Properties::new());
		let queued = events(&tally);
		let alias = queued.iter().find(|e| e.kind() == EventKind::Alias).unwrap();
		assert_eq!(alias.previous_id.as_deref(), Some("anon-7"));
		let after = queued.iter().find(|e| e.kind() == EventKind::Track).unwrap();
		assert_eq!(after.user_id.as_deref(), Some("user-1"));

		let before = tally.session_id();
		tally.register(Properties::new().insert("plan", "pro"));
		tally.reset();
		assert_eq!(tally.user_id(), None);
		assert!(tally.super_properties().is_empty());
		assert_ne!(tally.session_id(), before);
	}

	#[test]
	fn test_revenue_fields_win_over_properties() {
		let tally = Tally::init(config()).unwrap();
		tally.revenue(
			19.99,
			"EUR",
			"order-9",
			Properties::new().insert("currency", "USD").insert("coupon", "SPRING"),
		);

		let event = tracked(&tally).remove(0);
		assert_eq!(event.event.as_deref(), Some("revenue"));
		assert_eq!(event.properties.get("amount"), Some(&json!(19.99)));
		assert_eq!(event.properties.get("currency"), Some(&json!("EUR")));
		assert_eq!(event.properties.get("order_id"), Some(&json!("order-9")));
		assert_eq!(event.properties.get("coupon"), Some(&json!("SPRING")));
	}

	#[test]
	fn test_logs_carry_tags_and_pass_hooks() {
		let tally = Tally::init(
			config()
				.service("checkout")
				.before_send_log(crate::pipeline::hook(|entry: LogEntry| {
					(entry.level != LogLevel::Trace).then_some(entry)
				})),
		)
		.unwrap();

		tally.warning("slow response", Some(Properties::new().insert("ms", 812)));
		tally.trace("noise", None);

		let logs = tally.any_runtime().unwrap().logs.drain();
		assert_eq!(logs.len(), 1);
		let entry = &logs[0];
		assert_eq!(entry.level, LogLevel::Warning);
		assert_eq!(entry.service.as_deref(), Some("checkout"));
		assert_eq!(entry.source.as_deref(), Some("rust"));
		assert_eq!(entry.session_id, tally.session_id());
		assert_eq!(
			entry.data.as_ref().and_then(|d| d.get("ms")),
			Some(&Value::from(812))
		);
	}

	#[test]
	fn test_before_send_can_drop_events() {
		let tally = Tally::init(config().before_send(crate::pipeline::hook(|event: Event| {
			(event.event.as_deref() != Some("Secret")).then_some(event)
		})))
		.unwrap();

		tally.track("Secret", Properties::new());
		tally.track("Public", Properties::new());

		let names: Vec<_> = tracked(&tally).into_iter().filter_map(|e| e.event).collect();
		assert_eq!(names, ["Public"]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_session_task_rotates_idle_session() {
		let tally = Tally::init(config().session_timeout(Duration::from_secs(10))).unwrap();
		tally.track("A", Properties::new());
		let first = tally.session_id();

		tokio::time::sleep(Duration::from_secs(16)).await;

		let queued = events(&tally);
		assert_eq!(markers(&queued), ["session_start", "session_timeout"]);
		let timeout = queued.last().unwrap();
		assert_eq!(timeout.properties.get("previous_session_id"), Some(&json!(first)));
		assert_eq!(timeout.session_id, tally.session_id());
		assert_ne!(tally.session_id(), first);
	}

	#[tokio::test(start_paused = true)]
	async fn test_one_idle_gap_yields_one_timeout_marker() {
		let tally = Tally::init(config().session_timeout(Duration::from_secs(10))).unwrap();
		tally.track("A", Properties::new());

		tokio::time::sleep(Duration::from_secs(30)).await;
		tally.track("B", Properties::new());

		let queued = events(&tally);
		assert_eq!(markers(&queued), ["session_start", "session_timeout"]);
		let timeout = &queued[2];
		let b = queued.last().unwrap();
		assert_eq!(b.event.as_deref(), Some("B"));
		assert_eq!(b.session_id, timeout.session_id);
		assert_eq!(b.session_id, tally.session_id());
	}

	#[tokio::test(start_paused = true)]
	async fn test_foreground_after_gap_emits_marker() {
		let tally = Tally::init(config().session_timeout(Duration::from_secs(10))).unwrap();
		let runtime = tally.any_runtime().unwrap();
		runtime.stop_session_task();
		let first = tally.session_id();

		tokio::time::sleep(Duration::from_secs(5)).await;
		tally.notify_foreground();
		assert_eq!(tally.session_id(), first);

		tokio::time::sleep(Duration::from_secs(10)).await;
		tally.notify_foreground();

		let queued = events(&tally);
		assert_eq!(markers(&queued), ["session_start", "app_foreground"]);
		let foreground = queued.last().unwrap();
		assert_eq!(
			foreground.properties.get("previous_session_id"),
			Some(&json!(first))
		);
		assert_eq!(foreground.session_id, tally.session_id());
	}

	#[tokio::test(start_paused = true)]
	async fn test_close_stops_session_task() {
		let tally = Tally::init(config().session_timeout(Duration::from_secs(10))).unwrap();
		tally.track("A", Properties::new());
		events(&tally);
		let runtime = tally.any_runtime().unwrap();
		assert!(runtime.session_task.lock().is_some());

		tally.close().await.unwrap();
		assert!(runtime.session_task.lock().is_none());

		let before = tally.session_id();
		tokio::time::sleep(Duration::from_secs(30)).await;
		assert_eq!(tally.session_id(), before);
	}

	#[test]
	fn test_replayed_calls_keep_call_time() {
		let tally = Tally::new();
		tally.track("Early", Properties::new());
		tally.info("early log", None);
		let queued_at = now_millis();
		std::thread::sleep(Duration::from_millis(20));

		tally.configure(config()).unwrap();

		let queued = events(&tally);
		let marker = queued.iter().find(|e| e.kind() == EventKind::Context).unwrap();
		let early = queued.iter().find(|e| e.kind() == EventKind::Track).unwrap();
		assert!(early.timestamp <= queued_at);
		assert!(marker.timestamp > queued_at);

		let logs = tally.any_runtime().unwrap().logs.drain();
		assert!(logs[0].timestamp <= queued_at);
	}

	#[tokio::test]
	async fn test_close_is_terminal_and_idempotent() {
		let (config, seen) = error_sink(config());
		let tally = Tally::init(config).unwrap();
		events(&tally);

		tally.close().await.unwrap();
		tally.close().await.unwrap();
		assert_eq!(tally.state(), LifecycleState::Closed);

		tally.track("Late", Properties::new());
		assert!(matches!(seen.lock().as_slice(), [TallyError::Closed]));

		let err = tally.configure(super::tests::config()).unwrap_err();
		assert!(matches!(err, TallyError::Configuration(_)));
	}

	#[tokio::test]
	async fn test_close_unconfigured_drops_deferred_calls() {
		let tally = Tally::new();
		tally.track("Never", Properties::new());
		tally.close().await.unwrap();
		assert_eq!(tally.state(), LifecycleState::Closed);
		assert_eq!(tally.inner.deferred.lock().len(), 0);
	}

	#[test]
	fn test_flush_before_configure_is_noop() {
		let tally = Tally::new();
		tokio_test::block_on(tally.flush());
		assert_eq!(tally.state(), LifecycleState::Unconfigured);
	}

	#[test]
	fn test_flush_on_unload_drains_queues() {
		let tally = Tally::init(config()).unwrap();
		tally.track("Leaving", Properties::new());
		tally.notice("bye", None);

		tally.flush_on_unload();

		let runtime = tally.any_runtime().unwrap();
		assert_eq!(runtime.events.pending(), 0);
		assert_eq!(runtime.logs.pending(), 0);
	}
}
