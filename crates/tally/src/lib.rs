// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Product analytics and structured logging Rust SDK for Tally.
//!
//! This crate batches analytics events and log entries in memory and ships
//! them to the Tally collector as NDJSON.
//!
//! # Features
//!
//! - **Fire-and-forget API**: tracking calls never block or return errors;
//!   failures go to a single error callback
//! - **Batching**: size- and interval-driven flushes with bounded queues
//! - **Retries**: exponential backoff with jitter for transient failures
//! - **Sessions**: idle-timeout rotation with `context` marker events
//! - **Privacy hooks**: `before_send` pipelines and a URL/key [`Redactor`]
//! - **Pre-init queue**: calls made before configuration are replayed
//!
//! # Example
//!
//! ```ignore
//! use tally::{Properties, Tally, TallyConfig};
//!
//! #[tokio::main]
//! async fn main() -> tally::Result<()> {
//!     let tally = Tally::init(
//!         TallyConfig::new("0123456789abcdef0123456789abcdef")
//!             .service("checkout")
//!             .on_error(|e| eprintln!("tally: {e}")),
//!     )?;
//!
//!     tally.identify("user-42", Properties::new().insert("plan", "pro"));
//!     tally.track("Checkout Completed", Properties::new().insert("items", 3));
//!     tally.revenue(49.0, "USD", "order-1001", Properties::new());
//!     tally.warning("payment retried", None);
//!
//!     tally.close().await
//! }
//! ```

mod batcher;
mod beacon;
mod client;
mod config;
mod context;
mod deferred;
mod error;
mod identity;
mod pipeline;
mod redact;
mod session;
mod storage;
mod transport;

pub use batcher::{BatchSender, Batcher, BatcherConfig, OverflowHook, WeakBatcher};
pub use beacon::Beacon;
pub use client::{LifecycleState, Tally};
pub use config::{
	TallyConfig, DEFAULT_BATCH_SIZE, DEFAULT_CLOSE_TIMEOUT, DEFAULT_ENDPOINT,
	DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_QUEUE_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_NETWORK_TIMEOUT,
};
pub use context::{
	BotDetector, CiBotDetector, ContextProvider, DoNotTrack, EmptyContext, EnvDoNotTrack,
	RuntimeContext, StaticSignal, SDK_NAME, SDK_VERSION,
};
pub use deferred::DEFERRED_CAPACITY;
pub use error::{ErrorCallback, Result, TallyError};
pub use identity::{IdGenerator, UuidGenerator};
pub use pipeline::{hook, run_before_send, BeforeSend};
pub use redact::{Redactable, Redactor, REDACTED};
pub use session::{SessionReason, DEFAULT_SESSION_TIMEOUT, MARKER_COOLDOWN};
pub use storage::{
	FallbackStorage, FileStorage, MemoryStorage, PersistenceMode, Storage, StorageError,
};
pub use transport::{PayloadTooLargeHook, Transport, TransportOptions};

// Re-export core types for convenience
pub use tally_common_http::RetryConfig;
pub use tally_core::{ApiKey, Event, EventKind, LogEntry, LogLevel, Properties};
