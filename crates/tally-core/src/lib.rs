// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Tally analytics and logging SDK.
//!
//! This crate provides:
//! - [`Event`] and [`LogEntry`], the records delivered to the collector
//! - [`Properties`], the flat property map with explicit merge precedence
//! - [`ApiKey`] and the [`validate`] functions run before items are built
//! - NDJSON framing helpers in [`wire`]

mod api_key;
mod error;
mod event;
mod log;
mod properties;
pub mod validate;
pub mod wire;

pub use api_key::ApiKey;
pub use error::{CoreError, Result};
pub use event::{now_millis, Event, EventKind};
pub use log::{LogEntry, LogLevel};
pub use properties::Properties;
