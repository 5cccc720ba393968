// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runtime context and tracking-consent signals.

use tally_core::Properties;

/// SDK name attached to session markers.
pub const SDK_NAME: &str = "tally-rust";
/// SDK version attached to session markers.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Supplies metadata merged into session marker events.
pub trait ContextProvider: Send + Sync {
	fn context(&self) -> Properties;
}

/// Reports OS, architecture, locale and SDK identification.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuntimeContext;

impl ContextProvider for RuntimeContext {
	fn context(&self) -> Properties {
		let mut props = Properties::new()
			.insert("os", std::env::consts::OS)
			.insert("arch", std::env::consts::ARCH)
			.insert("sdk_name", SDK_NAME)
			.insert("sdk_version", SDK_VERSION);

		let raw = std::env::var("LC_ALL")
			.ok()
			.filter(|v| !v.is_empty())
			.or_else(|| std::env::var("LANG").ok());
		if let Some(locale) = raw.as_deref().and_then(normalize_locale) {
			props.set("locale", locale);
		}
		props
	}
}

/// Supplies no context at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyContext;

impl ContextProvider for EmptyContext {
	fn context(&self) -> Properties {
		Properties::new()
	}
}

/// Decides whether the process is automated traffic.
pub trait BotDetector: Send + Sync {
	fn is_bot(&self) -> bool;
}

/// Reports a do-not-track preference.
pub trait DoNotTrack: Send + Sync {
	fn do_not_track(&self) -> bool;
}

/// Treats CI environments (the `CI` variable) as bots.
#[derive(Debug, Default, Clone, Copy)]
pub struct CiBotDetector;

impl BotDetector for CiBotDetector {
	fn is_bot(&self) -> bool {
		flag_is_set(std::env::var("CI").ok().as_deref())
	}
}

/// Honors the `DO_NOT_TRACK` environment variable.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvDoNotTrack;

impl DoNotTrack for EnvDoNotTrack {
	fn do_not_track(&self) -> bool {
		flag_is_set(std::env::var("DO_NOT_TRACK").ok().as_deref())
	}
}

/// A fixed answer for either signal.
#[derive(Debug, Clone, Copy)]
pub struct StaticSignal(pub bool);

impl BotDetector for StaticSignal {
	fn is_bot(&self) -> bool {
		self.0
	}
}

impl DoNotTrack for StaticSignal {
	fn do_not_track(&self) -> bool {
		self.0
	}
}

fn flag_is_set(value: Option<&str>) -> bool {
	match value.map(str::trim) {
		None | Some("") => false,
		Some(v) => !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"),
	}
}

/// `en_US.UTF-8` becomes `en-US`; `C` and `POSIX` carry no locale.
fn normalize_locale(raw: &str) -> Option<String> {
	let base = raw.split(['.', '@']).next()?.trim();
	if base.is_empty() || base == "C" || base == "POSIX" {
		return None;
	}
	Some(base.replace('_', "-"))
}
