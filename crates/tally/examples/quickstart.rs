// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sends a few events and logs using configuration from the environment.
//!
//! ```sh
//! TALLY_API_KEY=0123456789abcdef0123456789abcdef RUST_LOG=tally=debug \
//!     cargo run -p tally --example quickstart
//! ```

use tally::{hook, Event, Properties, Redactor, Tally, TallyConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> tally::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.init();

	let redactor = Redactor::new()
		.strip_query_params(["token", "email"])
		.redact_keys(["password"]);

	let config = TallyConfig::from_env()?
		.service("quickstart")
		.before_send(redactor.into_hook())
		.before_send(hook(|event: Event| {
			(event.event.as_deref() != Some("Internal Ping")).then_some(event)
		}))
		.on_error(|e| eprintln!("tally error: {e}"));

	let tally = Tally::init(config)?;

	tally.register(Properties::new().insert("app_version", env!("CARGO_PKG_VERSION")));
	tally.identify("user-42", Properties::new().insert("plan", "pro"));
	tally.track(
		"Page Viewed",
		Properties::new()
			.insert("url", "https://shop.example.com/cart?token=abc&step=2")
			.insert("password", "hunter2"),
	);
	tally.track("Internal Ping", Properties::new());
	tally.revenue(49.0, "USD", "order-1001", Properties::new());
	tally.info("checkout page rendered", Some(Properties::new().insert("ms", 42)));

	tally.close().await
}
