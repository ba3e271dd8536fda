//! # Resilience Primitives Module
//!
//! Failure shaping for backend calls.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`retry`] | Retry with capped exponential backoff, driven by error classification |
//! | [`debounce`] | Collapses bursts of errors into one delivered notification |
//!
//! ## Retry
//!
//! ```rust
//! use command_cache::resilience::retry::{Retry, RetryConfig};
//! use command_cache::Error;
//! use std::time::Duration;
//!
//! # async fn load() -> Result<u32, Error> { Ok(1) }
//! # async fn run() -> Result<u32, Error> {
//! let policy = Retry::<Error>::new(
//!     RetryConfig::new()
//!         .with_max_retries(3)
//!         .with_initial_delay(Duration::from_millis(200)),
//! )
//! .on_retry(|attempt, err| eprintln!("retry {attempt}: {err}"));
//!
//! let value = policy.run(|| load()).await?;
//! # Ok(value)
//! # }
//! ```
//!
//! ## Debounced error sink
//!
//! ```rust,no_run
//! use command_cache::resilience::debounce::create_debounced_error_handler;
//! use std::time::Duration;
//!
//! # #[tokio::main] async fn main() {
//! let notify = create_debounced_error_handler(
//!     |err: String| eprintln!("{err}"),
//!     Duration::from_millis(1_000),
//! );
//! notify.call("first".to_string());
//! notify.call("second".to_string()); // only this one is delivered
//! # }
//! ```

pub mod debounce;
pub mod retry;

pub use debounce::{create_debounced_error_handler, DebouncedErrorHandler, DEFAULT_DEBOUNCE_DELAY};
pub use retry::{retry, Retry, RetryConfig, MAX_RETRIES_LIMIT};
