//! # command-cache
//!
//! Caching and failure-shaping layer for async calls to a backend process.
//!
//! ## Overview
//!
//! Every call a client makes to its backend goes through this crate. Given a
//! command name and its arguments it:
//!
//! - issues at most one backend call per identical request at a time
//! - serves recent results from a time-bounded cache
//! - evicts dependent reads when a mutation succeeds
//! - optionally serves stale data while refreshing in the background
//! - retries failures according to their classified kind
//!
//! Single process, in memory: nothing is persisted and nothing is shared
//! across client instances.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use command_cache::{CommandCache, CommandCacheConfig, FnExecutor};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> command_cache::Result<()> {
//!     let backend = FnExecutor::new(|command, args| async move {
//!         // call the real backend here
//!         Ok(json!({ "command": command, "args": args }))
//!     });
//!     let cache = CommandCache::with_config(backend, CommandCacheConfig::from_env()?)?;
//!
//!     let status = cache.stale_while_revalidate("get_status", None, None).await?;
//!     println!("{status}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Key encoding, TTL store, in-flight dedup, the [`CommandCache`] facade |
//! | [`config`] | TTL and invalidation tables, YAML loading |
//! | [`classify`] | Failure classification into [`ErrorKind`] |
//! | [`resilience`] | Retry with backoff, debounced error delivery |
//! | [`executor`] | The backend boundary |

pub mod cache;
pub mod classify;
pub mod config;
pub mod error_kind;
pub mod executor;
pub mod resilience;
pub mod utils;

pub use cache::{CacheKey, CacheStats, CommandCache, WarmRequest, WarmSummary};
pub use classify::{classify, classify_message, is_recoverable, ClassifiedError, Classify};
pub use config::{CommandCacheConfig, InvalidationMap, TtlTable};
pub use error_kind::{ErrorKind, UserMessage};
pub use executor::{Args, CommandExecutor, FnExecutor};
pub use resilience::{
    create_debounced_error_handler, retry, DebouncedErrorHandler, Retry, RetryConfig,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
