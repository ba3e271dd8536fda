//! # Command Caching Module
//!
//! Sits between callers and the backend executor so repeated and concurrent
//! reads do not turn into repeated backend calls.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CommandCache`] | Consumer-facing entry points (cached invoke, SWR, warming, invalidation) |
//! | [`CacheKey`] | Canonical (command, arguments) key |
//! | [`TtlCache`] | Latest successful result per key with age-based freshness |
//! | [`InFlightTracker`] | At most one running backend call per key |
//! | [`CacheStats`] | Size, per-entry ages and hit/miss counters |
//!
//! ## Read path
//!
//! 1. The key is built from the command and its sorted arguments.
//! 2. A fresh entry is returned without touching the backend.
//! 3. On a miss the call joins the in-flight request for the key, or starts
//!    it; the result is stored before any caller sees it.
//!
//! Mutations evict dependent reads through the configured invalidation map.
//!
//! ## Example
//!
//! ```rust,no_run
//! use command_cache::{CommandCache, FnExecutor};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # #[tokio::main] async fn main() -> command_cache::Result<()> {
//! let cache = CommandCache::new(FnExecutor::new(|command, _args| async move {
//!     Ok(json!({ "command": command }))
//! }));
//!
//! let args = json!({ "limit": 10 });
//! let items = cache
//!     .cached_invoke("get_items", args.as_object(), Some(Duration::from_secs(5)))
//!     .await?;
//!
//! cache.invoke_mutation("create_item", json!({ "name": "x" }).as_object()).await?;
//! // get_items was evicted; the next read goes to the backend.
//! # let _ = items;
//! # Ok(())
//! # }
//! ```

mod inflight;
mod key;
mod manager;
mod store;

pub use inflight::{InFlightTracker, SharedResult};
pub use key::{encode, CacheKey};
pub use manager::{CommandCache, WarmRequest, WarmSummary};
pub use store::{CacheStats, EntryStats, TtlCache};
