//! The backend boundary: an opaque async `execute(command, args)` call.

use crate::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Command arguments. Keys are re-sorted when building cache keys, so the
/// order a caller inserts them in does not matter.
pub type Args = serde_json::Map<String, Value>;

#[async_trait]
pub trait CommandExecutor: Send + Sync + 'static {
    async fn execute(&self, command: &str, args: Option<&Args>) -> Result<Value>;
}

type ExecFn = dyn Fn(String, Option<Args>) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// Adapts an async closure into a [`CommandExecutor`].
///
/// ```rust
/// use command_cache::FnExecutor;
/// use serde_json::json;
///
/// let exec = FnExecutor::new(|command, _args| async move {
///     Ok::<_, command_cache::Error>(json!({ "command": command }))
/// });
/// ```
pub struct FnExecutor {
    f: Arc<ExecFn>,
}

impl FnExecutor {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(String, Option<Args>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |command, args| Box::pin(f(command, args))),
        }
    }
}

#[async_trait]
impl CommandExecutor for FnExecutor {
    async fn execute(&self, command: &str, args: Option<&Args>) -> Result<Value> {
        (self.f)(command.to_string(), args.cloned()).await
    }
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for Arc<T> {
    async fn execute(&self, command: &str, args: Option<&Args>) -> Result<Value> {
        (**self).execute(command, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_executor_passes_command_and_args() {
        let exec = FnExecutor::new(|command, args| async move {
            Ok(json!({ "command": command, "args": args }))
        });
        let mut args = Args::new();
        args.insert("limit".into(), json!(10));

        let out = exec.execute("get_items", Some(&args)).await.unwrap();
        assert_eq!(out, json!({ "command": "get_items", "args": { "limit": 10 } }));
    }

    #[tokio::test]
    async fn test_fn_executor_surfaces_failures() {
        let exec = FnExecutor::new(|_, _| async move { Err(Error::backend("fetch failed")) });
        let err = exec.execute("get_items", None).await.unwrap_err();
        assert_eq!(err.message(), "fetch failed");
    }
}
