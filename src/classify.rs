//! Error classification: maps an arbitrary failure onto an [`ErrorKind`].
//!
//! Failures that already carry a kind (a [`ClassifiedError`], or a structured
//! I/O / serialization error) keep it. Anything opaque is classified from its
//! message: the lower-cased text is tested against [`PATTERNS`] in order and
//! the first match wins. Order matters because a message can contain several
//! triggers ("invalid network address" is `NETWORK`, not `VALIDATION`).

use crate::error_kind::{ErrorKind, UserMessage};
use crate::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

/// Message patterns in match order, most specific first.
pub const PATTERNS: &[(ErrorKind, &str)] = &[
    (ErrorKind::Network, r"network|fetch|connection"),
    (ErrorKind::Timeout, r"timeout|timed out"),
    (ErrorKind::Unauthorized, r"\b401\b|unauthori[sz]ed"),
    (ErrorKind::NotFound, r"\b404\b|not found"),
    (ErrorKind::Validation, r"validation|invalid"),
    (ErrorKind::Parse, r"parse|json"),
];

static COMPILED: Lazy<Vec<(ErrorKind, Regex)>> = Lazy::new(|| {
    PATTERNS
        .iter()
        .map(|(kind, src)| {
            let re = Regex::new(src).expect("classification patterns are valid regexes");
            (*kind, re)
        })
        .collect()
});

/// A failure with an explicit kind.
///
/// `source` keeps the original failure around for diagnostics; it does not
/// influence the kind.
#[derive(Debug, Clone, ThisError)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: Option<BTreeMap<String, String>>,
    #[source]
    pub source: Option<Box<Error>>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
            source: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, source: Error) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Classifies `err` and keeps it as the source.
    pub fn from_error(err: &Error) -> Self {
        if let Error::Classified(c) = err {
            return c.clone();
        }
        let mut classified = Self::new(err.kind(), err.message()).with_source(err.clone());
        if let Some(ctx) = err.context() {
            if !ctx.values.is_empty() {
                classified.context = Some(ctx.values.clone());
            }
        }
        classified
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }

    pub fn user_message(&self) -> UserMessage {
        self.kind.user_message()
    }
}

/// Anything that can be mapped onto an [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Classifies any failure.
pub fn classify<E: Classify + ?Sized>(error: &E) -> ErrorKind {
    error.kind()
}

/// Classifies an opaque message by pattern.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    COMPILED
        .iter()
        .find(|(_, re)| re.is_match(&lower))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}

pub fn is_recoverable(kind: ErrorKind) -> bool {
    kind.is_recoverable()
}

/// Default retry predicate: classify, then check recoverability.
pub fn is_retryable<E: Classify + ?Sized>(error: &E) -> bool {
    classify(error).is_recoverable()
}

impl Classify for ClassifiedError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Classified(c) => c.kind,
            Error::Serialization(_) | Error::Yaml(_) => ErrorKind::Parse,
            Error::Configuration { .. } => ErrorKind::Validation,
            Error::Io(io) => Classify::kind(io.as_ref()),
            Error::Backend { message, .. } => classify_message(message),
            Error::InFlightDropped { .. } => ErrorKind::Unknown,
        }
    }
}

impl Classify for std::io::Error {
    fn kind(&self) -> ErrorKind {
        use std::io::ErrorKind as Io;
        match std::io::Error::kind(self) {
            Io::TimedOut => ErrorKind::Timeout,
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::BrokenPipe
            | Io::AddrNotAvailable => ErrorKind::Network,
            Io::NotFound => ErrorKind::NotFound,
            Io::PermissionDenied => ErrorKind::Unauthorized,
            Io::InvalidInput => ErrorKind::Validation,
            Io::InvalidData | Io::UnexpectedEof => ErrorKind::Parse,
            _ => classify_message(&self.to_string()),
        }
    }
}

impl Classify for serde_json::Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Parse
    }
}

impl Classify for anyhow::Error {
    fn kind(&self) -> ErrorKind {
        if let Some(err) = self.downcast_ref::<Error>() {
            return err.kind();
        }
        if let Some(err) = self.downcast_ref::<ClassifiedError>() {
            return err.kind;
        }
        if let Some(err) = self.downcast_ref::<std::io::Error>() {
            return Classify::kind(err);
        }
        classify_message(&format!("{:#}", self))
    }
}

impl Classify for str {
    fn kind(&self) -> ErrorKind {
        classify_message(self)
    }
}

impl Classify for String {
    fn kind(&self) -> ErrorKind {
        classify_message(self)
    }
}

impl<T: Classify + ?Sized> Classify for &T {
    fn kind(&self) -> ErrorKind {
        (**self).kind()
    }
}

impl<T: Classify + ?Sized> Classify for Box<T> {
    fn kind(&self) -> ErrorKind {
        (**self).kind()
    }
}
