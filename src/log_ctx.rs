//! Immutable key/value context attached to log lines.
//!
//! Records carry a [`LogContext`] instead of a pre-configured logger. Each
//! call site renders the context after its own message, so the same
//! `mnt=... pvr=...` suffix follows a download through every stage.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct LogContext {
    fields: Arc<Vec<(&'static str, String)>>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new context with `key=value` appended. A key that is
    /// already present is replaced in place.
    pub fn with(&self, key: &'static str, value: impl fmt::Display) -> Self {
        let mut fields: Vec<(&'static str, String)> = self.fields.as_ref().clone();
        let value = value.to_string();
        match fields.iter_mut().find(|(k, _)| *k == key) {
            Some(field) => field.1 = value,
            None => fields.push((key, value)),
        }
        Self {
            fields: Arc::new(fields),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if value.is_empty() || value.contains(char::is_whitespace) {
                write!(f, "{}={:?}", key, value)?;
            } else {
                write!(f, "{}={}", key, value)?;
            }
        }
        Ok(())
    }
}

macro_rules! debug_ctx {
    ($ctx:expr, $($arg:tt)+) => {
        ::tracing::debug!("{} {}", format!($($arg)+), $ctx)
    };
}

macro_rules! info_ctx {
    ($ctx:expr, $($arg:tt)+) => {
        ::tracing::info!("{} {}", format!($($arg)+), $ctx)
    };
}

macro_rules! warn_ctx {
    ($ctx:expr, $($arg:tt)+) => {
        ::tracing::warn!("{} {}", format!($($arg)+), $ctx)
    };
}

macro_rules! error_ctx {
    ($ctx:expr, $($arg:tt)+) => {
        ::tracing::error!("{} {}", format!($($arg)+), $ctx)
    };
}

pub(crate) use {debug_ctx, error_ctx, info_ctx, warn_ctx};
