//! Structured logging with partial redaction
//!
//! Entries are written to stderr as
//! `[timestamp] LEVEL [module] message | key=value ...`.
//! Address-like fields are shortened to prefix/suffix, digests and
//! signatures to a short fingerprint, and anything named like a secret is
//! replaced outright.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Global flag to enable/disable debug logging
static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn enable_debug() {
    DEBUG_ENABLED.store(true, Ordering::SeqCst);
}

pub fn disable_debug() {
    DEBUG_ENABLED.store(false, Ordering::SeqCst);
}

pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::SeqCst)
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Structured log entry
#[derive(Debug)]
pub struct LogEntry {
    pub level: LogLevel,
    pub module: &'static str,
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl LogEntry {
    pub fn new(level: LogLevel, module: &'static str, message: impl Into<String>) -> Self {
        Self {
            level,
            module,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field; the key decides how much of the value is shown
    pub fn field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        let shown = redact_for_key(key, &value.to_string());
        self.fields.push((key, shown));
        self
    }

    /// Render without the timestamp (used by `log` and by tests)
    pub fn render(&self) -> String {
        let fields_str = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        if fields_str.is_empty() {
            format!("{} [{}] {}", self.level, self.module, self.message)
        } else {
            format!("{} [{}] {} | {}", self.level, self.module, self.message, fields_str)
        }
    }

    pub fn log(self) {
        if self.level == LogLevel::Debug && !is_debug_enabled() {
            return;
        }

        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        eprintln!("[{}] {}", timestamp, self.render());
    }
}

fn redact_for_key(key: &str, value: &str) -> String {
    let key_lower = key.to_lowercase();

    const SECRET_KEYS: [&str; 5] = ["secret", "private", "seed", "mnemonic", "keypair"];
    if SECRET_KEYS.iter().any(|k| key_lower.contains(k)) {
        return redact_value(value);
    }

    const DIGEST_KEYS: [&str; 6] = ["payload", "hash", "txid", "signature", "tx", "public_key"];
    if DIGEST_KEYS.iter().any(|k| key_lower.contains(k)) {
        return shorten(value, 10, 6);
    }

    const ADDRESS_KEYS: [&str; 4] = ["address", "from", "to", "recipient"];
    if ADDRESS_KEYS.iter().any(|k| key_lower.contains(k)) {
        return shorten(value, 6, 4);
    }

    value.to_string()
}

fn redact_value(value: &str) -> String {
    if value.is_empty() {
        "[EMPTY]".to_string()
    } else {
        format!("[REDACTED:{}chars]", value.len())
    }
}

/// Keep `prefix` leading and `suffix` trailing characters (a `0x` prefix
/// does not count towards the budget).
fn shorten(value: &str, prefix: usize, suffix: usize) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "[EMPTY]".to_string();
    }

    let prefix = if trimmed.starts_with("0x") { prefix + 2 } else { prefix };
    if !trimmed.is_ascii() || trimmed.len() <= prefix + suffix + 3 {
        return trimmed.to_string();
    }

    format!("{}...{}", &trimmed[..prefix], &trimmed[trimmed.len() - suffix..])
}

#[macro_export]
macro_rules! log_debug {
    ($module:expr, $msg:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Debug,
            $module,
            $msg
        )
        $(.field(stringify!($key), &$value))*
        .log()
    };
}

#[macro_export]
macro_rules! log_info {
    ($module:expr, $msg:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Info,
            $module,
            $msg
        )
        $(.field(stringify!($key), &$value))*
        .log()
    };
}

#[macro_export]
macro_rules! log_warn {
    ($module:expr, $msg:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Warn,
            $module,
            $msg
        )
        $(.field(stringify!($key), &$value))*
        .log()
    };
}
