//! Outlets for poller output.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Receives user-facing action events.
pub trait ActionEventSink: Send + Sync {
    fn on_warning(&self, message: &str) -> anyhow::Result<()>;

    fn on_error(&self, message: &str) -> anyhow::Result<()> {
        let _ = message;
        Ok(())
    }

    fn on_action_started(&self, action: &str) -> anyhow::Result<()> {
        let _ = action;
        Ok(())
    }

    fn on_action_completed(&self, action: &str) -> anyhow::Result<()> {
        let _ = action;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Per-project log the poller mirrors every diagnostic message into.
pub trait ProjectLogger: Send + Sync {
    fn log(&self, level: MessageLevel, message: &str);
}

/// Forwards to `tracing` under the `feedscope::project` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl ProjectLogger for TracingLogger {
    fn log(&self, level: MessageLevel, message: &str) {
        match level {
            MessageLevel::Debug => tracing::debug!(target: "feedscope::project", "{message}"),
            MessageLevel::Info => tracing::info!(target: "feedscope::project", "{message}"),
            MessageLevel::Warning => tracing::warn!(target: "feedscope::project", "{message}"),
            MessageLevel::Error => tracing::error!(target: "feedscope::project", "{message}"),
        }
    }
}
