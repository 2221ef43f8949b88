//! Result envelope returned for every command.
//!
//! ```json
//! {"INFO":{"CMD":"GET SETP","RSP":"OK"},"DATA":{"SETP":21.40},"SUCCESS":true}
//! ```
//!
//! Envelopes are only built through the constructors below, so a failed
//! envelope always carries `DATA == {"NODATA":true}`.

use serde::Serialize;

use crate::category::Category;
use crate::data::DataMap;
use crate::params::CODE_LEN;

/// Message reported when the device did not answer.
pub const COMMUNICATION_FAILED: &str = "Stove communication failed";

/// Message reported when no rule matched.
pub const NO_VALID_REQUEST: &str = "No valid request received";

/// `CMD` reported when no rule matched.
pub const UNKNOWN_CMD: &str = "UNKNOWN";

/// Protocol-level response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Rsp {
    Ok,
    Error,
    Timeout,
}

/// The `INFO` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Info {
    #[serde(rename = "CMD")]
    cmd: String,
    #[serde(rename = "RSP")]
    rsp: Rsp,
    #[serde(rename = "MSG", skip_serializing_if = "Option::is_none")]
    msg: Option<String>,
}

impl Info {
    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    pub fn rsp(&self) -> Rsp {
        self.rsp
    }

    pub fn msg(&self) -> Option<&str> {
        self.msg.as_deref()
    }
}

/// `{INFO, DATA, SUCCESS}` as sent to every transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEnvelope {
    #[serde(rename = "INFO")]
    info: Info,
    #[serde(rename = "DATA")]
    data: DataMap,
    #[serde(rename = "SUCCESS")]
    success: bool,
}

impl ResultEnvelope {
    /// Successful execution; `CMD` is the command code.
    pub fn success(cmd: &str, data: DataMap) -> Self {
        Self {
            info: Info {
                cmd: cmd.chars().take(CODE_LEN).collect(),
                rsp: Rsp::Ok,
                msg: None,
            },
            data,
            success: true,
        }
    }

    /// Local rejection; `CMD` is the full input.
    pub fn rejected(cmd: &str, message: impl Into<String>) -> Self {
        Self::failure(cmd, Rsp::Error, message.into())
    }

    /// The device did not answer.
    pub fn timeout(cmd: &str) -> Self {
        Self::failure(cmd, Rsp::Timeout, COMMUNICATION_FAILED.to_string())
    }

    /// No dispatch rule matched.
    pub fn unknown() -> Self {
        Self::failure(UNKNOWN_CMD, Rsp::Error, NO_VALID_REQUEST.to_string())
    }

    fn failure(cmd: &str, rsp: Rsp, msg: String) -> Self {
        Self {
            info: Info {
                cmd: cmd.to_string(),
                rsp,
                msg: Some(msg),
            },
            data: DataMap::new().with("NODATA", true),
            success: false,
        }
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    pub fn data(&self) -> &DataMap {
        &self.data
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"INFO":{"CMD":"UNKNOWN","RSP":"ERROR"},"DATA":{"NODATA":true},"SUCCESS":false}"#
                .to_string()
        })
    }
}

/// What happened to one command, before it becomes an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Completed {
        category: Option<Category>,
        data: DataMap,
    },
    Rejected {
        message: String,
    },
    DeviceFailed,
    Unmatched,
}

impl CommandOutcome {
    /// Whether the stove answered, when a device call was attempted.
    pub fn stove_reachable(&self) -> Option<bool> {
        match self {
            CommandOutcome::Completed { .. } => Some(true),
            CommandOutcome::DeviceFailed => Some(false),
            CommandOutcome::Rejected { .. } | CommandOutcome::Unmatched => None,
        }
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            CommandOutcome::Completed { category, .. } => *category,
            _ => None,
        }
    }

    pub fn into_envelope(self, cmd: &str) -> ResultEnvelope {
        match self {
            CommandOutcome::Completed { data, .. } => ResultEnvelope::success(cmd, data),
            CommandOutcome::Rejected { message } => ResultEnvelope::rejected(cmd, message),
            CommandOutcome::DeviceFailed => ResultEnvelope::timeout(cmd),
            CommandOutcome::Unmatched => ResultEnvelope::unknown(),
        }
    }
}
