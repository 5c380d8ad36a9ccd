//! Text framing between the controller and isolated workers.
//!
//! Outbound: the serialized task, or [`START_MESSAGE`] for stateless tasks.
//! Inbound: one of three fixed, case-sensitive ASCII prefixes followed by the
//! body.

/// Prefix of a successful completion; the body is the serialized result.
pub const TASK_COMPLETED_FLAG: &str = "TC::";
/// Prefix of a failed task; the body is the error message.
pub const TASK_ERROR_FLAG: &str = "TERR::";
/// Prefix of a diagnostic passthrough; the body is the log line.
pub const TASK_LOG_FLAG: &str = "TLOG::";
/// Start message for tasks without serializable state.
pub const START_MESSAGE: &str = "start!";

/// A decoded inbound message, borrowing its body from the raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMessage<'a> {
    /// `TC::` + payload.
    Completed(&'a str),
    /// `TERR::` + message.
    Error(&'a str),
    /// `TLOG::` + message.
    Log(&'a str),
    /// Anything else, verbatim.
    Unrecognized(&'a str),
}

impl<'a> WorkerMessage<'a> {
    /// Decode a raw message by prefix.
    #[must_use]
    pub fn parse(raw: &'a str) -> Self {
        if let Some(body) = raw.strip_prefix(TASK_COMPLETED_FLAG) {
            Self::Completed(body)
        } else if let Some(body) = raw.strip_prefix(TASK_ERROR_FLAG) {
            Self::Error(body)
        } else if let Some(body) = raw.strip_prefix(TASK_LOG_FLAG) {
            Self::Log(body)
        } else {
            Self::Unrecognized(raw)
        }
    }

    /// Whether the message resolves the worker's bound task.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Error(_))
    }
}

/// Frame a completion.
#[must_use]
pub fn completed(payload: &str) -> String {
    format!("{TASK_COMPLETED_FLAG}{payload}")
}

/// Frame an error.
#[must_use]
pub fn error(message: &str) -> String {
    format!("{TASK_ERROR_FLAG}{message}")
}

/// Frame a log line.
#[must_use]
pub fn log(message: &str) -> String {
    format!("{TASK_LOG_FLAG}{message}")
}
