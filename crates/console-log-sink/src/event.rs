// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{SecondsFormat, Utc};

/// Severity of a captured console log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Log,
    Warning,
    Error,
    Exception,
    Assert,
    /// Severity the producer could not classify.
    Unknown,
}

impl LogLevel {
    /// Label written to the `l` field of the persisted record.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Log => "Log",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Exception => "Exception",
            LogLevel::Assert => "Assert",
            LogLevel::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured log occurrence.
///
/// Immutable once built: a producer constructs it, the formatter consumes it
/// exactly once, and it is discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// ISO-8601 UTC timestamp with fractional seconds, see [`utc_timestamp`].
    pub timestamp: String,
    pub level: LogLevel,
    /// Arbitrary Unicode, control characters included; the formatter escapes.
    pub message: String,
    /// Attached by the producer for Error, Exception and Assert events.
    /// The sink side does not enforce that policy; an absent trace simply
    /// omits the `s` field.
    pub stack_trace: Option<String>,
}

impl LogEvent {
    pub fn new(
        timestamp: impl Into<String>,
        level: LogLevel,
        message: impl Into<String>,
        stack_trace: Option<String>,
    ) -> Self {
        LogEvent {
            timestamp: timestamp.into(),
            level,
            message: message.into(),
            stack_trace,
        }
    }
}

/// Current UTC time in the form the persisted records use,
/// e.g. `2025-02-06T23:45:12.345Z`.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
