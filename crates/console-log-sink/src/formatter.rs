// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Renders a [`LogEvent`] as one compact JSON line.
//!
//! Output schema, fixed field order, no trailing newline:
//!
//! ```text
//! {"t":"<timestamp>","l":"<level>","m":"<message>"[,"s":"<stack_trace>"]}
//! ```
//!
//! The `s` field is present if and only if the event carries a stack trace.
//! Formatting is deterministic and never fails; any string content is
//! representable.

use crate::event::LogEvent;

/// Fixed JSON overhead: `{"t":"","l":"","m":"","s":""}` plus slack.
const SKELETON_LEN: usize = 32;

/// Formats `event` into a freshly allocated line, sized from a skeleton
/// estimate so an escape-free line is written without regrowing. Escapes
/// expand beyond the estimate and may regrow the buffer.
pub fn format(event: &LogEvent) -> String {
    let mut out = String::with_capacity(estimated_len(event));
    format_into(event, &mut out);
    out
}

/// Appends the formatted line to `out`.
///
/// Producers on a hot path keep one scratch `String` per worker and pass it
/// here instead of allocating through [`format`] on every call.
pub fn format_into(event: &LogEvent, out: &mut String) {
    out.reserve(estimated_len(event));

    out.push_str("{\"t\":\"");
    escape_into(&event.timestamp, out);
    out.push_str("\",\"l\":\"");
    escape_into(event.level.as_str(), out);
    out.push_str("\",\"m\":\"");
    escape_into(&event.message, out);
    out.push('"');

    if let Some(trace) = event.stack_trace.as_deref() {
        out.push_str(",\"s\":\"");
        escape_into(trace, out);
        out.push('"');
    }

    out.push('}');
}

fn estimated_len(event: &LogEvent) -> usize {
    SKELETON_LEN
        + event.timestamp.len()
        + event.level.as_str().len()
        + event.message.len()
        + event.stack_trace.as_deref().map_or(0, str::len)
}

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Bytes that cannot appear raw inside a JSON string.
#[inline]
fn needs_escape(byte: u8) -> bool {
    byte == b'"' || byte == b'\\' || byte < 0x20
}

/// Appends `value` to `out`, escaped as a JSON string body.
///
/// Every escape-relevant byte is ASCII, so a byte-wise scan is enough and
/// each copied slice stays on a char boundary; non-ASCII text passes through
/// untouched. A string with nothing to escape is appended with one bulk copy
/// after the scan.
fn escape_into(value: &str, out: &mut String) {
    let bytes = value.as_bytes();
    let mut start = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        if !needs_escape(byte) {
            continue;
        }
        out.push_str(&value[start..i]);
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            _ => {
                out.push_str("\\u00");
                out.push(HEX[usize::from(byte >> 4)] as char);
                out.push(HEX[usize::from(byte & 0xf)] as char);
            }
        }
        start = i + 1;
    }

    out.push_str(&value[start..]);
}
