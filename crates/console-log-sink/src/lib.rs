// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batched JSON-Lines log sink for files tailed by external tooling.
//!
//! Producers build a [`LogEvent`], render it to a single JSON line with
//! [`formatter::format`], and hand the line to a [`FileSink`]. The sink
//! queues lines lock-free and flushes them to disk in batches, either when
//! the 500 ms ticker fires or when 32 lines are pending. The file is held
//! open with shared-read sharing, so automated agents can tail it while it
//! is being written.
//!
//! ```no_run
//! use console_log_sink::{formatter, utc_timestamp, FileSink, LogEvent, LogLevel};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), console_log_sink::SinkError> {
//! let sink = FileSink::open("Logs/console.log")?;
//!
//! let event = LogEvent::new(utc_timestamp(), LogLevel::Log, "engine ready", None);
//! sink.write(formatter::format(&event));
//!
//! sink.close()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod event;
pub mod formatter;
pub mod sink;
pub mod util;

pub use error::SinkError;
pub use event::{utc_timestamp, LogEvent, LogLevel};
pub use sink::{FileSink, SinkState};
