// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tracing formatter for the sink's own diagnostics.
//!
//! Lines are prefixed with `LOG_SINK` so they are easy to tell apart from the
//! application logs being shipped:
//!
//! ```text
//! LOG_SINK | INFO | LOGS | Sink closed
//! LOG_SINK | ERROR | LOGS | Failed to deliver log (connection_error): ...
//! ```
//!
//! Span context is not printed; the sink logs flat events only.

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext,
};
use tracing_subscriber::registry::LookupSpan;

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "LOG_SINK | {} | ", event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}
