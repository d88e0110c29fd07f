/// logging.rs — One JSON object per log line: `{"message": ..., "severity": ...}`.
/// Cloud log collectors pick `severity` up as the record level.
use serde::Serialize;
use std::fmt::{self, Write as _};
use tracing::{
    field::{Field, Visit},
    warn, Event, Level, Subscriber,
};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields, FormattedFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

pub type LevelHandle = reload::Handle<EnvFilter, Registry>;

#[derive(Serialize)]
pub struct Entry<'a> {
    pub message:  &'a str,
    pub severity: &'static str,
}

pub fn severity(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN  => "WARNING",
        Level::INFO  => "INFO",
        _            => "DEBUG",
    }
}

/// Render an entry as a single JSON line (no trailing newline).
pub fn render(message: &str, severity: &'static str) -> String {
    serde_json::to_string(&Entry { message, severity })
        .unwrap_or_else(|_| format!("{{\"message\":\"unrenderable log entry\",\"severity\":\"{severity}\"}}"))
}

/// Install the global subscriber. `RUST_LOG` wins; otherwise `info` until
/// [`apply_level`] is called with the configured level.
pub fn init() -> Option<LevelHandle> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_ansi(false).event_format(SeverityJson))
        .try_init()
        .ok()?;
    Some(handle)
}

pub fn apply_level(handle: &LevelHandle, level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    if let Err(e) = handle.reload(EnvFilter::new(level)) {
        warn!("failed to apply log level {level}: {e}");
    }
}

pub struct SeverityJson;

impl<S, N> FormatEvent<S, N> for SeverityJson
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        // Span fields (e.g. the webhook request id) go in front of the event's own.
        let mut span_fields = Vec::new();
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        span_fields.push(fields.to_string());
                    }
                }
            }
        }

        let message = visitor.finish(&span_fields);
        writeln!(writer, "{}", render(&message, severity(event.metadata().level())))
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields:  Vec<String>,
}

impl MessageVisitor {
    fn finish(self, span_fields: &[String]) -> String {
        let mut out = self.message;
        for f in span_fields.iter().chain(&self.fields) {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(f);
        }
        out
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.fields.push(format!("{}={value}", field.name()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.fields.push(format!("{}={value:?}", field.name()));
        }
    }
}
