use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt::{self as stdfmt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::Event;
use tracing::Subscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::{
    self as fmt_subscriber, format::Writer, FmtContext, FormatEvent, FormatFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "meshgraph";
const QUERY_DURATION_BUCKETS: [f64; 10] = [0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

pub fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("meshgraph=info,info"));

    let stdout = std::io::stdout;
    let stderr = std::io::stderr;

    let writer = stdout
        .with_max_level(tracing::Level::INFO)
        .or_else(stderr.with_min_level(tracing::Level::WARN));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(false)
        .with_ansi(false)
        .event_format(KeyValueFormatter::new())
        .fmt_fields(fmt_subscriber::format::DefaultFields::new())
        .with_writer(writer)
        .try_init()
        .map_err(|err| crate::err!("failed to initialise tracing subscriber: {err}"))
}

struct KeyValueFormatter {
    service_name: &'static str,
}

impl KeyValueFormatter {
    const fn new() -> Self {
        Self {
            service_name: SERVICE_NAME,
        }
    }
}

impl<S, N> FormatEvent<S, N> for KeyValueFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let pid = std::process::id().to_string();
        let metadata = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());

        let mut fields = visitor.fields;
        fields.sort_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));

        let mut line = String::new();
        push_field(&mut line, "ts", &timestamp);
        push_field(&mut line, "level", metadata.level().as_str());
        push_field(&mut line, "service", self.service_name);
        push_field(&mut line, "component", metadata.target());
        push_field(&mut line, "pid", &pid);

        if let Some(span_path) = current_span_path(ctx) {
            push_field(&mut line, "span", &span_path);
        }

        push_field(&mut line, "msg", &message);

        for (key, value) in fields {
            push_field(&mut line, &key, &value);
        }

        if let Some(file) = metadata.file() {
            push_field(&mut line, "file", file);
        }
        if let Some(line_no) = metadata.line() {
            push_field(&mut line, "line", &line_no.to_string());
        }

        writer.write_str(&line)?;
        writer.write_char('\n')
    }
}

fn current_span_path<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<String>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    let span = ctx.lookup_current()?;
    let names: Vec<&str> = span.scope().from_root().map(|s| s.name()).collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join("."))
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn record_field(&mut self, field: &Field, value: String) {
        if field.name().is_empty() {
            return;
        }
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_field(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn stdfmt::Debug) {
        self.record_field(field, format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_field(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_field(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_field(field, value.to_string());
    }
}

fn encode_field_value(value: &str) -> String {
    let needs_quotes = value.chars().any(|c| {
        c.is_whitespace()
            || matches!(
                c,
                '"' | '\\' | '=' | '[' | ']' | '{' | '}' | ',' | '\n' | '\r' | '\t'
            )
    });

    if !needs_quotes {
        return value.to_string();
    }

    let mut encoded = String::with_capacity(value.len() + 2);
    encoded.push('"');
    for ch in value.chars() {
        match ch {
            '"' => encoded.push_str("\\\""),
            '\\' => encoded.push_str("\\\\"),
            '\n' => encoded.push_str("\\n"),
            '\r' => encoded.push_str("\\r"),
            '\t' => encoded.push_str("\\t"),
            _ => encoded.push(ch),
        }
    }
    encoded.push('"');
    encoded
}

fn push_field(buffer: &mut String, key: &str, value: &str) {
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(key);
    buffer.push('=');
    buffer.push_str(&encode_field_value(value));
}

#[derive(Default)]
pub struct RuntimeCounters {
    query_success: AtomicU64,
    query_failure: AtomicU64,
    query_durations: Mutex<DurationBuckets>,
    config_fetches: OutcomeRegistry,
    appender_runs: OutcomeRegistry,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeCountersSnapshot {
    pub query_success: u64,
    pub query_failure: u64,
    pub query_durations: QueryDurationSnapshot,
    pub config_fetches: Vec<OutcomeSnapshot>,
    pub appender_runs: Vec<OutcomeSnapshot>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryDurationSnapshot {
    pub buckets: Vec<(f64, u64)>,
    pub sum: f64,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutcomeSnapshot {
    pub name: String,
    pub success: u64,
    pub failure: u64,
    pub failures_by_reason: Vec<(String, u64)>,
}

#[derive(Default)]
struct DurationBuckets {
    counts: [u64; QUERY_DURATION_BUCKETS.len()],
    sum: f64,
    total: u64,
}

impl DurationBuckets {
    fn observe(&mut self, duration_secs: f64) {
        for (idx, boundary) in QUERY_DURATION_BUCKETS.iter().enumerate() {
            if duration_secs <= *boundary {
                self.counts[idx] += 1;
            }
        }
        self.sum += duration_secs;
        self.total += 1;
    }

    fn snapshot(&self) -> QueryDurationSnapshot {
        QueryDurationSnapshot {
            buckets: QUERY_DURATION_BUCKETS
                .iter()
                .zip(self.counts.iter())
                .map(|(boundary, count)| (*boundary, *count))
                .collect(),
            sum: self.sum,
            count: self.total,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct OutcomeEntry {
    success: u64,
    failure: u64,
    failure_reasons: BTreeMap<String, u64>,
}

#[derive(Default)]
struct OutcomeRegistry {
    inner: Mutex<BTreeMap<String, OutcomeEntry>>,
}

impl OutcomeRegistry {
    fn record_success(&self, name: &str) {
        let mut guard = self.inner.lock().expect("outcome registry poisoned");
        let entry = guard.entry(name.to_string()).or_default();
        entry.success = entry.success.saturating_add(1);
    }

    fn record_failure(&self, name: &str, reason: Option<&str>) {
        let mut guard = self.inner.lock().expect("outcome registry poisoned");
        let entry = guard.entry(name.to_string()).or_default();
        entry.failure = entry.failure.saturating_add(1);
        let label = reason.unwrap_or("unknown").to_string();
        *entry.failure_reasons.entry(label).or_insert(0) += 1;
    }

    fn snapshot(&self) -> Vec<OutcomeSnapshot> {
        let guard = self.inner.lock().expect("outcome registry poisoned");
        guard
            .iter()
            .map(|(name, entry)| OutcomeSnapshot {
                name: name.clone(),
                success: entry.success,
                failure: entry.failure,
                failures_by_reason: entry
                    .failure_reasons
                    .iter()
                    .map(|(reason, count)| (reason.clone(), *count))
                    .collect(),
            })
            .collect()
    }
}

static RUNTIME_COUNTERS: OnceLock<RuntimeCounters> = OnceLock::new();

pub fn runtime_counters() -> &'static RuntimeCounters {
    RUNTIME_COUNTERS.get_or_init(RuntimeCounters::default)
}

impl RuntimeCounters {
    pub fn record_query(&self, success: bool, duration: Duration) {
        if success {
            self.query_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.query_failure.fetch_add(1, Ordering::Relaxed);
        }
        self.query_durations
            .lock()
            .expect("query duration buckets poisoned")
            .observe(duration.as_secs_f64());
    }

    pub fn record_config_fetch(&self, kind: &str, success: bool) {
        if success {
            self.config_fetches.record_success(kind);
        } else {
            self.config_fetches.record_failure(kind, None);
        }
    }

    pub fn record_appender_success(&self, appender: &str) {
        self.appender_runs.record_success(appender);
    }

    pub fn record_appender_failure(&self, appender: &str, reason: &str) {
        self.appender_runs.record_failure(appender, Some(reason));
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        RuntimeCountersSnapshot {
            query_success: self.query_success.load(Ordering::Relaxed),
            query_failure: self.query_failure.load(Ordering::Relaxed),
            query_durations: self
                .query_durations
                .lock()
                .expect("query duration buckets poisoned")
                .snapshot(),
            config_fetches: self.config_fetches.snapshot(),
            appender_runs: self.appender_runs.snapshot(),
        }
    }
}
