use serde::ser::{SerializeMap, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use time::format_description::well_known::Rfc3339;
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

use crate::storage::FieldStorage;

/// Writes each event as one JSON object per line.
///
/// Fields of every enclosing span are flattened into the event, inner spans
/// overriding outer ones and event fields overriding both. Reserved keys are
/// never overwritten. Credential fields arrive already masked by
/// [`FieldStorage`].
pub struct JsonLogLayer<W: for<'a> MakeWriter<'a> + 'static> {
    make_writer: W,
    application: String,
    version: String,
    hostname: String,
}

const TIMESTAMP: &str = "timestamp";
const LEVEL: &str = "level";
const APPLICATION: &str = "app";
const VERSION: &str = "version";
const HOSTNAME: &str = "host";
const TARGET: &str = "target";
const FILE: &str = "file";
const LINE: &str = "line";
const MESSAGE: &str = "message";
const SPAN: &str = "span";

const RESERVED_FIELDS: [&str; 10] = [
    TIMESTAMP,
    LEVEL,
    APPLICATION,
    VERSION,
    HOSTNAME,
    TARGET,
    FILE,
    LINE,
    MESSAGE,
    SPAN,
];

impl<W: for<'a> MakeWriter<'a> + 'static> JsonLogLayer<W> {
    pub fn new(application: impl Into<String>, version: impl Into<String>, make_writer: W) -> Self {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        Self::with_hostname(application, version, hostname, make_writer)
    }

    pub fn with_hostname(
        application: impl Into<String>,
        version: impl Into<String>,
        hostname: impl Into<String>,
        make_writer: W,
    ) -> Self {
        Self {
            make_writer,
            application: application.into(),
            version: version.into(),
            hostname: hostname.into(),
        }
    }

    fn format<S>(&self, event: &Event<'_>, ctx: &Context<'_, S>) -> Result<Vec<u8>, std::io::Error>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let mut event_fields = FieldStorage::default();
        event.record(&mut event_fields);

        let mut extra: BTreeMap<&'static str, Value> = BTreeMap::new();
        let mut span_name = None;
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                span_name = Some(span.name());
                if let Some(storage) = span.extensions().get::<FieldStorage>() {
                    storage.merge_into(&mut extra);
                }
            }
        }
        event_fields.merge_into(&mut extra);

        let metadata = event.metadata();
        let message = event_fields.get_str(MESSAGE).unwrap_or(metadata.target());

        let mut buffer = Vec::new();
        let mut serializer = serde_json::Serializer::new(&mut buffer);
        let mut map = serializer.serialize_map(None)?;

        if let Ok(timestamp) = time::OffsetDateTime::now_utc().format(&Rfc3339) {
            map.serialize_entry(TIMESTAMP, &timestamp)?;
        }
        map.serialize_entry(LEVEL, &metadata.level().as_str().to_lowercase())?;
        map.serialize_entry(APPLICATION, &self.application)?;
        map.serialize_entry(VERSION, &self.version)?;
        map.serialize_entry(HOSTNAME, &self.hostname)?;
        map.serialize_entry(TARGET, metadata.target())?;
        map.serialize_entry(FILE, &metadata.file())?;
        map.serialize_entry(LINE, &metadata.line())?;
        map.serialize_entry(MESSAGE, message)?;
        if let Some(name) = span_name {
            map.serialize_entry(SPAN, name)?;
        }

        for (key, value) in extra.iter().filter(|(k, _)| !RESERVED_FIELDS.contains(*k)) {
            map.serialize_entry(key, value)?;
        }
        map.end()?;

        buffer.push(b'\n');
        Ok(buffer)
    }
}

impl<S, W> Layer<S> for JsonLogLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if let Ok(line) = self.format(event, &ctx) {
            let _ = self.make_writer.make_writer().write_all(&line);
        }
    }
}
