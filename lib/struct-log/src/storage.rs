use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// Replacement written for any field listed in [`MASKED_FIELDS`].
pub const MASK: &str = "[redacted]";

/// Field names that carry credentials. Their values never reach the output.
pub const MASKED_FIELDS: &[&str] = &[
    "api_key",
    "client_secret",
    "client_token",
    "jwt",
    "password",
    "secret_id",
    "secret_key",
    "session_token",
    "token",
];

/// JSON values of the fields recorded on a span or an event.
#[derive(Debug, Default, Clone)]
pub struct FieldStorage {
    fields: BTreeMap<&'static str, Value>,
}

impl FieldStorage {
    pub fn values(&self) -> &BTreeMap<&'static str, Value> {
        &self.fields
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Copies every field into `target`, replacing values already there.
    pub fn merge_into(&self, target: &mut BTreeMap<&'static str, Value>) {
        target.extend(self.fields.iter().map(|(name, value)| (*name, value.clone())));
    }

    fn put(&mut self, field: &Field, value: impl FnOnce() -> Value) {
        let name = field.name();
        let value = if MASKED_FIELDS.contains(&name) {
            Value::String(MASK.to_string())
        } else {
            value()
        };
        self.fields.insert(name, value);
    }
}

impl Visit for FieldStorage {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, || Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, || Value::String(value.to_owned()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, || value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, || value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, || Value::Bool(value));
    }

    // NaN and infinities have no JSON number form.
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, || {
            serde_json::Number::from_f64(value)
                .map_or_else(|| Value::String(value.to_string()), Value::Number)
        });
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, || Value::String(value.to_string()));
    }
}

/// Records span fields into the span's extensions; [`crate::JsonLogLayer`]
/// reads them back for every event inside the span.
pub struct StorageLayer;

impl<S> Layer<S> for StorageLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &tracing::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut storage = FieldStorage::default();
        attrs.record(&mut storage);
        span.extensions_mut().insert(storage);
    }

    fn on_record(&self, id: &tracing::Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<FieldStorage>() {
            Some(storage) => values.record(storage),
            None => {
                let mut storage = FieldStorage::default();
                values.record(&mut storage);
                extensions.insert(storage);
            }
        }
    }
}
