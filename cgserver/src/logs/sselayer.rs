use std::fmt::Write as _;

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{Layer, layer::Context};

use super::{LogEntry, LogState};

/// Collects the `message` field and appends the structured fields after it.
#[derive(Default)]
struct EntryVisitor {
    message: String,
    fields: String,
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field, format_args!("{}", value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.push_field(field, format_args!("{:?}", value));
        }
    }
}

impl EntryVisitor {
    fn push_field(&mut self, field: &Field, value: std::fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", field.name(), value);
    }

    fn into_message(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }
}

/// Layer de tracing qui pousse chaque événement dans le buffer partagé
pub struct SseLayer {
    state: LogState,
}

impl SseLayer {
    pub fn new(state: LogState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for SseLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        self.state.push(LogEntry {
            timestamp: Utc::now(),
            level: event.metadata().level().to_string(),
            target: event.metadata().target().to_string(),
            message: visitor.into_message(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, reload};

    #[test]
    fn test_events_are_captured_with_fields() {
        let (_filter, handle) = reload::Layer::new(LevelFilter::TRACE);
        let state = LogState::new(10, handle);
        let subscriber = tracing_subscriber::registry().with(SseLayer::new(state.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(app = "YouTube", "Blocked content");
        });

        let entries = state.dump();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, "WARN");
        assert_eq!(entries[0].message, "Blocked content app=YouTube");
    }
}
