//! Debug trail: a tracing layer that keeps formatted events in memory.
//!
//! Install a [`DebugTrail`] on the subscriber around the calls to inspect,
//! then read the accumulated trace back for post-mortem inspection.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Shared, cloneable buffer of trace lines.
#[derive(Debug, Clone, Default)]
pub struct DebugTrail {
    entries: Arc<Mutex<Vec<String>>>,
}

impl DebugTrail {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn as_text(&self) -> String {
        self.lock().join("\n")
    }

    /// The trail wrapped in an XML comment, with `--` defused.
    pub fn as_xml_comment(&self) -> String {
        let mut text = self.as_text();
        while text.contains("--") {
            text = text.replace("--", "- -");
        }
        format!("<!--\n{}\n-->", text)
    }
}

impl<S: Subscriber> Layer<S> for DebugTrail {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let line = format!(
            "{} {} {}: {}{}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.6f"),
            meta.level(),
            meta.target(),
            visitor.message,
            visitor.fields
        );
        self.lock().push(line);
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: String,
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push_str(&format!(" {}={}", field.name(), value));
        }
    }
}
