//! Telemetry facade: operation timers, custom events and exceptions.
//!
//! Components receive a [`TelemetryHandle`] at construction instead of reaching for a
//! global. The default sink writes structured `log` records under the `telemetry` target;
//! tests use [`NoopTelemetry`] or [`MemoryTelemetry`]. Every call is fire-and-forget.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Event properties (key, value).
pub type Props<'a> = &'a [(&'a str, &'a str)];

/// Identity and context of a running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationInfo {
    pub id: String,
    pub name: String,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
}

/// Sink for telemetry records.
pub trait Telemetry: Send + Sync {
    fn operation_started(&self, _op: &OperationInfo) {}

    fn operation_stopped(
        &self,
        op: &OperationInfo,
        duration: Duration,
        success: bool,
        error: Option<&str>,
    );

    fn custom_event(&self, name: &str, props: Props<'_>);

    fn exception(&self, error: &str, props: Props<'_>);
}

/// Cloneable handle passed to handlers, the notifier and the agent call path.
#[derive(Clone)]
pub struct TelemetryHandle {
    sink: Arc<dyn Telemetry>,
}

impl TelemetryHandle {
    pub fn new(sink: Arc<dyn Telemetry>) -> Self {
        Self { sink }
    }

    /// Handle that writes to the `log` facade.
    pub fn log() -> Self {
        Self::new(Arc::new(LogTelemetry))
    }

    /// Handle that drops everything.
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopTelemetry))
    }

    /// Start a timed operation. Call [`Operation::stop`] when it finishes.
    pub fn start_operation(&self, name: &str) -> Operation {
        let info = OperationInfo {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            user_id: None,
            conversation_id: None,
        };
        self.sink.operation_started(&info);
        Operation {
            info,
            span_id: new_span_id(),
            started: Instant::now(),
            sink: self.sink.clone(),
        }
    }

    pub fn track_event(&self, name: &str, props: Props<'_>) {
        self.sink.custom_event(name, props);
    }

    pub fn track_exception(&self, error: &str, props: Props<'_>) {
        self.sink.exception(error, props);
    }
}

fn new_span_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// A running operation. Dropping it without `stop` records nothing.
pub struct Operation {
    info: OperationInfo,
    span_id: String,
    started: Instant,
    sink: Arc<dyn Telemetry>,
}

impl Operation {
    pub fn set_context(&mut self, user_id: Option<&str>, conversation_id: Option<&str>) {
        self.info.user_id = user_id.map(str::to_string);
        self.info.conversation_id = conversation_id.map(str::to_string);
    }

    pub fn info(&self) -> &OperationInfo {
        &self.info
    }

    /// W3C `traceparent` header value correlating downstream calls with this operation.
    pub fn traceparent(&self) -> String {
        format!("00-{}-{}-01", self.info.id, self.span_id)
    }

    pub fn stop(self, success: bool, error: Option<&str>) {
        self.sink
            .operation_stopped(&self.info, self.started.elapsed(), success, error);
    }
}

fn format_props(props: Props<'_>) -> String {
    props
        .iter()
        .map(|(k, v)| format!("{}={:?}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Writes telemetry as `log` records (target "telemetry").
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn operation_started(&self, op: &OperationInfo) {
        log::trace!(target: "telemetry", "operation started name={} id={}", op.name, op.id);
    }

    fn operation_stopped(
        &self,
        op: &OperationInfo,
        duration: Duration,
        success: bool,
        error: Option<&str>,
    ) {
        let user = op.user_id.as_deref().unwrap_or("-");
        let conversation = op.conversation_id.as_deref().unwrap_or("-");
        if success {
            log::info!(
                target: "telemetry",
                "operation name={} id={} user={} conversation={} duration_ms={} success=true",
                op.name,
                op.id,
                user,
                conversation,
                duration.as_millis()
            );
        } else {
            log::warn!(
                target: "telemetry",
                "operation name={} id={} user={} conversation={} duration_ms={} success=false error={:?}",
                op.name,
                op.id,
                user,
                conversation,
                duration.as_millis(),
                error.unwrap_or("")
            );
        }
    }

    fn custom_event(&self, name: &str, props: Props<'_>) {
        log::info!(target: "telemetry", "event name={} {}", name, format_props(props));
    }

    fn exception(&self, error: &str, props: Props<'_>) {
        log::error!(target: "telemetry", "exception error={:?} {}", error, format_props(props));
    }
}

pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn operation_stopped(&self, _: &OperationInfo, _: Duration, _: bool, _: Option<&str>) {}

    fn custom_event(&self, _: &str, _: Props<'_>) {}

    fn exception(&self, _: &str, _: Props<'_>) {}
}

/// One captured record in [`MemoryTelemetry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Operation {
        name: String,
        success: bool,
        error: Option<String>,
    },
    Event {
        name: String,
        props: Vec<(String, String)>,
    },
    Exception {
        error: String,
    },
}

/// Keeps records in memory; used by tests to assert what was emitted.
#[derive(Default)]
pub struct MemoryTelemetry {
    records: Mutex<Vec<Record>>,
}

impl MemoryTelemetry {
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Names of custom events in emission order.
    pub fn event_names(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Event { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    fn push(&self, record: Record) {
        if let Ok(mut g) = self.records.lock() {
            g.push(record);
        }
    }
}

impl Telemetry for MemoryTelemetry {
    fn operation_stopped(
        &self,
        op: &OperationInfo,
        _duration: Duration,
        success: bool,
        error: Option<&str>,
    ) {
        self.push(Record::Operation {
            name: op.name.clone(),
            success,
            error: error.map(str::to_string),
        });
    }

    fn custom_event(&self, name: &str, props: Props<'_>) {
        self.push(Record::Event {
            name: name.to_string(),
            props: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }

    fn exception(&self, error: &str, _props: Props<'_>) {
        self.push(Record::Exception {
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_stop_reaches_sink_with_context() {
        let sink = Arc::new(MemoryTelemetry::default());
        let telemetry = TelemetryHandle::new(sink.clone());
        let mut op = telemetry.start_operation("agent.chat");
        op.set_context(Some("u1"), Some("c1"));
        assert_eq!(op.info().user_id.as_deref(), Some("u1"));
        op.stop(false, Some("timeout"));
        assert_eq!(
            sink.records(),
            vec![Record::Operation {
                name: "agent.chat".to_string(),
                success: false,
                error: Some("timeout".to_string()),
            }]
        );
    }

    #[test]
    fn traceparent_has_w3c_shape() {
        let op = TelemetryHandle::noop().start_operation("bot.turn");
        let tp = op.traceparent();
        let parts: Vec<&str> = tp.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "00");
        assert_eq!(parts[1].len(), 32);
        assert_eq!(parts[2].len(), 16);
        assert_eq!(parts[3], "01");
    }

    #[test]
    fn events_are_recorded_in_order() {
        let sink = Arc::new(MemoryTelemetry::default());
        let telemetry = TelemetryHandle::new(sink.clone());
        telemetry.track_event("message.received", &[("channel", "msteams")]);
        telemetry.track_event("message.branch", &[("branch", "agent")]);
        telemetry.track_exception("boom", &[]);
        assert_eq!(sink.event_names(), vec!["message.received", "message.branch"]);
        assert!(sink
            .records()
            .contains(&Record::Exception { error: "boom".to_string() }));
    }
}
