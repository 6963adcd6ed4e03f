//! Instrumentation profiler with chrome-trace output
//!
//! A `Profiler` collects named duration events and writes them out as a
//! chrome://tracing compatible JSON document. Spans are recorded through the
//! RAII [`ProfileSpan`] guard, which reports its duration back to the
//! profiler when dropped. The profiler is an explicit context object passed
//! by reference; there is no global session state.

use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// A single completed duration event, in the chrome-trace "X" phase format.
#[derive(Debug, Clone, Serialize)]
struct TraceEvent {
    name: String,
    cat: &'static str,
    ph: &'static str,
    ts: u128,
    dur: u128,
    pid: u32,
    tid: u64,
}

#[derive(Serialize)]
struct TraceDocument<'a> {
    #[serde(rename = "otherData")]
    other_data: serde_json::Value,
    #[serde(rename = "traceEvents")]
    trace_events: &'a [TraceEvent],
}

/// Collects profiling spans for one session.
pub struct Profiler {
    session_name: String,
    epoch: Instant,
    events: Vec<TraceEvent>,
}

impl Profiler {
    /// Begin a new profiling session.
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            epoch: Instant::now(),
            events: Vec::new(),
        }
    }

    /// Name of this session.
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// Number of events recorded so far.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Start a timed span. The span records itself when dropped.
    pub fn span<'p>(&'p mut self, name: &str) -> ProfileSpan<'p> {
        ProfileSpan {
            profiler: self,
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    fn record(&mut self, name: String, start: Instant, end: Instant) {
        let ts = start.duration_since(self.epoch).as_micros();
        let dur = end.duration_since(start).as_micros();
        self.events.push(TraceEvent {
            name,
            cat: "function",
            ph: "X",
            ts,
            dur,
            pid: std::process::id(),
            tid: 0,
        });
    }

    /// Serialize the collected events as a chrome-trace JSON string.
    pub fn to_trace_json(&self) -> serde_json::Result<String> {
        let doc = TraceDocument {
            other_data: serde_json::json!({ "session": self.session_name }),
            trace_events: &self.events,
        };
        serde_json::to_string(&doc)
    }

    /// Write the trace document to a file for chrome://tracing.
    pub fn write_trace<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_trace_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let mut file = std::fs::File::create(path)?;
        file.write_all(json.as_bytes())
    }
}

/// RAII guard for a timed span. Reports its duration on drop.
pub struct ProfileSpan<'p> {
    profiler: &'p mut Profiler,
    name: String,
    start: Instant,
}

impl Drop for ProfileSpan<'_> {
    fn drop(&mut self) {
        let name = std::mem::take(&mut self.name);
        self.profiler.record(name, self.start, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_are_recorded_on_drop() {
        let mut profiler = Profiler::new("test");
        {
            let _span = profiler.span("work");
        }
        {
            let _span = profiler.span("more work");
        }
        assert_eq!(profiler.event_count(), 2);
    }

    #[test]
    fn trace_json_is_well_formed() {
        let mut profiler = Profiler::new("session");
        {
            let _span = profiler.span("frame");
        }
        let json = profiler.to_trace_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let events = parsed["traceEvents"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["name"], "frame");
        assert_eq!(events[0]["ph"], "X");
        assert!(events[0]["dur"].as_u64().is_some());
        assert_eq!(parsed["otherData"]["session"], "session");
    }

    #[test]
    fn timestamps_are_monotonic() {
        let mut profiler = Profiler::new("order");
        {
            let _a = profiler.span("first");
        }
        {
            let _b = profiler.span("second");
        }
        let json = profiler.to_trace_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let events = parsed["traceEvents"].as_array().unwrap();
        let t0 = events[0]["ts"].as_u64().unwrap();
        let t1 = events[1]["ts"].as_u64().unwrap();
        assert!(t1 >= t0);
    }
}
