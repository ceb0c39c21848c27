//! Chrome Tracing collector for job execution spans.
//!
//! Workers record one span per executed job into thread-local buffers, with no
//! contention on the hot path. Buffers are moved to a global list when a worker
//! exits, and can then be exported to a JSON file for chrome://tracing or
//! ui.perfetto.dev.

use serde::Serialize;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A single complete event in Chrome Tracing format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub name: &'static str,
    /// Event phase; always `"X"` (complete event with a duration).
    pub ph: &'static str,
    #[serde(rename = "ts")]
    pub start_us: u64,
    #[serde(rename = "dur")]
    pub duration_us: u64,
    pub pid: u32,
    pub tid: usize,
}

thread_local! {
    static TRACE_BUFFER: RefCell<Vec<TraceEvent>> = RefCell::new(Vec::with_capacity(1024));
}

lazy_static::lazy_static! {
    static ref GLOBAL_START: Instant = Instant::now();
    static ref EPOCH_START_US: u64 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as u64)
        .unwrap_or(0);
    static ref ALL_BUFFERS: Mutex<Vec<Vec<TraceEvent>>> = Mutex::new(Vec::new());
}

/// Records a span of work on the current thread.
pub fn record_event(name: &'static str, tid: usize, start: Instant, duration: Duration) {
    let start_us = start.saturating_duration_since(*GLOBAL_START).as_micros() as u64 + *EPOCH_START_US;

    TRACE_BUFFER.with(|buf| {
        buf.borrow_mut().push(TraceEvent {
            name,
            ph: "X",
            start_us,
            duration_us: duration.as_micros() as u64,
            pid: std::process::id(),
            tid,
        });
    });
}

/// Moves the current thread's buffer into the global list.
pub fn collect_local_trace() {
    TRACE_BUFFER.with(|buf| {
        let mut local_buf = buf.borrow_mut();
        if !local_buf.is_empty() {
            crate::lock(&*ALL_BUFFERS).push(std::mem::take(&mut *local_buf));
        }
    });
}

/// Removes and returns every collected event.
pub fn take_events() -> Vec<TraceEvent> {
    crate::lock(&*ALL_BUFFERS).drain(..).flatten().collect()
}

/// Exports every collected event to a JSON file.
pub fn export_to_file(path: impl AsRef<Path>) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let buffers = crate::lock(&*ALL_BUFFERS);
    let events: Vec<&TraceEvent> = buffers.iter().flatten().collect();
    serde_json::to_writer(&mut writer, &events)?;
    writeln!(writer)?;
    writer.flush()
}

/// RAII span: records an event covering its own lifetime.
pub struct TraceGuard {
    name: &'static str,
    tid: usize,
    start: Instant,
}

impl TraceGuard {
    pub fn new(name: &'static str, tid: usize) -> Self {
        Self {
            name,
            tid,
            start: Instant::now(),
        }
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        record_event(self.name, self.tid, self.start, self.start.elapsed());
    }
}

/// RAII guard that collects the local trace when dropped.
pub struct CollectorGuard;

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        collect_local_trace();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_guard_records_and_collects() {
        thread::spawn(|| {
            let _collector = CollectorGuard;
            let _span = TraceGuard::new("trace_unit_test_span", 7);
            thread::sleep(Duration::from_millis(1));
        })
        .join()
        .expect("tracing thread panicked");

        let events = take_events();
        let event = events
            .iter()
            .find(|event| event.name == "trace_unit_test_span")
            .expect("span collected");
        assert_eq!(event.tid, 7);
        assert_eq!(event.ph, "X");
    }

    #[test]
    fn test_event_serializes_in_chrome_format() {
        let event = TraceEvent {
            name: "job",
            ph: "X",
            start_us: 10,
            duration_us: 5,
            pid: 1,
            tid: 2,
        };
        let json = serde_json::to_value(&event).expect("serializable");
        assert_eq!(json["ts"], 10);
        assert_eq!(json["dur"], 5);
        assert_eq!(json["ph"], "X");
    }
}
