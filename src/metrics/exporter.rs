//! Prometheus text rendering of eviction metrics snapshots.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Mutex;

use crate::metrics::snapshot::EvictionMetricsSnapshot;

/// Latency tags exported per snapshot, matching the engine's trackers.
const LATENCY_TAGS: [&str; 3] = ["eviction_cycle", "eviction_del", "eviction_lazyfree"];

/// Emits one metric in the text exposition format: a `# TYPE` line
/// followed by the sample. Counters and gauges only differ in `kind`.
fn type_line(out: &mut String, prefix: &str, name: &str, kind: &str, value: u64) {
    let _ = writeln!(out, "# TYPE {}_{} {}", prefix, name, kind);
    let _ = writeln!(out, "{}_{} {}", prefix, name, value);
}

/// Renders snapshots in the Prometheus text exposition format so they can
/// be scraped by Prometheus or forwarded to an OpenTelemetry collector.
///
/// The whole snapshot is rendered into one buffer and written with a
/// single sink access, so a scrape never interleaves with another writer.
#[derive(Debug)]
pub struct PrometheusTextExporter<W: Write> {
    prefix: String,
    sink: Mutex<W>,
}

impl<W: Write> PrometheusTextExporter<W> {
    pub fn new(prefix: impl Into<String>, sink: W) -> Self {
        Self {
            prefix: prefix.into(),
            sink: Mutex::new(sink),
        }
    }

    /// Consumes the exporter and returns the sink.
    pub fn into_inner(self) -> W {
        self.sink
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Renders one snapshot as exposition text without touching the sink.
    pub fn render(&self, snapshot: &EvictionMetricsSnapshot) -> String {
        let mut out = String::new();
        let p = self.prefix.as_str();

        type_line(&mut out, p, "evicted_keys_total", "counter", snapshot.evicted_keys);
        type_line(&mut out, p, "cycles_total", "counter", snapshot.cycles);
        type_line(
            &mut out,
            p,
            "cycles_blocked_total",
            "counter",
            snapshot.cycles_blocked,
        );
        type_line(
            &mut out,
            p,
            "cycles_no_candidates_total",
            "counter",
            snapshot.cycles_no_candidates,
        );
        type_line(
            &mut out,
            p,
            "backstop_rescues_total",
            "counter",
            snapshot.backstop_rescues,
        );

        let latencies = [
            &snapshot.eviction_cycle,
            &snapshot.eviction_del,
            &snapshot.eviction_lazyfree,
        ];
        for (tag, latency) in LATENCY_TAGS.iter().zip(latencies) {
            type_line(
                &mut out,
                p,
                &format!("{}_samples_total", tag),
                "counter",
                latency.samples,
            );
            type_line(
                &mut out,
                p,
                &format!("{}_us_total", tag),
                "counter",
                latency.total_us,
            );
            type_line(&mut out, p, &format!("{}_max_us", tag), "gauge", latency.max_us);
        }
        out
    }

    /// Renders one snapshot and writes it to the sink.
    pub fn export(&self, snapshot: &EvictionMetricsSnapshot) -> io::Result<()> {
        let body = self.render(snapshot);
        let mut sink = self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sink.write_all(body.as_bytes())
    }
}
