//! Timing events and the debug README summary.
//!
//! Events are appended one JSON object per line to `timing.ndjson`. At
//! finalize time the log is read back and `start`/`end` events for the same
//! stage are paired into durations.

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::RevscopeError;

/// Event name that opens a timed span.
pub const EVENT_START: &str = "start";

/// Event name that closes a timed span.
pub const EVENT_END: &str = "end";

// ============================================================================
// TimingEvent
// ============================================================================

/// One line of `timing.ndjson`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingEvent {
    /// Pipeline stage (e.g. `resolve`, `diff`).
    pub stage: String,
    /// Event name; `start` and `end` are paired, anything else is a marker.
    pub event: String,
    /// Microseconds since the Unix epoch.
    pub timestamp_us: i64,
    /// Wall-clock time of the event.
    pub at: DateTime<Utc>,
}

impl TimingEvent {
    /// An event stamped with the current time.
    pub fn now(stage: &str, event: &str) -> Self {
        let at = Utc::now();
        Self {
            stage: stage.to_string(),
            event: event.to_string(),
            timestamp_us: at.timestamp_micros(),
            at,
        }
    }
}

/// Append one event to the log at `path`.
pub fn append_event(path: &Path, event: &TimingEvent) -> Result<(), RevscopeError> {
    let line = serde_json::to_string(event)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Read every event from the log. A missing file yields no events; lines that
/// fail to parse are skipped.
pub fn read_events(path: &Path) -> Result<Vec<TimingEvent>, RevscopeError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TimingEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => tracing::warn!("Skipping timing line {}: {}", line_num + 1, e),
        }
    }
    Ok(events)
}

// ============================================================================
// Durations
// ============================================================================

/// A paired `start`/`end` span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageDuration {
    /// Stage name.
    pub stage: String,
    /// Start timestamp (µs).
    pub start_us: i64,
    /// End timestamp (µs); `None` when the stage never ended.
    pub end_us: Option<i64>,
}

impl StageDuration {
    /// Duration in milliseconds, if the span closed.
    pub fn duration_ms(&self) -> Option<f64> {
        self.end_us.map(|end| (end - self.start_us) as f64 / 1000.0)
    }
}

/// Pair `start`/`end` events per stage, in order of first start.
///
/// A stage started more than once is paired first-in first-out. Unmatched
/// `end` events are dropped.
pub fn pair_durations(events: &[TimingEvent]) -> Vec<StageDuration> {
    let mut spans: Vec<StageDuration> = Vec::new();
    let mut open: HashMap<&str, Vec<usize>> = HashMap::new();

    for event in events {
        match event.event.as_str() {
            EVENT_START => {
                open.entry(event.stage.as_str()).or_default().push(spans.len());
                spans.push(StageDuration {
                    stage: event.stage.clone(),
                    start_us: event.timestamp_us,
                    end_us: None,
                });
            }
            EVENT_END => {
                let pending = open.get_mut(event.stage.as_str()).filter(|p| !p.is_empty());
                match pending {
                    Some(pending) => {
                        let idx = pending.remove(0);
                        spans[idx].end_us = Some(event.timestamp_us);
                    }
                    None => tracing::debug!("Unmatched end for stage `{}`", event.stage),
                }
            }
            _ => {}
        }
    }

    spans
}

// ============================================================================
// README
// ============================================================================

/// Render the human-readable summary written to `README.md`.
pub fn render_readme(
    title: &str,
    metadata: &serde_json::Value,
    durations: &[StageDuration],
    artifacts: &BTreeMap<String, usize>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Debug capture: {}\n\n", title));

    if let Some(fields) = metadata.as_object() {
        for (key, value) in fields {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str(&format!("- **{}**: {}\n", key, value));
        }
        out.push('\n');
    }

    out.push_str("## Timing\n\n");
    if durations.is_empty() {
        out.push_str("No timing events recorded.\n\n");
    } else {
        out.push_str("| Stage | Duration (ms) |\n|-------|---------------|\n");
        for span in durations {
            let ms = span
                .duration_ms()
                .map(|ms| format!("{:.3}", ms))
                .unwrap_or_else(|| "incomplete".to_string());
            out.push_str(&format!("| {} | {} |\n", span.stage, ms));
        }
        let total: f64 = durations.iter().filter_map(StageDuration::duration_ms).sum();
        out.push_str(&format!("\nTotal measured: {:.3} ms\n\n", total));
    }

    out.push_str("## Artifacts\n\n");
    if artifacts.is_empty() {
        out.push_str("No stage artifacts.\n");
    } else {
        for (stage, count) in artifacts {
            out.push_str(&format!("- `{}/`: {} file(s)\n", stage, count));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event(stage: &str, name: &str, us: i64) -> TimingEvent {
        TimingEvent {
            stage: stage.to_string(),
            event: name.to_string(),
            timestamp_us: us,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_pairs_start_end_per_stage() {
        let events = vec![
            event("resolve", "start", 1_000),
            event("diff", "start", 1_500),
            event("resolve", "end", 3_000),
            event("diff", "end", 6_500),
        ];
        let spans = pair_durations(&events);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].stage, "resolve");
        assert_eq!(spans[0].duration_ms(), Some(2.0));
        assert_eq!(spans[1].duration_ms(), Some(5.0));
    }

    #[test]
    fn test_unclosed_and_unmatched() {
        let events = vec![
            event("bundle", "end", 10),
            event("bundle", "start", 20),
            event("bundle", "checkpoint", 25),
        ];
        let spans = pair_durations(&events);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end_us, None);
        assert_eq!(spans[0].duration_ms(), None);
    }

    #[test]
    fn test_repeated_stage_pairs_fifo() {
        let events = vec![
            event("git", "start", 0),
            event("git", "end", 1_000),
            event("git", "start", 2_000),
            event("git", "end", 5_000),
        ];
        let spans = pair_durations(&events);
        assert_eq!(spans[0].duration_ms(), Some(1.0));
        assert_eq!(spans[1].duration_ms(), Some(3.0));
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("timing.ndjson");
        append_event(&path, &TimingEvent::now("resolve", "start")).unwrap();
        append_event(&path, &TimingEvent::now("resolve", "end")).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();

        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].timestamp_us <= events[1].timestamp_us);
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(read_events(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_render_readme_lists_stages_and_artifacts() {
        let spans = pair_durations(&[event("diff", "start", 0), event("diff", "end", 2_500)]);
        let mut artifacts = BTreeMap::new();
        artifacts.insert("diff".to_string(), 3);
        let meta = serde_json::json!({"identifier": "feature"});

        let readme = render_readme("acme-widgets", &meta, &spans, &artifacts);
        assert!(readme.contains("# Debug capture: acme-widgets"));
        assert!(readme.contains("**identifier**: feature"));
        assert!(readme.contains("| diff | 2.500 |"));
        assert!(readme.contains("`diff/`: 3 file(s)"));
    }
}
