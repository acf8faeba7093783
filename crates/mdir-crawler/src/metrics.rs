use std::cmp;
use std::fmt::Write;

use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use serde::Serialize;

use crate::message::TimingSamples;

/// Durations in milliseconds, `min` stays unset until the first sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Timing {
    pub total: u64,
    pub min: Option<u64>,
    pub max: u64,
}

impl Timing {
    pub fn record(&mut self, ms: u64) {
        self.fold(ms, ms, ms);
    }

    fn fold(&mut self, total: u64, min: u64, max: u64) {
        self.total += total;
        self.min = Some(self.min.map_or(min, |m| cmp::min(m, min)));
        self.max = cmp::max(self.max, max);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnitMetrics {
    /// Expected count, as advertised by the site
    pub total: u64,
    /// Actually completed count
    pub parsed: u64,
    pub time: Timing,
}

impl UnitMetrics {
    pub fn record(&mut self, ms: u64) {
        self.parsed += 1;
        self.time.record(ms);
    }

    /// Folds the samples of a worker report
    pub fn fold_samples(&mut self, samples: &TimingSamples) {
        if samples.is_empty() {
            return;
        }
        self.parsed += samples.list.len() as u64;
        self.time.fold(samples.total, samples.min, samples.max);
    }

    pub fn avg(&self) -> f64 {
        if self.parsed == 0 {
            0.
        } else {
            self.time.total as f64 / self.parsed as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunMetrics {
    pub pages: UnitMetrics,
    pub members: UnitMetrics,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RunMetrics {
        *self
    }

    pub fn format_report(&self) -> String {
        let mut text = title("Performance analysis");
        text.push('\n');
        text.push_str(&format_unit(&self.pages, "PAGE(s)"));
        text.push_str(&format_unit(&self.members, "MEMBER(s)"));
        text
    }
}

fn format_unit(unit: &UnitMetrics, name: &str) -> String {
    let mut text = String::new();

    writeln!(text, "[{name}:Count]").ok();
    text.push_str(&table(
        &["Total", "Parsed"],
        &[unit.total.to_string(), unit.parsed.to_string()],
    ));

    writeln!(text, "\n[{name}:Time]").ok();
    text.push_str(&table(
        &["Total (ms)", "Avg (ms)", "Min (ms)", "Max (ms)"],
        &[
            unit.time.total.to_string(),
            format!("{:.2}", unit.avg()),
            unit.time.min.unwrap_or_default().to_string(),
            unit.time.max.to_string(),
        ],
    ));
    text.push_str("\n\n");

    text
}

fn title(text: &str) -> String {
    table(&[text], &[])
}

fn table(head: &[&str], row: &[String]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(head.iter().copied());
    if !row.is_empty() {
        table.add_row(row.iter());
    }
    table.to_string()
}
