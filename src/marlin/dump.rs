use indexmap::IndexMap;
use serde::Serialize;

use super::parser::{EepromParser, is_marlin, parse_firmware_name, parse_stats_line};
use super::schema::SchemaSource;
use super::types::{ParsedRecord, PrintStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Setting,
    Stats,
    Firmware,
    Other,
}

/// Everything collected from one `M115` / `M503` / `M78` exchange
#[derive(Debug, Clone, Default, Serialize)]
pub struct EepromDump {
    pub firmware: Option<String>,
    pub settings: IndexMap<String, Vec<ParsedRecord>>,
    pub stats: PrintStats,
}

impl EepromDump {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one firmware line and keep whatever it carries.
    /// A command may report over several lines (one per driver or tool);
    /// each distinct line is kept under the setting name.
    pub fn ingest<S: SchemaSource>(&mut self, parser: &EepromParser<S>, line: &str) -> LineKind {
        if let Some(record) = parser.parse(line) {
            let records = self.settings.entry(record.name.clone()).or_default();
            if !records.contains(&record) {
                records.push(record);
            }
            return LineKind::Setting;
        }

        if let Some(name) = parse_firmware_name(line) {
            self.firmware = Some(name.to_string());
            return LineKind::Firmware;
        }

        let stats = parse_stats_line(line);
        if !stats.is_empty() {
            self.stats.merge(stats);
            return LineKind::Stats;
        }

        LineKind::Other
    }

    pub fn is_marlin(&self) -> bool {
        self.firmware.as_deref().is_some_and(is_marlin)
    }

    pub fn records(&self, name: &str) -> &[ParsedRecord] {
        self.settings.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn record_count(&self) -> usize {
        self.settings.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty() && self.stats.is_empty() && self.firmware.is_none()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
