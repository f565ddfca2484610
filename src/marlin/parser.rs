use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use super::schema::{SchemaSource, SchemaTable};
use super::types::*;

// Settings echo: `echo: M92 X80.00 Y80.00 Z400.00 E93.00`
static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^echo:\s*(?P<gcode>M(?P<value>\d{1,3}))").expect("command pattern")
});

static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<letter>[A-Za-z])(?P<value>[-+]?[0-9]*\.?[0-9]+)").expect("parameter pattern")
});

static STATS_RE: LazyLock<[(StatKey, Regex); 6]> = LazyLock::new(|| {
    let re = |p: &str| Regex::new(p).expect("stats pattern");
    [
        (StatKey::Prints, re(r"Prints: (\d*)")),
        (StatKey::Finished, re(r"Finished: (\d*)")),
        (StatKey::Failed, re(r"Failed: (\d*)")),
        (StatKey::TotalTime, re(r"Total time: (.*),")),
        (StatKey::Longest, re(r"Longest job: (.*)")),
        (StatKey::Filament, re(r"Filament used: (.*m)")),
    ]
});

const FIRMWARE_NAME_KEY: &str = "FIRMWARE_NAME:";
const M115_KEYS: [&str; 5] = [
    " SOURCE_CODE_URL:",
    " PROTOCOL_VERSION:",
    " MACHINE_TYPE:",
    " EXTRUDER_COUNT:",
    " UUID:",
];

/// Turns EEPROM dump lines into records, using `S` to find parameter layouts
#[derive(Debug, Clone)]
pub struct EepromParser<S = &'static SchemaTable> {
    schema: S,
}

impl Default for EepromParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EepromParser {
    /// Parser backed by the built-in Marlin table
    pub fn new() -> Self {
        Self {
            schema: SchemaTable::marlin(),
        }
    }
}

impl<S: SchemaSource> EepromParser<S> {
    pub fn with_schema(schema: S) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &S {
        &self.schema
    }

    /// Parse one line of firmware output.
    ///
    /// Lines that are not a settings echo give `None` without touching the
    /// schema. A settings command the schema does not know is logged once at
    /// warning level and also gives `None`.
    pub fn parse(&self, line: &str) -> Option<ParsedRecord> {
        let caps = COMMAND_RE.captures(line)?;
        let command = caps.name("gcode")?.as_str();

        let schema = match self.schema.find_name_from_command(command) {
            Ok(name) => self.schema.schema_for(name),
            Err(_) => None,
        };
        let Some(schema) = schema else {
            log::warn!(
                "EEPROM output line not recognized, skipped: {}",
                line.trim_matches(|c| c == '\r' || c == '\n' || c == ' ')
            );
            return None;
        };

        let kinds = schema.working_kinds();
        let mut params: IndexMap<String, ParamValue> = IndexMap::new();

        for m in PARAM_RE.captures_iter(line) {
            let Some(letter) = m["letter"].chars().next() else {
                continue;
            };
            let letter = letter.to_ascii_uppercase();
            let token = &m["value"];

            let Some(kind) = kinds.get(&letter) else {
                continue;
            };
            match kind {
                ParamKind::Bool => {
                    params.insert(letter.to_string(), ParamValue::Bool(parse_bool(token)));
                }
                ParamKind::Numeric => {
                    params.insert(letter.to_string(), parse_numeric(token));
                }
                ParamKind::IndexedSwitch => {
                    params.insert(format!("{letter}{}", switch_index(token)), ParamValue::Int(1));
                }
                ParamKind::PlainSwitch => {
                    params.insert(letter.to_string(), ParamValue::Int(switch_index(token)));
                }
            }
        }

        // Bare switch letters: `M593 X F57.00`, `M569 S1 X Y Z`
        for (&letter, &kind) in &kinds {
            if kind != ParamKind::PlainSwitch {
                continue;
            }
            let key = letter.to_string();
            if !params.contains_key(&key) && has_bare_letter(line, letter) {
                params.insert(key, ParamValue::Flag);
            }
        }

        Some(ParsedRecord {
            name: schema.name.clone(),
            command: command.to_string(),
            params,
        })
    }
}

/// Parse a print statistics line (`M78`), e.g.
/// `Stats: Prints: 12, Finished: 10, Failed: 2`
pub fn parse_stats_line(line: &str) -> PrintStats {
    let mut stats = PrintStats::default();
    for (key, re) in STATS_RE.iter() {
        if let Some(m) = re.captures(line).and_then(|c| c.get(1)) {
            stats.fields.insert(*key, m.as_str().to_string());
        }
    }
    stats
}

pub fn is_marlin(name: &str) -> bool {
    name.to_lowercase().contains("marlin")
}

/// Firmware name out of an `M115` report:
/// `FIRMWARE_NAME:Marlin 2.1.2 (Aug 1 2023) SOURCE_CODE_URL:github.com/...`
pub fn parse_firmware_name(line: &str) -> Option<&str> {
    let start = line.find(FIRMWARE_NAME_KEY)? + FIRMWARE_NAME_KEY.len();
    let rest = &line[start..];
    let end = M115_KEYS
        .iter()
        .filter_map(|k| rest.find(k))
        .min()
        .unwrap_or(rest.len());
    let name = rest[..end].trim();
    if name.is_empty() { None } else { Some(name) }
}

fn parse_bool(token: &str) -> bool {
    // firmware prints some flags as 1.0 / 0.0
    match token.parse::<f64>() {
        Ok(v) => v == 1.0,
        Err(_) => matches!(token.trim(), "1" | "true" | "True"),
    }
}

fn parse_numeric(token: &str) -> ParamValue {
    token
        .parse::<f64>()
        .map(ParamValue::Float)
        .unwrap_or_else(|_| ParamValue::Raw(token.to_string()))
}

fn switch_index(token: &str) -> i64 {
    token.parse::<f64>().map(|v| v.trunc() as i64).unwrap_or(1)
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn has_bare_letter(line: &str, letter: char) -> bool {
    line.match_indices(letter).any(|(i, s)| {
        let before = line[..i].chars().next_back();
        let after = line[i + s.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EepromError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, Once};

    static WARNINGS: Mutex<Vec<String>> = Mutex::new(Vec::new());

    struct CaptureLogger;

    impl log::Log for CaptureLogger {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Warn
        }

        fn log(&self, record: &log::Record) {
            if record.level() == log::Level::Warn {
                WARNINGS.lock().unwrap().push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;

    fn capture_warnings() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let _ = log::set_logger(&LOGGER);
            log::set_max_level(log::LevelFilter::Warn);
        });
    }

    fn warnings_containing(text: &str) -> usize {
        WARNINGS
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.contains(text))
            .count()
    }

    struct CountingSchema {
        table: SchemaTable,
        lookups: AtomicUsize,
    }

    impl SchemaSource for CountingSchema {
        fn find_name_from_command(&self, command: &str) -> Result<&str, EepromError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.table.find_name_from_command(command)
        }

        fn schema_for(&self, name: &str) -> Option<&CommandSchema> {
            self.table.schema_for(name)
        }
    }

    fn test_table() -> SchemaTable {
        SchemaTable::from_schemas([
            CommandSchema::new("steps", "M92").numeric("XY"),
            CommandSchema::new("flags", "M201").param('S', ParamType::Bool),
            CommandSchema::new("tmc_current", "M906")
                .numeric("XYZ")
                .switches("T", SwitchPolicy::Indexed),
            CommandSchema::new("input_shaping", "M593").switches("X", SwitchPolicy::Plain),
            CommandSchema::new("stealthchop", "M569")
                .param('S', ParamType::Bool)
                .switches("XYZE", SwitchPolicy::Plain),
        ])
    }

    fn parser() -> EepromParser<SchemaTable> {
        EepromParser::with_schema(test_table())
    }

    #[test]
    fn non_echo_lines_skip_schema_lookup() {
        let parser = EepromParser::with_schema(CountingSchema {
            table: test_table(),
            lookups: AtomicUsize::new(0),
        });
        for line in [
            "ok",
            "X:0.00 Y:0.00 Z:0.00 E:0.00 Count X:0 Y:0 Z:0",
            "echo:; Steps per unit:",
            "  echo: M92 X80.0",
            "M92 X80.0 Y80.0",
            "",
        ] {
            assert!(parser.parse(line).is_none(), "{line:?}");
        }
        assert_eq!(parser.schema().lookups.load(Ordering::SeqCst), 0);

        assert!(parser.parse("echo: M92 X80.0").is_some());
        assert_eq!(parser.schema().lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn only_declared_letters_are_kept() {
        let rec = parser().parse("echo: M92 X80.0 Y80.0 Z800.0 E90.0").unwrap();
        assert_eq!(rec.name, "steps");
        assert_eq!(rec.command, "M92");
        assert_eq!(rec.params.len(), 2);
        assert_eq!(rec.get("X"), Some(&ParamValue::Float(80.0)));
        assert_eq!(rec.get("Y"), Some(&ParamValue::Float(80.0)));
    }

    #[test]
    fn lowercase_letters_and_signs() {
        let rec = parser().parse("echo:M92 x-12.5 Y+.25\r\n").unwrap();
        assert_eq!(rec.get("X"), Some(&ParamValue::Float(-12.5)));
        assert_eq!(rec.get("Y"), Some(&ParamValue::Float(0.25)));
    }

    #[test]
    fn bool_params() {
        let p = parser();
        let on = p.parse("echo: M201 S1.0").unwrap();
        assert_eq!(on.get("S"), Some(&ParamValue::Bool(true)));
        let off = p.parse("echo: M201 S0.0").unwrap();
        assert_eq!(off.get("S"), Some(&ParamValue::Bool(false)));
        let int_on = p.parse("echo: M201 S1").unwrap();
        assert_eq!(int_on.get("S"), Some(&ParamValue::Bool(true)));
    }

    #[test]
    fn indexed_switches_make_composite_keys() {
        let rec = parser().parse("echo: M906 T0 T1").unwrap();
        assert_eq!(rec.params.len(), 2);
        assert_eq!(rec.get("T0"), Some(&ParamValue::Int(1)));
        assert_eq!(rec.get("T1"), Some(&ParamValue::Int(1)));
        assert!(rec.get("T").is_none());

        let rec = parser().parse("echo:  M906 T1 X800 Z650").unwrap();
        assert_eq!(rec.get("T1"), Some(&ParamValue::Int(1)));
        assert_eq!(rec.get("X"), Some(&ParamValue::Float(800.0)));
        assert_eq!(rec.get("Z"), Some(&ParamValue::Float(650.0)));
    }

    #[test]
    fn bare_plain_switch_is_presence_flag() {
        let rec = parser().parse("echo: M593 X F57.00").unwrap();
        assert_eq!(rec.name, "input_shaping");
        assert_eq!(rec.get("X"), Some(&ParamValue::Flag));
        assert!(rec.get("F").is_none());
        assert_eq!(rec.params.len(), 1);
    }

    #[test]
    fn plain_switches_next_to_bool() {
        let rec = parser().parse("echo:  M569 S1 X Y Z").unwrap();
        assert_eq!(rec.get("S"), Some(&ParamValue::Bool(true)));
        assert_eq!(rec.get("X"), Some(&ParamValue::Flag));
        assert_eq!(rec.get("Y"), Some(&ParamValue::Flag));
        assert_eq!(rec.get("Z"), Some(&ParamValue::Flag));
        // no bare E on the line; the `e` of echo does not count
        assert!(rec.get("E").is_none());
    }

    #[test]
    fn numeric_plain_switch_keeps_value() {
        let rec = parser().parse("echo: M593 X0 F40").unwrap();
        assert_eq!(rec.get("X"), Some(&ParamValue::Int(0)));
        let rec = parser().parse("echo: M593 X1").unwrap();
        assert_eq!(rec.get("X"), Some(&ParamValue::Int(1)));
    }

    #[test]
    fn bare_letter_inside_word_is_ignored() {
        let rec = parser().parse("echo: M569 S0 Xtra").unwrap();
        assert_eq!(rec.get("S"), Some(&ParamValue::Bool(false)));
        assert!(rec.get("X").is_none());
    }

    #[test]
    fn run_together_letters_are_not_switches() {
        // each switch must stand alone; `XY` is neither X nor Y
        let rec = parser().parse("echo: M569 S1 XY").unwrap();
        assert_eq!(rec.get("S"), Some(&ParamValue::Bool(true)));
        assert!(rec.get("X").is_none());
        assert!(rec.get("Y").is_none());

        let rec = parser().parse("echo: M569 S1 X,Y").unwrap();
        assert_eq!(rec.get("X"), Some(&ParamValue::Flag));
        assert_eq!(rec.get("Y"), Some(&ParamValue::Flag));
    }

    #[test]
    fn known_command_without_params() {
        let rec = parser().parse("echo: M92").unwrap();
        assert_eq!(rec.name, "steps");
        assert!(rec.params.is_empty());
    }

    #[test]
    fn unknown_command_warns_once() {
        capture_warnings();
        assert!(parser().parse("echo: M9999 X1\r\n").is_none());
        assert_eq!(warnings_containing("echo: M9999 X1"), 1);
        assert_eq!(warnings_containing("X1\r"), 0);
    }

    #[test]
    fn parsing_is_repeatable() {
        let p = parser();
        let line = "echo:  M906 T0 T1 X800 Y800";
        let first = p.parse(line).unwrap();
        let second = p.parse(line).unwrap();
        assert_eq!(first, second);
        assert_eq!(p.schema().schema_for("tmc_current").unwrap().params.len(), 3);
    }

    #[test]
    fn builtin_marlin_dump_lines() {
        let p = EepromParser::new();

        let rec = p.parse("echo:  M92 X80.00 Y80.00 Z400.00 E93.00").unwrap();
        assert_eq!(rec.name, "steps");
        assert_eq!(rec.get("E"), Some(&ParamValue::Float(93.0)));

        let rec = p.parse("echo:  M420 S1 Z10.00").unwrap();
        assert_eq!(rec.get("S"), Some(&ParamValue::Bool(true)));
        assert_eq!(rec.get("Z"), Some(&ParamValue::Float(10.0)));

        let rec = p.parse("echo:  M301 E1 P22.20 I1.08 D114.00").unwrap();
        assert_eq!(rec.get("E1"), Some(&ParamValue::Int(1)));
        assert_eq!(rec.get("P"), Some(&ParamValue::Float(22.2)));

        let rec = p.parse("echo:  M593 X F40.00 D0.15").unwrap();
        assert_eq!(rec.get("X"), Some(&ParamValue::Flag));
        assert_eq!(rec.get("D"), Some(&ParamValue::Float(0.15)));
    }

    #[test]
    fn token_fallbacks() {
        assert_eq!(parse_numeric("12..5"), ParamValue::Raw("12..5".into()));
        assert!(parse_numeric("12..5").is_raw());
        assert!(parse_bool("true"));
        assert!(!parse_bool("yes"));
        assert_eq!(switch_index("?"), 1);
        assert_eq!(switch_index("2.9"), 2);
    }

    #[test]
    fn stats_line() {
        let stats = parse_stats_line("Prints: 120, Finished: 100, Failed: 20");
        assert_eq!(stats.len(), 3);
        assert_eq!(stats.get(StatKey::Prints), Some("120"));
        assert_eq!(stats.get(StatKey::Finished), Some("100"));
        assert_eq!(stats.get(StatKey::Failed), Some("20"));

        let stats = parse_stats_line("Longest job: 3h2m");
        assert_eq!(stats.len(), 1);
        assert_eq!(stats.get(StatKey::Longest), Some("3h2m"));

        assert!(parse_stats_line("ok").is_empty());
    }

    #[test]
    fn stats_time_and_filament() {
        let stats = parse_stats_line("echo:Stats: Total time: 2d 3h 4m 5s, Longest job: 6h 7m 8s");
        assert_eq!(stats.get(StatKey::TotalTime), Some("2d 3h 4m 5s"));
        assert_eq!(stats.get(StatKey::Longest), Some("6h 7m 8s"));

        let stats = parse_stats_line("echo:Stats: Filament used: 123.45m");
        assert_eq!(stats.get(StatKey::Filament), Some("123.45m"));
    }

    #[test]
    fn marlin_detection() {
        assert!(is_marlin("Marlin 2.1.2"));
        assert!(is_marlin("MARLIN bugfix"));
        assert!(!is_marlin("Klipper"));
        assert!(!is_marlin(""));
    }

    #[test]
    fn firmware_name_from_m115() {
        let line = "FIRMWARE_NAME:Marlin 2.1.2.1 (Jun  1 2024) SOURCE_CODE_URL:github.com/MarlinFirmware/Marlin PROTOCOL_VERSION:1.0";
        assert_eq!(parse_firmware_name(line), Some("Marlin 2.1.2.1 (Jun  1 2024)"));
        assert_eq!(
            parse_firmware_name("FIRMWARE_NAME:Prusa-Firmware 3.13.2"),
            Some("Prusa-Firmware 3.13.2")
        );
        assert_eq!(parse_firmware_name("FIRMWARE_NAME: SOURCE_CODE_URL:x"), None);
        assert_eq!(parse_firmware_name("ok"), None);
    }
}
