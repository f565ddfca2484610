use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Declared type of a parameter letter in the schema table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Numeric,
    Bool,
    Switch,
}

impl<'de> Deserialize<'de> for ParamType {
    // "bool" and "switch" are special; float1, float2, int... are all numbers
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ty = String::deserialize(deserializer)?;
        Ok(match ty.as_str() {
            "bool" => Self::Bool,
            "switch" => Self::Switch,
            _ => Self::Numeric,
        })
    }
}

/// How switch letters of a command are reported by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SwitchPolicy {
    /// `T0`, `T1`... each index addresses a distinct unit (tool, driver)
    Indexed,
    /// Bare letter means "enabled", e.g. `M593 X F57.00`
    #[default]
    Plain,
}

/// Resolved kind of a letter for one parse call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Numeric,
    Bool,
    IndexedSwitch,
    PlainSwitch,
}

impl ParamKind {
    fn switch(policy: SwitchPolicy) -> Self {
        match policy {
            SwitchPolicy::Indexed => Self::IndexedSwitch,
            SwitchPolicy::Plain => Self::PlainSwitch,
        }
    }
}

/// Parameter layout of one settings command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSchema {
    pub name: String,
    pub command: String,
    pub params: IndexMap<char, ParamType>,
    pub switches: Vec<char>,
    pub switch_policy: SwitchPolicy,
}

impl CommandSchema {
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            params: IndexMap::new(),
            switches: Vec::new(),
            switch_policy: SwitchPolicy::Plain,
        }
    }

    pub fn param(mut self, letter: char, ty: ParamType) -> Self {
        self.params.insert(letter.to_ascii_uppercase(), ty);
        self
    }

    /// Declare several numeric letters at once: `.numeric("XYZE")`
    pub fn numeric(mut self, letters: &str) -> Self {
        for c in letters.chars() {
            self.params.insert(c.to_ascii_uppercase(), ParamType::Numeric);
        }
        self
    }

    pub fn switches(mut self, letters: &str, policy: SwitchPolicy) -> Self {
        self.switches = letters.chars().map(|c| c.to_ascii_uppercase()).collect();
        self.switch_policy = policy;
        self
    }

    /// Build the per-call letter table. Switch letters already declared as
    /// params keep their declared type.
    pub fn working_kinds(&self) -> IndexMap<char, ParamKind> {
        let mut kinds: IndexMap<char, ParamKind> = self
            .params
            .iter()
            .map(|(&letter, &ty)| {
                let kind = match ty {
                    ParamType::Numeric => ParamKind::Numeric,
                    ParamType::Bool => ParamKind::Bool,
                    ParamType::Switch => ParamKind::switch(self.switch_policy),
                };
                (letter, kind)
            })
            .collect();

        for &sw in &self.switches {
            kinds
                .entry(sw)
                .or_insert_with(|| ParamKind::switch(self.switch_policy));
        }
        kinds
    }
}

/// A single extracted value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Bool(bool),
    Int(i64),
    /// Bare switch letter with no number after it; reads as 1
    Flag,
    /// Token matched a declared letter but did not convert
    Raw(String),
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Flag => serializer.serialize_i64(1),
            Self::Raw(s) => serializer.serialize_str(s),
        }
    }
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Flag => Some(1.0),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Raw(s) => s.parse().ok(),
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{}", if *b { 1 } else { 0 }),
            Self::Int(v) => write!(f, "{v}"),
            Self::Flag => f.write_str("1"),
            Self::Raw(s) => write!(f, "{s}"),
        }
    }
}

/// One recognized EEPROM dump line: `echo: M92 X80.00 Y80.00`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRecord {
    pub name: String,
    pub command: String,
    pub params: IndexMap<String, ParamValue>,
}

impl ParsedRecord {
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKey {
    Prints,
    Finished,
    Failed,
    TotalTime,
    Longest,
    Filament,
}

impl StatKey {
    pub const ALL: [StatKey; 6] = [
        Self::Prints,
        Self::Finished,
        Self::Failed,
        Self::TotalTime,
        Self::Longest,
        Self::Filament,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prints => "prints",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::TotalTime => "total_time",
            Self::Longest => "longest",
            Self::Filament => "filament",
        }
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Print statistics as reported by `M78`, kept as the firmware wrote them
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PrintStats {
    pub fields: IndexMap<StatKey, String>,
}

impl PrintStats {
    pub fn get(&self, key: StatKey) -> Option<&str> {
        self.fields.get(&key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Fold in fields from a later line, newer values win
    pub fn merge(&mut self, other: PrintStats) {
        for (key, value) in other.fields {
            self.fields.insert(key, value);
        }
    }
}
