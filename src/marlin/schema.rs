use std::sync::LazyLock;

use indexmap::IndexMap;
use serde::Deserialize;

use super::types::{CommandSchema, ParamType, SwitchPolicy};
use crate::error::EepromError;

/// Lookup of parameter layouts by command token and internal name
pub trait SchemaSource {
    fn find_name_from_command(&self, command: &str) -> Result<&str, EepromError>;
    fn schema_for(&self, name: &str) -> Option<&CommandSchema>;
}

impl<S: SchemaSource + ?Sized> SchemaSource for &S {
    fn find_name_from_command(&self, command: &str) -> Result<&str, EepromError> {
        (**self).find_name_from_command(command)
    }

    fn schema_for(&self, name: &str) -> Option<&CommandSchema> {
        (**self).schema_for(name)
    }
}

/// Immutable schema table, keyed by name with a command index
#[derive(Debug, Clone, Default)]
pub struct SchemaTable {
    by_name: IndexMap<String, CommandSchema>,
    by_command: IndexMap<String, String>,
}

static MARLIN: LazyLock<SchemaTable> = LazyLock::new(build_marlin_table);

impl SchemaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table for the settings Marlin 2.x prints in its `M503` report
    pub fn marlin() -> &'static SchemaTable {
        &MARLIN
    }

    pub fn from_schemas(schemas: impl IntoIterator<Item = CommandSchema>) -> Self {
        let mut table = Self::new();
        for schema in schemas {
            table.insert(schema);
        }
        table
    }

    /// Add a schema. An entry with the same name or command is replaced.
    pub fn insert(&mut self, schema: CommandSchema) {
        if let Some(old_name) = self.by_command.get(&schema.command).cloned() {
            self.by_name.shift_remove(&old_name);
        }
        if let Some(old) = self.by_name.get(&schema.name) {
            let old_command = old.command.clone();
            self.by_command.shift_remove(&old_command);
        }
        self.by_command
            .insert(schema.command.clone(), schema.name.clone());
        self.by_name.insert(schema.name.clone(), schema);
    }

    /// Overlay every entry of `other` onto this table
    pub fn extend(&mut self, other: SchemaTable) {
        for (_, schema) in other.by_name {
            self.insert(schema);
        }
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandSchema> {
        self.by_name.values()
    }

    /// Load a table in the plugin's JSON layout:
    ///
    /// ```json
    /// { "tmc_current": { "command": "M906",
    ///                    "params": { "X": { "type": "float1" } },
    ///                    "switches": ["T"], "switchesIndexable": true } }
    /// ```
    pub fn from_json(json: &str) -> Result<Self, EepromError> {
        let entries: IndexMap<String, SchemaEntry> = serde_json::from_str(json)?;
        let mut table = Self::new();
        for (name, entry) in entries {
            let schema = entry.into_schema(&name)?;
            if table.by_command.contains_key(&schema.command) {
                return Err(EepromError::Schema(format!(
                    "command {} declared twice",
                    schema.command
                )));
            }
            table.insert(schema);
        }
        Ok(table)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, EepromError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }
}

impl SchemaSource for SchemaTable {
    fn find_name_from_command(&self, command: &str) -> Result<&str, EepromError> {
        self.by_command
            .get(command)
            .map(String::as_str)
            .ok_or_else(|| EepromError::UnknownCommand(command.to_string()))
    }

    fn schema_for(&self, name: &str) -> Option<&CommandSchema> {
        self.by_name.get(name)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaEntry {
    command: String,
    #[serde(default)]
    params: IndexMap<String, ParamSpec>,
    #[serde(default)]
    switches: Vec<String>,
    #[serde(default)]
    switches_indexable: bool,
    #[serde(default)]
    switches_not_indexed: bool,
}

#[derive(Deserialize)]
struct ParamSpec {
    #[serde(rename = "type", default = "default_param_type")]
    ty: ParamType,
}

fn default_param_type() -> ParamType {
    ParamType::Numeric
}

impl SchemaEntry {
    fn into_schema(self, name: &str) -> Result<CommandSchema, EepromError> {
        let mut schema = CommandSchema::new(name, self.command.trim());
        if !is_command_token(&schema.command) {
            return Err(EepromError::Schema(format!(
                "{name}: invalid command token {:?}",
                schema.command
            )));
        }
        for (key, spec) in self.params {
            schema = schema.param(single_letter(name, &key)?, spec.ty);
        }
        let policy = if self.switches_indexable && !self.switches_not_indexed {
            SwitchPolicy::Indexed
        } else {
            SwitchPolicy::Plain
        };
        let mut letters = String::new();
        for key in &self.switches {
            letters.push(single_letter(name, key)?);
        }
        Ok(schema.switches(&letters, policy))
    }
}

fn single_letter(name: &str, key: &str) -> Result<char, EepromError> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Ok(c.to_ascii_uppercase()),
        _ => Err(EepromError::Schema(format!(
            "{name}: parameter key {key:?} is not a single letter"
        ))),
    }
}

fn is_command_token(command: &str) -> bool {
    command
        .strip_prefix('M')
        .map(|n| (1..=3).contains(&n.len()) && n.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

fn build_marlin_table() -> SchemaTable {
    use ParamType::Bool;
    use SwitchPolicy::{Indexed, Plain};

    SchemaTable::from_schemas([
        CommandSchema::new("steps", "M92")
            .numeric("XYZE")
            .switches("T", Indexed),
        CommandSchema::new("feedrate", "M203")
            .numeric("XYZE")
            .switches("T", Indexed),
        CommandSchema::new("max_acceleration", "M201")
            .numeric("XYZE")
            .switches("T", Indexed),
        CommandSchema::new("print_acceleration", "M204").numeric("PRT"),
        CommandSchema::new("advanced", "M205").numeric("BSTXYZEJ"),
        CommandSchema::new("home_offset", "M206").numeric("XYZ"),
        CommandSchema::new("filament", "M200")
            .numeric("DL")
            .param('S', Bool)
            .switches("T", Indexed),
        CommandSchema::new("hotend_offset", "M218")
            .numeric("XYZ")
            .switches("T", Indexed),
        CommandSchema::new("material", "M145").numeric("SHBF"),
        CommandSchema::new("hotend_pid", "M301")
            .numeric("PIDCLF")
            .switches("E", Indexed),
        CommandSchema::new("bed_pid", "M304").numeric("PID"),
        CommandSchema::new("chamber_pid", "M309").numeric("PID"),
        CommandSchema::new("linear_advance", "M900")
            .numeric("K")
            .switches("T", Indexed),
        CommandSchema::new("probe_offset", "M851").numeric("XYZ"),
        CommandSchema::new("bed_leveling", "M420")
            .param('S', Bool)
            .numeric("Z"),
        CommandSchema::new("delta", "M665").numeric("LRHSXYZABC"),
        CommandSchema::new("endstop_offsets", "M666").numeric("XYZ"),
        CommandSchema::new("retract", "M207").numeric("SFZW"),
        CommandSchema::new("recover", "M208").numeric("SFWR"),
        CommandSchema::new("auto_retract", "M209").param('S', Bool),
        CommandSchema::new("backlash", "M425").numeric("FSXYZ"),
        CommandSchema::new("tmc_current", "M906")
            .numeric("XYZE")
            .switches("IT", Indexed),
        CommandSchema::new("tmc_hybrid", "M913")
            .numeric("XYZE")
            .switches("IT", Indexed),
        CommandSchema::new("tmc_bump", "M914")
            .numeric("XYZ")
            .switches("I", Indexed),
        CommandSchema::new("tmc_stealthchop", "M569")
            .param('S', Bool)
            .switches("XYZE", Plain),
        CommandSchema::new("input_shaping", "M593")
            .numeric("FD")
            .switches("XY", Plain),
        CommandSchema::new("servo_angles", "M281").numeric("PLU"),
        CommandSchema::new("skew", "M852").numeric("IJKS"),
    ])
}
