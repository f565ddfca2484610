//! Parser for Marlin EEPROM dumps.
//!
//! Classifies lines of firmware output produced by `M503`, extracts the
//! parameters each settings command reports, and picks print statistics
//! (`M78`) and the firmware name (`M115`) out of the same stream.
//!
//! ```
//! use eeprom_marlin::{EepromParser, ParamValue};
//!
//! let parser = EepromParser::new();
//! let record = parser.parse("echo:  M92 X80.00 Y80.00 Z400.00 E93.00").unwrap();
//! assert_eq!(record.name, "steps");
//! assert_eq!(record.get("Z"), Some(&ParamValue::Float(400.0)));
//! ```

pub mod config;
pub mod error;
pub mod marlin;
pub mod serial;

pub use error::EepromError;
pub use marlin::dump::{EepromDump, LineKind};
pub use marlin::parser::{EepromParser, is_marlin, parse_firmware_name, parse_stats_line};
pub use marlin::protocol::build_command;
pub use marlin::schema::{SchemaSource, SchemaTable};
pub use marlin::types::{
    CommandSchema, ParamKind, ParamType, ParamValue, ParsedRecord, PrintStats, StatKey,
    SwitchPolicy,
};
