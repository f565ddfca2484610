use super::types::{ParamValue, ParsedRecord};

/// Report all settings (the EEPROM dump)
pub const REPORT_SETTINGS: &str = "M503";
/// Print job statistics
pub const PRINT_STATS: &str = "M78";
/// Firmware name and capabilities
pub const FIRMWARE_INFO: &str = "M115";
pub const SAVE_SETTINGS: &str = "M500";
pub const LOAD_SETTINGS: &str = "M501";
pub const RESET_SETTINGS: &str = "M502";

/// Commands sent to request a complete dump
pub fn dump_request(with_stats: bool) -> Vec<&'static str> {
    let mut cmds = vec![FIRMWARE_INFO, REPORT_SETTINGS];
    if with_stats {
        cmds.push(PRINT_STATS);
    }
    cmds
}

/// Rebuild the settings command that restores a parsed record:
/// `{M92, X: 80.0, Y: 80.0}` -> `M92 X80 Y80`
pub fn build_command(record: &ParsedRecord) -> String {
    let mut cmd = record.command.clone();
    for (key, value) in &record.params {
        cmd.push(' ');
        match value {
            ParamValue::Flag => cmd.push_str(key),
            // composite index key already carries its number: T0, I1
            ParamValue::Int(_) if key.len() > 1 => cmd.push_str(key),
            _ => cmd.push_str(&format!("{key}{value}")),
        }
    }
    cmd
}
