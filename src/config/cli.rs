use clap::Parser;

use super::settings::DumpSettings;

/// Read a Marlin EEPROM dump (M503 output) and print the settings as JSON.
///
/// Without FILE or --port the dump is read from stdin.
#[derive(Debug, Parser)]
#[command(name = "eeprom-marlin")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Marlin EEPROM dump reader", long_about = None)]
pub struct Cli {
    /// Read from a printer on this serial port
    #[arg(short, long, env = "EEPROM_MARLIN_PORT")]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Stop after this many milliseconds without output
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Wait this many milliseconds after connecting before sending
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Also request print statistics (M78)
    #[arg(long)]
    pub stats: bool,

    /// Overlay a schema table (plugin JSON layout) on the built-in one
    #[arg(long)]
    pub schema: Option<String>,

    /// Read a captured dump from a file
    #[arg(short, long, conflicts_with = "input")]
    pub file: Option<String>,

    /// List serial ports and exit
    #[arg(long)]
    pub list_ports: bool,

    /// Store the given options in settings.json
    #[arg(long)]
    pub save: bool,

    /// Captured dump to read, `-` for stdin
    #[arg(value_name = "FILE")]
    pub input: Option<String>,
}

impl Cli {
    /// Dump file given either with --file or positionally
    pub fn input(&self) -> Option<&str> {
        self.file.as_deref().or(self.input.as_deref())
    }

    /// Options given on the command line win over stored settings
    pub fn apply(&self, settings: &mut DumpSettings) {
        if let Some(port) = &self.port {
            settings.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            settings.baud_rate = baud;
        }
        if let Some(ms) = self.timeout_ms {
            settings.idle_timeout_ms = ms;
        }
        if let Some(ms) = self.delay_ms {
            settings.startup_delay_ms = ms;
        }
        if let Some(path) = &self.schema {
            settings.schema_path = Some(path.clone());
        }
        if self.stats {
            settings.request_stats = true;
        }
    }
}
