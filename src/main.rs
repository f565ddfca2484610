use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use eeprom_marlin::config::cli::Cli;
use eeprom_marlin::config::settings::DumpSettings;
use eeprom_marlin::marlin::protocol;
use eeprom_marlin::serial::connection::{self, SerialConnection};
use eeprom_marlin::{EepromDump, EepromError, EepromParser, SchemaSource, SchemaTable};

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), EepromError> {
    let cli = Cli::parse();

    if cli.list_ports {
        for port in connection::list_ports() {
            println!("{port}");
        }
        return Ok(());
    }

    let mut settings = DumpSettings::load();
    cli.apply(&mut settings);
    if cli.save {
        settings.save();
    }

    let mut table = SchemaTable::marlin().clone();
    if let Some(path) = &settings.schema_path {
        table.extend(SchemaTable::load(Path::new(path))?);
        log::info!("Schema table: {} commands", table.len());
    }
    let parser = EepromParser::with_schema(&table);
    let mut dump = EepromDump::new();

    match (cli.input(), settings.port.as_deref()) {
        (Some("-"), _) | (None, None) => read_stream(std::io::stdin().lock(), &parser, &mut dump)?,
        (Some(path), _) => read_stream(BufReader::new(File::open(path)?), &parser, &mut dump)?,
        (None, Some(port)) => read_serial(port, &settings, &parser, &mut dump)?,
    }

    if let Some(name) = &dump.firmware {
        if !dump.is_marlin() {
            log::warn!("Firmware {name} is not Marlin, settings may be incomplete");
        }
    }
    log::info!("Collected {} settings lines", dump.record_count());

    println!("{}", dump.to_json()?);
    Ok(())
}

fn read_stream<S: SchemaSource>(
    reader: impl BufRead,
    parser: &EepromParser<S>,
    dump: &mut EepromDump,
) -> Result<(), EepromError> {
    connection::read_lossy_lines(reader, |line| {
        dump.ingest(parser, line);
        true
    })?;
    Ok(())
}

fn read_serial<S: SchemaSource>(
    port: &str,
    settings: &DumpSettings,
    parser: &EepromParser<S>,
    dump: &mut EepromDump,
) -> Result<(), EepromError> {
    let conn = SerialConnection::connect(port, settings.baud_rate)?;

    // boot banner; Marlin echoes its settings here too
    let boot = collect(&conn, settings.startup_delay_ms, parser, dump);
    log::debug!("{boot} lines before request");

    for cmd in protocol::dump_request(settings.request_stats) {
        conn.send(cmd);
    }
    let answered = collect(&conn, settings.idle_timeout_ms, parser, dump);
    conn.disconnect();

    if answered == 0 {
        return Err(EepromError::Serial(format!("no answer from {port}")));
    }
    Ok(())
}

fn collect<S: SchemaSource>(
    conn: &SerialConnection,
    idle_ms: u64,
    parser: &EepromParser<S>,
    dump: &mut EepromDump,
) -> usize {
    connection::collect_lines(&conn.rx, Duration::from_millis(idle_ms), |line| {
        dump.ingest(parser, line);
    })
}
