use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use serialport::SerialPort;
use std::io::{BufRead, BufReader, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::EepromError;

/// Messages from the serial reader thread
#[derive(Debug, Clone, PartialEq)]
pub enum SerialMsg {
    Line(String),
    Connected(String),
    Disconnected(String),
}

/// Messages to the serial writer thread
#[derive(Debug)]
pub enum SerialCmd {
    SendLine(String),
    Disconnect,
}

pub struct SerialConnection {
    pub rx: Receiver<SerialMsg>,
    pub cmd_tx: Sender<SerialCmd>,
    port_handle: Arc<Mutex<Option<Box<dyn SerialPort>>>>,
}

impl SerialConnection {
    /// Open a serial port and spawn reader/writer threads
    pub fn connect(port_name: &str, baud_rate: u32) -> Result<Self, EepromError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| EepromError::Serial(format!("Failed to open {port_name}: {e}")))?;

        let (msg_tx, msg_rx) = unbounded::<SerialMsg>();
        let (cmd_tx, cmd_rx) = unbounded::<SerialCmd>();
        let port_handle = Arc::new(Mutex::new(Some(port.try_clone()?)));
        log::info!("Connected to {port_name} at {baud_rate} baud");

        // Reader thread
        let port_name_owned = port_name.to_string();
        std::thread::spawn(move || {
            let _ = msg_tx.send(SerialMsg::Connected(port_name_owned));
            read_lines(BufReader::new(port), &msg_tx);
        });

        // Writer thread
        let port_for_writer = port_handle.clone();
        std::thread::spawn(move || {
            loop {
                match cmd_rx.recv() {
                    Ok(SerialCmd::SendLine(line)) => {
                        let Ok(mut guard) = port_for_writer.lock() else {
                            break;
                        };
                        if let Some(ref mut port) = *guard {
                            log::debug!("> {line}");
                            let data = format!("{line}\n");
                            if let Err(e) = port.write_all(data.as_bytes()).and_then(|_| port.flush()) {
                                log::warn!("Write failed: {e}");
                            }
                        }
                    }
                    Ok(SerialCmd::Disconnect) | Err(_) => {
                        // dropping the port closes it
                        if let Ok(mut guard) = port_for_writer.lock() {
                            guard.take();
                        }
                        break;
                    }
                }
            }
        });

        Ok(Self {
            rx: msg_rx,
            cmd_tx,
            port_handle,
        })
    }

    pub fn send(&self, line: &str) {
        let _ = self.cmd_tx.send(SerialCmd::SendLine(line.to_string()));
    }

    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(SerialCmd::Disconnect);
    }

    pub fn is_connected(&self) -> bool {
        self.port_handle
            .lock()
            .map(|port| port.is_some())
            .unwrap_or(false)
    }
}

/// Feed every non-empty line of `reader` to `on_line` until it returns false
/// or the stream ends. Bytes are decoded lossily so line noise cannot end the
/// session, and a partial line is kept across read timeouts.
pub fn read_lossy_lines(
    mut reader: impl BufRead,
    mut on_line: impl FnMut(&str) -> bool,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    loop {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                // last line without a terminator
                if !buf.is_empty() {
                    emit_line(&buf, &mut on_line);
                }
                return Ok(());
            }
            Ok(_) => {
                if buf.last() != Some(&b'\n') {
                    continue;
                }
                let more = emit_line(&buf, &mut on_line);
                buf.clear();
                if !more {
                    return Ok(());
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

fn emit_line(raw: &[u8], on_line: &mut impl FnMut(&str) -> bool) -> bool {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return true;
    }
    on_line(line)
}

/// Forward lines to the channel until the stream ends or fails
fn read_lines(reader: impl BufRead, tx: &Sender<SerialMsg>) {
    let result = read_lossy_lines(reader, |line| {
        log::debug!("< {line}");
        tx.send(SerialMsg::Line(line.to_string())).is_ok()
    });
    let reason = match result {
        Ok(()) => "end of stream".to_string(),
        Err(e) => e.to_string(),
    };
    let _ = tx.send(SerialMsg::Disconnected(reason));
}

/// Hand every received line to `on_line` until nothing arrives for `idle`
/// or the port goes away. Returns the number of lines seen.
pub fn collect_lines(
    rx: &Receiver<SerialMsg>,
    idle: Duration,
    mut on_line: impl FnMut(&str),
) -> usize {
    let mut count = 0;
    loop {
        match rx.recv_timeout(idle) {
            Ok(SerialMsg::Line(line)) => {
                on_line(&line);
                count += 1;
            }
            Ok(SerialMsg::Connected(port)) => log::debug!("Reader started on {port}"),
            Ok(SerialMsg::Disconnected(reason)) => {
                log::info!("Disconnected: {reason}");
                break;
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    count
}

/// Enumerate available serial ports
pub fn list_ports() -> Vec<String> {
    let mut ports = Vec::new();

    // System serial port API
    if let Ok(system_ports) = serialport::available_ports() {
        for p in system_ports {
            ports.push(p.port_name);
        }
    }

    // Fallback: scan /dev
    if ports.is_empty() {
        for pattern in &["ttyUSB", "ttyACM"] {
            if let Ok(entries) = std::fs::read_dir("/dev") {
                for entry in entries.flatten() {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if name.starts_with(pattern) {
                        ports.push(format!("/dev/{name}"));
                    }
                }
            }
        }
    }

    ports.sort();
    ports
}
