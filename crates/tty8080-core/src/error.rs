use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Conditions raised by the console device and its settings store.
///
/// None of these are fatal: they are reported through a [`Notifier`] at the
/// point where they happen and the emulated CPU keeps running.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConsoleError {
    #[error("serial port {port} is not opened")]
    NotConnected { port: String },

    #[error("failed to open serial port {port}: {reason}")]
    TransportOpenFailed { port: String, reason: String },

    #[error("{device}: failed to write byte {value:02X} to port {port}: {reason}")]
    TransportWriteFailed {
        device: String,
        port: String,
        value: u8,
        reason: String,
    },

    #[error("failed to close serial port {port}: {reason}")]
    TransportCloseFailed { port: String, reason: String },

    #[error("could not load {}, will proceed with default settings: {reason}", .path.display())]
    SettingsLoadFailed { path: PathBuf, reason: String },

    #[error("could not save settings to {}: {reason}", .path.display())]
    SettingsSaveFailed { path: PathBuf, reason: String },

    #[error("{device}: no byte arrived within {timeout:?}")]
    ReadTimedOut { device: String, timeout: Duration },

    #[error("{device}: pending read was cancelled")]
    ReadCancelled { device: String },
}

/// Errors coming out of a [`SerialTransport`](crate::SerialTransport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported setting: {0}")]
    Unsupported(String),

    #[error("session is closed")]
    Closed,

    #[error("{0}")]
    Injected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("port {port:#04X} is already used by {owner}")]
    PortInUse { port: u8, owner: String },
}

/// Sink for [`ConsoleError`] reports.
///
/// Every report is logged. When created through [`Notifier::channel`] the
/// report is also forwarded to the returned receiver so a front end can
/// present it.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<Sender<ConsoleError>>,
}

impl Notifier {
    pub fn log_only() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, Receiver<ConsoleError>) {
        let (tx, rx) = unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn report(&self, err: ConsoleError) {
        log::warn!("{err}");
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is listening anymore.
            let _ = tx.send(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_forwards_reports() {
        let (notifier, rx) = Notifier::channel();
        notifier.report(ConsoleError::NotConnected { port: "COM2".into() });
        assert_eq!(
            rx.try_recv().unwrap(),
            ConsoleError::NotConnected { port: "COM2".into() }
        );
    }

    #[test]
    fn report_survives_dropped_receiver() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.report(ConsoleError::ReadCancelled { device: "tty".into() });
    }

    #[test]
    fn write_failure_message_names_byte_and_device() {
        let err = ConsoleError::TransportWriteFailed {
            device: "tty".into(),
            port: "COM2".into(),
            value: 0x41,
            reason: "broken pipe".into(),
        };
        assert_eq!(
            err.to_string(),
            "tty: failed to write byte 41 to port COM2: broken pipe"
        );
    }
}
