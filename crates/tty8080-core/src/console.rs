use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::bus::IoDevice;
use crate::error::{ConsoleError, Notifier};
use crate::queue::InboundQueue;
use crate::settings::{ConnectionSettings, SettingsStore, DEFAULT_PROFILE};
use crate::transport::{InboundEvent, InboundHandler, SerialTransport, TransportSession};

/// CPU port addresses the console answers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMap {
    pub data_in: u8,
    pub data_out: u8,
    pub status: u8,
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub name: String,
    pub ports: PortMap,
    /// Settings profile loaded at construction and saved after each open.
    pub profile: String,
    /// `None` makes a data-port read wait for as long as it takes.
    pub read_timeout: Option<Duration>,
}

impl ConsoleConfig {
    pub fn new(ports: PortMap) -> Self {
        Self {
            name: "tty".to_string(),
            ports,
            profile: DEFAULT_PROFILE.to_string(),
            read_timeout: None,
        }
    }
}

/// Serial console peripheral.
///
/// CPU writes go straight out over the transport. Inbound bytes are queued
/// and handed to the CPU one at a time through the data port, while the
/// status port reports how many are waiting.
pub struct Console {
    config: ConsoleConfig,
    settings: Mutex<ConnectionSettings>,
    store: SettingsStore,
    transport: Box<dyn SerialTransport>,
    session: Mutex<Option<Box<dyn TransportSession>>>,
    inbound: Arc<InboundQueue>,
    notifier: Notifier,
}

impl Console {
    /// Builds a disconnected console with settings loaded from `store`.
    pub fn new(
        config: ConsoleConfig,
        store: SettingsStore,
        transport: Box<dyn SerialTransport>,
        notifier: Notifier,
    ) -> Self {
        let settings = store.load(&config.profile);
        Self {
            config,
            settings: Mutex::new(settings),
            store,
            transport,
            session: Mutex::new(None),
            inbound: Arc::new(InboundQueue::new()),
            notifier,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn ports(&self) -> PortMap {
        self.config.ports
    }

    pub fn settings(&self) -> ConnectionSettings {
        self.settings.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Number of queued inbound bytes, without the status port's cap.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    pub fn byte_from_cpu(&self, _address: u8, value: u8) {
        let mut session = self.session.lock();
        let Some(session) = session.as_mut() else {
            self.notifier.report(ConsoleError::NotConnected {
                port: self.settings.lock().port_name.clone(),
            });
            return;
        };

        log::trace!("{} <- cpu {value:02X}", self.config.name);
        if let Err(e) = session.write_byte(value) {
            self.notifier.report(ConsoleError::TransportWriteFailed {
                device: self.config.name.clone(),
                port: session.port_name().to_string(),
                value,
                reason: e.to_string(),
            });
        }
    }

    pub fn byte_to_cpu(&self, address: u8) -> u8 {
        let ports = self.config.ports;
        if address == ports.data_in {
            self.read_data()
        } else if address == ports.status {
            self.inbound.len().min(u8::MAX as usize) as u8
        } else {
            0
        }
    }

    fn read_data(&self) -> u8 {
        let byte = match self.config.read_timeout {
            Some(timeout) => self.inbound.pop_timeout(timeout).ok_or_else(|| {
                ConsoleError::ReadTimedOut {
                    device: self.config.name.clone(),
                    timeout,
                }
            }),
            None => self.inbound.pop().ok_or_else(|| ConsoleError::ReadCancelled {
                device: self.config.name.clone(),
            }),
        };

        match byte {
            Ok(byte) => {
                log::trace!("{} -> cpu {byte:02X}", self.config.name);
                byte
            }
            Err(err) => {
                log::debug!("{err}");
                0
            }
        }
    }

    /// Releases a CPU thread blocked on the data port; the read yields 0.
    pub fn cancel_pending_read(&self) {
        self.inbound.cancel_waiters();
    }

    /// Opens a session with the current settings, replacing any open one.
    /// The settings are saved once the port is open.
    pub fn open_connection(&self) -> Result<(), ConsoleError> {
        let mut session = self.session.lock();
        if let Some(previous) = session.take() {
            let _ = self.close_session(previous);
        }

        let settings = self.settings();
        let inbound = self.inbound.clone();
        let name = self.config.name.clone();
        let handler: InboundHandler = Arc::new(move |event: InboundEvent| match event {
            InboundEvent::Data(bytes) => inbound.push_all(&bytes),
            InboundEvent::LineState { line, level } => {
                log::info!("{name}: {line} - {}", if level { "On" } else { "Off" });
            }
        });

        match self.transport.open(&settings, handler) {
            Ok(opened) => {
                log::debug!("{}: connected {settings}", self.config.name);
                *session = Some(opened);
                drop(session);
                // Save failures are reported by the store; the port stays open.
                let _ = self.store.save(&self.config.profile, &settings);
                Ok(())
            }
            Err(e) => {
                let err = ConsoleError::TransportOpenFailed {
                    port: settings.port_name,
                    reason: e.to_string(),
                };
                self.notifier.report(err.clone());
                Err(err)
            }
        }
    }

    /// Closes the open session, if any. The console ends up disconnected
    /// even when the transport complains.
    pub fn close_connection(&self) -> Result<(), ConsoleError> {
        match self.session.lock().take() {
            Some(session) => self.close_session(session),
            None => Ok(()),
        }
    }

    fn close_session(&self, session: Box<dyn TransportSession>) -> Result<(), ConsoleError> {
        let port = session.port_name().to_string();
        match session.close() {
            Ok(()) => {
                log::debug!("{}: closed {port}", self.config.name);
                Ok(())
            }
            Err(e) => {
                let err = ConsoleError::TransportCloseFailed {
                    port,
                    reason: e.to_string(),
                };
                self.notifier.report(err.clone());
                Err(err)
            }
        }
    }

    /// Close, swap in `settings`, reopen.
    pub fn reconfigure(&self, settings: ConnectionSettings) -> Result<(), ConsoleError> {
        // A failed close is already reported and must not block the reopen.
        let _ = self.close_connection();
        *self.settings.lock() = settings;
        self.open_connection()
    }
}

impl IoDevice for Console {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn port_list(&self) -> (Vec<u8>, Vec<u8>) {
        let ports = self.config.ports;
        (vec![ports.data_in, ports.status], vec![ports.data_out])
    }

    fn byte_from_cpu(&self, address: u8, value: u8) {
        Console::byte_from_cpu(self, address, value)
    }

    fn byte_to_cpu(&self, address: u8) -> u8 {
        Console::byte_to_cpu(self, address)
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        let _ = self.close_connection();
    }
}
