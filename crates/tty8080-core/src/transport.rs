//! The seam between the console device and whatever actually moves bytes.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::settings::ConnectionSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    Cts,
    Dsr,
    Dcd,
    Ri,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Line::Cts => "CTS",
            Line::Dsr => "DSR",
            Line::Dcd => "DCD",
            Line::Ri => "RI",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Bytes read from the wire, oldest first.
    Data(Vec<u8>),
    LineState { line: Line, level: bool },
}

/// Called from a transport-managed thread for every inbound event.
pub type InboundHandler = Arc<dyn Fn(InboundEvent) + Send + Sync>;

pub trait SerialTransport: Send + Sync {
    fn open(
        &self,
        settings: &ConnectionSettings,
        handler: InboundHandler,
    ) -> Result<Box<dyn TransportSession>, TransportError>;
}

/// An open connection. Dropping a session without calling
/// [`close`](TransportSession::close) still releases it, but any close
/// error is lost.
pub trait TransportSession: Send {
    fn port_name(&self) -> &str;

    fn write_byte(&mut self, byte: u8) -> Result<(), TransportError>;

    fn close(self: Box<Self>) -> Result<(), TransportError>;
}

#[derive(Default)]
struct Wire {
    handler: Option<InboundHandler>,
    written: Vec<u8>,
    opens: usize,
    echo: bool,
    fail_open: Option<String>,
    fail_write: Option<String>,
    fail_close: Option<String>,
}

/// In-process transport. Written bytes are recorded (and optionally echoed
/// back), inbound traffic is injected by hand.
///
/// Clones share the same wire, so a test can keep one handle while the
/// console owns another.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    wire: Arc<Mutex<Wire>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every byte written is delivered straight back as inbound data.
    pub fn loopback() -> Self {
        let transport = Self::default();
        transport.wire.lock().echo = true;
        transport
    }

    pub fn fail_open(&self, reason: Option<&str>) {
        self.wire.lock().fail_open = reason.map(str::to_string);
    }

    pub fn fail_write(&self, reason: Option<&str>) {
        self.wire.lock().fail_write = reason.map(str::to_string);
    }

    pub fn fail_close(&self, reason: Option<&str>) {
        self.wire.lock().fail_close = reason.map(str::to_string);
    }

    pub fn is_open(&self) -> bool {
        self.wire.lock().handler.is_some()
    }

    pub fn open_count(&self) -> usize {
        self.wire.lock().opens
    }

    pub fn written(&self) -> Vec<u8> {
        self.wire.lock().written.clone()
    }

    /// Delivers bytes as if they had just arrived. Returns `false` when no
    /// session is open.
    pub fn inject(&self, bytes: &[u8]) -> bool {
        self.deliver(InboundEvent::Data(bytes.to_vec()))
    }

    pub fn set_line(&self, line: Line, level: bool) -> bool {
        self.deliver(InboundEvent::LineState { line, level })
    }

    fn deliver(&self, event: InboundEvent) -> bool {
        // Call the handler outside the lock, it may re-enter the transport.
        let handler = self.wire.lock().handler.clone();
        match handler {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }
}

impl SerialTransport for MemoryTransport {
    fn open(
        &self,
        settings: &ConnectionSettings,
        handler: InboundHandler,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        let mut wire = self.wire.lock();
        if let Some(reason) = &wire.fail_open {
            return Err(TransportError::Injected(reason.clone()));
        }
        wire.handler = Some(handler);
        wire.opens += 1;
        Ok(Box::new(MemorySession {
            port_name: settings.port_name.clone(),
            transport: self.clone(),
        }))
    }
}

struct MemorySession {
    port_name: String,
    transport: MemoryTransport,
}

impl TransportSession for MemorySession {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        let echo = {
            let mut wire = self.transport.wire.lock();
            if let Some(reason) = &wire.fail_write {
                return Err(TransportError::Injected(reason.clone()));
            }
            wire.written.push(byte);
            wire.echo
        };
        if echo {
            self.transport.inject(&[byte]);
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), TransportError> {
        let mut wire = self.transport.wire.lock();
        wire.handler = None;
        match &wire.fail_close {
            Some(reason) => Err(TransportError::Injected(reason.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_handler() -> (InboundHandler, Arc<Mutex<Vec<InboundEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (Arc::new(move |event| sink.lock().push(event)), seen)
    }

    #[test]
    fn inject_reaches_open_session_only() {
        let transport = MemoryTransport::new();
        assert!(!transport.inject(b"x"));

        let (handler, seen) = recording_handler();
        let session = transport
            .open(&ConnectionSettings::default(), handler)
            .unwrap();
        assert!(transport.inject(b"AB"));
        assert!(transport.set_line(Line::Cts, true));

        session.close().unwrap();
        assert!(!transport.inject(b"C"));
        assert_eq!(
            *seen.lock(),
            vec![
                InboundEvent::Data(b"AB".to_vec()),
                InboundEvent::LineState { line: Line::Cts, level: true },
            ]
        );
    }

    #[test]
    fn loopback_echoes_writes() {
        let transport = MemoryTransport::loopback();
        let (handler, seen) = recording_handler();
        let mut session = transport
            .open(&ConnectionSettings::default(), handler)
            .unwrap();

        session.write_byte(0x55).unwrap();
        assert_eq!(transport.written(), vec![0x55]);
        assert_eq!(*seen.lock(), vec![InboundEvent::Data(vec![0x55])]);
    }

    #[test]
    fn injected_failures_surface_as_errors() {
        let transport = MemoryTransport::new();
        transport.fail_open(Some("port busy"));
        let (handler, _) = recording_handler();
        assert!(transport
            .open(&ConnectionSettings::default(), handler.clone())
            .is_err());

        transport.fail_open(None);
        transport.fail_write(Some("cable pulled"));
        let mut session = transport
            .open(&ConnectionSettings::default(), handler)
            .unwrap();
        assert!(matches!(
            session.write_byte(1),
            Err(TransportError::Injected(reason)) if reason == "cable pulled"
        ));
        assert!(transport.written().is_empty());
    }
}
