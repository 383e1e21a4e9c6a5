use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use serialport::{SerialPort, SerialPortInfo};
use std::io::{ErrorKind, Read, Write};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::TransportError;
use crate::settings::{ConnectionSettings, DataBits, Parity, StopBits};
use crate::transport::{InboundEvent, InboundHandler, Line, SerialTransport, TransportSession};

const READ_TIMEOUT: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct PortInfo {
    pub port_name: String,
    pub port_type: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (port_type, vid, pid, manufacturer, product) = match &info.port_type {
            serialport::SerialPortType::UsbPort(usb) => (
                "USB".to_string(),
                Some(usb.vid),
                Some(usb.pid),
                usb.manufacturer.clone(),
                usb.product.clone(),
            ),
            serialport::SerialPortType::PciPort => ("PCI".to_string(), None, None, None, None),
            serialport::SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None, None, None, None),
            serialport::SerialPortType::Unknown => ("Unknown".to_string(), None, None, None, None),
        };
        Self {
            port_name: info.port_name,
            port_type,
            vid,
            pid,
            manufacturer,
            product,
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

impl TryFrom<StopBits> for serialport::StopBits {
    type Error = TransportError;

    fn try_from(bits: StopBits) -> Result<Self, Self::Error> {
        match bits {
            StopBits::One => Ok(serialport::StopBits::One),
            StopBits::Two => Ok(serialport::StopBits::Two),
            StopBits::OnePointFive => Err(TransportError::Unsupported("1.5 stop bits".into())),
        }
    }
}

impl TryFrom<Parity> for serialport::Parity {
    type Error = TransportError;

    fn try_from(parity: Parity) -> Result<Self, Self::Error> {
        match parity {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Even => Ok(serialport::Parity::Even),
            Parity::Mark | Parity::Space => {
                Err(TransportError::Unsupported(format!("{parity} parity")))
            }
        }
    }
}

/// Talks to an OS serial port through the `serialport` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortTransport;

impl SerialPortTransport {
    pub fn list_ports() -> Vec<PortInfo> {
        serialport::available_ports()
            .unwrap_or_default()
            .into_iter()
            .map(PortInfo::from)
            .collect()
    }
}

impl SerialTransport for SerialPortTransport {
    fn open(
        &self,
        settings: &ConnectionSettings,
        handler: InboundHandler,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        let port = serialport::new(&settings.port_name, settings.baud_rate)
            .data_bits(settings.data_bits.into())
            .parity(settings.parity.try_into()?)
            .stop_bits(settings.stop_bits.try_into()?)
            .flow_control(serialport::FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;
        log::debug!("opened {settings}");

        Ok(Box::new(start_session(port, settings.port_name.clone(), handler)?))
    }
}

/// Splits an open port into a writer kept by the session and a reader
/// owned by a worker thread.
fn start_session(
    port: Box<dyn SerialPort>,
    port_name: String,
    handler: InboundHandler,
) -> Result<SerialPortSession, TransportError> {
    let writer = port.try_clone()?;
    let (tx_stop, rx_stop) = bounded::<()>(1);
    let worker = std::thread::Builder::new()
        .name(format!("serial-{port_name}"))
        .spawn(move || pump(port, rx_stop, handler))?;

    Ok(SerialPortSession {
        port_name,
        writer,
        tx_stop,
        worker: Some(worker),
    })
}

fn read_lines(port: &mut dyn SerialPort) -> [(Line, bool); 4] {
    [
        (Line::Cts, port.read_clear_to_send().unwrap_or(false)),
        (Line::Dsr, port.read_data_set_ready().unwrap_or(false)),
        (Line::Dcd, port.read_carrier_detect().unwrap_or(false)),
        (Line::Ri, port.read_ring_indicator().unwrap_or(false)),
    ]
}

/// Worker loop: owns the reading side of the port and forwards reads and
/// line edges to `handler` until a stop is requested.
fn pump(mut port: Box<dyn SerialPort>, rx_stop: Receiver<()>, handler: InboundHandler) -> Result<(), TransportError> {
    let mut lines = read_lines(port.as_mut());
    let mut buf = [0u8; 4096];
    loop {
        match port.read(&mut buf) {
            Ok(n) if n > 0 => handler(InboundEvent::Data(buf[..n].to_vec())),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => {
                log::debug!("read error: {e}");
                std::thread::sleep(READ_TIMEOUT);
            }
        }

        let now = read_lines(port.as_mut());
        for ((line, before), (_, after)) in lines.iter().zip(now.iter()) {
            if before != after {
                handler(InboundEvent::LineState { line: *line, level: *after });
            }
        }
        lines = now;

        match rx_stop.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return Ok(()),
            Err(TryRecvError::Empty) => {}
        }
    }
}

struct SerialPortSession {
    port_name: String,
    writer: Box<dyn SerialPort>,
    tx_stop: Sender<()>,
    worker: Option<JoinHandle<Result<(), TransportError>>>,
}

impl SerialPortSession {
    fn shutdown(&mut self) -> Result<(), TransportError> {
        let _ = self.tx_stop.try_send(());
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| TransportError::Io(std::io::Error::other("serial worker panicked")))?,
            None => Ok(()),
        }
    }
}

impl TransportSession for SerialPortSession {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        if self.worker.is_none() {
            return Err(TransportError::Closed);
        }
        self.writer.write_all(&[byte])?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), TransportError> {
        self.shutdown()
    }
}

impl Drop for SerialPortSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_framing_is_rejected_before_opening() {
        let settings = ConnectionSettings {
            stop_bits: StopBits::OnePointFive,
            ..Default::default()
        };
        let handler: InboundHandler = std::sync::Arc::new(|_: InboundEvent| {});
        let err = SerialPortTransport.open(&settings, handler).err().unwrap();
        assert!(matches!(err, TransportError::Unsupported(_)));
    }

    #[test]
    fn mark_and_space_parity_are_unsupported() {
        assert!(serialport::Parity::try_from(Parity::Mark).is_err());
        assert!(serialport::Parity::try_from(Parity::Space).is_err());
        assert!(matches!(
            serialport::Parity::try_from(Parity::Even),
            Ok(serialport::Parity::Even)
        ));
    }

    #[cfg(unix)]
    mod pty {
        use super::*;
        use parking_lot::Mutex;
        use serialport::TTYPort;
        use std::sync::Arc;
        use std::time::Instant;

        fn session_on_pty() -> (TTYPort, SerialPortSession, Arc<Mutex<Vec<u8>>>) {
            let (mut master, mut slave) = TTYPort::pair().unwrap();
            master.set_timeout(Duration::from_secs(2)).unwrap();
            slave.set_timeout(READ_TIMEOUT).unwrap();

            let received = Arc::new(Mutex::new(Vec::new()));
            let sink = received.clone();
            let handler: InboundHandler = Arc::new(move |event: InboundEvent| {
                if let InboundEvent::Data(bytes) = event {
                    sink.lock().extend(bytes);
                }
            });
            let session = start_session(Box::new(slave), "pty".into(), handler).unwrap();
            (master, session, received)
        }

        #[test]
        fn far_end_bytes_arrive_in_order() {
            let (mut master, session, received) = session_on_pty();
            master.write_all(b"hello").unwrap();
            master.write_all(b", world").unwrap();

            let deadline = Instant::now() + Duration::from_secs(2);
            while received.lock().len() < 12 && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            assert_eq!(*received.lock(), b"hello, world".to_vec());
            Box::new(session).close().unwrap();
        }

        #[test]
        fn writes_reach_far_end_without_waiting_on_reads() {
            let (mut master, mut session, _received) = session_on_pty();
            let sent: Vec<u8> = (0..50u8).collect();

            let start = Instant::now();
            for &b in &sent {
                session.write_byte(b).unwrap();
            }
            // An idle reader used to hold every write for a full read timeout.
            assert!(start.elapsed() < Duration::from_millis(250), "took {:?}", start.elapsed());

            let mut echoed = vec![0u8; sent.len()];
            master.read_exact(&mut echoed).unwrap();
            assert_eq!(echoed, sent);
            Box::new(session).close().unwrap();
        }

        #[test]
        fn close_stops_the_worker() {
            let (_master, session, _received) = session_on_pty();
            let start = Instant::now();
            Box::new(session).close().unwrap();
            assert!(start.elapsed() < Duration::from_secs(1));
        }
    }
}
