//! Serial console peripheral for an 8080 emulator: settings persistence,
//! serial transport, inbound byte queue and the CPU-facing device.

pub mod bus;
pub mod console;
pub mod encoding;
pub mod error;
pub mod queue;
pub mod serial_port;
pub mod settings;
pub mod traffic;
pub mod transport;

pub use bus::{IoBus, IoDevice};
pub use console::{Console, ConsoleConfig, PortMap};
pub use encoding::{describe_byte, TextEncoding};
pub use error::{BusError, ConsoleError, Notifier, TransportError};
pub use queue::InboundQueue;
pub use serial_port::{PortInfo, SerialPortTransport};
pub use settings::{ConnectionSettings, DataBits, Parity, SettingsStore, StopBits, DEFAULT_PROFILE};
pub use traffic::{Direction, TrafficEntry, TrafficLog};
pub use transport::{InboundEvent, InboundHandler, Line, MemoryTransport, SerialTransport, TransportSession};

#[cfg(test)]
pub(crate) mod test_util {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    /// Fresh, empty directory under the system temp dir.
    pub fn scratch_dir(tag: &str) -> PathBuf {
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("tty8080-{tag}-{}-{n}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
