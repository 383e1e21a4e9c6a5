use std::collections::HashMap;
use std::sync::Arc;

use crate::error::BusError;

/// A peripheral attached to the CPU's I/O port space.
pub trait IoDevice: Send + Sync {
    fn name(&self) -> &str;

    /// Ports the device answers on, as `(inputs, outputs)`.
    fn port_list(&self) -> (Vec<u8>, Vec<u8>);

    fn byte_from_cpu(&self, address: u8, value: u8);

    fn byte_to_cpu(&self, address: u8) -> u8;
}

/// Routes CPU `IN`/`OUT` instructions to registered devices.
#[derive(Default)]
pub struct IoBus {
    devices: Vec<Arc<dyn IoDevice>>,
    inputs: HashMap<u8, usize>,
    outputs: HashMap<u8, usize>,
}

impl IoBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `device`. Nothing is registered if any of its ports is
    /// already taken in the same direction.
    pub fn register(&mut self, device: Arc<dyn IoDevice>) -> Result<(), BusError> {
        let (inputs, outputs) = device.port_list();
        for (ports, taken) in [(&inputs, &self.inputs), (&outputs, &self.outputs)] {
            if let Some(&port) = ports.iter().find(|port| taken.contains_key(*port)) {
                return Err(BusError::PortInUse {
                    port,
                    owner: self.devices[taken[&port]].name().to_string(),
                });
            }
        }

        let index = self.devices.len();
        log::debug!("attached {} in {inputs:02X?} out {outputs:02X?}", device.name());
        self.inputs.extend(inputs.into_iter().map(|port| (port, index)));
        self.outputs.extend(outputs.into_iter().map(|port| (port, index)));
        self.devices.push(device);
        Ok(())
    }

    pub fn input(&self, port: u8) -> u8 {
        match self.inputs.get(&port) {
            Some(&index) => self.devices[index].byte_to_cpu(port),
            None => {
                log::trace!("IN from unmapped port {port:02X}");
                0
            }
        }
    }

    pub fn output(&self, port: u8, value: u8) {
        match self.outputs.get(&port) {
            Some(&index) => self.devices[index].byte_from_cpu(port, value),
            None => log::trace!("OUT {value:02X} to unmapped port {port:02X} ignored"),
        }
    }
}
