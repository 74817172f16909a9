//! Device capability used by hardware-bound blocks.
//!
//! The scenario core treats devices as opaque: they accept and return byte
//! buffers, may fail, and may be slow. Blocks resolve a device by name from
//! the run's `DeviceRegistry` during `prepare()` and call into it from their
//! asynchronous step.

pub mod loopback;

pub use loopback::LoopbackDevice;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors reported by a device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device '{0}' is not initialized")]
    NotInitialized(String),

    #[error("Device I/O failed: {0}")]
    Io(String),

    #[error("Device timed out after {0} ms")]
    Timeout(u64),

    #[error("Device lock poisoned")]
    Poisoned,
}

/// Byte-oriented I/O device (serial port, smartcard reader, file, ...).
#[cfg_attr(test, mockall::automock)]
pub trait IoDevice: Send {
    /// Human-readable device name.
    fn name(&self) -> String;

    fn init(&mut self) -> Result<(), DeviceError>;

    fn deinit(&mut self) -> Result<(), DeviceError>;

    /// Write `data`, returning the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, DeviceError>;

    /// Read up to `len` bytes.
    fn read(&mut self, len: usize) -> Result<Vec<u8>, DeviceError>;
}

/// A device shared between the registry and the blocks bound to it.
pub type SharedDevice = Arc<Mutex<dyn IoDevice>>;

/// Lock a shared device, mapping poisoning to a device error.
pub fn lock_device(device: &SharedDevice) -> Result<MutexGuard<'_, dyn IoDevice + 'static>, DeviceError> {
    device.lock().map_err(|_| DeviceError::Poisoned)
}

/// Devices available to a run, keyed by the name blocks refer to them by.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, SharedDevice>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device under `name`, replacing any previous one.
    pub fn register<D: IoDevice + 'static>(&mut self, name: impl Into<String>, device: D) -> SharedDevice {
        let shared: SharedDevice = Arc::new(Mutex::new(device));
        self.devices.insert(name.into(), shared.clone());
        shared
    }

    pub fn get(&self, name: &str) -> Option<SharedDevice> {
        self.devices.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.devices.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.is_empty());

        registry.register("serial0", LoopbackDevice::new("serial0"));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("serial0").is_some());
        assert!(registry.get("serial1").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["serial0"]);
    }

    #[test]
    fn test_shared_device_is_same_instance() {
        let mut registry = DeviceRegistry::new();
        let handle = registry.register("dev", LoopbackDevice::new("dev"));

        {
            let mut dev = lock_device(&handle).unwrap();
            dev.init().unwrap();
            dev.write(b"abc").unwrap();
        }

        let from_registry = registry.get("dev").unwrap();
        let mut dev = lock_device(&from_registry).unwrap();
        assert_eq!(dev.read(3).unwrap(), b"abc".to_vec());
    }
}
