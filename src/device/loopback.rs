//! In-memory loopback device.
//!
//! Bytes written become readable in FIFO order. Used by the CLI's
//! `--loopback` option and by tests that need a device without hardware.

use crate::device::{DeviceError, IoDevice};
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct LoopbackDevice {
    name: String,
    initialized: bool,
    buffer: VecDeque<u8>,
    bytes_written: u64,
    bytes_read: u64,
}

impl LoopbackDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Queue bytes as if the remote end had sent them.
    pub fn preload(&mut self, data: &[u8]) {
        self.buffer.extend(data.iter().copied());
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    fn ensure_initialized(&self) -> Result<(), DeviceError> {
        if self.initialized {
            Ok(())
        } else {
            Err(DeviceError::NotInitialized(self.name.clone()))
        }
    }
}

impl IoDevice for LoopbackDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn init(&mut self) -> Result<(), DeviceError> {
        self.initialized = true;
        tracing::debug!("Loopback device '{}' initialized", self.name);
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), DeviceError> {
        self.initialized = false;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, DeviceError> {
        self.ensure_initialized()?;
        self.buffer.extend(data.iter().copied());
        self.bytes_written += data.len() as u64;
        Ok(data.len())
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>, DeviceError> {
        self.ensure_initialized()?;
        let count = len.min(self.buffer.len());
        let data: Vec<u8> = self.buffer.drain(..count).collect();
        self.bytes_read += data.len() as u64;
        Ok(data)
    }
}
