//! Device doubles for IO block tests

use scenario_engine::device::{DeviceError, IoDevice};
use std::sync::{Arc, Mutex};

/// Records every write and serves reads from a fixed pattern.
#[derive(Clone, Default)]
pub struct RecordingDevice {
    pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
    pub pattern: Vec<u8>,
    pub fail_with: Option<DeviceError>,
}

impl RecordingDevice {
    pub fn with_pattern(pattern: &[u8]) -> Self {
        Self {
            pattern: pattern.to_vec(),
            ..Self::default()
        }
    }

    pub fn failing(error: DeviceError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::default()
        }
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }
}

impl IoDevice for RecordingDevice {
    fn name(&self) -> String {
        "recording".to_string()
    }

    fn init(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, DeviceError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        self.writes.lock().unwrap().push(data.to_vec());
        Ok(data.len())
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>, DeviceError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        Ok(self.pattern.iter().copied().cycle().take(len).collect())
    }
}
