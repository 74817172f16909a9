//! IO device read and write blocks.
//!
//! Both bind to a device by the "Device" field during `prepare()` and run
//! their transfer on a worker thread. A stop request cannot interrupt a
//! transfer in progress; the worker reports `Stopped` once it returns.

use super::{block_name_param, params_root};
use crate::device::{lock_device, SharedDevice};
use crate::params::{ConfigParam, ParamState, ParamType};
use crate::scenario::block::{
    Block, BlockCore, BlockError, LogLevel, PortData, PrepareContext, BLOCK_NAME_PARAM,
    RUN_LOG_TARGET,
};
use crate::scenario::block_kind::BlockKind;
use crate::scenario::completion::CompletionHandle;
use crate::scenario::port::Port;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

const DEVICE_PARAM: &str = "Device";
const READ_LENGTH_PARAM: &str = "Read length";
const DATA_IN: &str = "dataIn";
const DATA_OUT: &str = "dataOut";

/// Run-scoped binding shared by both device blocks.
#[derive(Default)]
struct DeviceBinding {
    device: Option<SharedDevice>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl DeviceBinding {
    fn bind(&mut self, core: &BlockCore, ctx: &PrepareContext<'_>) -> bool {
        self.release();
        let name = core.params().sub_value(DEVICE_PARAM).unwrap_or_default();
        match ctx.devices.get(name) {
            Some(device) => {
                tracing::debug!(block = core.title(), device = name, "Bound IO device");
                self.device = Some(device);
                true
            }
            None => {
                core.log(LogLevel::Error, format!("IO device '{}' is not available", name));
                false
            }
        }
    }

    fn is_busy(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Start `transfer` on a worker thread, reporting through `completion`.
    fn spawn<F>(
        &mut self,
        block: String,
        completion: CompletionHandle,
        transfer: F,
    ) -> Result<(), BlockError>
    where
        F: FnOnce(&SharedDevice) -> Result<PortData, BlockError> + Send + 'static,
    {
        let device = self
            .device
            .clone()
            .ok_or_else(|| BlockError::NotPrepared("no IO device bound".into()))?;
        if self.is_busy() {
            return Err(BlockError::Failed("Previous transfer still running".into()));
        }
        self.join();

        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        self.worker = Some(std::thread::spawn(move || {
            if stop.load(Ordering::SeqCst) {
                completion.stopped();
                return;
            }
            let result = transfer(&device);
            if stop.load(Ordering::SeqCst) {
                completion.stopped();
                return;
            }
            match result {
                Ok(outputs) => completion.finish(outputs),
                Err(e) => {
                    tracing::error!(target: RUN_LOG_TARGET, block = block.as_str(), "{}", e);
                    completion.fail(e.to_string());
                }
            }
        }));
        Ok(())
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("IO device worker panicked");
            }
        }
    }

    fn release(&mut self) {
        self.request_stop();
        self.join();
        self.device = None;
    }
}

fn device_params(kind: BlockKind, default_name: &str) -> ConfigParam {
    params_root(kind.display_name())
        .with_sub(block_name_param(default_name))
        .with_sub(ConfigParam::new(
            DEVICE_PARAM,
            "",
            ParamType::String,
            "Name of the IO device to use.",
        ))
}

fn store_device_params(core: &mut BlockCore, params: ConfigParam, required: &[&str]) -> ConfigParam {
    let mut params = params;
    if !params.has_subs(required) {
        params.set_state(ParamState::Error, "Wrong structure of the pre-init params.");
        return params;
    }

    params.reset_state(true);
    core.params = params;
    core.apply_block_name();

    let device = core.params.sub_value(DEVICE_PARAM).unwrap_or_default().to_string();
    if device.is_empty() {
        if let Some(field) = core.params.sub_mut(DEVICE_PARAM) {
            field.set_state(ParamState::Warning, "No IO device selected.");
        }
    }
    core.set_subtitle(device);
    core.params.clone()
}

// ── Read ──

pub struct IoDeviceReadBlock {
    core: BlockCore,
    binding: DeviceBinding,
}

impl IoDeviceReadBlock {
    pub fn new() -> Self {
        let kind = BlockKind::IoDeviceRead;
        let params = device_params(kind, "IO device read").with_sub(ConfigParam::new(
            READ_LENGTH_PARAM,
            "1",
            ParamType::UInt,
            "Number of bytes to read.",
        ));
        Self {
            core: BlockCore::new(kind.display_name(), kind.description())
                .with_params(params)
                .with_port(Port::flow_input("flowIn"))
                .with_port(Port::flow_output("flowOut"))
                .with_port(
                    Port::data_output(DATA_OUT)
                        .with_description("Data read from the device.")
                        .with_type_hint("byte array"),
                ),
            binding: DeviceBinding::default(),
        }
    }

    fn read_length(&self) -> Option<usize> {
        self.core
            .params()
            .sub_value(READ_LENGTH_PARAM)?
            .trim()
            .parse()
            .ok()
    }
}

impl Default for IoDeviceReadBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Block for IoDeviceReadBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::IoDeviceRead
    }

    fn core(&self) -> &BlockCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BlockCore {
        &mut self.core
    }

    fn clone_block(&self) -> Box<dyn Block> {
        Box::new(Self {
            core: self.core.clone(),
            binding: DeviceBinding::default(),
        })
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[BLOCK_NAME_PARAM, DEVICE_PARAM, READ_LENGTH_PARAM]
    }

    fn set_params(&mut self, params: ConfigParam) -> ConfigParam {
        let required = self.required_params();
        store_device_params(&mut self.core, params, required)
    }

    fn prepare(&mut self, ctx: &PrepareContext<'_>) -> bool {
        if self.read_length().is_none() {
            self.core.log(LogLevel::Error, "Invalid read length");
            return false;
        }
        self.binding.bind(&self.core, ctx)
    }

    fn cleanup(&mut self) -> bool {
        self.binding.release();
        true
    }

    fn execute(&mut self, _inputs: &PortData, completion: CompletionHandle) -> Result<(), BlockError> {
        let len = self
            .read_length()
            .ok_or_else(|| BlockError::Failed("Invalid read length".into()))?;
        let block = self.core.title().to_string();

        self.binding.spawn(block.clone(), completion, move |device| {
            let data = lock_device(device)?.read(len)?;
            tracing::info!(
                target: RUN_LOG_TARGET,
                block = block.as_str(),
                "Read {} bytes",
                data.len()
            );
            let mut outputs = PortData::new();
            outputs.insert(DATA_OUT.to_string(), data);
            Ok(outputs)
        })
    }

    fn stop_execution(&mut self) {
        self.binding.request_stop();
    }
}

impl Drop for IoDeviceReadBlock {
    fn drop(&mut self) {
        self.binding.release();
    }
}

// ── Write ──

pub struct IoDeviceWriteBlock {
    core: BlockCore,
    binding: DeviceBinding,
}

impl IoDeviceWriteBlock {
    pub fn new() -> Self {
        let kind = BlockKind::IoDeviceWrite;
        Self {
            core: BlockCore::new(kind.display_name(), kind.description())
                .with_params(device_params(kind, "IO device write"))
                .with_port(Port::flow_input("flowIn"))
                .with_port(Port::flow_output("flowOut"))
                .with_port(
                    Port::data_input(DATA_IN)
                        .with_description("Data written to the device.")
                        .with_type_hint("byte array"),
                ),
            binding: DeviceBinding::default(),
        }
    }
}

impl Default for IoDeviceWriteBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Block for IoDeviceWriteBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::IoDeviceWrite
    }

    fn core(&self) -> &BlockCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BlockCore {
        &mut self.core
    }

    fn clone_block(&self) -> Box<dyn Block> {
        Box::new(Self {
            core: self.core.clone(),
            binding: DeviceBinding::default(),
        })
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[BLOCK_NAME_PARAM, DEVICE_PARAM]
    }

    fn set_params(&mut self, params: ConfigParam) -> ConfigParam {
        let required = self.required_params();
        store_device_params(&mut self.core, params, required)
    }

    fn prepare(&mut self, ctx: &PrepareContext<'_>) -> bool {
        self.binding.bind(&self.core, ctx)
    }

    fn cleanup(&mut self) -> bool {
        self.binding.release();
        true
    }

    fn execute(&mut self, inputs: &PortData, completion: CompletionHandle) -> Result<(), BlockError> {
        let data = inputs
            .get(DATA_IN)
            .cloned()
            .ok_or_else(|| BlockError::MissingInput(DATA_IN.to_string()))?;
        let block = self.core.title().to_string();

        self.binding.spawn(block.clone(), completion, move |device| {
            let written = lock_device(device)?.write(&data)?;
            if written != data.len() {
                return Err(BlockError::Failed(format!(
                    "Device accepted {} of {} bytes",
                    written,
                    data.len()
                )));
            }
            tracing::info!(
                target: RUN_LOG_TARGET,
                block = block.as_str(),
                "Wrote {} bytes",
                written
            );
            Ok(PortData::new())
        })
    }

    fn stop_execution(&mut self) {
        self.binding.request_stop();
    }
}

impl Drop for IoDeviceWriteBlock {
    fn drop(&mut self) {
        self.binding.release();
    }
}
