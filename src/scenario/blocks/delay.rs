//! Delay block: waits "Length" seconds on a worker thread.

use super::{block_name_param, params_root};
use crate::params::{ConfigParam, ParamState, ParamType};
use crate::scenario::block::{
    Block, BlockCore, BlockError, LogLevel, PortData, BLOCK_NAME_PARAM, RUN_LOG_TARGET,
};
use crate::scenario::block_kind::BlockKind;
use crate::scenario::completion::CompletionHandle;
use crate::scenario::port::Port;
use crossbeam_channel::{after, bounded, select, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

const LENGTH_PARAM: &str = "Length";

/// A running delay: dropping `stop_tx` wakes the worker early.
struct PendingDelay {
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

pub struct DelayBlock {
    core: BlockCore,
    pending: Option<PendingDelay>,
}

impl DelayBlock {
    pub fn new() -> Self {
        let kind = BlockKind::Delay;
        let params = params_root(kind.display_name())
            .with_sub(block_name_param("Delay"))
            .with_sub(ConfigParam::new(
                LENGTH_PARAM,
                "3",
                ParamType::Real,
                "Length of delay in seconds.",
            ));
        Self {
            core: BlockCore::new(kind.display_name(), kind.description())
                .with_params(params)
                .with_subtitle("3s")
                .with_port(Port::flow_input("flowIn"))
                .with_port(
                    Port::flow_output("flowOut")
                        .with_label("done")
                        .with_description("Flow continues through this port after set delay."),
                ),
            pending: None,
        }
    }

    fn length(&self) -> Option<Duration> {
        let seconds = self
            .core
            .params()
            .sub_value(LENGTH_PARAM)?
            .trim()
            .parse::<f64>()
            .ok()?;
        Duration::try_from_secs_f64(seconds).ok()
    }

    /// Whether a delay is currently running.
    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .and_then(|p| p.worker.as_ref())
            .is_some_and(|w| !w.is_finished())
    }
}

impl Default for DelayBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DelayBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayBlock")
            .field("core", &self.core)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

impl Block for DelayBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::Delay
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
            pending: None,
        })
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[BLOCK_NAME_PARAM, LENGTH_PARAM]
    }

    fn set_params(&mut self, params: ConfigParam) -> ConfigParam {
        let mut params = params;
        if !self.validate_params_structure(&params) {
            params.set_state(ParamState::Error, "Wrong structure of the pre-init params.");
            return params;
        }

        params.reset_state(true);
        self.core.params = params;
        self.core.apply_block_name();

        if self.length().is_none() {
            if let Some(field) = self.core.params.sub_mut(LENGTH_PARAM) {
                field.set_state(ParamState::Error, "Invalid value.");
            }
        }
        let subtitle = format!(
            "{}s",
            self.core.params.sub_value(LENGTH_PARAM).unwrap_or_default()
        );
        self.core.set_subtitle(subtitle);

        self.core.params.clone()
    }

    fn execute(&mut self, _inputs: &PortData, completion: CompletionHandle) -> Result<(), BlockError> {
        let Some(length) = self.length() else {
            self.core.log(LogLevel::Error, "Failed to delay: length invalid...");
            return Err(BlockError::Failed("Delay length invalid".into()));
        };
        if self.is_pending() {
            self.core.log(LogLevel::Error, "Failed to delay: could not start timer...");
            return Err(BlockError::Failed("Delay already running".into()));
        }
        self.cleanup();

        self.core.log(LogLevel::Info, "Starting delay...");
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let block = self.core.title().to_string();

        let worker = std::thread::spawn(move || {
            select! {
                recv(after(length)) -> _ => {
                    tracing::info!(target: RUN_LOG_TARGET, block = block.as_str(), "Delay over.");
                    completion.finish_empty();
                }
                recv(stop_rx) -> _ => {
                    tracing::info!(target: RUN_LOG_TARGET, block = block.as_str(), "Delay stopped.");
                    completion.stopped();
                }
            }
        });

        self.pending = Some(PendingDelay {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        });
        Ok(())
    }

    fn stop_execution(&mut self) {
        if let Some(pending) = self.pending.as_mut() {
            pending.stop_tx.take();
        }
    }

    fn cleanup(&mut self) -> bool {
        if let Some(mut pending) = self.pending.take() {
            pending.stop_tx.take();
            if let Some(worker) = pending.worker.take() {
                if worker.join().is_err() {
                    tracing::warn!("Delay worker panicked");
                }
            }
        }
        true
    }
}

impl Drop for DelayBlock {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::block::apply_params;
    use crate::scenario::completion::Completion;

    fn with_length(seconds: &str) -> DelayBlock {
        let mut block = DelayBlock::new();
        let mut params = block.params().clone();
        params.sub_mut(LENGTH_PARAM).unwrap().set_value(seconds).unwrap();
        apply_params(&mut block, params);
        block
    }

    #[test]
    fn test_short_delay_finishes() {
        let mut block = with_length("0.01");
        assert_eq!(block.core().subtitle(), "0.01s");
        let (handle, rx) = CompletionHandle::channel();
        block.execute(&PortData::new(), handle).unwrap();

        let completion = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(completion, Completion::Finished(PortData::new()));
        assert!(block.cleanup());
        assert!(block.cleanup());
    }

    #[test]
    fn test_stop_wakes_long_delay() {
        let mut block = with_length("60");
        let (handle, rx) = CompletionHandle::channel();
        block.execute(&PortData::new(), handle).unwrap();
        assert!(block.is_pending());

        block.stop_execution();
        let completion = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(completion, Completion::Stopped);
        block.cleanup();
        assert!(!block.is_pending());
    }

    #[test]
    fn test_negative_length_rejected() {
        let mut block = with_length("-1");
        assert_eq!(
            block.params().sub(LENGTH_PARAM).unwrap().state(),
            ParamState::Error
        );
        let (handle, _rx) = CompletionHandle::channel();
        assert!(block.execute(&PortData::new(), handle).is_err());
    }

    #[test]
    fn test_not_immediate() {
        let mut block = DelayBlock::new();
        assert!(!block.supports_immediate_execution());
        assert!(block.execute_immediate(&PortData::new()).is_err());
    }
}
