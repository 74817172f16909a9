//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod devices;

use scenario_engine::config::RunnerSettings;
use std::time::Duration;

/// Runner settings with a short stop grace so cancelled tests finish fast.
pub fn fast_settings() -> RunnerSettings {
    RunnerSettings {
        completion_poll_ms: 1,
        stop_grace_ms: 500,
        ..RunnerSettings::default()
    }
}

/// Upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}
