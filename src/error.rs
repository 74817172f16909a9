//! Error handling for the scenario engine
//!
//! Edit-time validation never produces these errors: rejected connections
//! and bad parameter values are reported through return values and status.
//! `ScenarioError` covers I/O, persistence, configuration and graph lookups;
//! `RunError` records why a run was aborted.

use crate::scenario::id::BlockId;
use thiserror::Error;

/// Main error type for scenario engine operations
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// A block id that is not part of the scenario
    #[error("Unknown block {0}")]
    UnknownBlock(BlockId),

    /// The block cannot be removed while a run references it
    #[error("Block {0} is in use by a running scenario")]
    BlockInUse(BlockId),

    /// A saved block carries a kind tag with no registered kind
    #[error("Unknown block kind tag {0}")]
    UnknownBlockKind(u32),

    /// A persisted object carries the wrong format/version tag
    #[error("Format mismatch in {object}: expected '{expected}', found '{found}'")]
    FormatMismatch {
        object: &'static str,
        expected: &'static str,
        found: String,
    },

    /// Persisted data is structurally inconsistent
    #[error("Corrupt scenario data: {0}")]
    Corrupt(String),

    /// The scenario violates a structural invariant (entry point, ...)
    #[error("Invalid scenario: {0}")]
    Invalid(#[from] RunError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ScenarioError>,
    },
}

impl ScenarioError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ScenarioError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context layers
    pub fn root(&self) -> &ScenarioError {
        match self {
            ScenarioError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for ScenarioError {
    fn from(err: serde_json::Error) -> Self {
        ScenarioError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ScenarioError {
    fn from(err: toml::de::Error) -> Self {
        ScenarioError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ScenarioError {
    fn from(err: toml::ser::Error) -> Self {
        ScenarioError::Config(err.to_string())
    }
}

/// Why a run did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("Scenario has no flow start block")]
    NoEntryPoint,

    #[error("Scenario has {0} flow start blocks, exactly one is required")]
    MultipleEntryPoints(usize),

    #[error("Block {0} failed to prepare")]
    PrepareFailed(BlockId),

    #[error("Block {block} failed: {message}")]
    BlockFailed { block: BlockId, message: String },

    #[error("Block {0} has no unambiguous next flow port")]
    NoNextHop(BlockId),

    #[error("Step limit of {0} reached")]
    StepLimit(u64),

    #[error("Another run is already in progress")]
    AlreadyRunning,
}

/// Result type alias for scenario engine operations
pub type Result<T> = std::result::Result<T, ScenarioError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<ScenarioError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScenarioError::UnknownBlockKind(99);
        assert_eq!(err.to_string(), "Unknown block kind tag 99");
    }

    #[test]
    fn test_error_with_context() {
        let err = ScenarioError::Corrupt("dangling port".to_string());
        let with_ctx = err.with_context("Failed to load scenario");
        assert!(with_ctx.to_string().contains("Failed to load scenario"));
        assert!(matches!(with_ctx.root(), ScenarioError::Corrupt(_)));
    }

    #[test]
    fn test_format_mismatch() {
        let err = ScenarioError::FormatMismatch {
            object: "block",
            expected: "scenario-engine/block/1",
            found: "scenario-engine/block/0".to_string(),
        };
        assert!(err.to_string().contains("scenario-engine/block/0"));
    }

    #[test]
    fn test_result_ext_converts() {
        let io: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = io.context("reading scenario").unwrap_err();
        assert!(matches!(err.root(), ScenarioError::Io(_)));
    }

    #[test]
    fn test_run_error_promotes() {
        let err: ScenarioError = RunError::MultipleEntryPoints(2).into();
        assert!(err.to_string().contains("2 flow start blocks"));
    }
}
