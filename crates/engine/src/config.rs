//! Engine configuration
//!
//! Instantiation-time options for the in-memory engine. The in-memory
//! backend is a test double: it only instantiates when the environment
//! tag is `test`. Hosts running against the networked backend never reach
//! this code path.
//!
//! The cursor-encryption key belongs to the pagination collaborator; it is
//! accepted here so one config struct can be threaded through both layers,
//! and ignored by the engine.

use dynamem_core::{EngineError, Result};

/// Environment tag under which the in-memory engine may run.
pub const TEST_ENVIRONMENT: &str = "test";

/// Default table name; callers usually inject their own.
pub const DEFAULT_TABLE_NAME: &str = "main";

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deployment environment tag (`test`, `staging`, ...)
    pub environment: String,
    /// Table the client operates on
    pub table_name: String,
    /// Select the in-memory engine instead of a networked backend
    pub in_memory: bool,
    /// Pagination-collaborator option; ignored by the engine
    pub cursor_encryption_key: Option<String>,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Enforce the instantiation rule: in-memory requires the `test`
    /// environment tag.
    pub fn check_in_memory_allowed(&self) -> Result<()> {
        if !self.in_memory {
            return Err(EngineError::validation(
                "The in-memory engine was not enabled in the configuration",
            ));
        }
        if self.environment != TEST_ENVIRONMENT {
            return Err(EngineError::validation(format!(
                "The in-memory engine is only available in the '{TEST_ENVIRONMENT}' environment, got '{}'",
                self.environment
            )));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    environment: String,
    table_name: String,
    in_memory: bool,
    cursor_encryption_key: Option<String>,
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self {
            environment: TEST_ENVIRONMENT.to_string(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            in_memory: true,
            cursor_encryption_key: None,
        }
    }
}

impl EngineConfigBuilder {
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn in_memory(mut self, in_memory: bool) -> Self {
        self.in_memory = in_memory;
        self
    }

    pub fn cursor_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.cursor_encryption_key = Some(key.into());
        self
    }

    pub fn build(self) -> EngineConfig {
        EngineConfig {
            environment: self.environment,
            table_name: self.table_name,
            in_memory: self.in_memory,
            cursor_encryption_key: self.cursor_encryption_key,
        }
    }
}
