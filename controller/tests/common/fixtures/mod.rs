//! This module provides reusable test utilities:
//! - A recording dispatcher standing in for the collector pool
//! - A reconciler harness over in-memory store and catalog
//! - Test configuration builders
//! - Common test data

// Allow unused code in test fixtures - not every test binary uses all of them
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod harness;
pub mod mock_dispatcher;
pub mod test_config;
pub mod test_data;

// Re-export commonly used items
pub use harness::TestHarness;
pub use mock_dispatcher::MockDispatcher;
pub use test_config::TestConfigBuilder;
pub use test_data::*;
