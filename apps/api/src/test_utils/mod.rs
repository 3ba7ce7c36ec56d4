//! Test utilities for integration testing.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - In-memory repository implementations for mocking persistence
//! - Scripted providers and tools standing in for vendors
//! - A builder for HTTP-level `AppState`s

mod app_state_builder;
mod factories;
mod provider_mocks;
mod repo_mocks;

pub use app_state_builder::*;
pub use factories::*;
pub use provider_mocks::*;
pub use repo_mocks::*;
