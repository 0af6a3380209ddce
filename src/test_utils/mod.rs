//! Test utilities for use case and HTTP tests.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - An in-memory billing store implementing every repository trait
//! - Fakes for the shared cache, wallet, notifier and payment gateways
//! - A builder for an `AppState` wired to those fakes

mod app_state_builder;
mod billing_mocks;
mod factories;
mod port_mocks;

pub use app_state_builder::*;
pub use billing_mocks::*;
pub use factories::*;
pub use port_mocks::*;
