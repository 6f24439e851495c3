//! E2E test scenarios, one module per check.

mod routing;
mod suite;
