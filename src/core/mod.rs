//! Core domain models for routes
//!
//! This module defines the fundamental data structures that represent
//! routes, controllers, statistics and errors.

pub mod controller;
pub mod error;
pub mod route;
pub mod stats;

pub use controller::*;
pub use error::*;
pub use route::*;
pub use stats::*;
