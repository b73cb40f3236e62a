//! Engine unit tests
//!
//! Collected here rather than scattered across inline test modules.

pub mod driver;
