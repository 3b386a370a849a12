//! Utilities Module

pub mod logging;
