//! Vendor matching and job lifecycle orchestration for on-demand print fulfillment.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
