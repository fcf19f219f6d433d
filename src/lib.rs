//! Behavior-chain routing with asset-aware output caching.

pub mod ajax;
pub mod cache;
pub mod chain;
pub mod config;
pub mod conneg;
pub mod error;
pub mod infra;
pub mod site;
