//! Reverse proxy that routes all traffic to one of two backend pools and
//! switches between them live, gated on a health probe.

pub mod backend;
pub mod config;
pub mod metrics;
pub mod proxy;
