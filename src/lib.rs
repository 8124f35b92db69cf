//! qmetrics: performance, portfolio and robustness analytics for closed trades.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], command dispatch in [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
