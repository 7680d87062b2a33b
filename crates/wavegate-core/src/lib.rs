//! # wavegate-core
//!
//! Core types for wavegate, the phase-gate and circuit-breaker coordinator
//! for multi-agent delivery waves.
//!
//! A wave is a bounded unit of multi-agent work split into sequential
//! phases. Agents, QA tooling and cost trackers write evidence ("signals")
//! into the project's `.wavegate/` directory; the breaker and the gate read
//! it and persist their own records next to it.
//!
//! ## Core Paradigm
//!
//! - State is files (one writer role per record, atomic replace on write)
//! - Missing threshold evidence means "no problem seen", never a halt
//! - Missing completion evidence means "not done", never a pass
//! - Records are typed and cross one encode/decode boundary

pub mod clock;
pub mod config;
mod error;
pub mod fail_open;
pub mod layout;
pub mod signals;
mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{BreakerConfig, GateConfig, WaveGateConfig};
pub use error::{Result, WaveGateError};
pub use layout::StateLayout;
pub use signals::{
    CompletionDocument, CompletionSignal, RepeatedError, SignalKind, SignalSnapshot, SignalStore,
};
pub use types::*;
