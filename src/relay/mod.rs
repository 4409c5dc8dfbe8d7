//! Relay engine for cross-chain message delivery
//!
//! The relay engine:
//! 1. Drains the transport outbox of every registered chain
//! 2. Groups envelopes by destination chain
//! 3. Delivers each group on its destination, destinations in parallel
//! 4. Repeats until no chain has anything left to send

pub mod engine;

pub use engine::{RelayEngine, RelayRound, RelayStats};
