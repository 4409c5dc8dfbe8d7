//! Cross-chain leverage and flash repay orchestration for synthetic assets
//!
//! A request starts on an origin chain, its swap runs on a hub chain that
//! holds the liquidity, and the result comes back through a callback that
//! finishes the request exactly once.

pub mod chain;
pub mod config;
pub mod devnet;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod external;
pub mod fees;
pub mod governance;
pub mod ledger;
pub mod metrics;
pub mod orchestrator;
pub mod relay;
pub mod retry;
pub mod sim;
pub mod types;

pub use chain::{Chain, DeliveryOutcome};
pub use error::{ProtocolError, ProtocolResult};
