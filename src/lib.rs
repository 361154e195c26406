//! stepledger: a wallet session engine that mirrors an on-chain step ledger.
//!
//! The engine resolves which read methods a deployed ledger supports,
//! reconciles a per-step status vector from whatever it answers, guards the
//! session against identity and network changes, coordinates step
//! submissions through the user's wallet, and attaches approval transactions
//! found in an indexer as evidence.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod ledger;
pub mod rpc;
pub mod session;
pub mod settings;
pub mod types;
pub mod view;
pub mod wallet;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{Session, SessionDeps, SessionEvent, SessionSnapshot};
