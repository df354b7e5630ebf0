//! `walletflow-core` orchestrates the long-running flows of an identity wallet
//! client: recovery phrase and local backup, cloud backup, push notification
//! handling, credential correlation and startup hydration.
//!
//! Every flow is a workflow reacting to events on an in-process bus. The
//! native credential layer, storage and the share sheet are host-provided
//! collaborators. Foreign hosts interact through [`WalletOrchestrator`].
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod bridge;
pub mod bus;
pub mod config;
pub mod engine;
pub mod event;
pub mod payload;
pub mod state;
pub mod storage;
pub mod workflows;

mod error;
pub use error::*;

mod logger;
pub use logger::*;

mod orchestrator;
pub use orchestrator::WalletOrchestrator;

// private modules
mod dispatch;

uniffi::setup_scaffolding!("walletflow_core");
