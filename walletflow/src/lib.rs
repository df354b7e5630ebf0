//! Bindings crate: re-exports `walletflow-core` and its `UniFFI` scaffolding so
//! a single library is built for Swift and Kotlin.

pub use walletflow_core::*;

walletflow_core::uniffi_reexport_scaffolding!();
