//! Error type shared by the persistent sync-state ports.
//!
//! Processed orders, locks, metadata, daily stats, the error log, and CRM
//! tokens all live in one store, so they fail the same ways.

use super::define_port_error;

define_port_error! {
    /// Errors raised by the persistent sync-state store.
    pub enum StoreError {
        /// Store connection could not be established or was lost.
        Connection => "sync store connection failed",
        /// Query or statement execution failed.
        Query => "sync store query failed",
        /// A persisted value could not be mapped back into the domain.
        Corrupt => "sync store holds an invalid value",
    }
}
