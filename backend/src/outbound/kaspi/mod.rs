//! Marketplace order API adapter.

mod dto;
mod http_source;

pub use http_source::{KaspiHttpConfig, KaspiHttpSource};
