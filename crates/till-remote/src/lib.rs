//! Query client for the remote ordering platform.
//!
//! This crate defines the [`OrderSource`] boundary both delivery channels
//! fetch through, plus the production HTTP implementation. It is stateless:
//! window computation, deduplication, and persistence all live elsewhere.

mod http;
mod source;
mod wire;

pub use http::HttpOrderSource;
pub use source::{OrderSource, SourceError};
pub use wire::parse_wire_order;
