//! Content retrieval and record extraction: the gateway fetcher that turns a
//! content reference into a parsed [`Payload`], and the projection from a
//! payload to the records it carries.

pub mod fetcher;
pub mod payload;

/// Content-addressed identifier of one retrievable blob.
pub type ContentRef = String;

/// One extracted unit of business value (a URL for the default field).
pub type Record = String;

pub use fetcher::{ContentFetcher, FetchError, GatewayFetcher};
pub use payload::{Extraction, Payload};
