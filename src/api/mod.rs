//! REST API boundary: transport trait, reqwest client, envelope and error types.

mod client;
pub mod envelope;
pub mod error;
#[cfg(test)]
pub mod mock;
pub mod transport;

pub use client::HttpClient;
pub use envelope::{BulkResult, ListMeta, ListParams, Page};
pub use error::{ApiError, ErrorBody, ErrorKind};
pub use transport::{ApiRequest, ApiResponse, ByteStream, Method, RequestOptions, RestTransport};
