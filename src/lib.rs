//! Embedded appliance web front end.
//!
//! Serves the appliance UI from in-memory blobs and the local filesystem,
//! negotiates caching with the peer using a two-phase stat/validate protocol,
//! applies `%[KEY]` template substitution and version stamping to served
//! text assets, and multiplexes bidirectional binary frames over persistent
//! websocket connections without blocking the delivery task.

pub mod cache;
pub mod config;
pub mod content;
pub mod http;
pub mod params;
pub mod stream;

pub use config::schema::WebConfig;
pub use http::HttpServer;
pub use params::Params;
pub use stream::registry::ConnectionRegistry;
