//! API handler modules

pub mod generate;
pub mod health;
pub mod sse;

pub use generate::generate_routes;
pub use health::health_routes;
pub use sse::event_stream;
