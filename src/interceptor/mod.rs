//! Entry points that set the tenant context around a unit of work.

pub mod http;

pub use http::*;
