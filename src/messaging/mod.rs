//! Message entry/exit interceptors: the tenant id travels as the `X-Project-Id` string property.

pub mod listener;
pub mod memory;
pub mod message;
pub mod template;

pub use listener::*;
pub use message::*;
pub use template::*;
