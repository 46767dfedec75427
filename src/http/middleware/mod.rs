//! HTTP middleware.

pub mod request_buffer;

pub use request_buffer::request_buffer_middleware;
