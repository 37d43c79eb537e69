//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): error codes shared by the pool, streams and peers
//! - [`IoResultExt`](context::IoResultExt): IO error context helpers

pub mod context;
pub mod neterror;

#[cfg(test)]
mod tests;
