//! Ergonomic error context helpers.
//!
//! Converts IO errors raised while dialing into context-rich `NetError`
//! variants that carry the dial target.

use crate::base::neterror::NetError;
use std::io;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Add dial context to an IO error.
    ///
    /// # Example
    /// ```ignore
    /// use evnet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(target).await.dial_context(target)?;
    /// // Error: "Dial to example.com:443 failed: connection refused"
    /// ```
    fn dial_context(self, target: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn dial_context(self, target: &str) -> Result<T, NetError> {
        self.map_err(|e| NetError::dial_failed(target, e))
    }
}
