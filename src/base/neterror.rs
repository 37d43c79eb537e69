use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NetError {
    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Address invalid")]
    AddressInvalid,
    #[error("Socket not connected")]
    SocketNotConnected,
    #[error("Connection timed out")]
    ConnectionTimedOut,

    // Pool / peer lifecycle errors (custom codes starting at -900)
    #[error("Dial to {target} failed: {reason}")]
    DialFailed { target: String, reason: String },
    #[error("Connection pool closed")]
    PoolClosed,
    #[error("Peer closed")]
    PeerClosed,
    #[error("Peer backlog full ({limit} frames)")]
    BacklogFull { limit: usize },
    #[error("Transport released")]
    TransportGone,
    #[error("Socket closed by remote while idle")]
    SocketRemoteClosed,
    #[error("Data received on idle socket")]
    DataReceivedUnexpectedly,

    #[error("Unknown error ({0})")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::AddressInvalid => -108,
            NetError::SocketNotConnected => -112,
            NetError::ConnectionTimedOut => -118,

            NetError::SocketRemoteClosed => -901,
            NetError::DataReceivedUnexpectedly => -902,
            NetError::DialFailed { .. } => -910,
            NetError::PoolClosed => -911,
            NetError::PeerClosed => -920,
            NetError::BacklogFull { .. } => -921,
            NetError::TransportGone => -922,
            NetError::Unknown(code) => *code,
        }
    }

    /// Whether a caller wrapping `acquire` with its own retry policy may
    /// reasonably try again after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NetError::DialFailed { .. }
                | NetError::ConnectionRefused
                | NetError::ConnectionReset
                | NetError::ConnectionTimedOut
                | NetError::ConnectionFailed
        )
    }

    pub(crate) fn dial_failed(target: &str, reason: impl ToString) -> Self {
        NetError::DialFailed { target: target.to_string(), reason: reason.to_string() }
    }
}

impl From<i32> for NetError {
    /// Payload-carrying variants come back with empty payloads; only the
    /// code survives the conversion.
    fn from(code: i32) -> Self {
        match code {
            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -108 => NetError::AddressInvalid,
            -112 => NetError::SocketNotConnected,
            -118 => NetError::ConnectionTimedOut,
            -901 => NetError::SocketRemoteClosed,
            -902 => NetError::DataReceivedUnexpectedly,
            -910 => NetError::DialFailed { target: String::new(), reason: String::new() },
            -911 => NetError::PoolClosed,
            -920 => NetError::PeerClosed,
            -921 => NetError::BacklogFull { limit: 0 },
            -922 => NetError::TransportGone,
            code => NetError::Unknown(code),
        }
    }
}
