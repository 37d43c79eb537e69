use crate::base::neterror::NetError;

#[test]
fn test_net_error_roundtrip() {
    // Standard Chromium error
    let original = NetError::ConnectionRefused;
    let code = original.as_i32();
    assert_eq!(code, -102);
    let converted = NetError::from(code);
    assert!(matches!(converted, NetError::ConnectionRefused));

    // Custom error
    let custom = NetError::PoolClosed;
    let custom_code = custom.as_i32();
    assert_eq!(custom_code, -911);
    let custom_converted = NetError::from(custom_code);
    assert!(matches!(custom_converted, NetError::PoolClosed));
}

#[test]
fn test_payload_variants_keep_code() {
    let err = NetError::BacklogFull { limit: 8 };
    assert_eq!(err.as_i32(), -921);
    assert!(matches!(NetError::from(-921), NetError::BacklogFull { .. }));
}

#[test]
fn test_unknown_error() {
    let err = NetError::from(-9999);
    assert!(matches!(err, NetError::Unknown(-9999)));
}

#[test]
fn test_transient_classification() {
    assert!(NetError::dial_failed("a:1", "refused").is_transient());
    assert!(!NetError::PoolClosed.is_transient());
    assert!(!NetError::PeerClosed.is_transient());
}

#[test]
fn test_collision_avoidance() {
    // Pool and peer codes must stay clear of the Blob range (-900 to -906)
    // defined in Chromium's net_error_list.h, except the two idle-socket
    // codes that mirror Chromium's own edge-case errors.
    let blob_range = -906..=-900;

    for err in [NetError::PoolClosed, NetError::PeerClosed, NetError::TransportGone] {
        assert!(!blob_range.contains(&err.as_i32()));
    }
}

#[test]
fn test_every_code_round_trips() {
    let errors = [
        NetError::ConnectionClosed,
        NetError::ConnectionReset,
        NetError::ConnectionRefused,
        NetError::ConnectionAborted,
        NetError::ConnectionFailed,
        NetError::AddressInvalid,
        NetError::SocketNotConnected,
        NetError::ConnectionTimedOut,
        NetError::SocketRemoteClosed,
        NetError::DataReceivedUnexpectedly,
        NetError::PoolClosed,
        NetError::PeerClosed,
        NetError::TransportGone,
    ];
    for err in errors {
        assert_eq!(NetError::from(err.as_i32()), err);
    }

    // Codes with no variant here stay opaque.
    assert_eq!(NetError::from(-142), NetError::Unknown(-142));
}
