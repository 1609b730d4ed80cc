use std::time::Duration;

use request_optimizer::{EnhancedError, ErrorKind, ErrorReport, OptimizerError};

fn http(status: u16) -> OptimizerError {
    OptimizerError::Http {
        status,
        message: format!("status {status}"),
    }
}

#[test]
fn classification_table() {
    let cases = [
        (OptimizerError::Network("refused".into()), ErrorKind::Network, true),
        (OptimizerError::Timeout(Duration::from_secs(10)), ErrorKind::Timeout, true),
        (http(400), ErrorKind::Unknown, false),
        (http(401), ErrorKind::Auth, false),
        (http(403), ErrorKind::Permission, false),
        (http(404), ErrorKind::NotFound, false),
        (http(429), ErrorKind::Unknown, false),
        (http(500), ErrorKind::Server, true),
        (http(503), ErrorKind::Server, true),
        (OptimizerError::Other("boom".into()), ErrorKind::Unknown, true),
        (OptimizerError::Cancelled, ErrorKind::Unknown, false),
        (OptimizerError::InvalidInput("bad".into()), ErrorKind::Unknown, false),
    ];

    for (err, kind, retryable) in cases {
        assert_eq!(err.kind(), kind, "kind of {err:?}");
        assert_eq!(err.is_retryable(), retryable, "retryable of {err:?}");
    }
}

#[test]
fn business_codes_follow_http_taxonomy() {
    let forbidden = OptimizerError::Api {
        code: 403,
        message: "admins only".into(),
    };
    assert_eq!(forbidden.kind(), ErrorKind::Permission);
    assert_eq!(forbidden.code(), Some(403));

    let server = OptimizerError::Api {
        code: 500,
        message: "db down".into(),
    };
    assert!(server.is_retryable());
}

#[test]
fn user_messages_are_per_category() {
    assert_eq!(
        http(401).user_message(),
        "login expired, please log in again"
    );
    assert_eq!(
        OptimizerError::Timeout(Duration::from_secs(1)).user_message(),
        "request timed out, please try again later"
    );
    assert_eq!(
        OptimizerError::Other("?".into()).user_message(),
        "operation failed, please try again later"
    );
}

#[test]
fn enhanced_error_report_serializes_with_type_field() {
    let err = EnhancedError::new(http(502), 3);
    let report = err.report();
    assert_eq!(report.kind, ErrorKind::Server);
    assert!(report.can_retry);
    assert_eq!(report.message, "HTTP error (502): status 502");

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["type"], "SERVER_ERROR");
    assert_eq!(json["user_message"], "server is busy, please try again later");
    assert!(json["timestamp_ms"].as_u64().unwrap() > 0);
}

#[test]
fn report_from_raw_error() {
    let report = ErrorReport::from_error(&OptimizerError::Network("dns".into()));
    assert_eq!(report.kind, ErrorKind::Network);
    assert_eq!(report.message, "network error: dns");
}

#[test]
fn enhanced_error_displays_message() {
    let err: EnhancedError = OptimizerError::Cancelled.into();
    assert_eq!(err.to_string(), "request cancelled");
    assert_eq!(err.retry_count, 0);
    assert!(!err.can_retry);
}
