use std::time::Duration;

use muninn::{MuninnError, Result};

#[test]
fn test_error_display() {
    let err = MuninnError::Upstream {
        status: 502,
        message: "bad gateway".to_string(),
    };
    assert_eq!(err.to_string(), "upstream returned 502: bad gateway");

    let err = MuninnError::Validation { valid: 1, total: 4 };
    assert!(err.to_string().contains("1 of 4"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(MuninnError::NoSource)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(MuninnError::Http("connection reset".into()).is_transient());
    assert!(MuninnError::Timeout(Duration::from_secs(15)).is_transient());
    assert!(MuninnError::DataFetch("empty response".into()).is_transient());
    assert!(
        MuninnError::Upstream {
            status: 500,
            message: "internal".into()
        }
        .is_transient()
    );
    assert!(
        MuninnError::Upstream {
            status: 429,
            message: "slow down".into()
        }
        .is_transient()
    );
}

#[test]
fn permanent_errors() {
    assert!(
        !MuninnError::Upstream {
            status: 404,
            message: "not found".into()
        }
        .is_transient()
    );
    assert!(!MuninnError::Validation { valid: 0, total: 2 }.is_transient());
    assert!(!MuninnError::Unauthorized.is_transient());
    assert!(!MuninnError::Configuration("bad".into()).is_transient());
    assert!(
        !MuninnError::MemoryLimitExceeded {
            estimated: 2,
            limit: 1
        }
        .is_transient()
    );
}

// ============================================================================
// Fallback classification
// ============================================================================

#[test]
fn upstream_failures_trigger_fallback() {
    assert!(MuninnError::Validation { valid: 0, total: 2 }.is_fallback_trigger());
    assert!(
        MuninnError::Upstream {
            status: 404,
            message: String::new()
        }
        .is_fallback_trigger()
    );
    assert!(MuninnError::NoSource.is_fallback_trigger());
    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(MuninnError::from(json).is_fallback_trigger());
}

#[test]
fn local_faults_do_not_trigger_fallback() {
    assert!(!MuninnError::Unauthorized.is_fallback_trigger());
    assert!(!MuninnError::Configuration("bad".into()).is_fallback_trigger());
    assert!(!MuninnError::Invalidation("webhook down".into()).is_fallback_trigger());
    assert!(
        !MuninnError::MemoryLimitExceeded {
            estimated: 2,
            limit: 1
        }
        .is_fallback_trigger()
    );
}
