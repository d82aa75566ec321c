#[cfg(test)]
mod tests {
    use crate::error::*;
    use std::error::Error;

    #[test]
    fn test_core_error_display() {
        let err = CoreError::ValidationError("port must be 1..=65535".to_string());
        assert_eq!(err.to_string(), "Validation error: port must be 1..=65535");

        let err = CoreError::ProcessSpawn("npx: not found".to_string());
        assert_eq!(err.to_string(), "Failed to spawn helper: npx: not found");

        let err = CoreError::ProcessSignal("EPERM".to_string());
        assert_eq!(err.to_string(), "Failed to signal process: EPERM");

        let err = CoreError::RecordError("unreadable".to_string());
        assert_eq!(err.to_string(), "Record error: unreadable");

        let err = CoreError::QueryError("empty answer".to_string());
        assert_eq!(err.to_string(), "Query error: empty answer");
    }

    #[test]
    fn test_core_error_from_serde_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let core_err: CoreError = serde_err.into();
        assert!(matches!(core_err, CoreError::SerializationError(_)));
    }

    #[test]
    fn test_error_trait_implementation() {
        let err = CoreError::ValidationError("test".to_string());
        let _: &dyn Error = &err;
        assert!(err.source().is_none());

        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CoreError = serde_err.into();
        assert!(err.source().is_some());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CoreError::ConfigurationError("test".to_string()).code(),
            "CORE001"
        );
        assert_eq!(
            CoreError::ValidationError("test".to_string()).code(),
            "CORE002"
        );
        assert_eq!(CoreError::ProcessSpawn("test".to_string()).code(), "CORE010");
        assert_eq!(
            CoreError::StartFailed { port: 1, pid: 2 }.code(),
            "CORE013"
        );
        assert_eq!(CoreError::RecordError("test".to_string()).code(), "CORE020");
        assert_eq!(CoreError::QueryError("test".to_string()).code(), "CORE030");
        assert_eq!(CoreError::RateLimited("test".to_string()).code(), "CORE031");
        assert_eq!(CoreError::AuthFailed("test".to_string()).code(), "CORE032");
    }

    #[test]
    fn test_credential_related_errors() {
        assert!(CoreError::RateLimited("429".to_string()).is_credential_related());
        assert!(CoreError::AuthFailed("unauthorized".to_string()).is_credential_related());
        assert!(!CoreError::QueryError("empty".to_string()).is_credential_related());
    }
}
