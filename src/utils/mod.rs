//! The `utils` module collects the pieces shared by every other module:
//! error types and logging initialisation.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::error::{ConfigError, DeliveryError, IngestError};
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warning");
        logging::init("nonsense");
    }

    #[test]
    fn error_messages_name_the_offender() {
        let err = ConfigError::OutOfRange {
            name: "batch.interval_ms",
            value: 50,
            min: 100,
            max: 60_000,
        };
        assert_eq!(
            err.to_string(),
            "batch.interval_ms = 50 is out of range [100, 60000]"
        );

        let err = IngestError::NonFinite {
            field: "latitude",
            value: f64::NAN,
        };
        assert!(err.to_string().contains("latitude"));

        let err = DeliveryError::UnknownHandle("viewer-1".to_string());
        assert!(err.to_string().contains("viewer-1"));
    }
}
