//! Runtime settings for the orchestration engine.
//!
//! Every value can be overridden through an `INVOICEFLOW_*` environment
//! variable and falls back to the defaults the built-in workflow variants
//! are tuned for. Settings are read once at startup; the built-in
//! definitions in [`crate::workflow::loader`] are parameterized by them.

use crate::models::invoice::Region;

/// Process-wide configuration, resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Default maximum attempts per stage (first try included).
    pub default_max_attempts: u32,
    /// Default per-stage timeout in seconds.
    pub default_timeout_secs: u64,
    /// Confidence below this on data extraction routes into detailed review.
    pub extraction_threshold: f64,
    /// Confidence gate applied by the validation stage in strict variants.
    pub validation_threshold: f64,
    /// Confidence at or above this lets fast-track skip validation entirely.
    pub auto_approve_threshold: f64,
    /// Region assumed when a submission does not declare one.
    pub default_region: Region,
    /// Path of the SQLite audit database.
    pub audit_db_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            default_timeout_secs: 30,
            extraction_threshold: 0.85,
            validation_threshold: 0.75,
            auto_approve_threshold: 0.95,
            default_region: Region::Us,
            audit_db_path: "data/audit.db".to_string(),
        }
    }
}

impl Settings {
    /// Resolve settings from `INVOICEFLOW_*` environment variables,
    /// keeping the default for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_max_attempts: env_parse("INVOICEFLOW_MAX_ATTEMPTS", defaults.default_max_attempts),
            default_timeout_secs: env_parse("INVOICEFLOW_STAGE_TIMEOUT", defaults.default_timeout_secs),
            extraction_threshold: env_parse(
                "INVOICEFLOW_CONFIDENCE_THRESHOLD",
                defaults.extraction_threshold,
            ),
            validation_threshold: env_parse(
                "INVOICEFLOW_VALIDATION_THRESHOLD",
                defaults.validation_threshold,
            ),
            auto_approve_threshold: env_parse(
                "INVOICEFLOW_AUTO_APPROVE_THRESHOLD",
                defaults.auto_approve_threshold,
            ),
            default_region: std::env::var("INVOICEFLOW_DEFAULT_REGION")
                .ok()
                .and_then(|v| Region::parse(&v))
                .unwrap_or(defaults.default_region),
            audit_db_path: std::env::var("INVOICEFLOW_AUDIT_DB")
                .unwrap_or(defaults.audit_db_path),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.default_max_attempts, 3);
        assert!(settings.auto_approve_threshold > settings.extraction_threshold);
        assert!(settings.extraction_threshold > settings.validation_threshold);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("INVOICEFLOW_MAX_ATTEMPTS", "5");
        std::env::set_var("INVOICEFLOW_DEFAULT_REGION", "EU");
        let settings = Settings::from_env();
        assert_eq!(settings.default_max_attempts, 5);
        assert_eq!(settings.default_region, Region::Eu);
        std::env::remove_var("INVOICEFLOW_MAX_ATTEMPTS");
        std::env::remove_var("INVOICEFLOW_DEFAULT_REGION");
    }

    #[test]
    fn test_unparseable_falls_back() {
        std::env::set_var("INVOICEFLOW_STAGE_TIMEOUT", "not-a-number");
        let settings = Settings::from_env();
        assert_eq!(settings.default_timeout_secs, 30);
        std::env::remove_var("INVOICEFLOW_STAGE_TIMEOUT");
    }
}
