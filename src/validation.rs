use crate::config_validator::ConfigValidator;
use crate::error::ApiError;
use serde::Deserialize;
use validator::{Validate, ValidationError};

/// Path parameters of `/v1/admission/:quota_class`.
#[derive(Debug, Deserialize, Validate)]
pub struct QuotaClassPath {
    #[validate(custom(function = "validate_quota_class"))]
    pub quota_class: String,
}

fn validate_quota_class(value: &str) -> Result<(), ValidationError> {
    ConfigValidator::validate_quota_class(value).map_err(|_| {
        let mut err = ValidationError::new("quota_class");
        err.message = Some("must be 1-64 characters of letters, digits, '-' or '_'".into());
        err
    })
}

/// Request validation utilities
pub struct RequestValidator;

impl RequestValidator {
    /// Validates the quota class taken from the URL
    pub fn quota_class(path: QuotaClassPath) -> Result<String, ApiError> {
        path.validate()
            .map_err(|e| ApiError::ValidationError(e.to_string()))?;
        Ok(path.quota_class)
    }
}
