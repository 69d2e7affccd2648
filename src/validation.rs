// src/validation.rs

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ApiError, FieldError};

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    })
}

pub fn is_email(value: &str) -> bool {
    email_regex().is_match(value)
}

/// Collects field-level failures so a request reports all of them at once.
#[derive(Default)]
pub struct Checks {
    errors: Vec<FieldError>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(&mut self, field: &str, value: Option<&str>, message: &str) -> &mut Self {
        if value.map_or(true, |v| v.trim().is_empty()) {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn email(&mut self, field: &str, value: Option<&str>, message: &str) -> &mut Self {
        if !value.map_or(false, |v| is_email(v.trim())) {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn min_len(&mut self, field: &str, value: Option<&str>, min: usize, message: &str) -> &mut Self {
        if value.map_or(0, |v| v.chars().count()) < min {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    /// Records `message` against `field` when `ok` is false.
    pub fn check(&mut self, field: &str, ok: bool, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::invalid_fields(std::mem::take(&mut self.errors)))
        }
    }
}

/// Parses an optional wire value, reporting failure against `field`.
pub fn parse_field<T: std::str::FromStr<Err = String>>(
    field: &str,
    value: Option<&str>,
) -> Result<Option<T>, ApiError> {
    match value {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: String| ApiError::invalid_fields(vec![FieldError::new(field, &e)])),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    #[test]
    fn email_shape() {
        assert!(is_email("a.b@example.co"));
        assert!(!is_email("no-at-sign.com"));
        assert!(!is_email("two words@example.com"));
    }

    #[test]
    fn all_failures_are_reported_in_order() {
        let err = Checks::new()
            .required("name", Some("  "), "Name is required")
            .required("city", Some("Pune"), "City is required")
            .email("email", Some("bad"), "Invalid email")
            .min_len("password", Some("12345"), 6, "Password must be at least 6 characters")
            .finish()
            .unwrap_err();
        match err {
            ApiError::Validation { message, errors } => {
                assert_eq!(message, "Name is required");
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, ["name", "email", "password"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parse_field_reports_the_field() {
        assert_eq!(parse_field::<Priority>("priority", None).unwrap(), None);
        assert_eq!(
            parse_field::<Priority>("priority", Some("low")).unwrap(),
            Some(Priority::Low)
        );
        let err = parse_field::<Priority>("priority", Some("urgent")).unwrap_err();
        assert!(matches!(err, ApiError::Validation { ref errors, .. } if errors[0].field == "priority"));
    }
}
