//! Validation helpers for DTOs.

use validator::ValidationError;

const USERNAME_MAX_LENGTH: usize = 32;

/// Validates that a display name is non-blank and at most 32 characters.
pub fn validate_username(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("username_blank");
        err.message = Some("username must not be blank".into());
        return Err(err);
    }

    if name.chars().count() > USERNAME_MAX_LENGTH {
        let mut err = ValidationError::new("username_length");
        err.message = Some(
            format!("username must be at most {USERNAME_MAX_LENGTH} characters").into(),
        );
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reasonable_names() {
        assert!(validate_username("ada").is_ok());
        assert!(validate_username("Grace Hopper").is_ok());
    }

    #[test]
    fn rejects_blank_names() {
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
    }

    #[test]
    fn rejects_overlong_names() {
        let long = "x".repeat(USERNAME_MAX_LENGTH + 1);
        assert!(validate_username(&long).is_err());
        let max = "x".repeat(USERNAME_MAX_LENGTH);
        assert!(validate_username(&max).is_ok());
    }
}
