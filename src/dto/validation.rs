//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted display name, counted in characters after trimming.
pub const MAX_PLAYER_NAME_CHARS: usize = 40;

/// Validates that a room pin is exactly six ASCII digits.
///
/// # Examples
///
/// ```ignore
/// validate_pin("042137") // Ok
/// validate_pin("42137")  // Err - too short
/// validate_pin("04213a") // Err - not a digit
/// ```
pub fn validate_pin(pin: &str) -> Result<(), ValidationError> {
    if pin.len() != 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("pin_format");
        err.message = Some("PIN must be 6 digits".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a display name once surrounding whitespace is removed.
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    let length = name.trim().chars().count();
    if length == 0 {
        let mut err = ValidationError::new("name_empty");
        err.message = Some("Name is required".into());
        return Err(err);
    }
    if length > MAX_PLAYER_NAME_CHARS {
        let mut err = ValidationError::new("name_length");
        err.message =
            Some(format!("Name must be at most {MAX_PLAYER_NAME_CHARS} characters").into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pin() {
        assert!(validate_pin("000000").is_ok());
        assert!(validate_pin("123456").is_ok());
        assert!(validate_pin("12345").is_err()); // too short
        assert!(validate_pin("1234567").is_err()); // too long
        assert!(validate_pin("12a456").is_err());
        assert!(validate_pin("١٢٣٤٥٦").is_err()); // non-ascii digits
    }

    #[test]
    fn test_validate_player_name() {
        assert!(validate_player_name("Alice").is_ok());
        assert!(validate_player_name("  Bob  ").is_ok());
        assert!(validate_player_name("   ").is_err());
        assert!(validate_player_name(&"é".repeat(40)).is_ok());
        assert!(validate_player_name(&"x".repeat(41)).is_err());
    }
}
