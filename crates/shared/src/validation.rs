//! Common validation utilities.

use validator::ValidationError;

/// Highest weekday index (0 = Monday .. 6 = Sunday).
pub const MAX_WEEKDAY: u8 = 6;

/// Characters the realtime database refuses inside a path key.
const FORBIDDEN_KEY_CHARS: [char; 6] = ['.', '$', '#', '[', ']', '/'];

/// Maximum length of a single path key.
const MAX_KEY_LENGTH: usize = 128;

/// Parses a 24-hour `HH:MM` string into `(hour, minute)`.
///
/// Both parts must be exactly two digits.
pub fn parse_time_of_day(value: &str) -> Option<(u8, u8)> {
    let (hour, minute) = value.split_once(':')?;
    if hour.len() != 2 || minute.len() != 2 {
        return None;
    }
    if !hour.chars().chain(minute.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hour: u8 = hour.parse().ok()?;
    let minute: u8 = minute.parse().ok()?;
    (hour <= 23 && minute <= 59).then_some((hour, minute))
}

/// Validates that a string is a 24-hour `HH:MM` time of day.
pub fn validate_time_of_day(value: &str) -> Result<(), ValidationError> {
    if parse_time_of_day(value).is_some() {
        Ok(())
    } else {
        let mut err = ValidationError::new("time_of_day");
        err.message = Some("Time must be in HH:MM format (00:00 to 23:59)".into());
        Err(err)
    }
}

/// Validates that battery level is within valid range (0 to 100).
pub fn validate_battery_level(level: i64) -> Result<(), ValidationError> {
    if (0..=100).contains(&level) {
        Ok(())
    } else {
        let mut err = ValidationError::new("battery_range");
        err.message = Some("Battery level must be between 0 and 100".into());
        Err(err)
    }
}

/// Validates a weekday index (0 = Monday .. 6 = Sunday).
pub fn validate_weekday(day: u8) -> Result<(), ValidationError> {
    if day <= MAX_WEEKDAY {
        Ok(())
    } else {
        let mut err = ValidationError::new("weekday_range");
        err.message = Some("Day must be between 0 (Mon) and 6 (Sun)".into());
        Err(err)
    }
}

/// Validates every entry of a weekday set.
pub fn validate_weekdays(days: &[u8]) -> Result<(), ValidationError> {
    days.iter().try_for_each(|day| validate_weekday(*day))
}

/// Validates a value used as a single key of a database path (user id,
/// device id, schedule id).
pub fn validate_path_key(key: &str) -> Result<(), ValidationError> {
    if key.trim().is_empty() {
        let mut err = ValidationError::new("key_blank");
        err.message = Some("Identifier must not be blank".into());
        return Err(err);
    }
    if key.len() > MAX_KEY_LENGTH {
        let mut err = ValidationError::new("key_length");
        err.message = Some("Identifier must be at most 128 characters".into());
        return Err(err);
    }
    if key
        .chars()
        .any(|c| FORBIDDEN_KEY_CHARS.contains(&c) || c.is_control())
    {
        let mut err = ValidationError::new("key_characters");
        err.message = Some("Identifier may not contain '.', '$', '#', '[', ']' or '/'".into());
        return Err(err);
    }
    Ok(())
}
