use thiserror::Error;

pub const MAX_MESSAGE_TEXT_LEN: usize = 20_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("value is too short (min {min}, got {got})")]
    TooShort { min: usize, got: usize },
    #[error("value is too long (max {max}, got {got})")]
    TooLong { max: usize, got: usize },
    #[error("invalid characters")]
    InvalidCharacters,
    #[error("missing field: {0}")]
    Missing(&'static str),
}

/// Outgoing text must carry something besides whitespace.
pub fn validate_message_text(text: &str) -> Result<(), ValidationError> {
    let len = text.trim().chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > MAX_MESSAGE_TEXT_LEN {
        return Err(ValidationError::TooLong {
            max: MAX_MESSAGE_TEXT_LEN,
            got: len,
        });
    }
    Ok(())
}

/// Phone number or email address identifying a contact.
pub fn validate_handle(handle: &str) -> Result<(), ValidationError> {
    let len = handle.len();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 255 {
        return Err(ValidationError::TooLong { max: 255, got: len });
    }
    if handle.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

/// Group sends are addressed by chat identifier rather than handle.
pub fn validate_group_target(
    is_group: bool,
    chat_identifier: Option<&str>,
) -> Result<(), ValidationError> {
    if is_group && chat_identifier.map_or(true, |id| id.trim().is_empty()) {
        return Err(ValidationError::Missing("chat_identifier"));
    }
    Ok(())
}
