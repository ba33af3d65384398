//! MQTT topic name and topic filter validation
//!
//! Publishing requires a topic name (no wildcards); subscribing takes a
//! filter where `+` matches one whole level and `#` the remaining levels.

use thiserror::Error;

/// Longest topic the wire encoding can carry
pub const MAX_TOPIC_LEN: usize = 65_535;

/// Reserved inbound payload that requests a health configuration reload
pub const RELOAD_COMMAND: &[u8] = b"reload";

#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("topic is empty")]
    Empty,
    #[error("topic is {0} bytes, longer than {MAX_TOPIC_LEN}")]
    TooLong(usize),
    #[error("topic contains a NUL character")]
    NulCharacter,
    #[error("topic name contains wildcard '{0}'")]
    Wildcard(char),
    #[error("wildcard '{0}' must occupy a whole level")]
    PartialLevelWildcard(char),
    #[error("multi-level wildcard must be the last level")]
    MisplacedMultiLevel,
}

fn check_common(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(TopicError::TooLong(topic.len()));
    }
    if topic.contains('\0') {
        return Err(TopicError::NulCharacter);
    }
    Ok(())
}

/// Validate a topic name used for publishing
pub fn validate_topic_name(topic: &str) -> Result<(), TopicError> {
    check_common(topic)?;

    if let Some(wildcard) = topic.chars().find(|c| *c == '+' || *c == '#') {
        return Err(TopicError::Wildcard(wildcard));
    }

    Ok(())
}

/// Validate a topic filter used for subscribing
pub fn validate_topic_filter(filter: &str) -> Result<(), TopicError> {
    check_common(filter)?;

    let mut levels = filter.split('/').peekable();
    while let Some(level) = levels.next() {
        if level.contains('#') {
            if level != "#" {
                return Err(TopicError::PartialLevelWildcard('#'));
            }
            if levels.peek().is_some() {
                return Err(TopicError::MisplacedMultiLevel);
            }
        }
        if level.contains('+') && level != "+" {
            return Err(TopicError::PartialLevelWildcard('+'));
        }
    }

    Ok(())
}

/// Whether an inbound payload is the reserved reload command
pub fn is_reload_command(payload: &[u8]) -> bool {
    payload == RELOAD_COMMAND
}
