//! Input checks with field-specific messages.

use chrono::{DateTime, Duration, Utc};

use folio_types::api::{LogSessionRequest, UpdateProfileRequest};

use crate::error::ActionError;

pub const MAX_BIO_CHARS: usize = 500;
pub const MAX_DESCRIPTION_CHARS: usize = 500;
pub const MAX_SESSION_MINUTES: u32 = 720;
/// Clock skew tolerated on a session's end time.
pub const FUTURE_SKEW_MINUTES: i64 = 5;

type Checked = Result<(), ActionError>;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

pub fn username(name: &str) -> Checked {
    let valid = (3..=32).contains(&name.len())
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if !valid {
        return Err(ActionError::invalid(
            "Username must be 3-32 characters of letters, digits or underscores",
        ));
    }
    Ok(())
}

pub fn password(password: &str) -> Checked {
    if char_len(password) < 8 {
        return Err(ActionError::invalid("Password must be at least 8 characters"));
    }
    Ok(())
}

pub fn profile(req: &UpdateProfileRequest) -> Checked {
    if let Some(bio) = &req.bio {
        if char_len(bio) > MAX_BIO_CHARS {
            return Err(ActionError::invalid("Bio must be at most 500 characters"));
        }
    }
    if let Some(goal) = req.daily_goal_minutes {
        if !(5..=600).contains(&goal) {
            return Err(ActionError::invalid(
                "Daily goal must be between 5 and 600 minutes",
            ));
        }
    }
    if let Some(offset) = req.utc_offset_minutes {
        if !(-720..=840).contains(&offset) {
            return Err(ActionError::invalid(
                "UTC offset must be between -720 and 840 minutes",
            ));
        }
    }
    Ok(())
}

pub fn book(title: &str, author: &str) -> Checked {
    if title.trim().is_empty() || char_len(title) > 200 {
        return Err(ActionError::invalid("Title must be 1-200 characters"));
    }
    if author.trim().is_empty() || char_len(author) > 200 {
        return Err(ActionError::invalid("Author must be 1-200 characters"));
    }
    Ok(())
}

pub fn session(req: &LogSessionRequest, now: DateTime<Utc>) -> Checked {
    if !(1..=MAX_SESSION_MINUTES).contains(&req.duration_minutes) {
        return Err(ActionError::invalid(
            "Duration must be between 1 and 720 minutes",
        ));
    }
    if req.ended_at <= req.started_at {
        return Err(ActionError::invalid("Session must end after it starts"));
    }
    // Span rounded up to whole minutes.
    let span_secs = (req.ended_at - req.started_at).num_seconds();
    let span_minutes = (span_secs + 59) / 60;
    if i64::from(req.duration_minutes) > span_minutes {
        return Err(ActionError::invalid(
            "Duration cannot exceed the time between start and end",
        ));
    }
    if req.ended_at > now + Duration::minutes(FUTURE_SKEW_MINUTES) {
        return Err(ActionError::invalid("Session cannot end in the future"));
    }
    Ok(())
}

pub fn room_name(name: &str) -> Checked {
    if name.trim().is_empty() || char_len(name) > 80 {
        return Err(ActionError::invalid("Room name must be 1-80 characters"));
    }
    Ok(())
}

pub fn description(description: &str) -> Checked {
    if char_len(description) > MAX_DESCRIPTION_CHARS {
        return Err(ActionError::invalid(
            "Description must be at most 500 characters",
        ));
    }
    Ok(())
}

pub fn flag_reason(reason: &str, details: Option<&str>) -> Checked {
    if reason.trim().is_empty() || char_len(reason) > 200 {
        return Err(ActionError::invalid("Reason must be 1-200 characters"));
    }
    if details.is_some_and(|d| char_len(d) > 1000) {
        return Err(ActionError::invalid("Details must be at most 1000 characters"));
    }
    Ok(())
}

pub fn experiment_name(name: &str) -> Checked {
    let valid = (1..=64).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if !valid {
        return Err(ActionError::invalid("Invalid experiment name"));
    }
    Ok(())
}

/// Page size with a default and an upper bound.
pub fn limit(requested: Option<u32>, default: u32, max: u32) -> Result<u32, ActionError> {
    match requested {
        None => Ok(default),
        Some(n) if (1..=max).contains(&n) => Ok(n),
        Some(_) => Err(ActionError::invalid(format!(
            "Limit must be between 1 and {max}"
        ))),
    }
}
