//! Subject validation and wildcard matching.
//!
//! Subjects are dot-separated tokens. In a filter, `*` matches exactly one
//! token and `>` (only as the last token) matches one or more trailing tokens.

const SEPARATOR: char = '.';
const WILDCARD_SINGLE: &str = "*";
const WILDCARD_TAIL: &str = ">";

/// Errors for malformed subjects or filters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubjectError {
    #[error("subject is empty")]
    Empty,

    #[error("subject '{0}' contains an empty token")]
    EmptyToken(String),

    #[error("subject '{0}' contains whitespace")]
    Whitespace(String),

    #[error("subject '{0}' uses wildcards, which are only allowed in filters")]
    Wildcard(String),

    #[error("filter '{0}' has '>' before its last token")]
    MisplacedTail(String),
}

/// Validate a concrete publish subject (no wildcards).
pub fn validate_subject(subject: &str) -> Result<(), SubjectError> {
    check_tokens(subject)?;
    if subject
        .split(SEPARATOR)
        .any(|t| t == WILDCARD_SINGLE || t == WILDCARD_TAIL)
    {
        return Err(SubjectError::Wildcard(subject.to_string()));
    }
    Ok(())
}

/// Validate a subscription/stream filter.
pub fn validate_filter(filter: &str) -> Result<(), SubjectError> {
    check_tokens(filter)?;
    let tokens: Vec<&str> = filter.split(SEPARATOR).collect();
    let last = tokens.len() - 1;
    if tokens[..last].iter().any(|t| *t == WILDCARD_TAIL) {
        return Err(SubjectError::MisplacedTail(filter.to_string()));
    }
    Ok(())
}

fn check_tokens(subject: &str) -> Result<(), SubjectError> {
    if subject.is_empty() {
        return Err(SubjectError::Empty);
    }
    if subject.chars().any(char::is_whitespace) {
        return Err(SubjectError::Whitespace(subject.to_string()));
    }
    if subject.split(SEPARATOR).any(str::is_empty) {
        return Err(SubjectError::EmptyToken(subject.to_string()));
    }
    Ok(())
}

/// Whether `subject` is matched by `filter`.
pub fn matches(filter: &str, subject: &str) -> bool {
    let mut filter_tokens = filter.split(SEPARATOR);
    let mut subject_tokens = subject.split(SEPARATOR);

    loop {
        match (filter_tokens.next(), subject_tokens.next()) {
            (Some(WILDCARD_TAIL), Some(_)) => return filter_tokens.next().is_none(),
            (Some(WILDCARD_SINGLE), Some(_)) => continue,
            (Some(f), Some(s)) if f == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Whether some concrete subject is matched by both filters.
pub fn filters_overlap(a: &str, b: &str) -> bool {
    let mut a_tokens = a.split(SEPARATOR);
    let mut b_tokens = b.split(SEPARATOR);

    loop {
        match (a_tokens.next(), b_tokens.next()) {
            (Some(WILDCARD_TAIL), Some(_)) | (Some(_), Some(WILDCARD_TAIL)) => return true,
            (Some(x), Some(y)) if x == WILDCARD_SINGLE || y == WILDCARD_SINGLE || x == y => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Whether any filter in `filters` matches `subject`.
pub fn matches_any<S: AsRef<str>>(filters: &[S], subject: &str) -> bool {
    filters.iter().any(|f| matches(f.as_ref(), subject))
}
