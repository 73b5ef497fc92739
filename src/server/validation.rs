use crate::server::response::ApiError;

const MAX_PROJECT_NAME_LEN: usize = 100;
const MAX_BRANCH_NAME_LEN: usize = 100;
const MAX_FILE_NAME_LEN: usize = 255;

fn is_valid_branch_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

fn validate_length(name: &str, entity: &str, max_len: usize) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{entity} name cannot be empty")));
    }
    if name.chars().count() > max_len {
        return Err(ApiError::bad_request(format!(
            "{entity} name cannot exceed {max_len} characters"
        )));
    }
    Ok(())
}

pub fn validate_project_name(name: &str) -> Result<(), ApiError> {
    validate_length(name, "Project", MAX_PROJECT_NAME_LEN)
}

pub fn validate_file_name(name: &str) -> Result<(), ApiError> {
    validate_length(name, "File", MAX_FILE_NAME_LEN)
}

/// Branch names follow git's loose shape: no spaces, no leading separator.
pub fn validate_branch_name(name: &str) -> Result<(), ApiError> {
    validate_length(name, "Branch", MAX_BRANCH_NAME_LEN)?;
    if !name.chars().all(is_valid_branch_char) {
        return Err(ApiError::bad_request(
            "Branch name can only contain alphanumeric characters, hyphens, underscores, periods, and slashes",
        ));
    }
    if name.starts_with(['-', '/', '.']) || name.ends_with('/') {
        return Err(ApiError::bad_request(
            "Branch name cannot start with a hyphen, slash, or period",
        ));
    }
    Ok(())
}

/// Parses an optional `?status=` query value with the entity's own parser.
pub fn parse_status_filter<T>(
    raw: Option<&str>,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, ApiError> {
    match raw {
        None | Some("") => Ok(None),
        Some(value) => parse(value)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("Unknown status '{value}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReviewStatus;

    #[test]
    fn test_branch_names() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("feature/login-v2").is_ok());
        assert!(validate_branch_name("").is_err());
        assert!(validate_branch_name("has space").is_err());
        assert!(validate_branch_name("-dash").is_err());
        assert!(validate_branch_name("trailing/").is_err());
        assert!(validate_branch_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_project_and_file_names() {
        assert!(validate_project_name("My Project").is_ok());
        assert!(validate_project_name("   ").is_err());
        assert!(validate_file_name("src/main.py").is_ok());
        assert!(validate_file_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_status_filter() {
        assert_eq!(parse_status_filter(None, ReviewStatus::parse).unwrap(), None);
        assert_eq!(parse_status_filter(Some(""), ReviewStatus::parse).unwrap(), None);
        assert_eq!(
            parse_status_filter(Some("pending"), ReviewStatus::parse).unwrap(),
            Some(ReviewStatus::Pending)
        );
        assert!(parse_status_filter(Some("bogus"), ReviewStatus::parse).is_err());
    }
}
