use thiserror::Error;

/// An environment variable required by the application is not set.
#[derive(Debug, Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVarError(pub String);

/// Reads an environment variable, returning a structured error if it's missing.
///
/// This is a thin wrapper around `std::env::var` that provides a more
/// ergonomic and specific error type for missing variables.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, MissingEnvVarError> {
    std::env::var(name).map_err(|_| MissingEnvVarError(name.to_string()))
}

/// Reads an optional environment variable.
///
/// Unset, non-unicode, and blank (whitespace-only) values all come back as `None`,
/// so callers can treat "exported but empty" the same as "not exported".
pub fn get_optional_env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn missing_var_reports_its_name() {
        unsafe { std::env::remove_var("SHARED_UTILS_TEST_MISSING") };
        let err = get_env_var("SHARED_UTILS_TEST_MISSING").unwrap_err();
        assert_eq!(err.to_string(), "Missing environment variable: SHARED_UTILS_TEST_MISSING");
    }

    #[test]
    #[serial]
    fn blank_optional_var_is_none() {
        unsafe { std::env::set_var("SHARED_UTILS_TEST_BLANK", "   ") };
        assert_eq!(get_optional_env_var("SHARED_UTILS_TEST_BLANK"), None);

        unsafe { std::env::set_var("SHARED_UTILS_TEST_BLANK", " value ") };
        assert_eq!(
            get_optional_env_var("SHARED_UTILS_TEST_BLANK").as_deref(),
            Some("value")
        );
        unsafe { std::env::remove_var("SHARED_UTILS_TEST_BLANK") };
    }
}
