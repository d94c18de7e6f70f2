use crate::error::{ParleyError, Result};

/// Describe the step that failed on top of a lower-level error.
pub trait Context<T> {
    fn context(self, step: &str) -> Result<T>;
    fn with_context(self, step: impl FnOnce() -> String) -> Result<T>;
}

impl<T, E> Context<T> for std::result::Result<T, E>
where
    E: Into<ParleyError>,
{
    fn context(self, step: &str) -> Result<T> {
        self.with_context(|| step.to_string())
    }

    fn with_context(self, step: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| describe(step(), e.into()))
    }
}

/// Steps stack onto one message so the source is always the root failure.
fn describe(step: String, err: ParleyError) -> ParleyError {
    match err {
        ParleyError::Context { message, source } => ParleyError::Context {
            message: format!("{}: {}", step, message),
            source,
        },
        root => ParleyError::Context {
            message: step,
            source: Box::new(root),
        },
    }
}

/// A setting that must come from the CLI, the environment or the config file.
pub trait Required<T> {
    fn required(self, name: &str) -> Result<T>;
}

impl<T> Required<T> for Option<T> {
    fn required(self, name: &str) -> Result<T> {
        self.ok_or_else(|| ParleyError::Config(format!("{} is not set", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn not_found() -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    #[test]
    fn test_context_names_the_step() {
        let err = not_found().context("Failed to read auth.json").unwrap_err();

        match &err {
            ParleyError::Context { message, source } => {
                assert_eq!(message, "Failed to read auth.json");
                assert!(matches!(**source, ParleyError::Io(_)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.to_string(), "Failed to read auth.json: IO error: no such file");
    }

    #[test]
    fn test_nested_steps_keep_root_source() {
        let err = not_found()
            .with_context(|| "Failed to read auth.json".to_string())
            .context("Failed to restore the saved session")
            .unwrap_err();

        let ParleyError::Context { message, source } = err else {
            panic!("expected a context error");
        };
        assert_eq!(
            message,
            "Failed to restore the saved session: Failed to read auth.json"
        );
        assert!(matches!(*source, ParleyError::Io(_)));
    }

    #[test]
    fn test_missing_setting_is_config_error() {
        let err = None::<String>.required("API_URL").unwrap_err();
        assert!(matches!(&err, ParleyError::Config(m) if m == "API_URL is not set"));

        assert_eq!(Some(3).required("ANY").unwrap(), 3);
    }
}
