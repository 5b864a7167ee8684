pub const DEFAULT_REQUIRED_FIELD_ERROR_MESSAGE: &str = "Field is required";

/// Settings shared by every form of an application.
///
/// Passed to [`crate::FormBuilder::config`]; forms built without one use
/// [`FormConfig::default`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormConfig {
    pub required_field_error_message: String,
}

impl FormConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required_field_error_message(mut self, message: impl Into<String>) -> Self {
        self.required_field_error_message = message.into();
        self
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            required_field_error_message: DEFAULT_REQUIRED_FIELD_ERROR_MESSAGE.to_string(),
        }
    }
}
