use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::controller::FormResult;
use crate::value::{FieldPath, FieldValue, FormState};

/// Custom rule run after the required check. `Err` carries the message shown
/// to the user, verbatim.
pub trait FieldValidator: Send + Sync {
    fn validate(&self, value: &FieldValue, state: &FormState) -> Result<(), String>;
}

impl<F> FieldValidator for F
where
    F: Fn(&FieldValue, &FormState) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, value: &FieldValue, state: &FormState) -> Result<(), String> {
        (self)(value, state)
    }
}

/// Transform applied to raw input before it is stored.
pub trait FieldFormatter: Send + Sync {
    fn format(&self, raw: FieldValue) -> FieldValue;
}

impl<F> FieldFormatter for F
where
    F: Fn(FieldValue) -> FieldValue + Send + Sync,
{
    fn format(&self, raw: FieldValue) -> FieldValue {
        (self)(raw)
    }
}

/// Options passed to `register` for one field.
#[derive(Clone, Default)]
pub struct FieldOptions {
    pub(crate) required: Option<bool>,
    pub(crate) validate: Option<Arc<dyn FieldValidator>>,
    pub(crate) format: Option<Arc<dyn FieldFormatter>>,
    pub(crate) disabled: bool,
    pub(crate) helper_text: Option<String>,
    pub(crate) default: Option<FieldValue>,
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the form-wide required default for this field.
    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn validate(mut self, validator: impl FieldValidator + 'static) -> Self {
        self.validate = Some(Arc::new(validator));
        self
    }

    pub fn format(mut self, formatter: impl FieldFormatter + 'static) -> Self {
        self.format = Some(Arc::new(formatter));
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Shown instead of the validation message.
    pub fn helper_text(mut self, text: impl Into<String>) -> Self {
        self.helper_text = Some(text.into());
        self
    }

    /// Default for a field missing from the baseline. Ignored otherwise.
    pub fn default_value(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

impl Debug for FieldOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldOptions")
            .field("required", &self.required)
            .field("validate", &self.validate.is_some())
            .field("format", &self.format.is_some())
            .field("disabled", &self.disabled)
            .field("helper_text", &self.helper_text)
            .field("default", &self.default)
            .finish()
    }
}

#[derive(Clone)]
pub struct FieldSettings {
    pub required: bool,
    pub validate: Option<Arc<dyn FieldValidator>>,
    pub format: Option<Arc<dyn FieldFormatter>>,
    pub disabled: bool,
}

impl Debug for FieldSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSettings")
            .field("required", &self.required)
            .field("validate", &self.validate.is_some())
            .field("format", &self.format.is_some())
            .field("disabled", &self.disabled)
            .finish()
    }
}

#[derive(Default)]
pub(crate) struct SchemaRegistry {
    settings: BTreeMap<FieldPath, FieldSettings>,
    defaults: BTreeMap<FieldPath, FieldValue>,
}

impl SchemaRegistry {
    /// Last registration wins. Returns true the first time `path` is seen.
    pub(crate) fn upsert(&mut self, path: FieldPath, settings: FieldSettings) -> bool {
        self.settings.insert(path, settings).is_none()
    }

    pub(crate) fn get(&self, path: &FieldPath) -> Option<&FieldSettings> {
        self.settings.get(path)
    }

    pub(crate) fn set_default(&mut self, path: FieldPath, value: FieldValue) {
        self.defaults.insert(path, value);
    }

    pub(crate) fn default_for(&self, path: &FieldPath) -> Option<&FieldValue> {
        self.defaults.get(path)
    }

    pub(crate) fn entries(&self) -> Vec<(FieldPath, FieldSettings)> {
        self.settings
            .iter()
            .map(|(path, settings)| (path.clone(), settings.clone()))
            .collect()
    }

    /// The baseline plus defaults of fields declared only through `register`.
    pub(crate) fn extend_shape(&self, baseline: &FormState) -> FormResult<FormState> {
        let mut shape = baseline.clone();
        for (path, value) in &self.defaults {
            if shape.get_path(path).is_none() {
                shape = shape.set_path(path, value.clone())?;
            }
        }
        Ok(shape)
    }
}
