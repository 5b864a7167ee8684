use std::fmt::{Debug, Formatter};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::controller::{FormController, FormError, FormResult, write_lock};
use crate::registry::{FieldOptions, FieldSettings};
use crate::store::StateUpdate;
use crate::value::{FieldPath, FieldValue, FormState, IntoFieldPath};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldMode {
    /// Boolean field, bound through `checked`.
    Checkbox,
    /// Any other field, bound through `value`.
    Input,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldControl {
    Checked(bool),
    Value(FieldValue),
}

/// The parts of an input element's change event the binder reads.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChangeEvent {
    pub value: String,
    pub checked: bool,
}

impl ChangeEvent {
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            checked: false,
        }
    }

    pub fn checked(checked: bool) -> Self {
        Self {
            value: String::new(),
            checked,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChangeInput {
    Raw(FieldValue),
    Event(ChangeEvent),
}

impl From<ChangeEvent> for ChangeInput {
    fn from(value: ChangeEvent) -> Self {
        ChangeInput::Event(value)
    }
}

impl From<FieldValue> for ChangeInput {
    fn from(value: FieldValue) -> Self {
        ChangeInput::Raw(value)
    }
}

impl From<&str> for ChangeInput {
    fn from(value: &str) -> Self {
        ChangeInput::Raw(value.into())
    }
}

impl From<String> for ChangeInput {
    fn from(value: String) -> Self {
        ChangeInput::Raw(value.into())
    }
}

impl From<bool> for ChangeInput {
    fn from(value: bool) -> Self {
        ChangeInput::Raw(value.into())
    }
}

impl From<Decimal> for ChangeInput {
    fn from(value: Decimal) -> Self {
        ChangeInput::Raw(value.into())
    }
}

impl From<DateTime<Utc>> for ChangeInput {
    fn from(value: DateTime<Utc>) -> Self {
        ChangeInput::Raw(value.into())
    }
}

/// `onChange` of one bound field.
#[derive(Clone)]
pub struct ChangeHandler {
    controller: FormController,
    path: FieldPath,
    mode: FieldMode,
}

impl ChangeHandler {
    pub fn call(&self, input: impl Into<ChangeInput>) -> FormResult<()> {
        self.controller.handle_change(&self.path, self.mode, input.into())
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }
}

impl Debug for ChangeHandler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeHandler")
            .field("form", &self.controller.form_id())
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Props for one input widget: `name`, `value` or `checked`, `on_change`,
/// `error`, `disabled` and `helper_text`.
#[derive(Clone, Debug)]
pub struct FieldProps {
    pub name: String,
    pub control: FieldControl,
    pub on_change: ChangeHandler,
    pub error: bool,
    pub disabled: bool,
    pub helper_text: Option<String>,
}

impl FieldProps {
    pub fn value(&self) -> Option<&FieldValue> {
        match &self.control {
            FieldControl::Value(value) => Some(value),
            FieldControl::Checked(_) => None,
        }
    }

    pub fn checked(&self) -> Option<bool> {
        match self.control {
            FieldControl::Checked(checked) => Some(checked),
            FieldControl::Value(_) => None,
        }
    }

    pub fn mode(&self) -> FieldMode {
        match self.control {
            FieldControl::Checked(_) => FieldMode::Checkbox,
            FieldControl::Value(_) => FieldMode::Input,
        }
    }
}

impl FormController {
    /// Declares a field and returns its bound props.
    ///
    /// Meant to be called on every render: settings for `path` are replaced,
    /// never merged.
    pub fn register(&self, path: impl IntoFieldPath, options: FieldOptions) -> FormResult<FieldProps> {
        let path = path.into_field_path()?;
        self.check_path(&path)?;

        let baseline_default = self.engine.baseline.get_path(&path).cloned();
        let registered_default = baseline_default.is_none().then(|| {
            options
                .default
                .clone()
                .unwrap_or_else(|| FieldValue::Text(String::new()))
        });
        let mode = match baseline_default.as_ref().or(registered_default.as_ref()) {
            Some(FieldValue::Bool(_)) => FieldMode::Checkbox,
            _ => FieldMode::Input,
        };
        let required = options.required.unwrap_or(match mode {
            FieldMode::Checkbox => false,
            FieldMode::Input => self.required_by_default,
        });
        let settings = FieldSettings {
            required,
            validate: options.validate.clone(),
            format: options.format.clone(),
            disabled: options.disabled,
        };

        let is_new = {
            let mut registry = write_lock(&self.engine.registry, "registering field")?;
            if let Some(default) = registered_default {
                registry.set_default(path.clone(), default);
            }
            registry.upsert(path.clone(), settings)
        };
        if is_new {
            tracing::debug!(form = %self.id, path = %path, required, ?mode, "registered field");
        }

        let current = self.engine.resolve(&self.store.get()?, &path)?;
        let control = match mode {
            FieldMode::Checkbox => {
                FieldControl::Checked(current.as_ref().and_then(FieldValue::as_bool).unwrap_or(false))
            }
            FieldMode::Input => {
                FieldControl::Value(current.unwrap_or_else(|| FieldValue::Text(String::new())))
            }
        };
        let message = self.engine.error_at(&path)?;

        Ok(FieldProps {
            name: path.to_string(),
            control,
            on_change: ChangeHandler {
                controller: self.clone(),
                path,
                mode,
            },
            error: message.is_some(),
            disabled: options.disabled,
            helper_text: options.helper_text.or(message),
        })
    }

    pub(crate) fn handle_change(
        &self,
        path: &FieldPath,
        mode: FieldMode,
        input: ChangeInput,
    ) -> FormResult<()> {
        let raw = match input {
            ChangeInput::Raw(value) => value,
            ChangeInput::Event(event) => match mode {
                FieldMode::Checkbox => FieldValue::Bool(event.checked),
                FieldMode::Input => FieldValue::Text(event.value),
            },
        };
        let value = match self.settings(path)?.and_then(|settings| settings.format) {
            Some(formatter) => formatter.format(raw),
            None => raw,
        };

        // Touch first so the single recomputation triggered by the write
        // already sees the field as touched. A rejected write undoes it.
        let was_touched = self.engine.touch(path)?;
        let target = path.clone();
        let written = self.store.update(StateUpdate::try_with(move |previous: &FormState| {
            previous.set_path(&target, value)
        }));
        if let Err(error) = written {
            self.engine.restore_touched(path, was_touched)?;
            tracing::debug!(form = %self.id, path = %path, %error, "field change rejected");
            return Err(error);
        }
        Ok(())
    }

    /// A path is usable when each proper prefix is a nested object (or
    /// absent) in the form shape and the path itself is not an object.
    fn check_path(&self, path: &FieldPath) -> FormResult<()> {
        let shape = self.engine.shape()?;
        for ancestor in path.ancestors() {
            match shape.get_path(&ancestor) {
                None => return Ok(()),
                Some(FieldValue::Object(_)) => {}
                Some(_) => {
                    return Err(FormError::InvalidPath {
                        path: path.to_string(),
                        reason: format!("`{ancestor}` is a value, not a nested object"),
                    });
                }
            }
        }
        if shape.get_path(path).is_some_and(FieldValue::is_object) {
            return Err(FormError::InvalidPath {
                path: path.to_string(),
                reason: "path addresses a nested object, not a field".into(),
            });
        }
        Ok(())
    }
}
