use std::sync::{Arc, RwLock};

use crate::config::FormConfig;
use crate::controller::{FormId, FormResult, read_lock, write_lock};
use crate::registry::SchemaRegistry;
use crate::shape::{ErrorState, TouchedState};
use crate::store::{Committed, StateListener};
use crate::value::{FieldPath, FieldValue, FormState};

pub(crate) struct DerivedState {
    pub(crate) errors: ErrorState,
    pub(crate) touched: TouchedState,
    /// Store revision the installed errors were computed from.
    pub(crate) revision: u64,
}

/// Owns the schema registry and the error/touched maps derived from the
/// store. Clones share everything.
#[derive(Clone)]
pub(crate) struct ValidationEngine {
    pub(crate) form_id: FormId,
    pub(crate) baseline: FormState,
    pub(crate) config: Arc<FormConfig>,
    pub(crate) registry: Arc<RwLock<SchemaRegistry>>,
    pub(crate) derived: Arc<RwLock<DerivedState>>,
}

impl ValidationEngine {
    pub(crate) fn new(form_id: FormId, baseline: FormState, config: FormConfig) -> Self {
        let derived = DerivedState {
            errors: ErrorState::from_shape(&baseline, None),
            touched: TouchedState::from_shape(&baseline, false),
            revision: 0,
        };
        Self {
            form_id,
            baseline,
            config: Arc::new(config),
            registry: Arc::new(RwLock::new(SchemaRegistry::default())),
            derived: Arc::new(RwLock::new(derived)),
        }
    }

    pub(crate) fn shape(&self) -> FormResult<FormState> {
        read_lock(&self.registry, "reading registry defaults")?.extend_shape(&self.baseline)
    }

    /// Value shown for `path`: the stored value, else its default.
    pub(crate) fn resolve(&self, data: &FormState, path: &FieldPath) -> FormResult<Option<FieldValue>> {
        if let Some(value) = data.get_path(path) {
            return Ok(Some(value.clone()));
        }
        if let Some(value) = self.baseline.get_path(path) {
            return Ok(Some(value.clone()));
        }
        Ok(read_lock(&self.registry, "reading registered default")?
            .default_for(path)
            .cloned())
    }

    /// Runs every registered rule over the shape's leaves.
    ///
    /// With `check_touched`, fields the user has not interacted with are
    /// left without an error.
    pub(crate) fn validate(&self, data: &FormState, check_touched: bool) -> FormResult<ErrorState> {
        let shape = self.shape()?;
        let entries = read_lock(&self.registry, "reading registry for validation")?.entries();
        let touched = read_lock(&self.derived, "reading touched state for validation")?
            .touched
            .clone();

        let mut errors = ErrorState::from_shape(&shape, None);
        for (path, settings) in entries {
            let Some(default) = shape.get_path(&path) else {
                continue;
            };
            if default.is_object() || settings.disabled {
                continue;
            }
            if check_touched && !touched.get(&path).copied().unwrap_or(false) {
                continue;
            }

            let value = data.get_path(&path).unwrap_or(default);
            if settings.required && !value.is_truthy() {
                errors.set(&path, Some(self.config.required_field_error_message.clone()));
                continue;
            }

            if let Some(validator) = &settings.validate {
                if let Err(message) = validator.validate(value, data) {
                    errors.set(&path, Some(message));
                }
            }
        }
        Ok(errors)
    }

    pub(crate) fn recompute(&self, commit: &Committed) -> FormResult<()> {
        let errors = self.validate(&commit.state, true)?;
        tracing::trace!(
            form = %self.form_id,
            revision = commit.revision,
            valid = errors.is_valid(),
            "recomputed field errors"
        );
        self.install_errors(errors, commit.revision)
    }

    /// Listener that keeps the error map in sync with the store.
    pub(crate) fn listener(&self) -> StateListener {
        let engine = self.clone();
        Arc::new(move |commit: &Committed| {
            if let Err(error) = engine.recompute(commit) {
                tracing::error!(form = %engine.form_id, %error, "failed to recompute field errors");
            }
        })
    }

    /// Installs `errors` unless a newer revision has already been installed.
    pub(crate) fn install_errors(&self, errors: ErrorState, revision: u64) -> FormResult<()> {
        let mut derived = write_lock(&self.derived, "installing field errors")?;
        if revision < derived.revision {
            tracing::trace!(
                form = %self.form_id,
                revision,
                installed = derived.revision,
                "dropped errors of a superseded commit"
            );
            return Ok(());
        }
        derived.errors = errors;
        derived.revision = revision;
        Ok(())
    }

    /// Marks `path` touched and returns its previous flag, if it had one.
    pub(crate) fn touch(&self, path: &FieldPath) -> FormResult<Option<bool>> {
        let mut derived = write_lock(&self.derived, "touching field")?;
        let previous = derived.touched.get(path).copied();
        derived.touched.set(path, true);
        Ok(previous)
    }

    /// Puts back a flag saved by [`ValidationEngine::touch`].
    pub(crate) fn restore_touched(&self, path: &FieldPath, previous: Option<bool>) -> FormResult<()> {
        let mut derived = write_lock(&self.derived, "restoring touched flag")?;
        match previous {
            Some(flag) => derived.touched.set(path, flag),
            None => {
                derived.touched.remove(path);
            }
        }
        Ok(())
    }

    pub(crate) fn touch_all(&self) -> FormResult<()> {
        let touched = TouchedState::from_shape(&self.shape()?, true);
        write_lock(&self.derived, "touching all fields")?.touched = touched;
        Ok(())
    }

    pub(crate) fn reset_touched(&self) -> FormResult<()> {
        let touched = TouchedState::from_shape(&self.shape()?, false);
        write_lock(&self.derived, "resetting touched state")?.touched = touched;
        Ok(())
    }

    pub(crate) fn reset_errors(&self, revision: u64) -> FormResult<()> {
        let errors = ErrorState::from_shape(&self.shape()?, None);
        self.install_errors(errors, revision)
    }

    pub(crate) fn errors(&self) -> FormResult<ErrorState> {
        Ok(read_lock(&self.derived, "reading field errors")?.errors.clone())
    }

    pub(crate) fn touched(&self) -> FormResult<TouchedState> {
        Ok(read_lock(&self.derived, "reading touched state")?.touched.clone())
    }

    pub(crate) fn error_at(&self, path: &FieldPath) -> FormResult<Option<String>> {
        Ok(read_lock(&self.derived, "reading field error")?
            .errors
            .get(path)
            .cloned()
            .flatten())
    }

    pub(crate) fn is_touched(&self, path: &FieldPath) -> FormResult<bool> {
        Ok(read_lock(&self.derived, "reading field touched flag")?
            .touched
            .get(path)
            .copied()
            .unwrap_or(false))
    }
}
