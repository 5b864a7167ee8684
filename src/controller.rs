use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::config::FormConfig;
use crate::hash::{HashLocation, HashStore};
use crate::registry::FieldSettings;
use crate::shape::{ErrorState, TouchedState};
use crate::store::{StateCell, StateStore, StateUpdate, Subscription};
use crate::validation::ValidationEngine;
use crate::value::{FormModel, FormState, IntoFieldPath};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

impl Display for FormId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "form-{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct FormSnapshot {
    pub state: FormState,
    pub errors: ErrorState,
    pub touched: TouchedState,
    pub is_valid: bool,
    pub is_changed: bool,
    pub is_any_touched: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FormError {
    #[error("form needs either default values or an external state cell")]
    MissingSource,
    #[error("form was given both default values and an external state cell")]
    ConflictingSource,
    #[error("a URL hash store needs default values")]
    HashRequiresDefaults,
    #[error("invalid field path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("unsupported form value: {0}")]
    UnsupportedValue(String),
    #[error("form state does not fit the model: {0}")]
    ModelMismatch(String),
    #[error("location access failed: {0}")]
    Location(String),
}

pub type FormResult<T> = Result<T, FormError>;

type HashOpener =
    Box<dyn FnOnce(FormState, Duration) -> FormResult<Arc<dyn StateStore>> + Send + 'static>;

/// Collects the state source and settings of a form.
///
/// Exactly one of [`FormBuilder::defaults`] (or [`FormBuilder::model`]) and
/// [`FormBuilder::store`] must be supplied.
#[derive(Default)]
pub struct FormBuilder {
    defaults: Option<FormState>,
    store: Option<StateCell>,
    hash: Option<HashOpener>,
    debounce: Duration,
    config: FormConfig,
    required_by_default: Option<bool>,
    typed: bool,
}

impl FormBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default values of a dynamically shaped form. Fields are optional
    /// unless registered as required.
    pub fn defaults(mut self, defaults: FormState) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Default values taken from a typed model. Fields are required unless
    /// registered otherwise.
    pub fn model<T: FormModel>(mut self, model: &T) -> Self {
        self.defaults = Some(model.to_form_state());
        self.typed = true;
        self
    }

    /// Externally owned cell. The baseline is its value at build time.
    pub fn store(mut self, cell: StateCell) -> Self {
        self.store = Some(cell);
        self
    }

    /// Mirrors the state into `key` of the location fragment.
    pub fn hash<L>(mut self, location: L, key: impl Into<String>) -> Self
    where
        L: HashLocation + Clone,
    {
        let key = key.into();
        self.hash = Some(Box::new(move |defaults, debounce| {
            let store = HashStore::open(location, key, defaults, debounce)?;
            Ok(Arc::new(store) as Arc<dyn StateStore>)
        }));
        self
    }

    /// Delay before hash writes reach the location.
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn config(mut self, config: FormConfig) -> Self {
        self.config = config;
        self
    }

    pub fn required_by_default(mut self, required: bool) -> Self {
        self.required_by_default = Some(required);
        self
    }

    pub fn build(self) -> FormResult<FormController> {
        let required_by_default = self.required_by_default.unwrap_or(self.typed);
        let (store, baseline): (Arc<dyn StateStore>, FormState) = match (self.defaults, self.store) {
            (Some(_), Some(_)) => return Err(FormError::ConflictingSource),
            (None, None) if self.hash.is_some() => return Err(FormError::HashRequiresDefaults),
            (None, None) => return Err(FormError::MissingSource),
            (None, Some(_)) if self.hash.is_some() => return Err(FormError::HashRequiresDefaults),
            (None, Some(cell)) => {
                let baseline = cell.get()?;
                (Arc::new(cell), baseline)
            }
            (Some(defaults), None) => match self.hash {
                Some(open) => (open(defaults.clone(), self.debounce)?, defaults),
                None => (Arc::new(StateCell::new(defaults.clone())), defaults),
            },
        };
        FormController::assemble(store, baseline, self.config, required_by_default)
    }
}

/// Facade over one form: its store, field registry and derived state.
///
/// Clones are handles to the same form. The store subscription is released
/// when the last handle is dropped.
#[derive(Clone)]
pub struct FormController {
    pub(crate) id: FormId,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) engine: ValidationEngine,
    pub(crate) required_by_default: bool,
    _subscription: Arc<Subscription>,
}

impl FormController {
    /// Ephemeral form over a dynamically shaped state.
    pub fn new(defaults: FormState) -> FormResult<Self> {
        FormBuilder::new().defaults(defaults).build()
    }

    /// Ephemeral form over a typed model.
    pub fn from_model<T: FormModel>(model: &T) -> FormResult<Self> {
        FormBuilder::new().model(model).build()
    }

    pub fn builder() -> FormBuilder {
        FormBuilder::new()
    }

    fn assemble(
        store: Arc<dyn StateStore>,
        baseline: FormState,
        config: FormConfig,
        required_by_default: bool,
    ) -> FormResult<Self> {
        let id = FormId::next();
        let engine = ValidationEngine::new(id, baseline, config);
        let subscription = store.subscribe(engine.listener())?;
        tracing::debug!(form = %id, required_by_default, "form controller created");
        Ok(Self {
            id,
            store,
            engine,
            required_by_default,
            _subscription: Arc::new(subscription),
        })
    }

    pub fn form_id(&self) -> FormId {
        self.id
    }

    pub fn state(&self) -> FormResult<FormState> {
        self.store.get()
    }

    pub fn baseline(&self) -> &FormState {
        &self.engine.baseline
    }

    pub fn errors(&self) -> FormResult<ErrorState> {
        self.engine.errors()
    }

    pub fn touched(&self) -> FormResult<TouchedState> {
        self.engine.touched()
    }

    pub fn field_error(&self, path: impl IntoFieldPath) -> FormResult<Option<String>> {
        self.engine.error_at(&path.into_field_path()?)
    }

    pub fn is_touched(&self, path: impl IntoFieldPath) -> FormResult<bool> {
        self.engine.is_touched(&path.into_field_path()?)
    }

    pub fn settings(&self, path: impl IntoFieldPath) -> FormResult<Option<FieldSettings>> {
        let path = path.into_field_path()?;
        Ok(read_lock(&self.engine.registry, "reading field settings")?
            .get(&path)
            .cloned())
    }

    /// The current state converted back into a typed model.
    pub fn model<T: FormModel>(&self) -> FormResult<T> {
        T::from_form_state(&self.state()?)
    }

    /// Writes the store directly. Touched flags are left as they are, so
    /// untouched fields changed this way show no error until touched.
    pub fn set_state(&self, update: impl Into<StateUpdate>) -> FormResult<()> {
        self.store.update(update.into())
    }

    pub fn update_state(
        &self,
        update: impl FnOnce(&FormState) -> FormState + Send + 'static,
    ) -> FormResult<()> {
        self.store.update(StateUpdate::with(update))
    }

    /// Marks every field touched, validates all of them regardless of prior
    /// interaction and returns whether the form is valid.
    pub fn force_validate(&self) -> FormResult<bool> {
        self.engine.touch_all()?;
        let commit = self.store.committed()?;
        let errors = self.engine.validate(&commit.state, false)?;
        let is_valid = errors.is_valid();
        self.engine.install_errors(errors, commit.revision)?;
        tracing::debug!(form = %self.id, is_valid, "forced validation finished");
        Ok(is_valid)
    }

    /// Restores the baseline and forgets every error and touched flag.
    pub fn clear(&self) -> FormResult<()> {
        self.engine.reset_touched()?;
        self.store.reset(&self.engine.baseline)?;
        self.engine.reset_errors(self.store.committed()?.revision)?;
        tracing::debug!(form = %self.id, "form cleared");
        Ok(())
    }

    pub fn is_any_touched(&self) -> FormResult<bool> {
        Ok(self.engine.touched()?.any_touched())
    }

    pub fn is_changed(&self) -> FormResult<bool> {
        Ok(self.store.get()? != self.engine.baseline)
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let state = self.store.get()?;
        let errors = self.engine.errors()?;
        let touched = self.engine.touched()?;
        Ok(FormSnapshot {
            is_valid: errors.is_valid(),
            is_changed: state != self.engine.baseline,
            is_any_touched: touched.any_touched(),
            state,
            errors,
            touched,
        })
    }

    /// Pushes pending writes of a persistent store right away.
    pub fn flush(&self) -> FormResult<()> {
        self.store.flush()
    }

    pub async fn flush_debounced(&self) -> FormResult<()> {
        self.store.flush_debounced().await
    }
}

pub(crate) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(crate) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
