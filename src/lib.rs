mod binding;
mod config;
mod controller;
mod hash;
mod registry;
mod shape;
mod store;
mod validation;
mod value;

#[cfg(test)]
mod tests;

pub use binding::{ChangeEvent, ChangeHandler, ChangeInput, FieldControl, FieldMode, FieldProps};
pub use calmform_derive::FormModel;
pub use config::{DEFAULT_REQUIRED_FIELD_ERROR_MESSAGE, FormConfig};
pub use controller::{FormBuilder, FormController, FormError, FormId, FormResult, FormSnapshot};
#[cfg(feature = "web")]
pub use hash::BrowserLocation;
pub use hash::{HashLocation, HashStore, InMemoryLocation, decode_state, encode_state};
pub use registry::{FieldFormatter, FieldOptions, FieldSettings, FieldValidator};
pub use shape::{ErrorState, ShapeMap, Slot, TouchedState};
pub use store::{
    BoxedFlushFuture, Committed, StateCell, StateListener, StateStore, StateUpdate, Subscription,
};
pub use value::{FieldPath, FieldValue, FormData, FormModel, FormState, IntoFieldPath};
