use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_timer::Delay;
use url::form_urlencoded;

use crate::controller::{FormError, FormResult, read_lock, write_lock};
use crate::store::{
    BoxedFlushFuture, Committed, StateCell, StateListener, StateStore, StateUpdate, Subscription,
};
use crate::value::{FieldValue, FormState};

/// Access to the page location fragment (the part after `#`).
pub trait HashLocation: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Current fragment without the leading `#`.
    fn fragment(&self) -> Result<String, Self::Error>;

    /// Swaps the fragment in place, replacing the current history entry
    /// rather than pushing a new one.
    fn replace_fragment(&self, fragment: &str) -> Result<(), Self::Error>;
}

#[derive(Default)]
struct LocationState {
    fragment: String,
    replacements: usize,
}

/// Location stand-in for native hosts and tests.
#[derive(Clone, Default)]
pub struct InMemoryLocation {
    state: Arc<RwLock<LocationState>>,
}

impl InMemoryLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fragment(fragment: impl Into<String>) -> Self {
        let location = Self::new();
        location.set_fragment(fragment);
        location
    }

    /// Simulates the user landing on a URL with this fragment.
    pub fn set_fragment(&self, fragment: impl Into<String>) {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.fragment = fragment.into();
    }

    /// Number of history replacements performed so far.
    pub fn replacements(&self) -> usize {
        let state = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.replacements
    }
}

impl HashLocation for InMemoryLocation {
    type Error = Infallible;

    fn fragment(&self) -> Result<String, Self::Error> {
        let state = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(state.fragment.clone())
    }

    fn replace_fragment(&self, fragment: &str) -> Result<(), Self::Error> {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.fragment = fragment.to_string();
        state.replacements += 1;
        Ok(())
    }
}

#[cfg(feature = "web")]
pub use browser::BrowserLocation;

#[cfg(feature = "web")]
mod browser {
    use wasm_bindgen::JsValue;

    use super::HashLocation;

    #[derive(Debug, thiserror::Error)]
    #[error("browser location unavailable: {0}")]
    pub struct BrowserLocationError(String);

    fn js_error(value: JsValue) -> BrowserLocationError {
        BrowserLocationError(value.as_string().unwrap_or_else(|| format!("{value:?}")))
    }

    /// The `window.location` of the current page.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct BrowserLocation;

    impl HashLocation for BrowserLocation {
        type Error = BrowserLocationError;

        fn fragment(&self) -> Result<String, Self::Error> {
            let window = web_sys::window()
                .ok_or_else(|| BrowserLocationError("no window".into()))?;
            let hash = window.location().hash().map_err(js_error)?;
            Ok(hash.trim_start_matches('#').to_string())
        }

        fn replace_fragment(&self, fragment: &str) -> Result<(), Self::Error> {
            let window = web_sys::window()
                .ok_or_else(|| BrowserLocationError("no window".into()))?;
            let location = window.location();
            let base = format!(
                "{}{}",
                location.pathname().map_err(js_error)?,
                location.search().map_err(js_error)?
            );
            let url = if fragment.is_empty() {
                base
            } else {
                format!("{base}#{fragment}")
            };
            window
                .history()
                .map_err(js_error)?
                .replace_state_with_url(&JsValue::NULL, "", Some(&url))
                .map_err(js_error)
        }
    }
}

#[derive(Default)]
struct PendingWrite {
    ticket: u64,
    state: Option<FormState>,
}

/// [`StateStore`] mirrored into one entry of the URL fragment.
///
/// The fragment is read as form-urlencoded pairs; the store owns the pair
/// named `key`, whose value is the JSON encoding of the state. Other pairs
/// are preserved.
#[derive(Clone)]
pub struct HashStore<L> {
    key: Arc<str>,
    location: L,
    cell: StateCell,
    defaults: FormState,
    debounce: Duration,
    pending: Arc<RwLock<PendingWrite>>,
}

impl<L> HashStore<L>
where
    L: HashLocation + Clone,
{
    /// Loads the state stored under `key`, falling back to `defaults` when
    /// the entry is missing or cannot be decoded. A field that fails to decode
    /// keeps its default; the other fields are still restored.
    pub fn open(
        location: L,
        key: impl Into<String>,
        defaults: FormState,
        debounce: Duration,
    ) -> FormResult<Self> {
        let key: Arc<str> = key.into().into();
        let fragment = location
            .fragment()
            .map_err(|error| FormError::Location(error.to_string()))?;
        let initial = match fragment_entry(&fragment, &key) {
            Some(encoded) => match decode_over_defaults(&encoded, &defaults) {
                Ok(state) => state,
                Err(error) => {
                    tracing::warn!(key = %key, %error, "discarding undecodable form state in URL");
                    defaults.clone()
                }
            },
            None => defaults.clone(),
        };
        Ok(Self {
            key,
            location,
            cell: StateCell::new(initial),
            defaults,
            debounce,
            pending: Arc::new(RwLock::new(PendingWrite::default())),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn location(&self) -> &L {
        &self.location
    }

    pub fn has_pending_write(&self) -> FormResult<bool> {
        Ok(read_lock(&self.pending, "reading pending hash write")?
            .state
            .is_some())
    }

    fn write_entry(&self, encoded: Option<&str>) -> FormResult<()> {
        let fragment = self
            .location
            .fragment()
            .map_err(|error| FormError::Location(error.to_string()))?;
        let next = rewrite_fragment(&fragment, &self.key, encoded);
        if next == fragment {
            return Ok(());
        }
        self.location
            .replace_fragment(&next)
            .map_err(|error| FormError::Location(error.to_string()))
    }

    async fn flush_after_debounce(&self) -> FormResult<()> {
        let ticket = read_lock(&self.pending, "reading hash write ticket")?.ticket;
        if !self.debounce.is_zero() {
            Delay::new(self.debounce).await;
        }
        if read_lock(&self.pending, "checking hash write ticket")?.ticket != ticket {
            return Ok(());
        }
        self.flush()
    }
}

impl<L> StateStore for HashStore<L>
where
    L: HashLocation + Clone,
{
    fn committed(&self) -> FormResult<Committed> {
        self.cell.committed()
    }

    fn update(&self, update: StateUpdate) -> FormResult<()> {
        let pending = self.pending.clone();
        let debounce = self.debounce;
        // Record the pending write before listeners observe the new value.
        self.cell.update(StateUpdate::try_with(move |previous| {
            let next = update.apply(previous)?;
            let mut pending = write_lock(&pending, "scheduling hash write")?;
            pending.ticket += 1;
            pending.state = Some(next.clone());
            tracing::trace!(ticket = pending.ticket, ?debounce, "scheduled hash write");
            Ok(next)
        }))?;
        if self.debounce.is_zero() {
            self.flush()?;
        }
        Ok(())
    }

    fn subscribe(&self, listener: StateListener) -> FormResult<Subscription> {
        self.cell.subscribe(listener)
    }

    fn reset(&self, baseline: &FormState) -> FormResult<()> {
        {
            let mut pending = write_lock(&self.pending, "dropping pending hash write")?;
            pending.ticket += 1;
            pending.state = None;
        }
        self.cell.update(StateUpdate::Replace(baseline.clone()))?;
        self.write_entry(None)
    }

    fn flush(&self) -> FormResult<()> {
        let Some(state) = write_lock(&self.pending, "taking pending hash write")?
            .state
            .take()
        else {
            return Ok(());
        };
        let encoded = encode_state(&state);
        tracing::trace!(key = %self.key, bytes = encoded.len(), "persisting form state to URL");
        self.write_entry(Some(&encoded))
    }

    fn flush_debounced(&self) -> BoxedFlushFuture<'_> {
        Box::pin(self.flush_after_debounce())
    }
}

impl<L> HashStore<L> {
    /// Defaults used when the URL carried no usable entry.
    pub fn defaults(&self) -> &FormState {
        &self.defaults
    }
}

pub fn encode_state(state: &FormState) -> String {
    state.to_json().to_string()
}

/// Decodes a JSON payload, using `shape` to restore dates.
pub fn decode_state(encoded: &str, shape: &FormState) -> FormResult<FormState> {
    let value = serde_json::from_str::<serde_json::Value>(encoded)
        .map_err(|error| FormError::UnsupportedValue(error.to_string()))?;
    FormState::from_json(&value, Some(shape))
}

/// Decodes entry by entry on top of `defaults`.
fn decode_over_defaults(encoded: &str, defaults: &FormState) -> FormResult<FormState> {
    let value = serde_json::from_str::<serde_json::Value>(encoded)
        .map_err(|error| FormError::UnsupportedValue(error.to_string()))?;
    let serde_json::Value::Object(entries) = value else {
        return Err(FormError::UnsupportedValue(
            "form state in the URL is not a JSON object".into(),
        ));
    };
    let mut state = defaults.clone();
    for (key, value) in &entries {
        match FieldValue::from_json(value, defaults.get(key)) {
            Ok(decoded) => {
                state.insert(key.clone(), decoded);
            }
            Err(error) => {
                tracing::warn!(field = %key, %error, "keeping default for undecodable field in URL");
            }
        }
    }
    Ok(state)
}

fn fragment_entry(fragment: &str, key: &str) -> Option<String> {
    form_urlencoded::parse(fragment.as_bytes())
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

fn rewrite_fragment(fragment: &str, key: &str, encoded: Option<&str>) -> String {
    let mut pairs = form_urlencoded::parse(fragment.as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect::<Vec<_>>();
    match encoded {
        Some(encoded) => match pairs.iter_mut().find(|(name, _)| name == key) {
            Some(pair) => pair.1 = encoded.to_string(),
            None => pairs.push((key.to_string(), encoded.to_string())),
        },
        None => pairs.retain(|(name, _)| name != key),
    }
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
