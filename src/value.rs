use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::controller::{FormError, FormResult};

/// A single slot of form state.
///
/// Enumerated choices are carried as `Text`. Falsiness follows what a
/// required check expects: `Null`, `Bool(false)`, empty text and zero are
/// falsy, dates and nested objects never are.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Text(String),
    Number(Decimal),
    Date(DateTime<Utc>),
    Object(FormState),
}

impl FieldValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Null => false,
            FieldValue::Bool(value) => *value,
            FieldValue::Text(value) => !value.is_empty(),
            FieldValue::Number(value) => !value.is_zero(),
            FieldValue::Date(_) | FieldValue::Object(_) => true,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, FieldValue::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            FieldValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Date(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&FormState> {
        match self {
            FieldValue::Object(value) => Some(value),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(value) => Value::Bool(*value),
            FieldValue::Text(value) => Value::String(value.clone()),
            FieldValue::Number(value) => Number::from_str(&value.normalize().to_string())
                .map(Value::Number)
                .unwrap_or_else(|_| Value::String(value.to_string())),
            FieldValue::Date(value) => Value::String(value.to_rfc3339()),
            FieldValue::Object(state) => state.to_json(),
        }
    }

    /// Decodes a JSON value, using `hint` (usually the baseline value at the
    /// same position) to recover dates that JSON can only carry as strings.
    pub fn from_json(value: &Value, hint: Option<&FieldValue>) -> FormResult<Self> {
        Ok(match value {
            Value::Null => FieldValue::Null,
            Value::Bool(value) => FieldValue::Bool(*value),
            Value::Number(number) => FieldValue::Number(decimal_from_number(number)?),
            Value::String(text) => match hint {
                Some(FieldValue::Date(_)) => DateTime::parse_from_rfc3339(text)
                    .map(|date| FieldValue::Date(date.with_timezone(&Utc)))
                    .unwrap_or_else(|_| FieldValue::Text(text.clone())),
                _ => FieldValue::Text(text.clone()),
            },
            Value::Object(entries) => {
                FieldValue::Object(FormState::from_json_map(entries, hint.and_then(Self::as_object))?)
            }
            Value::Array(_) => {
                return Err(FormError::UnsupportedValue(
                    "arrays are not part of the form value model".into(),
                ));
            }
        })
    }
}

fn decimal_from_number(number: &Number) -> FormResult<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|error| FormError::UnsupportedValue(format!("number `{text}`: {error}")))
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Number(value) => write!(f, "{value}"),
            FieldValue::Date(value) => f.write_str(&value.to_rfc3339()),
            FieldValue::Object(state) => write!(f, "{}", state.to_json()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(Decimal::from(value))
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Date(value)
    }
}

impl From<FormState> for FieldValue {
    fn from(value: FormState) -> Self {
        FieldValue::Object(value)
    }
}

/// Nested mapping from field name to value.
///
/// Cloning is cheap: entries sit behind an `Arc` and writes copy only the
/// maps along the written path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormState(Arc<BTreeMap<String, FieldValue>>);

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        Arc::make_mut(&mut self.0).insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when both handles point at the same underlying entries.
    pub fn shares_entries_with(&self, other: &FormState) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn get_path(&self, path: &FieldPath) -> Option<&FieldValue> {
        let (last, parents) = path.segments().split_last()?;
        let mut current = self;
        for segment in parents {
            current = current.get(segment)?.as_object()?;
        }
        current.get(last)
    }

    /// Returns a new state with `value` written at `path`.
    ///
    /// Missing intermediate objects are created. Siblings of every map on
    /// the path keep sharing storage with `self`.
    pub fn set_path(&self, path: &FieldPath, value: FieldValue) -> FormResult<FormState> {
        if path.is_root() {
            return Err(FormError::InvalidPath {
                path: String::new(),
                reason: "cannot write to the root of the form".into(),
            });
        }
        let mut next = self.clone();
        next.write_segments(path.segments(), value, path)?;
        Ok(next)
    }

    fn write_segments(
        &mut self,
        segments: &[String],
        value: FieldValue,
        path: &FieldPath,
    ) -> FormResult<()> {
        let Some((head, rest)) = segments.split_first() else {
            return Ok(());
        };
        let entries = Arc::make_mut(&mut self.0);
        if rest.is_empty() {
            entries.insert(head.clone(), value);
            return Ok(());
        }
        let slot = entries
            .entry(head.clone())
            .or_insert_with(|| FieldValue::Object(FormState::new()));
        match slot {
            FieldValue::Object(child) => child.write_segments(rest, value, path),
            _ => Err(FormError::InvalidPath {
                path: path.to_string(),
                reason: format!("`{head}` holds a value, not a nested object"),
            }),
        }
    }

    /// Paths of every non-object value, depth first in key order.
    pub fn leaf_paths(&self) -> Vec<FieldPath> {
        let mut paths = Vec::new();
        self.collect_leaf_paths(&FieldPath::root(), &mut paths);
        paths
    }

    fn collect_leaf_paths(&self, prefix: &FieldPath, paths: &mut Vec<FieldPath>) {
        for (key, value) in self.iter() {
            let path = prefix.child(key);
            match value {
                FieldValue::Object(child) => child.collect_leaf_paths(&path, paths),
                _ => paths.push(path),
            }
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect::<Map<String, Value>>(),
        )
    }

    /// Decodes a JSON object. `hint` supplies the expected shape (see
    /// [`FieldValue::from_json`]).
    pub fn from_json(value: &Value, hint: Option<&FormState>) -> FormResult<Self> {
        match value {
            Value::Object(entries) => Self::from_json_map(entries, hint),
            other => Err(FormError::UnsupportedValue(format!(
                "form state must be a JSON object, got `{other}`"
            ))),
        }
    }

    fn from_json_map(entries: &Map<String, Value>, hint: Option<&FormState>) -> FormResult<Self> {
        let mut state = FormState::new();
        for (key, value) in entries {
            let value_hint = hint.and_then(|hint| hint.get(key));
            state.insert(key.clone(), FieldValue::from_json(value, value_hint)?);
        }
        Ok(state)
    }
}

impl Serialize for FormState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FormState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        FormState::from_json(&value, None).map_err(serde::de::Error::custom)
    }
}

impl<K, V> FromIterator<(K, V)> for FormState
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut state = FormState::new();
        for (key, value) in iter {
            state.insert(key, value);
        }
        state
    }
}

/// Address of one value inside a [`FormState`], written `a.b.c`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// The empty path. Only useful as a prefix for building child paths.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(path: &str) -> FormResult<Self> {
        Self::from_segments(path.split('.'))
    }

    pub fn from_segments<I, S>(segments: I) -> FormResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = segments.into_iter().map(Into::into).collect::<Vec<String>>();
        if segments.is_empty() || segments.iter().any(String::is_empty) {
            return Err(FormError::InvalidPath {
                path: segments.join("."),
                reason: "path segments must be non-empty".into(),
            });
        }
        Ok(Self(segments))
    }

    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(key.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Every proper prefix, shortest first.
    pub fn ancestors(&self) -> impl Iterator<Item = FieldPath> + '_ {
        (1..self.0.len()).map(|len| Self(self.0[..len].to_vec()))
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub trait IntoFieldPath {
    fn into_field_path(self) -> FormResult<FieldPath>;
}

impl IntoFieldPath for FieldPath {
    fn into_field_path(self) -> FormResult<FieldPath> {
        if self.is_root() {
            return Err(FormError::InvalidPath {
                path: String::new(),
                reason: "the root path does not address a field".into(),
            });
        }
        Ok(self)
    }
}

impl IntoFieldPath for &FieldPath {
    fn into_field_path(self) -> FormResult<FieldPath> {
        self.clone().into_field_path()
    }
}

impl IntoFieldPath for &str {
    fn into_field_path(self) -> FormResult<FieldPath> {
        FieldPath::parse(self)
    }
}

impl IntoFieldPath for String {
    fn into_field_path(self) -> FormResult<FieldPath> {
        FieldPath::parse(&self)
    }
}

/// Conversion between a Rust value and its [`FieldValue`] representation.
pub trait FormData: Sized {
    fn to_field_value(&self) -> FieldValue;
    fn from_field_value(value: &FieldValue) -> Option<Self>;
}

/// A statically typed form shape, usually implemented with
/// `#[derive(FormModel)]`.
pub trait FormModel: FormData + Clone + Send + Sync + 'static {
    type Fields;

    fn fields_at(prefix: FieldPath) -> Self::Fields;

    fn fields() -> Self::Fields {
        Self::fields_at(FieldPath::root())
    }

    fn to_form_state(&self) -> FormState {
        match self.to_field_value() {
            FieldValue::Object(state) => state,
            _ => FormState::new(),
        }
    }

    fn from_form_state(state: &FormState) -> FormResult<Self> {
        Self::from_field_value(&FieldValue::Object(state.clone())).ok_or_else(|| {
            FormError::ModelMismatch(format!(
                "state does not match `{}`",
                std::any::type_name::<Self>()
            ))
        })
    }
}

impl FormData for FieldValue {
    fn to_field_value(&self) -> FieldValue {
        self.clone()
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FormData for FormState {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Object(self.clone())
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_object().cloned()
    }
}

impl FormData for String {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_text().map(str::to_string)
    }
}

impl FormData for bool {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Bool(*self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FormData for Decimal {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Number(*self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_number()
    }
}

impl FormData for i64 {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Number(Decimal::from(*self))
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value
            .as_number()
            .filter(|number| number.fract().is_zero())
            .and_then(|number| number.to_i64())
    }
}

impl FormData for DateTime<Utc> {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Date(*self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_date()
    }
}

impl<T> FormData for Option<T>
where
    T: FormData,
{
    fn to_field_value(&self) -> FieldValue {
        match self {
            Some(value) => value.to_field_value(),
            None => FieldValue::Null,
        }
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(None),
            other => T::from_field_value(other).map(Some),
        }
    }
}
