use std::collections::BTreeMap;

use crate::value::{FieldPath, FieldValue, FormState};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Slot<T> {
    Leaf(T),
    Branch(ShapeMap<T>),
}

/// Per-field metadata laid out in the same tree shape as a [`FormState`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShapeMap<T> {
    slots: BTreeMap<String, Slot<T>>,
}

/// `None` marks a valid field.
pub type ErrorState = ShapeMap<Option<String>>;

pub type TouchedState = ShapeMap<bool>;

impl<T> Default for ShapeMap<T> {
    fn default() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }
}

impl<T: Clone> ShapeMap<T> {
    /// Mirrors every key of `shape`, recursing into nested objects and
    /// filling each leaf with `leaf`.
    pub fn from_shape(shape: &FormState, leaf: T) -> Self {
        let slots = shape
            .iter()
            .map(|(key, value)| {
                let slot = match value {
                    FieldValue::Object(child) => Slot::Branch(Self::from_shape(child, leaf.clone())),
                    _ => Slot::Leaf(leaf.clone()),
                };
                (key.clone(), slot)
            })
            .collect();
        Self { slots }
    }

    pub fn get(&self, path: &FieldPath) -> Option<&T> {
        let (last, parents) = path.segments().split_last()?;
        let mut current = self;
        for segment in parents {
            match current.slots.get(segment)? {
                Slot::Branch(child) => current = child,
                Slot::Leaf(_) => return None,
            }
        }
        match current.slots.get(last)? {
            Slot::Leaf(value) => Some(value),
            Slot::Branch(_) => None,
        }
    }

    /// Writes a leaf, creating branches along the way. A leaf sitting where a
    /// branch is needed gets replaced.
    pub fn set(&mut self, path: &FieldPath, value: T) {
        let Some((last, parents)) = path.segments().split_last() else {
            return;
        };
        let mut current = self;
        for segment in parents {
            let slot = current
                .slots
                .entry(segment.clone())
                .or_insert_with(|| Slot::Branch(ShapeMap::default()));
            if let Slot::Leaf(_) = slot {
                *slot = Slot::Branch(ShapeMap::default());
            }
            let Slot::Branch(child) = slot else {
                return;
            };
            current = child;
        }
        current.slots.insert(last.clone(), Slot::Leaf(value));
    }

    /// Drops the leaf at `path`. Branches along the way are kept.
    pub fn remove(&mut self, path: &FieldPath) -> Option<T> {
        let (last, parents) = path.segments().split_last()?;
        let mut current = self;
        for segment in parents {
            match current.slots.get_mut(segment)? {
                Slot::Branch(child) => current = child,
                Slot::Leaf(_) => return None,
            }
        }
        match current.slots.remove(last)? {
            Slot::Leaf(value) => Some(value),
            branch @ Slot::Branch(_) => {
                current.slots.insert(last.clone(), branch);
                None
            }
        }
    }

    pub fn leaves(&self) -> Vec<(FieldPath, &T)> {
        let mut leaves = Vec::new();
        self.collect_leaves(&FieldPath::root(), &mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, prefix: &FieldPath, leaves: &mut Vec<(FieldPath, &'a T)>) {
        for (key, slot) in &self.slots {
            let path = prefix.child(key);
            match slot {
                Slot::Leaf(value) => leaves.push((path, value)),
                Slot::Branch(child) => child.collect_leaves(&path, leaves),
            }
        }
    }

    pub fn any(&self, predicate: impl Fn(&T) -> bool + Copy) -> bool {
        self.slots.values().any(|slot| match slot {
            Slot::Leaf(value) => predicate(value),
            Slot::Branch(child) => child.any(predicate),
        })
    }

    pub fn slot(&self, key: &str) -> Option<&Slot<T>> {
        self.slots.get(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl ShapeMap<Option<String>> {
    /// True when no leaf, at any depth, carries an error message.
    pub fn is_valid(&self) -> bool {
        !self.any(Option::is_some)
    }

    pub fn messages(&self) -> Vec<(FieldPath, String)> {
        self.leaves()
            .into_iter()
            .filter_map(|(path, message)| message.clone().map(|message| (path, message)))
            .collect()
    }
}

impl ShapeMap<bool> {
    pub fn any_touched(&self) -> bool {
        self.any(|touched| *touched)
    }
}
