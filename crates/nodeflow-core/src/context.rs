use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{NodeflowError, Result};

/// Raw key/value mapping carried by a context or a static patch.
pub type ContextMap = HashMap<String, serde_json::Value>;

/// Accumulated pipeline state shared between graph nodes.
///
/// A `Context` is an immutable snapshot: cloning is cheap and merging a patch
/// always yields a new snapshot, leaving every previously published one
/// untouched. Keys are strings; values are JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    data: Arc<ContextMap>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a Context from initial data.
    pub fn from_map(data: ContextMap) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Deserialize a value into `T`.
    ///
    /// Returns `MissingKey` when absent and `Json` when the value has the
    /// wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .data
            .get(key)
            .ok_or_else(|| NodeflowError::MissingKey(key.to_string()))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the underlying data map.
    pub fn data(&self) -> &ContextMap {
        &self.data
    }

    /// Render the snapshot as a JSON object.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Produce a new snapshot with `patch` merged in (shallow, overwrites on conflict).
    pub fn apply(&self, patch: Patch) -> Context {
        let updates = match patch {
            Patch::Static(map) => map,
            Patch::Computed(f) => f(self),
        };
        if updates.is_empty() {
            return self.clone();
        }

        let mut data = ContextMap::clone(&self.data);
        data.extend(updates);
        Context::from_map(data)
    }
}

impl From<ContextMap> for Context {
    fn from(data: ContextMap) -> Self {
        Self::from_map(data)
    }
}

/// Function form of a patch: receives the pre-merge snapshot once.
pub type PatchFn = Box<dyn FnOnce(&Context) -> ContextMap + Send>;

/// Incremental update to a [`Context`].
pub enum Patch {
    /// Partial mapping merged as-is.
    Static(ContextMap),
    /// Computed from the current snapshot at merge time.
    Computed(PatchFn),
}

impl Patch {
    /// A static patch with no keys.
    pub fn empty() -> Self {
        Patch::Static(ContextMap::new())
    }

    /// A static patch setting a single key.
    pub fn set(key: impl Into<String>, value: serde_json::Value) -> Self {
        Patch::empty().with(key, value)
    }

    pub fn from_map(map: ContextMap) -> Self {
        Patch::Static(map)
    }

    /// Build a static patch from a JSON object.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(obj) => Ok(Patch::Static(obj.into_iter().collect())),
            other => Err(NodeflowError::InvalidPatch(json_kind(&other).to_string())),
        }
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: FnOnce(&Context) -> ContextMap + Send + 'static,
    {
        Patch::Computed(Box::new(f))
    }

    /// Add a key to this patch.
    ///
    /// On a computed patch the key is inserted after the function runs, so it
    /// wins over whatever the function produced for the same key.
    pub fn with(self, key: impl Into<String>, value: serde_json::Value) -> Self {
        let key = key.into();
        match self {
            Patch::Static(mut map) => {
                map.insert(key, value);
                Patch::Static(map)
            }
            Patch::Computed(f) => Patch::computed(move |ctx| {
                let mut map = f(ctx);
                map.insert(key, value);
                map
            }),
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Patch::Computed(_))
    }
}

impl Default for Patch {
    fn default() -> Self {
        Patch::empty()
    }
}

impl From<ContextMap> for Patch {
    fn from(map: ContextMap) -> Self {
        Patch::Static(map)
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Patch::Static(map) => f.debug_tuple("Static").field(map).finish(),
            Patch::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Merge an optional patch into `context`; `None` returns the context unchanged.
pub fn apply_patch(context: &Context, patch: Option<Patch>) -> Context {
    match patch {
        Some(patch) => context.apply(patch),
        None => context.clone(),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
