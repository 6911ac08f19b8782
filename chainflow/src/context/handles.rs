//! Non-serializable values carried alongside context fields.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Handle name an HTTP adapter uses for the inbound request.
pub const REQUEST_HANDLE: &str = "request";
/// Handle name an HTTP adapter uses for its response writer.
pub const RESPONSE_HANDLE: &str = "response";
/// Handle name for the hosting application (router, app state, ...).
pub const APP_HANDLE: &str = "app";

type HandleValue = Arc<dyn Any + Send + Sync>;

/// A name-keyed map of shared, type-erased values.
///
/// Handles let adapters thread things like response writers or database
/// pools through a pipeline without forcing them into JSON. Cloning a
/// `Handles` clones the `Arc`s, not the values.
#[derive(Clone, Default)]
pub struct Handles {
    entries: HashMap<String, HandleValue>,
}

impl Handles {
    /// Creates an empty handle map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `name`, replacing any previous handle.
    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.entries.insert(name.into(), Arc::new(value));
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns the handle under `name` if it exists and has type `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .get(name)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Checks whether a handle exists under `name`, whatever its type.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Removes a handle.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Copies every handle from `other` whose name is not present here.
    pub fn absorb(&mut self, other: &Self) {
        for (name, value) in &other.entries {
            self.entries
                .entry(name.clone())
                .or_insert_with(|| Arc::clone(value));
        }
    }

    /// Returns the handle names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no handles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Handles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handles").field("names", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct ResponseWriter {
        body: Mutex<Vec<String>>,
    }

    #[test]
    fn test_typed_lookup() {
        let handles = Handles::new().with(RESPONSE_HANDLE, ResponseWriter::default());

        let writer = handles.get::<ResponseWriter>(RESPONSE_HANDLE).unwrap();
        writer.body.lock().push("hello".to_string());

        assert!(handles.get::<String>(RESPONSE_HANDLE).is_none());
        assert!(handles.get::<ResponseWriter>("missing").is_none());
    }

    #[test]
    fn test_clones_share_values() {
        let handles = Handles::new().with(RESPONSE_HANDLE, ResponseWriter::default());
        let copy = handles.clone();

        copy.get::<ResponseWriter>(RESPONSE_HANDLE)
            .unwrap()
            .body
            .lock()
            .push("sent".to_string());

        let original = handles.get::<ResponseWriter>(RESPONSE_HANDLE).unwrap();
        assert_eq!(original.body.lock().as_slice(), ["sent".to_string()]);
    }

    #[test]
    fn test_absorb_keeps_existing() {
        let mut left = Handles::new().with(APP_HANDLE, 1_u32);
        let right = Handles::new().with(APP_HANDLE, 2_u32).with("db", "pool");

        left.absorb(&right);

        assert_eq!(*left.get::<u32>(APP_HANDLE).unwrap(), 1);
        assert_eq!(left.names(), vec!["app".to_string(), "db".to_string()]);
    }

    #[test]
    fn test_debug_lists_names() {
        let handles = Handles::new().with(REQUEST_HANDLE, 0_i32);
        assert_eq!(format!("{handles:?}"), "Handles { names: [\"request\"] }");
    }
}
