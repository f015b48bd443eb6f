//! Payee name resolution for `dispatch_by_name`.

use std::collections::HashMap;

use parking_lot::RwLock;
use treasury_types::Address;

/// Resolves human-readable payee names to addresses.
pub trait NameDirectory: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Address>;
}

/// Case-insensitive in-memory directory.
#[derive(Debug, Default)]
pub struct InMemoryNameDirectory {
    names: RwLock<HashMap<String, Address>>,
}

impl InMemoryNameDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a name. Returns the previous address, if any.
    pub fn register(&self, name: &str, address: Address) -> Option<Address> {
        self.names.write().insert(normalize(name), address)
    }

    pub fn remove(&self, name: &str) -> Option<Address> {
        self.names.write().remove(&normalize(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

impl NameDirectory for InMemoryNameDirectory {
    fn resolve(&self, name: &str) -> Option<Address> {
        self.names.read().get(&normalize(name)).copied()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
