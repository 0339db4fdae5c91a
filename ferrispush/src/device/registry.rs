//! Registry mapping vendor names to device factories.

use std::sync::Arc;

use indexmap::IndexMap;

use super::{Device, DeviceFactory};
use crate::error::UsageError;

/// Registry of device implementations, looked up by vendor name.
///
/// Names are case-insensitive and kept in registration order.
#[derive(Default, Clone)]
pub struct VendorRegistry {
    vendors: IndexMap<String, DeviceFactory>,
}

impl VendorRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), UsageError>
    where
        F: Fn(&str) -> Box<dyn Device> + Send + Sync + 'static,
    {
        self.register_factory(name, Arc::new(factory))
    }

    /// Register an already shared factory under `name`.
    pub fn register_factory(
        &mut self,
        name: impl Into<String>,
        factory: DeviceFactory,
    ) -> Result<(), UsageError> {
        let name = name.into().to_lowercase();
        if self.vendors.contains_key(&name) {
            return Err(UsageError::DuplicateVendor { name });
        }
        self.vendors.insert(name, factory);
        Ok(())
    }

    /// Get the factory for a vendor.
    pub fn get(&self, name: &str) -> Result<DeviceFactory, UsageError> {
        self.vendors
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| UsageError::UnknownVendor {
                name: name.to_string(),
                known: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    /// Check if a vendor is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.vendors.contains_key(&name.to_lowercase())
    }

    /// List all registered vendor names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vendors.keys().map(String::as_str)
    }

    /// Number of registered vendors.
    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }
}

impl std::fmt::Debug for VendorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorRegistry")
            .field("vendors", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
