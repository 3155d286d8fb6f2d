//! Registry of loaded material packages
//!
//! Submodels name their material by `(owner, index)`. Handles owned by the
//! model package itself resolve locally; everything else, including the
//! level, global and shared-vehicle sentinel owners, resolves through a
//! [`PackageManager`] the host fills with the packages it has loaded.
//!
//! The manager is a plain value. A host that shares it between threads
//! wraps it in a lock of its choosing.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::formats::material::{Material, MaterialHandle, MaterialPackage};

#[derive(Debug, Clone, Default)]
pub struct PackageManager {
    packages: HashMap<u32, Arc<MaterialPackage>>,
}

impl PackageManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package under its own uid.
    ///
    /// # Errors
    /// Returns [`Error::PackageAlreadyRegistered`] if the uid is taken.
    pub fn register(&mut self, package: impl Into<Arc<MaterialPackage>>) -> Result<Arc<MaterialPackage>> {
        let package = package.into();
        self.register_as(package.uid, package)
    }

    /// Register a package under an explicit owner id, e.g. one of the
    /// sentinel owners for level or global materials.
    ///
    /// # Errors
    /// Returns [`Error::PackageAlreadyRegistered`] if the owner id is taken.
    pub fn register_as(
        &mut self,
        uid: u32,
        package: impl Into<Arc<MaterialPackage>>,
    ) -> Result<Arc<MaterialPackage>> {
        if self.packages.contains_key(&uid) {
            return Err(Error::PackageAlreadyRegistered { uid });
        }
        let package = package.into();
        tracing::debug!(
            "Registered material package {:#x} ({} materials)",
            uid,
            package.len()
        );
        self.packages.insert(uid, Arc::clone(&package));
        Ok(package)
    }

    pub fn unregister(&mut self, uid: u32) -> Option<Arc<MaterialPackage>> {
        self.packages.remove(&uid)
    }

    #[must_use]
    pub fn get(&self, uid: u32) -> Option<&Arc<MaterialPackage>> {
        self.packages.get(&uid)
    }

    #[must_use]
    pub fn contains(&self, uid: u32) -> bool {
        self.packages.contains_key(&uid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn clear(&mut self) {
        self.packages.clear();
    }

    /// Look up the material a handle names.
    ///
    /// Returns `None` for the null handle, an unregistered owner or an index
    /// past the end of the owner's package.
    #[must_use]
    pub fn resolve(&self, handle: MaterialHandle) -> Option<&Material> {
        if handle.is_null() {
            return None;
        }
        self.packages.get(&u32::from(handle.owner))?.get(handle.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::common::Platform;
    use crate::formats::material::OWNER_GLOBAL;

    fn package(uid: u32, materials: usize) -> MaterialPackage {
        let mut package = MaterialPackage::new(Platform::Pc, uid);
        package.materials = (0..materials)
            .map(|i| Material {
                flags: i as u32,
                ..Material::default()
            })
            .collect();
        package
    }

    #[test]
    fn test_register_and_resolve() {
        let mut manager = PackageManager::new();
        manager.register(package(0x20, 2)).unwrap();
        manager.register_as(u32::from(OWNER_GLOBAL), package(0x99, 1)).unwrap();

        assert_eq!(manager.len(), 2);
        assert_eq!(manager.resolve(MaterialHandle::new(0x20, 1)).unwrap().flags, 1);
        assert!(manager.resolve(MaterialHandle::new(0x20, 2)).is_none());
        assert!(manager.resolve(MaterialHandle::new(OWNER_GLOBAL, 0)).is_some());
        assert!(manager.resolve(MaterialHandle::NULL).is_none());
        assert!(manager.resolve(MaterialHandle::new(0x21, 0)).is_none());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut manager = PackageManager::new();
        manager.register(package(0x20, 1)).unwrap();
        assert!(matches!(
            manager.register(package(0x20, 3)),
            Err(Error::PackageAlreadyRegistered { uid: 0x20 })
        ));
        assert_eq!(manager.get(0x20).unwrap().len(), 1);

        assert!(manager.unregister(0x20).is_some());
        assert!(!manager.contains(0x20));
        manager.register(package(0x20, 3)).unwrap();
        manager.clear();
        assert!(manager.is_empty());
    }
}
