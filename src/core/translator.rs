//! Address translation between target addresses and module-relative
//! breakpoint addresses.

use crate::debug::types::{BreakpointAddress, RelocatedAddress};

/// A module loaded into the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub name: String,
    /// Address the module was loaded at
    pub base_address: u64,
    pub size: u64,
}

impl LoadedModule {
    fn contains(&self, address: u64) -> bool {
        address >= self.base_address && address - self.base_address < self.size
    }
}

/// Maps relocated addresses to the module that contains them
#[derive(Debug, Clone, Default)]
pub struct AddressTranslator {
    modules: Vec<LoadedModule>,
}

impl AddressTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. A module with the same name is replaced.
    pub fn add_module(&mut self, name: impl Into<String>, base_address: u64, size: u64) {
        let name = name.into();
        self.modules.retain(|m| m.name != name);
        self.modules.push(LoadedModule {
            name,
            base_address,
            size,
        });
    }

    pub fn modules(&self) -> &[LoadedModule] {
        &self.modules
    }

    /// Relocated address to breakpoint address
    pub fn unrelocate(&self, address: RelocatedAddress) -> BreakpointAddress {
        match self.modules.iter().find(|m| m.contains(address.0)) {
            Some(module) => BreakpointAddress::new(&module.name, address.0 - module.base_address),
            None => BreakpointAddress::absolute(address.0),
        }
    }

    /// Breakpoint address to relocated address.
    ///
    /// None if the module is not loaded or the offset runs past the end of
    /// the address space.
    pub fn relocate(&self, address: &BreakpointAddress) -> Option<RelocatedAddress> {
        match address.module() {
            Some(name) => self
                .modules
                .iter()
                .find(|m| m.name == name)
                .and_then(|m| m.base_address.checked_add(address.address()))
                .map(RelocatedAddress),
            None => Some(RelocatedAddress(address.address())),
        }
    }
}
