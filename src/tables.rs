use rustc_hash::FxHashMap;

use crate::ast::access::{Identifier, Reference};
use crate::ast::location::{HandleKey, InstantiatedLocation, Location};
use crate::source::Handle;

/// Handle-key to path table. Populated during host setup, read-only
/// afterwards; the core only performs lookups.
#[derive(Clone, Debug, Default)]
pub struct Handles {
    paths: FxHashMap<HandleKey, String>,
}

impl Handles {
    pub fn new() -> Self {
        Handles::default()
    }

    pub fn add(&mut self, handle: &Handle) -> HandleKey {
        let key = handle.key();
        self.paths.insert(key, handle.path().to_string());
        key
    }

    pub fn get(&self, key: HandleKey) -> Option<&str> {
        self.paths.get(&key).map(String::as_str)
    }

    /// Resolve a reference location to a renderable one. Unregistered
    /// handles render as `?`.
    pub fn instantiate(&self, location: &Location) -> InstantiatedLocation {
        InstantiatedLocation {
            path: self.get(location.path).unwrap_or("?").to_string(),
            start: location.start,
            stop: location.stop,
        }
    }
}

/// Module-export lookups, backing wildcard-import expansion. `None` means
/// the module has not been indexed yet, which is distinct from a module
/// exporting nothing.
pub trait ModuleExports {
    fn exports(&self, qualifier: &Reference) -> Option<Vec<Identifier>>;
}

/// In-memory export table with the populate-then-freeze lifecycle.
#[derive(Clone, Debug, Default)]
pub struct ModuleTable {
    exports: FxHashMap<Reference, Vec<Identifier>>,
}

impl ModuleTable {
    pub fn new() -> Self {
        ModuleTable::default()
    }

    pub fn add(&mut self, qualifier: Reference, exports: Vec<Identifier>) {
        self.exports.insert(qualifier, exports);
    }
}

impl ModuleExports for ModuleTable {
    fn exports(&self, qualifier: &Reference) -> Option<Vec<Identifier>> {
        self.exports.get(qualifier).cloned()
    }
}
