// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Template catalog.
//!
//! An explicitly passed, process-scoped map of template id → descriptor.
//! Callers construct one and hand it to [`crate::draw`]; the engine never
//! looks templates up through global state. Templates are shared read-only
//! via `Arc`, so a reload swaps the descriptor without invalidating
//! buildings already holding the previous one.

use crate::template::Template;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: FxHashMap<String, Arc<Template>>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a template under its own id, replacing any previous entry.
    pub fn insert(&mut self, template: Template) -> Arc<Template> {
        let entry = Arc::new(template);
        self.templates.insert(entry.id.clone(), entry.clone());
        entry
    }

    pub fn get(&self, id: &str) -> Option<Arc<Template>> {
        self.templates.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Replaces a template in place. Same as [`TemplateCatalog::insert`]
    /// but returns the previous descriptor, letting callers detect whether
    /// anything actually changed.
    pub fn reload(&mut self, template: Template) -> Option<Arc<Template>> {
        let entry = Arc::new(template);
        self.templates.insert(entry.id.clone(), entry)
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<Template>> {
        self.templates.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
