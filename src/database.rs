//! The salsa database owned by the compiler driver.

use std::collections::BTreeMap;
use std::sync::Arc;

use salsa::Setter;
use trellis_context::{Db, MergedContext};
use trellis_core::{SourceTemplate, TemplateSet};

#[salsa::db]
#[derive(Clone)]
pub struct TemplateDatabase {
    storage: salsa::Storage<Self>,
    context: Arc<MergedContext>,
    templates: Option<TemplateSet>,
}

#[salsa::db]
impl salsa::Database for TemplateDatabase {}

#[salsa::db]
impl Db for TemplateDatabase {
    fn context(&self) -> &MergedContext {
        &self.context
    }

    fn template_set(&self) -> Option<TemplateSet> {
        self.templates
    }
}

impl TemplateDatabase {
    pub fn new(context: Arc<MergedContext>) -> Self {
        let mut db = Self {
            storage: salsa::Storage::default(),
            context,
            templates: None,
        };
        db.templates = Some(TemplateSet::new(&db, BTreeMap::new()));
        db
    }

    pub fn merged_context(&self) -> &Arc<MergedContext> {
        &self.context
    }

    fn set(&self) -> Option<TemplateSet> {
        self.templates
    }

    pub fn source(&self, name: &str) -> Option<SourceTemplate> {
        let set = self.set()?;
        set.templates(self).get(name).copied()
    }

    /// Registered template names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.set()
            .map(|set| set.templates(self).keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Add a template or update its text. Writing identical text is a no-op
    /// so cached analyses survive a re-sync.
    pub fn set_source(&mut self, name: &str, text: &str) -> SourceTemplate {
        if let Some(source) = self.source(name) {
            if source.text(self) != text {
                source.set_text(self).to(text.to_string());
            }
            return source;
        }
        let source = SourceTemplate::new(self, name.to_string(), text.to_string());
        if let Some(set) = self.set() {
            let mut templates = set.templates(self).clone();
            templates.insert(name.to_string(), source);
            set.set_templates(self).to(templates);
        }
        source
    }

    /// Forget a template; callers that referenced it re-check on next use.
    pub fn remove_source(&mut self, name: &str) -> bool {
        let Some(set) = self.set() else {
            return false;
        };
        let mut templates = set.templates(self).clone();
        if templates.remove(name).is_none() {
            return false;
        }
        set.set_templates(self).to(templates);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_codegen::compile_unit;

    #[test]
    fn test_identical_text_keeps_cached_results() {
        let mut db = TemplateDatabase::new(Arc::new(MergedContext::base_only()));
        let source = db.set_source("hello", "<% template hello() %>hi");
        let first = compile_unit(&db, source).unwrap();
        let again = db.set_source("hello", "<% template hello() %>hi");
        assert_eq!(source, again);
        let second = compile_unit(&db, source).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_removed_template_breaks_callers() {
        let mut db = TemplateDatabase::new(Arc::new(MergedContext::base_only()));
        db.set_source("inner", "<% template inner() %>x");
        let outer = db.set_source("outer", "<% template outer() %><% call inner() %>");
        assert!(compile_unit(&db, outer).is_some());
        assert!(db.remove_source("inner"));
        assert!(compile_unit(&db, outer).is_none());
        assert_eq!(db.names(), vec!["outer".to_string()]);
    }
}
