//! Minimal database for tests of the pipeline crates.

use std::collections::BTreeMap;
use std::sync::Arc;

use salsa::Setter;
use trellis_core::{SourceTemplate, TemplateSet};

use crate::database::Db;
use crate::merge::MergedContext;

#[salsa::db]
#[derive(Clone)]
pub struct TestDatabase {
    storage: salsa::Storage<Self>,
    context: Arc<MergedContext>,
    templates: Option<TemplateSet>,
}

#[salsa::db]
impl salsa::Database for TestDatabase {}

#[salsa::db]
impl Db for TestDatabase {
    fn context(&self) -> &MergedContext {
        &self.context
    }

    fn template_set(&self) -> Option<TemplateSet> {
        self.templates
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new(MergedContext::base_only())
    }
}

impl TestDatabase {
    pub fn new(context: MergedContext) -> Self {
        Self {
            storage: salsa::Storage::default(),
            context: Arc::new(context),
            templates: None,
        }
    }

    /// Add a template, or replace the text of an existing one.
    pub fn template(&mut self, name: &str, text: &str) -> SourceTemplate {
        let set = match self.templates {
            Some(set) => set,
            None => {
                let set = TemplateSet::new(self, BTreeMap::new());
                self.templates = Some(set);
                set
            }
        };
        let mut templates = set.templates(self).clone();
        if let Some(&source) = templates.get(name) {
            source.set_text(self).to(text.to_string());
            return source;
        }
        let source = SourceTemplate::new(self, name.to_string(), text.to_string());
        templates.insert(name.to_string(), source);
        set.set_templates(self).to(templates);
        source
    }
}
