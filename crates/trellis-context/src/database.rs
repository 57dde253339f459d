use trellis_core::TemplateSet;

use crate::merge::MergedContext;

/// The database every pipeline query runs against.
///
/// The merged context is fixed for the lifetime of a database; templates
/// change through the [`TemplateSet`] input, which is `None` only while the
/// database is being constructed.
#[salsa::db]
pub trait Db: salsa::Database {
    fn context(&self) -> &MergedContext;

    fn template_set(&self) -> Option<TemplateSet>;
}
