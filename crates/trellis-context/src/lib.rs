//! The capability surface templates are compiled against.
//!
//! A [`MergedContext`] is built once from an ordered list of
//! [`Contributor`]s and is read-only afterwards: the analyzer resolves calls
//! against its [`ContextModel`], and compiled templates dispatch through it at
//! run time.

pub mod base;
pub mod classes;
pub mod contributor;
pub mod database;
pub mod merge;
pub mod model;
pub mod overload;
pub mod test_db;

pub use base::{BASE, base_contributor};
pub use classes::{CastPlan, ClassDef, ClassKind, ClassTable, Coercion, MethodCandidate};
pub use contributor::{Contributor, FnContributor, HostFn};
pub use database::Db;
pub use merge::{MergeCollisionError, MergedContext, MergedContextBuilder};
pub use model::{ContextModel, Member};
pub use overload::{Cost, OverloadError, OverloadResolver, Resolved};
