//! Course content queries and annotation enrichment for coursenotes.
//!
//! Everything here works against the [`ContentStore`] and [`AccessChecker`]
//! seams, so the same logic runs over an in-memory tree, a storage snapshot,
//! or a test fixture.

pub mod access;
pub mod assignments;
pub mod courses;
pub mod enrichment;
pub mod memory;
pub mod notes;
pub mod store;

#[cfg(test)]
mod test_support;

pub use access::{AccessAction, AccessChecker, CourseAccess};
pub use assignments::{filter_problems, get_course_assignments};
pub use courses::{get_course_detail, list_courses};
pub use enrichment::{AnnotationEnricher, jump_to_url};
pub use memory::MemoryStore;
pub use notes::{AnnotationSource, SearchEnvelope, get_notes, is_feature_enabled, search};
pub use store::{ContentStore, ItemFilter};
