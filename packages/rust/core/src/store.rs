//! The read-only content store seam.
//!
//! Everything in this crate reads course content through [`ContentStore`].
//! Implementations own the nodes; callers only ever borrow them, and refer to
//! other nodes by [`UsageKey`].

use coursenotes_shared::{ContentNode, Course, CourseKey, Result, UsageKey};

/// Store-level filter for [`ContentStore::get_items`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub graded: Option<bool>,
    pub category: Option<String>,
}

impl ItemFilter {
    /// Nodes flagged `graded = true`.
    pub fn graded() -> Self {
        Self {
            graded: Some(true),
            category: None,
        }
    }

    pub fn category(category: impl Into<String>) -> Self {
        Self {
            graded: None,
            category: Some(category.into()),
        }
    }

    pub fn matches(&self, node: &ContentNode) -> bool {
        self.graded.is_none_or(|g| node.graded == g)
            && self.category.as_deref().is_none_or(|c| node.category == c)
    }
}

/// Read access to course trees.
///
/// Lookups by key fail with `ItemNotFound` when the key does not resolve.
pub trait ContentStore {
    /// The course with this id, if it exists.
    fn get_course(&self, course_key: &CourseKey) -> Option<&Course>;

    /// Every course in the store.
    fn get_courses(&self) -> Vec<&Course>;

    fn get_item(&self, location: &UsageKey) -> Result<&ContentNode>;

    /// Nodes of a course matching `filter`, in document order.
    fn get_items(&self, course_key: &CourseKey, filter: &ItemFilter) -> Vec<&ContentNode>;

    fn get_parent_location(&self, location: &UsageKey) -> Option<UsageKey>;

    /// Children of `node` in document order.
    fn get_children(&self, node: &ContentNode) -> Result<Vec<&ContentNode>> {
        node.children.iter().map(|c| self.get_item(c)).collect()
    }

    fn has_children(&self, node: &ContentNode) -> bool {
        !node.children.is_empty()
    }

    /// Run `op` with every lookup inside it observing one consistent view of
    /// the course.
    fn bulk_operations<R>(&self, _course_key: &CourseKey, op: impl FnOnce(&Self) -> R) -> R
    where
        Self: Sized,
    {
        op(self)
    }
}
