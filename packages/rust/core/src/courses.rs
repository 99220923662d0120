//! Course list and detail lookups.

use coursenotes_shared::{CourseKey, CourseNotesError, CourseSummary, Result};

use crate::store::ContentStore;

/// Every course in the store. An empty store gives an empty list.
pub fn list_courses<S: ContentStore>(store: &S) -> Vec<CourseSummary> {
    store
        .get_courses()
        .into_iter()
        .map(CourseSummary::from)
        .collect()
}

/// A single course; `NotFound` when it does not exist.
pub fn get_course_detail<S: ContentStore>(store: &S, course_key: &CourseKey) -> Result<CourseSummary> {
    store
        .get_course(course_key)
        .map(CourseSummary::from)
        .ok_or_else(|| CourseNotesError::NotFound(course_key.to_string()))
}
