//! Assignment extraction.
//!
//! An assignment is any block flagged as graded; its problems are the
//! `problem` blocks found beneath it.

use tracing::{debug, instrument};

use coursenotes_shared::{
    AssignmentResult, ContentNode, CourseKey, CourseNotesError, ProblemResult, Result,
};

use crate::store::{ContentStore, ItemFilter};

/// List the graded blocks of a course with their problems.
///
/// Fails with `NotFound` when the course does not exist. A course without
/// graded blocks yields an empty list, and an assignment without problems
/// yields an empty `problems` list.
#[instrument(skip_all, fields(course = %course_key))]
pub fn get_course_assignments<S: ContentStore>(
    store: &S,
    course_key: &CourseKey,
) -> Result<Vec<AssignmentResult>> {
    if store.get_course(course_key).is_none() {
        return Err(CourseNotesError::NotFound(course_key.to_string()));
    }

    store.bulk_operations(course_key, |store| {
        let assignments = store.get_items(course_key, &ItemFilter::graded());
        debug!(count = assignments.len(), "graded blocks found");

        assignments
            .into_iter()
            .map(|assignment| -> Result<AssignmentResult> {
                let problems = filter_problems(store, assignment)?
                    .into_iter()
                    .map(ProblemResult::from)
                    .collect();
                Ok(AssignmentResult {
                    id: assignment.location.to_string(),
                    name: assignment.display_name_with_default(),
                    assignment_type: assignment.format.clone(),
                    problems,
                })
            })
            .collect::<Result<Vec<_>>>()
    })
}

/// Collect the problems under `node`, depth-first, left to right.
///
/// A problem contributes itself (its own children are not searched), a
/// childless node contributes nothing, anything else contributes its
/// children's problems in order.
pub fn filter_problems<'s, S: ContentStore>(
    store: &'s S,
    node: &'s ContentNode,
) -> Result<Vec<&'s ContentNode>> {
    let mut problems = Vec::new();
    let mut stack = vec![node];

    while let Some(current) = stack.pop() {
        if current.is_problem() {
            problems.push(current);
            continue;
        }
        if !store.has_children(current) {
            continue;
        }
        let children = store.get_children(current)?;
        stack.extend(children.into_iter().rev());
    }

    Ok(problems)
}
