//! Access checks for content items.

use coursenotes_shared::{Actor, ContentNode, CourseKey};

/// Capability being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessAction {
    /// View the item in the courseware.
    Load,
    /// Course staff privileges.
    Staff,
}

/// Pure predicate deciding whether an actor may perform an action on an item.
pub trait AccessChecker {
    fn has_access(
        &self,
        actor: &Actor,
        action: AccessAction,
        item: &ContentNode,
        course_key: &CourseKey,
    ) -> bool;
}

impl<F> AccessChecker for F
where
    F: Fn(&Actor, AccessAction, &ContentNode, &CourseKey) -> bool,
{
    fn has_access(
        &self,
        actor: &Actor,
        action: AccessAction,
        item: &ContentNode,
        course_key: &CourseKey,
    ) -> bool {
        self(actor, action, item, course_key)
    }
}

/// Default rules: staff see everything; learners are held back by
/// staff-only visibility and by content-group restrictions.
#[derive(Debug, Clone, Copy, Default)]
pub struct CourseAccess;

impl CourseAccess {
    /// Every partition the item restricts must list the actor's group.
    fn in_allowed_groups(actor: &Actor, item: &ContentNode) -> bool {
        item.group_access
            .iter()
            .filter(|(_, groups)| !groups.is_empty())
            .all(|(partition, groups)| {
                actor
                    .partition_groups
                    .get(partition)
                    .is_some_and(|g| groups.contains(g))
            })
    }
}

impl AccessChecker for CourseAccess {
    fn has_access(
        &self,
        actor: &Actor,
        action: AccessAction,
        item: &ContentNode,
        _course_key: &CourseKey,
    ) -> bool {
        if actor.is_staff {
            return true;
        }
        match action {
            AccessAction::Staff => false,
            AccessAction::Load => {
                !item.visible_to_staff_only && Self::in_allowed_groups(actor, item)
            }
        }
    }
}
