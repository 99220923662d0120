//! Arena-backed in-memory [`ContentStore`].
//!
//! Nodes live in one `Vec` and are addressed through a key index, so a loaded
//! snapshot can be traversed without chasing owned pointers. Document order is
//! a depth-first pre-order walk from each course root.

use std::collections::HashMap;

use tracing::debug;

use coursenotes_shared::{
    ContentNode, Course, CourseKey, CourseNotesError, CourseTree, Result, UsageKey,
};

use crate::store::{ContentStore, ItemFilter};

/// In-memory content store holding one or more whole courses.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    courses: Vec<Course>,
    nodes: Vec<ContentNode>,
    index: HashMap<UsageKey, usize>,
    parents: HashMap<UsageKey, UsageKey>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from whole course trees.
    pub fn from_trees(trees: impl IntoIterator<Item = CourseTree>) -> Result<Self> {
        let mut store = Self::new();
        for tree in trees {
            store.insert_course(tree)?;
        }
        Ok(store)
    }

    /// Add a course tree.
    ///
    /// Rejects duplicate keys, nodes outside the course, children that are not
    /// part of the tree, nodes with two parents, and a root that has a parent.
    pub fn insert_course(&mut self, tree: CourseTree) -> Result<()> {
        let CourseTree { course, nodes } = tree;

        if self.get_course(&course.id).is_some() {
            return Err(CourseNotesError::validation(format!(
                "course {} already loaded",
                course.id
            )));
        }

        let mut local: HashMap<&UsageKey, &ContentNode> = HashMap::with_capacity(nodes.len());
        for node in &nodes {
            if node.location.course_key != course.id {
                return Err(CourseNotesError::validation(format!(
                    "node {} does not belong to course {}",
                    node.location, course.id
                )));
            }
            if self.index.contains_key(&node.location)
                || local.insert(&node.location, node).is_some()
            {
                return Err(CourseNotesError::validation(format!(
                    "duplicate node {}",
                    node.location
                )));
            }
        }

        if !local.contains_key(&course.location) {
            return Err(CourseNotesError::validation(format!(
                "course root {} missing from tree",
                course.location
            )));
        }

        let mut parents: HashMap<UsageKey, UsageKey> = HashMap::new();
        for node in &nodes {
            for child in &node.children {
                if !local.contains_key(child) {
                    return Err(CourseNotesError::validation(format!(
                        "{} lists unknown child {child}",
                        node.location
                    )));
                }
                if let Some(previous) = parents.insert(child.clone(), node.location.clone()) {
                    return Err(CourseNotesError::validation(format!(
                        "{child} has two parents: {previous} and {}",
                        node.location
                    )));
                }
            }
        }

        if parents.contains_key(&course.location) {
            return Err(CourseNotesError::validation(format!(
                "course root {} has a parent",
                course.location
            )));
        }

        debug!(course = %course.id, nodes = nodes.len(), "course loaded into memory store");

        for node in nodes {
            self.index.insert(node.location.clone(), self.nodes.len());
            self.nodes.push(node);
        }
        self.parents.extend(parents);
        self.courses.push(course);
        Ok(())
    }

    /// Delete a node as an authoring tool would: it disappears from lookups
    /// and from its parent's children. Its own children keep pointing at it.
    pub fn remove_item(&mut self, location: &UsageKey) -> Result<ContentNode> {
        let idx = self
            .index
            .remove(location)
            .ok_or_else(|| CourseNotesError::ItemNotFound(location.to_string()))?;

        if let Some(parent) = self.parents.remove(location) {
            if let Some(&parent_idx) = self.index.get(&parent) {
                self.nodes[parent_idx].children.retain(|c| c != location);
            }
        }

        Ok(self.nodes[idx].clone())
    }

    /// Number of live nodes across all courses.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl ContentStore for MemoryStore {
    fn get_course(&self, course_key: &CourseKey) -> Option<&Course> {
        self.courses.iter().find(|c| &c.id == course_key)
    }

    fn get_courses(&self) -> Vec<&Course> {
        self.courses.iter().collect()
    }

    fn get_item(&self, location: &UsageKey) -> Result<&ContentNode> {
        self.index
            .get(location)
            .map(|&idx| &self.nodes[idx])
            .ok_or_else(|| CourseNotesError::ItemNotFound(location.to_string()))
    }

    fn get_items(&self, course_key: &CourseKey, filter: &ItemFilter) -> Vec<&ContentNode> {
        let Some(course) = self.get_course(course_key) else {
            return Vec::new();
        };
        let Ok(root) = self.get_item(&course.location) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if filter.matches(node) {
                found.push(node);
            }
            // Reverse so the leftmost child is visited first.
            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .filter_map(|c| self.get_item(c).ok()),
            );
        }
        found
    }

    fn get_parent_location(&self, location: &UsageKey) -> Option<UsageKey> {
        self.parents.get(location).cloned()
    }
}
