//! Course tree builders for unit tests.

use std::io;
use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

use coursenotes_shared::{ContentNode, Course, CourseKey, CourseTab, CourseTree, UsageKey};

use crate::memory::MemoryStore;

pub(crate) struct CourseBuilder {
    course: Course,
    nodes: Vec<ContentNode>,
}

impl CourseBuilder {
    pub(crate) fn new(org: &str, course: &str, run: &str) -> Self {
        let id = CourseKey::new(org, course, run);
        let location = id.make_usage_key("course", "course");
        let mut root = ContentNode::new(location.clone(), "course");
        root.display_name = Some(format!("{course} course"));
        Self {
            course: Course {
                id,
                display_name: format!("{course} course"),
                location,
                tabs: vec![CourseTab {
                    tab_type: "courseware".into(),
                    name: Some("Courseware".into()),
                }],
            },
            nodes: vec![root],
        }
    }

    pub(crate) fn root(&self) -> UsageKey {
        self.course.location.clone()
    }

    pub(crate) fn tab(&mut self, tab_type: &str) -> &mut Self {
        self.course.tabs.push(CourseTab {
            tab_type: tab_type.into(),
            name: None,
        });
        self
    }

    pub(crate) fn child(
        &mut self,
        parent: &UsageKey,
        category: &str,
        id: &str,
        name: &str,
    ) -> UsageKey {
        let location = self.course.id.make_usage_key(category, id);
        let mut node = ContentNode::new(location.clone(), category);
        node.display_name = Some(name.into());
        self.node_mut(parent).children.push(location.clone());
        self.nodes.push(node);
        location
    }

    pub(crate) fn graded(&mut self, parent: &UsageKey, id: &str, name: &str, format: &str) -> UsageKey {
        self.graded_block(parent, "sequential", id, name, format)
    }

    pub(crate) fn graded_block(
        &mut self,
        parent: &UsageKey,
        category: &str,
        id: &str,
        name: &str,
        format: &str,
    ) -> UsageKey {
        let location = self.child(parent, category, id, name);
        let node = self.node_mut(&location);
        node.graded = true;
        node.format = Some(format.into());
        location
    }

    pub(crate) fn node_mut(&mut self, location: &UsageKey) -> &mut ContentNode {
        self.nodes
            .iter_mut()
            .find(|n| &n.location == location)
            .expect("node exists in builder")
    }

    pub(crate) fn tree(self) -> CourseTree {
        CourseTree {
            course: self.course,
            nodes: self.nodes,
        }
    }

    pub(crate) fn build(self) -> (MemoryStore, CourseKey) {
        let (store, course) = self.build_with_course();
        (store, course.id)
    }

    pub(crate) fn build_with_course(self) -> (MemoryStore, Course) {
        let tree = self.tree();
        let course = tree.course.clone();
        let store = MemoryStore::from_trees([tree]).expect("valid test tree");
        (store, course)
    }
}

/// One chapter, one graded "Lesson 1" (Homework), one "Problem 1".
pub(crate) fn demo_course() -> (MemoryStore, CourseKey) {
    let mut b = CourseBuilder::new("edX", "DemoX", "2014");
    let chapter = b.child(&b.root(), "chapter", "chapter1", "Week 1");
    let lesson = b.graded(&chapter, "lesson1", "Lesson 1", "Homework");
    b.child(&lesson, "problem", "problem1", "Problem 1");
    b.build()
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = BufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BufferWriter(Arc::clone(&self.0))
    }
}

impl io::Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .0
            .lock()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber and return what it logged at
/// `WARN` and above.
pub(crate) fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, String) {
    let sink = SharedBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(sink.clone())
        .with_ansi(false)
        .with_max_level(Level::WARN)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let bytes = sink.0.lock().expect("lock output").clone();
    (result, String::from_utf8(bytes).expect("utf8 log output"))
}
