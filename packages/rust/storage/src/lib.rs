//! libSQL storage for imported course trees.
//!
//! The [`Storage`] struct wraps a local libSQL database holding course
//! metadata, content blocks, and the history of imports.
//!
//! **Access rules:**
//! - `coursenotes import`: read-write via [`Storage::open`]
//! - query commands: read-only via [`Storage::open_readonly`]
//!
//! Reads hand back a [`MemoryStore`] snapshot of one course, so every query in
//! a request sees the same tree.

mod migrations;

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use coursenotes_core::MemoryStore;
use coursenotes_shared::{
    ContentNode, Course, CourseKey, CourseNotesError, CourseSummary, CourseTree, Result, UsageKey,
};
use libsql::{Connection, Database, params};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Outcome of a successful [`Storage::import_course`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub job_id: String,
    pub course_id: CourseKey,
    pub nodes: usize,
}

/// One row of the import history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub id: String,
    pub course_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub node_count: Option<i64>,
}

fn storage_err(e: libsql::Error) -> CourseNotesError {
    CourseNotesError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CourseNotesError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CourseNotesError::Storage(format!(
                "database not found at {}; import a course first",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    CourseNotesError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CourseNotesError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Import
    // -----------------------------------------------------------------------

    /// Replace a course's stored tree with `tree`.
    ///
    /// The tree is validated first; an invalid tree leaves the database
    /// untouched. The replacement and its import record commit together.
    #[instrument(skip_all, fields(course = %tree.course.id, nodes = tree.nodes.len()))]
    pub async fn import_course(&self, tree: &CourseTree) -> Result<ImportSummary> {
        self.check_writable()?;
        MemoryStore::from_trees([tree.clone()])?;

        let course_id = tree.course.id.to_string();
        let job_id = Uuid::now_v7().to_string();
        let started_at = Utc::now().to_rfc3339();
        let tabs_json = serde_json::to_string(&tree.course.tabs)
            .map_err(|e| CourseNotesError::Storage(format!("encode tabs: {e}")))?;

        let mut placement: HashMap<&UsageKey, (&UsageKey, i64)> = HashMap::new();
        for node in &tree.nodes {
            for (position, child) in node.children.iter().enumerate() {
                placement.insert(child, (&node.location, position as i64));
            }
        }

        let tx = self.conn.transaction().await.map_err(storage_err)?;

        tx.execute(
            "DELETE FROM nodes WHERE course_id = ?1",
            params![course_id.as_str()],
        )
        .await
        .map_err(storage_err)?;

        tx.execute(
            "INSERT INTO courses (id, display_name, location, tabs_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                location = excluded.location,
                tabs_json = excluded.tabs_json,
                updated_at = excluded.updated_at",
            params![
                course_id.as_str(),
                tree.course.display_name.as_str(),
                tree.course.location.to_string(),
                tabs_json,
                started_at.as_str()
            ],
        )
        .await
        .map_err(storage_err)?;

        for (seq, node) in tree.nodes.iter().enumerate() {
            let (parent_key, position) = match placement.get(&node.location) {
                Some((parent, position)) => (Some(parent.to_string()), Some(*position)),
                None => (None, None),
            };
            let group_access_json = if node.group_access.is_empty() {
                None
            } else {
                Some(
                    serde_json::to_string(&node.group_access)
                        .map_err(|e| CourseNotesError::Storage(format!("encode group_access: {e}")))?,
                )
            };

            tx.execute(
                "INSERT INTO nodes (location, course_id, seq, parent_key, position, category,
                                    display_name, graded, format, visible_to_staff_only,
                                    group_access_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    node.location.to_string(),
                    course_id.as_str(),
                    seq as i64,
                    parent_key,
                    position,
                    node.category.as_str(),
                    node.display_name.clone(),
                    node.graded as i64,
                    node.format.clone(),
                    node.visible_to_staff_only as i64,
                    group_access_json
                ],
            )
            .await
            .map_err(storage_err)?;
        }

        let finished_at = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO imports (id, course_id, started_at, finished_at, node_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job_id.as_str(),
                course_id.as_str(),
                started_at.as_str(),
                finished_at.as_str(),
                tree.nodes.len() as i64
            ],
        )
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;

        info!(job_id = %job_id, "course imported");
        Ok(ImportSummary {
            job_id,
            course_id: tree.course.id.clone(),
            nodes: tree.nodes.len(),
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// All stored courses, ordered by id.
    pub async fn list_courses(&self) -> Result<Vec<CourseSummary>> {
        let mut rows = self
            .conn
            .query("SELECT id, display_name FROM courses ORDER BY id", params![])
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let id: String = row.get(0).map_err(storage_err)?;
            let name: String = row.get(1).map_err(storage_err)?;
            results.push(CourseSummary { id, name });
        }
        Ok(results)
    }

    /// Course metadata without its content tree.
    pub async fn get_course(&self, course_key: &CourseKey) -> Result<Option<Course>> {
        query_course(&self.conn, course_key).await
    }

    /// Load one course into a [`MemoryStore`] snapshot, or `None` if it was
    /// never imported.
    #[instrument(skip_all, fields(course = %course_key))]
    pub async fn load_course(&self, course_key: &CourseKey) -> Result<Option<MemoryStore>> {
        // Course row and node rows must come from the same committed import.
        let tx = self.conn.transaction().await.map_err(storage_err)?;

        let Some(course) = query_course(&tx, course_key).await? else {
            tx.commit().await.map_err(storage_err)?;
            return Ok(None);
        };

        let mut rows = tx
            .query(
                "SELECT location, parent_key, position, category, display_name, graded,
                        format, visible_to_staff_only, group_access_json
                 FROM nodes WHERE course_id = ?1 ORDER BY seq",
                params![course_key.to_string()],
            )
            .await
            .map_err(storage_err)?;

        let mut nodes = Vec::new();
        let mut placements: Vec<(UsageKey, i64, UsageKey)> = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let node = row_to_node(&row)?;
            if let Some(parent) = row.get::<String>(1).ok() {
                let parent: UsageKey = parent.parse()?;
                let position = row.get::<i64>(2).unwrap_or(0);
                placements.push((parent, position, node.location.clone()));
            }
            nodes.push(node);
        }
        drop(rows);
        tx.commit().await.map_err(storage_err)?;

        placements.sort_by_key(|(_, position, _)| *position);
        let index: HashMap<UsageKey, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.location.clone(), i))
            .collect();
        for (parent, _, child) in placements {
            let idx = *index.get(&parent).ok_or_else(|| {
                CourseNotesError::Storage(format!("node {child} references unknown parent {parent}"))
            })?;
            nodes[idx].children.push(child);
        }

        debug!(nodes = nodes.len(), "course snapshot loaded");
        MemoryStore::from_trees([CourseTree { course, nodes }]).map(Some)
    }

    /// Import history for a course, newest first.
    pub async fn list_imports(&self, course_key: &CourseKey) -> Result<Vec<ImportRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, course_id, started_at, finished_at, node_count
                 FROM imports WHERE course_id = ?1 ORDER BY id DESC",
                params![course_key.to_string()],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(ImportRecord {
                id: row.get(0).map_err(storage_err)?,
                course_id: row.get(1).map_err(storage_err)?,
                started_at: row.get(2).map_err(storage_err)?,
                finished_at: row.get::<String>(3).ok(),
                node_count: row.get::<i64>(4).ok(),
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

async fn query_course(conn: &Connection, course_key: &CourseKey) -> Result<Option<Course>> {
    let mut rows = conn
        .query(
            "SELECT id, display_name, location, tabs_json FROM courses WHERE id = ?1",
            params![course_key.to_string()],
        )
        .await
        .map_err(storage_err)?;

    match rows.next().await.map_err(storage_err)? {
        Some(row) => Ok(Some(row_to_course(&row)?)),
        None => Ok(None),
    }
}

fn row_to_course(row: &libsql::Row) -> Result<Course> {
    let id: String = row.get(0).map_err(storage_err)?;
    let location: String = row.get(2).map_err(storage_err)?;
    let tabs_json: String = row.get(3).map_err(storage_err)?;
    Ok(Course {
        id: id.parse()?,
        display_name: row.get(1).map_err(storage_err)?,
        location: location.parse()?,
        tabs: serde_json::from_str(&tabs_json)
            .map_err(|e| CourseNotesError::Storage(format!("invalid tabs_json: {e}")))?,
    })
}

/// Node columns as selected by [`Storage::load_course`]; children are filled
/// in afterwards.
fn row_to_node(row: &libsql::Row) -> Result<ContentNode> {
    let location: String = row.get(0).map_err(storage_err)?;
    let category: String = row.get(3).map_err(storage_err)?;
    let mut node = ContentNode::new(location.parse()?, category);
    node.display_name = row.get::<String>(4).ok();
    node.graded = row.get::<i64>(5).map_err(storage_err)? != 0;
    node.format = row.get::<String>(6).ok();
    node.visible_to_staff_only = row.get::<i64>(7).map_err(storage_err)? != 0;
    if let Ok(json) = row.get::<String>(8) {
        node.group_access = serde_json::from_str(&json)
            .map_err(|e| CourseNotesError::Storage(format!("invalid group_access_json: {e}")))?;
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursenotes_core::{ContentStore, get_course_assignments};
    use coursenotes_shared::CourseTab;

    const FIXTURE: &str = "../../../fixtures/demo_course.json";

    fn temp_db() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("cn_test_{}.db", Uuid::now_v7()))
    }

    async fn test_storage() -> Storage {
        Storage::open(&temp_db()).await.expect("open test db")
    }

    fn demo_tree() -> CourseTree {
        let json = std::fs::read_to_string(FIXTURE).expect("read course fixture");
        serde_json::from_str(&json).expect("parse course fixture")
    }

    fn small_tree(run: &str, lesson_name: &str) -> CourseTree {
        let id = CourseKey::new("edX", "Small", run);
        let root_loc = id.make_usage_key("course", "course");
        let lesson_loc = id.make_usage_key("sequential", "lesson");
        let mut root = ContentNode::new(root_loc.clone(), "course");
        root.children.push(lesson_loc.clone());
        let mut lesson = ContentNode::new(lesson_loc, "sequential");
        lesson.display_name = Some(lesson_name.into());
        lesson.graded = true;
        CourseTree {
            course: Course {
                id,
                display_name: "Small".into(),
                location: root_loc,
                tabs: vec![CourseTab {
                    tab_type: "courseware".into(),
                    name: None,
                }],
            },
            nodes: vec![root, lesson],
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = temp_db();
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn import_then_load_round_trips_the_tree() {
        let storage = test_storage().await;
        let tree = demo_tree();

        let summary = storage.import_course(&tree).await.expect("import");
        assert_eq!(summary.nodes, tree.nodes.len());

        let store = storage
            .load_course(&tree.course.id)
            .await
            .expect("load")
            .expect("course present");

        for node in &tree.nodes {
            assert_eq!(store.get_item(&node.location).expect("node loaded"), node);
        }
        let course = store.get_course(&tree.course.id).expect("course");
        assert!(course.has_tab("edxnotes"));

        let assignments = get_course_assignments(&store, &tree.course.id).unwrap();
        let names: Vec<_> = assignments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Lesson 1", "Midterm"]);
        assert_eq!(assignments[1].problems.len(), 2);
        assert_eq!(assignments[1].problems[1].name, "exam q2");
    }

    #[tokio::test]
    async fn reimport_replaces_the_tree() {
        let storage = test_storage().await;
        storage.import_course(&small_tree("r1", "Old")).await.unwrap();
        storage.import_course(&small_tree("r1", "New")).await.unwrap();

        let key = CourseKey::new("edX", "Small", "r1");
        let store = storage.load_course(&key).await.unwrap().unwrap();
        let lesson = store
            .get_item(&key.make_usage_key("sequential", "lesson"))
            .unwrap();
        assert_eq!(lesson.display_name.as_deref(), Some("New"));
        assert_eq!(store.len(), 2);
        assert_eq!(storage.list_imports(&key).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn snapshot_tracks_root_changes_across_reimports() {
        let tmp = temp_db();
        let writer = Storage::open(&tmp).await.unwrap();
        let reader = Storage::open_readonly(&tmp).await.unwrap();
        let key = CourseKey::new("edX", "Small", "r1");

        for (i, root_id) in ["course", "course_v2", "course_v3"].iter().enumerate() {
            let mut tree = small_tree("r1", &format!("Lesson {i}"));
            let root = key.make_usage_key("course", root_id);
            tree.course.location = root.clone();
            tree.nodes[0].location = root.clone();
            writer.import_course(&tree).await.unwrap();

            let store = reader
                .load_course(&key)
                .await
                .expect("snapshot loads")
                .expect("course present");
            let course = store.get_course(&key).unwrap();
            assert_eq!(course.location, root);
            assert_eq!(store.get_item(&root).unwrap().children.len(), 1);
            assert_eq!(store.len(), 2);
        }
    }

    #[tokio::test]
    async fn invalid_tree_is_rejected_without_writing() {
        let storage = test_storage().await;
        let mut tree = small_tree("bad", "Lesson");
        tree.nodes[0]
            .children
            .push(tree.course.id.make_usage_key("problem", "missing"));

        assert!(storage.import_course(&tree).await.is_err());
        assert!(storage.list_courses().await.unwrap().is_empty());
        assert!(storage.list_imports(&tree.course.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_and_missing_course() {
        let storage = test_storage().await;
        storage.import_course(&small_tree("b", "L")).await.unwrap();
        storage.import_course(&small_tree("a", "L")).await.unwrap();

        let ids: Vec<_> = storage
            .list_courses()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, ["course-v1:edX+Small+a", "course-v1:edX+Small+b"]);

        let missing = CourseKey::new("edX", "Nope", "x");
        assert!(storage.load_course(&missing).await.unwrap().is_none());
        assert!(storage.get_course(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = temp_db();
        let rw = Storage::open(&tmp).await.unwrap();
        rw.import_course(&small_tree("r1", "L")).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_courses().await.unwrap().len(), 1);
        let result = ro.import_course(&small_tree("r2", "L")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_database() {
        assert!(Storage::open_readonly(&temp_db()).await.is_err());
    }
}
