//! SQL migration definitions for the coursenotes database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: courses, nodes, imports",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS courses (
    id           TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    location     TEXT NOT NULL,
    tabs_json    TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

-- One row per content block. Child order is (parent_key, position).
CREATE TABLE IF NOT EXISTS nodes (
    location              TEXT PRIMARY KEY,
    course_id             TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    seq                   INTEGER NOT NULL,
    parent_key            TEXT,
    position              INTEGER,
    category              TEXT NOT NULL,
    display_name          TEXT,
    graded                INTEGER NOT NULL DEFAULT 0,
    format                TEXT,
    visible_to_staff_only INTEGER NOT NULL DEFAULT 0,
    group_access_json     TEXT
);

CREATE INDEX IF NOT EXISTS idx_nodes_course ON nodes(course_id);
CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_key, position);

CREATE TABLE IF NOT EXISTS imports (
    id          TEXT PRIMARY KEY,
    course_id   TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    node_count  INTEGER
);

CREATE INDEX IF NOT EXISTS idx_imports_course ON imports(course_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
