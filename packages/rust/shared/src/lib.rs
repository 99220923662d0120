//! Shared types, error model, and configuration for coursenotes.
//!
//! This crate is the foundation depended on by all other coursenotes crates.
//! It provides:
//! - [`CourseNotesError`] — the unified error type
//! - Keys ([`CourseKey`], [`UsageKey`]) and domain types ([`ContentNode`],
//!   [`AssignmentResult`], [`AnnotationRecord`], ...)
//! - Configuration ([`AppConfig`], [`NotesConfig`], config loading)

pub mod config;
pub mod error;
pub mod keys;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FeaturesConfig, LmsConfig, NotesConfig, StorageConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{CourseNotesError, Result, UPSTREAM_RETRY_MESSAGE};
pub use keys::{CourseKey, UsageKey};
pub use types::{
    Actor, AncestorContext, AnnotationRecord, AssignmentResult, ContentNode, Course,
    CourseSummary, CourseTab, CourseTree, NOTES_TAB_TYPE, PROBLEM_CATEGORY, ProblemResult,
    RawAnnotation, parse_timestamp, parse_timestamp_value, time_display,
};
