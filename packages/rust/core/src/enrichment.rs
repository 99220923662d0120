//! Annotation enrichment.
//!
//! Takes raw annotation rows from the notes service and keeps only those the
//! actor can still see, attaching the containing unit's name and link and a
//! parsed `updated` timestamp to each survivor.

use tracing::{instrument, warn};

use coursenotes_shared::{
    Actor, AncestorContext, AnnotationRecord, ContentNode, Course, CourseKey, RawAnnotation,
    UsageKey, parse_timestamp_value,
};

use crate::access::{AccessAction, AccessChecker};
use crate::store::ContentStore;

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// LMS link to a block: `/courses/{course}/jump_to/{location}`, optionally
/// under an absolute origin.
pub fn jump_to_url(base_url: Option<&str>, course_key: &CourseKey, location: &UsageKey) -> String {
    let path = format!(
        "/courses/{}/jump_to/{}",
        course_key.to_deprecated_string(),
        location.to_deprecated_string()
    );
    match base_url {
        Some(base) => format!("{}{path}", base.trim_end_matches('/')),
        None => path,
    }
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

/// Filters and enriches annotation rows against a content store.
pub struct AnnotationEnricher<'a, S, A> {
    store: &'a S,
    access: &'a A,
    base_url: Option<String>,
}

impl<'a, S: ContentStore, A: AccessChecker> AnnotationEnricher<'a, S, A> {
    pub fn new(store: &'a S, access: &'a A) -> Self {
        Self {
            store,
            access,
            base_url: None,
        }
    }

    /// Make ancestor links absolute under `base_url`.
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Enrich `raw` for `actor`, preserving the relative order of survivors.
    ///
    /// Rows whose item is unknown or whose timestamp is malformed are logged
    /// and dropped. Rows the actor may not load are dropped without a log line.
    #[instrument(skip_all, fields(course = %course.id, user = actor.user_id, rows = raw.len()))]
    pub fn enrich(
        &self,
        actor: &Actor,
        course: &Course,
        raw: Vec<RawAnnotation>,
    ) -> Vec<AnnotationRecord> {
        self.store.bulk_operations(&course.id, |store| {
            raw.into_iter()
                .filter_map(|row| self.enrich_row(store, actor, course, row))
                .collect()
        })
    }

    fn enrich_row(
        &self,
        store: &S,
        actor: &Actor,
        course: &Course,
        row: RawAnnotation,
    ) -> Option<AnnotationRecord> {
        let usage_key = match course.id.make_usage_key_from_deprecated_string(&row.usage_id) {
            Ok(key) => key,
            Err(e) => {
                warn!(usage_id = %row.usage_id, error = %e, "Module not found: unparsable usage id");
                return None;
            }
        };

        let item = match store.get_item(&usage_key) {
            Ok(item) => item,
            Err(_) => {
                warn!(%usage_key, "Module not found");
                return None;
            }
        };

        if !self
            .access
            .has_access(actor, AccessAction::Load, item, &course.id)
        {
            return None;
        }

        let unit = self.ancestor_context(store, course, &usage_key);
        let updated = match parse_timestamp_value(&row.updated) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(%usage_key, error = %e, "dropping note with malformed timestamp");
                return None;
            }
        };

        Some(AnnotationRecord::from_raw(row, updated, unit))
    }

    /// Display name and link of the item's parent, or an empty context when
    /// the parent is unknown.
    fn ancestor_context(&self, store: &S, course: &Course, usage_key: &UsageKey) -> AncestorContext {
        match get_ancestor(store, usage_key) {
            Some(parent) => AncestorContext {
                display_name: Some(parent.display_name_with_default()),
                url: Some(jump_to_url(
                    self.base_url.as_deref(),
                    &course.id,
                    &parent.location,
                )),
            },
            None => AncestorContext::default(),
        }
    }
}

/// The parent node of `usage_key`, logging when either the parent pointer or
/// the parent itself is missing.
fn get_ancestor<'s, S: ContentStore>(store: &'s S, usage_key: &UsageKey) -> Option<&'s ContentNode> {
    let Some(location) = store.get_parent_location(usage_key) else {
        warn!(%usage_key, "Parent location for the module not found");
        return None;
    };
    match store.get_item(&location) {
        Ok(parent) => Some(parent),
        Err(_) => {
            warn!(%location, "Parent module not found");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
