//! Notes retrieval and search on top of an upstream annotation source.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use coursenotes_shared::{
    Actor, AnnotationRecord, Course, CourseKey, CourseNotesError, FeaturesConfig, NOTES_TAB_TYPE,
    RawAnnotation, Result,
};

use crate::access::AccessChecker;
use crate::enrichment::AnnotationEnricher;
use crate::store::ContentStore;

/// Upstream notes service. Implementations return the raw response body.
#[allow(async_fn_in_trait)]
pub trait AnnotationSource {
    /// All of `actor`'s annotations in a course.
    async fn annotations(&self, actor: &Actor, course_key: &CourseKey) -> Result<String>;

    /// `actor`'s annotations in a course matching `text`.
    async fn search(&self, actor: &Actor, course_key: &CourseKey, text: &str) -> Result<String>;
}

/// Search response: enriched `rows` plus whatever else upstream sent
/// (totals, paging) passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchEnvelope {
    pub rows: Vec<AnnotationRecord>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The notes feature is on for a course only when enabled globally and the
/// course carries a notes tab.
pub fn is_feature_enabled(course: &Course, features: &FeaturesConfig) -> bool {
    features.enable_edxnotes && course.has_tab(NOTES_TAB_TYPE)
}

/// Fetch and enrich `actor`'s notes for `course`.
///
/// `None` means upstream had nothing usable: a body that is not JSON, `null`,
/// or an empty collection.
#[instrument(skip_all, fields(course = %course.id, user = actor.user_id))]
pub async fn get_notes<Src, S, A>(
    source: &Src,
    enricher: &AnnotationEnricher<'_, S, A>,
    actor: &Actor,
    course: &Course,
) -> Result<Option<Vec<AnnotationRecord>>>
where
    Src: AnnotationSource,
    S: ContentStore,
    A: AccessChecker,
{
    let body = source.annotations(actor, &course.id).await?;

    let collection: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "notes body is not JSON");
            return Ok(None);
        }
    };
    if is_empty_collection(&collection) {
        return Ok(None);
    }

    let rows = parse_rows(collection)?;
    Ok(Some(enricher.enrich(actor, course, rows)))
}

/// Run a text search and enrich the matching rows.
#[instrument(skip_all, fields(course = %course.id, user = actor.user_id))]
pub async fn search<Src, S, A>(
    source: &Src,
    enricher: &AnnotationEnricher<'_, S, A>,
    actor: &Actor,
    course: &Course,
    text: &str,
) -> Result<SearchEnvelope>
where
    Src: AnnotationSource,
    S: ContentStore,
    A: AccessChecker,
{
    let body = source.search(actor, &course.id, text).await?;

    let mut content = match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(kind = json_kind(&other), "search response is not an object");
            return Err(CourseNotesError::upstream("search response is not an object"));
        }
        Err(e) => {
            warn!(error = %e, "invalid JSON in search response");
            return Err(CourseNotesError::upstream(e.to_string()));
        }
    };

    let Some(rows) = content.remove("rows") else {
        warn!("search response has no rows");
        return Err(CourseNotesError::upstream("missing rows"));
    };
    let rows = parse_rows(rows).inspect_err(|e| warn!(error = ?e, "unreadable search rows"))?;

    Ok(SearchEnvelope {
        rows: enricher.enrich(actor, course, rows),
        extra: content,
    })
}

fn is_empty_collection(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn parse_rows(value: Value) -> Result<Vec<RawAnnotation>> {
    if !value.is_array() {
        return Err(CourseNotesError::upstream(format!(
            "expected an array of notes, got {}",
            json_kind(&value)
        )));
    }
    serde_json::from_value(value).map_err(|e| CourseNotesError::upstream(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
