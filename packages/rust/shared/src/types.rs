//! Core domain types: course content, derived API results, and annotations.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{CourseNotesError, Result};
use crate::keys::{CourseKey, UsageKey};

/// Category tag of the problem blocks collected under an assignment.
pub const PROBLEM_CATEGORY: &str = "problem";

/// Course tab type that turns the notes feature on for a course.
pub const NOTES_TAB_TYPE: &str = "edxnotes";

// ---------------------------------------------------------------------------
// Course content
// ---------------------------------------------------------------------------

/// A single block in a course's content tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    pub location: UsageKey,
    /// Block category, e.g. `course`, `chapter`, `sequential`, `problem`.
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Child locations in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UsageKey>,
    #[serde(default)]
    pub graded: bool,
    /// Assignment type label (e.g. `Homework`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub visible_to_staff_only: bool,
    /// Partition id -> group ids allowed to see this block. Empty means everyone.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub group_access: BTreeMap<u32, Vec<u32>>,
}

impl ContentNode {
    /// A bare node with no children or settings.
    pub fn new(location: UsageKey, category: impl Into<String>) -> Self {
        Self {
            location,
            category: category.into(),
            display_name: None,
            children: Vec::new(),
            graded: false,
            format: None,
            visible_to_staff_only: false,
            group_access: BTreeMap::new(),
        }
    }

    /// Display name, falling back to the block id with underscores as spaces.
    pub fn display_name_with_default(&self) -> String {
        match &self.display_name {
            Some(name) => name.clone(),
            None => self.location.block_id.replace('_', " "),
        }
    }

    pub fn is_problem(&self) -> bool {
        self.category == PROBLEM_CATEGORY
    }
}

/// An entry in a course's tab configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseTab {
    #[serde(rename = "type")]
    pub tab_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Course-level metadata. The root block lives at `location`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseKey,
    pub display_name: String,
    pub location: UsageKey,
    #[serde(default)]
    pub tabs: Vec<CourseTab>,
}

impl Course {
    pub fn has_tab(&self, tab_type: &str) -> bool {
        self.tabs.iter().any(|t| t.tab_type == tab_type)
    }
}

/// A whole course: metadata plus every block, root included.
///
/// This is the import format and the unit a store snapshot is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseTree {
    pub course: Course,
    pub nodes: Vec<ContentNode>,
}

// ---------------------------------------------------------------------------
// Course API results
// ---------------------------------------------------------------------------

/// `{id, name}` payload of the course list and course detail endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub id: String,
    pub name: String,
}

impl From<&Course> for CourseSummary {
    fn from(course: &Course) -> Self {
        Self {
            id: course.id.to_string(),
            name: course.display_name.clone(),
        }
    }
}

/// A problem inside an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemResult {
    pub id: String,
    pub name: String,
}

impl From<&ContentNode> for ProblemResult {
    fn from(node: &ContentNode) -> Self {
        Self {
            id: node.location.to_string(),
            name: node.display_name_with_default(),
        }
    }
}

/// A graded block and the problems found beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub id: String,
    pub name: String,
    pub assignment_type: Option<String>,
    pub problems: Vec<ProblemResult>,
}

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

/// The user a request is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: u64,
    pub username: String,
    pub is_staff: bool,
    /// Partition id -> the group this user is assigned to.
    pub partition_groups: BTreeMap<u32, u32>,
}

impl Actor {
    pub fn learner(user_id: u64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            is_staff: false,
            partition_groups: BTreeMap::new(),
        }
    }

    pub fn staff(user_id: u64, username: impl Into<String>) -> Self {
        Self {
            is_staff: true,
            ..Self::learner(user_id, username)
        }
    }

    pub fn with_group(mut self, partition_id: u32, group_id: u32) -> Self {
        self.partition_groups.insert(partition_id, group_id);
        self
    }
}

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

/// An annotation row as returned by the notes service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAnnotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub usage_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Kept as raw JSON so one badly typed row cannot fail the whole batch.
    #[serde(default)]
    pub updated: serde_json::Value,
    /// Everything else the service sent (quote, ranges, tags, ...), echoed back.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Display name and link of the block containing an annotated item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorContext {
    pub display_name: Option<String>,
    pub url: Option<String>,
}

/// An annotation that survived filtering, with its location context attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub usage_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(serialize_with = "serialize_time_display")]
    pub updated: DateTime<Utc>,
    pub unit: AncestorContext,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AnnotationRecord {
    pub fn from_raw(raw: RawAnnotation, updated: DateTime<Utc>, unit: AncestorContext) -> Self {
        Self {
            id: raw.id,
            user: raw.user,
            usage_id: raw.usage_id,
            text: raw.text,
            updated,
            unit,
            extra: raw.extra,
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d"];

/// Parse an annotation `updated` value. Offset-less input is taken as UTC and
/// a bare date as midnight UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
        .ok_or_else(|| CourseNotesError::InvalidTimestamp(value.to_string()))
}

/// [`parse_timestamp`] for a raw JSON `updated` value; anything but a string
/// is invalid.
pub fn parse_timestamp_value(value: &serde_json::Value) -> Result<DateTime<Utc>> {
    match value.as_str() {
        Some(s) => parse_timestamp(s),
        None => Err(CourseNotesError::InvalidTimestamp(value.to_string())),
    }
}

/// LMS default time display, e.g. `Jan 01, 2024 at 00:00 UTC`.
pub fn time_display(dt: &DateTime<Utc>) -> String {
    dt.format("%b %d, %Y at %H:%M UTC").to_string()
}

fn serialize_time_display<S: Serializer>(
    dt: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&time_display(dt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn course_key() -> CourseKey {
        CourseKey::new("edX", "DemoX", "2014")
    }

    #[test]
    fn display_name_falls_back_to_block_id() {
        let mut node = ContentNode::new(course_key().make_usage_key("vertical", "Unit_One"), "vertical");
        assert_eq!(node.display_name_with_default(), "Unit One");
        node.display_name = Some("Week 1".into());
        assert_eq!(node.display_name_with_default(), "Week 1");
    }

    #[test]
    fn parse_timestamp_accepts_common_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T00:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-01T00:00:00+00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-01T00:00:00.000000").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-01 00:00:00").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2024-01-01T02:00:00+02:00").unwrap(),
            expected
        );
    }

    #[test]
    fn parse_timestamp_accepts_bare_dates() {
        let midnight = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01").unwrap(), midnight);
        assert_eq!(
            parse_timestamp("2024-01-01 09:30").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn non_string_timestamps_are_invalid() {
        assert!(parse_timestamp_value(&serde_json::json!("2024-01-01T00:00:00Z")).is_ok());
        for bad in [serde_json::Value::Null, serde_json::json!(1704067200), serde_json::json!({})] {
            assert!(matches!(
                parse_timestamp_value(&bad),
                Err(CourseNotesError::InvalidTimestamp(_))
            ));
        }
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("yesterday-ish").unwrap_err();
        assert!(matches!(err, CourseNotesError::InvalidTimestamp(ref v) if v == "yesterday-ish"));
    }

    #[test]
    fn raw_annotation_keeps_unknown_fields() {
        let json = r#"{
            "id": "n1",
            "user": "anon",
            "usage_id": "i4x://edX/DemoX/html/intro",
            "text": "remember this",
            "quote": "the quoted bit",
            "updated": "2024-01-01T00:00:00Z"
        }"#;
        let raw: RawAnnotation = serde_json::from_str(json).unwrap();
        assert_eq!(raw.extra.get("quote").and_then(|v| v.as_str()), Some("the quoted bit"));
        assert!(!raw.extra.contains_key("usage_id"));
    }

    #[test]
    fn annotation_record_serializes_display_time() {
        let raw = RawAnnotation {
            id: Some("n1".into()),
            user: None,
            usage_id: "i4x://edX/DemoX/html/intro".into(),
            text: Some("hi".into()),
            updated: "2024-01-01T00:00:00Z".into(),
            extra: serde_json::Map::new(),
        };
        let record = AnnotationRecord::from_raw(
            raw,
            Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap(),
            AncestorContext {
                display_name: Some("Unit 1".into()),
                url: Some("/courses/edX/DemoX/2014/jump_to/x".into()),
            },
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["updated"], "Mar 05, 2024 at 14:07 UTC");
        assert_eq!(value["unit"]["display_name"], "Unit 1");
        assert!(value.get("user").is_none());
    }

    #[test]
    fn assignment_result_shape() {
        let result = AssignmentResult {
            id: "a".into(),
            name: "Lesson 1".into(),
            assignment_type: Some("Homework".into()),
            problems: vec![ProblemResult {
                id: "p".into(),
                name: "Problem 1".into(),
            }],
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["assignment_type"], "Homework");
        assert_eq!(value["problems"][0]["name"], "Problem 1");
    }

    #[test]
    fn course_tree_fixture_parses() {
        let json = r#"{
            "course": {
                "id": "course-v1:edX+DemoX+2014",
                "display_name": "Demo",
                "location": "block-v1:edX+DemoX+2014+type@course+block@course",
                "tabs": [{"type": "edxnotes", "name": "Notes"}]
            },
            "nodes": [{
                "location": "block-v1:edX+DemoX+2014+type@course+block@course",
                "category": "course",
                "group_access": {"50": [1, 2]}
            }]
        }"#;
        let tree: CourseTree = serde_json::from_str(json).unwrap();
        assert!(tree.course.has_tab(NOTES_TAB_TYPE));
        assert_eq!(tree.nodes[0].group_access.get(&50), Some(&vec![1, 2]));
    }
}
