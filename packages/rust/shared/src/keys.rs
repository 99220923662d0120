//! Course and usage keys.
//!
//! Keys are opaque outside this module: they parse from and display to the
//! `course-v1:` / `block-v1:` string forms, and also accept the deprecated
//! slash-separated (`Org/Course/Run`) and `i4x://` forms still found in older
//! annotation rows.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CourseNotesError, Result};

static COURSE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^course-v1:([\w.\-~]+)\+([\w.\-~]+)\+([\w.\-~]+)$").expect("valid regex")
});

static DEPRECATED_COURSE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\w.\-~]+)/([\w.\-~]+)/([\w.\-~]+)$").expect("valid regex")
});

static USAGE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^block-v1:([\w.\-~]+)\+([\w.\-~]+)\+([\w.\-~]+)\+type@([\w\-]+)\+block@([\w.\-~:]+)$",
    )
    .expect("valid regex")
});

static DEPRECATED_USAGE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^i4x://([\w.\-~]+)/([\w.\-~]+)/([\w\-]+)/([\w.\-~:]+)$").expect("valid regex")
});

// ---------------------------------------------------------------------------
// CourseKey
// ---------------------------------------------------------------------------

/// Identifies one run of a course.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CourseKey {
    pub org: String,
    pub course: String,
    pub run: String,
}

impl CourseKey {
    pub fn new(org: impl Into<String>, course: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            course: course.into(),
            run: run.into(),
        }
    }

    /// `Org/Course/Run`, as used in legacy LMS routes.
    pub fn to_deprecated_string(&self) -> String {
        format!("{}/{}/{}", self.org, self.course, self.run)
    }

    /// Build a usage key for a block in this course.
    pub fn make_usage_key(&self, block_type: &str, block_id: &str) -> UsageKey {
        UsageKey {
            course_key: self.clone(),
            block_type: block_type.to_string(),
            block_id: block_id.to_string(),
        }
    }

    /// Parse a usage id in either the current or the `i4x://` form and bind
    /// it to this course run.
    ///
    /// The deprecated form carries no run, so the run always comes from `self`.
    pub fn make_usage_key_from_deprecated_string(&self, usage_id: &str) -> Result<UsageKey> {
        if let Some(caps) = DEPRECATED_USAGE_KEY_RE.captures(usage_id) {
            return Ok(self.make_usage_key(&caps[3], &caps[4]));
        }
        let key: UsageKey = usage_id.parse()?;
        Ok(self.make_usage_key(&key.block_type, &key.block_id))
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "course-v1:{}+{}+{}", self.org, self.course, self.run)
    }
}

impl FromStr for CourseKey {
    type Err = CourseNotesError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = COURSE_KEY_RE
            .captures(s)
            .or_else(|| DEPRECATED_COURSE_KEY_RE.captures(s))
            .ok_or_else(|| CourseNotesError::invalid_key(s, "not a course key"))?;
        Ok(Self::new(&caps[1], &caps[2], &caps[3]))
    }
}

impl TryFrom<String> for CourseKey {
    type Error = CourseNotesError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CourseKey> for String {
    fn from(key: CourseKey) -> Self {
        key.to_string()
    }
}

// ---------------------------------------------------------------------------
// UsageKey
// ---------------------------------------------------------------------------

/// Identifies one content block within a course run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UsageKey {
    pub course_key: CourseKey,
    pub block_type: String,
    pub block_id: String,
}

impl UsageKey {
    /// `i4x://Org/Course/type/block`.
    pub fn to_deprecated_string(&self) -> String {
        format!(
            "i4x://{}/{}/{}/{}",
            self.course_key.org, self.course_key.course, self.block_type, self.block_id
        )
    }
}

impl fmt::Display for UsageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block-v1:{}+{}+{}+type@{}+block@{}",
            self.course_key.org,
            self.course_key.course,
            self.course_key.run,
            self.block_type,
            self.block_id
        )
    }
}

impl FromStr for UsageKey {
    type Err = CourseNotesError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = USAGE_KEY_RE
            .captures(s)
            .ok_or_else(|| CourseNotesError::invalid_key(s, "not a usage key"))?;
        Ok(Self {
            course_key: CourseKey::new(&caps[1], &caps[2], &caps[3]),
            block_type: caps[4].to_string(),
            block_id: caps[5].to_string(),
        })
    }
}

impl TryFrom<String> for UsageKey {
    type Error = CourseNotesError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<UsageKey> for String {
    fn from(key: UsageKey) -> Self {
        key.to_string()
    }
}
