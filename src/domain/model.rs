use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time record of portal state, keyed by slash-scoped field names
/// (`summary/grades`, `grades/CSEN701`, `transcript/Winter 2024`, ...).
///
/// `fetched_at` is bookkeeping only and never participates in diffing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub fetched_at: DateTime<Utc>,
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Snapshot {
    pub fn new(fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at,
            fields: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: serde_json::Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One field-level change between two snapshots.
///
/// `old = None` means the field appeared, `new = None` means it disappeared,
/// both present means the value changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<serde_json::Value>,
    pub new: Option<serde_json::Value>,
}

impl FieldChange {
    pub fn kind(&self) -> ChangeKind {
        match (&self.old, &self.new) {
            (None, Some(_)) => ChangeKind::Added,
            (Some(_), None) => ChangeKind::Removed,
            _ => ChangeKind::Updated,
        }
    }

    /// Category derived from the field-name prefix. `summary/<section>` fields
    /// categorize by the section they summarize.
    pub fn category(&self) -> ChangeCategory {
        let mut segments = self.field.split('/');
        let mut head = segments.next().unwrap_or("");
        if head == "summary" {
            head = segments.next().unwrap_or("");
        }
        match head {
            "grades" => ChangeCategory::Grades,
            "attendance" => ChangeCategory::Attendance,
            "transcript" => ChangeCategory::Transcript,
            _ => ChangeCategory::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Added,
    Removed,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ChangeCategory {
    Grades,
    Attendance,
    Transcript,
    Other,
}

impl ChangeCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeCategory::Grades => "Grades",
            ChangeCategory::Attendance => "Attendance",
            ChangeCategory::Transcript => "Transcript",
            ChangeCategory::Other => "Other",
        }
    }
}

/// Ordered set of field-level changes. Empty means "no change".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffResult {
    pub changes: Vec<FieldChange>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Changes grouped by category, in category order.
    pub fn by_category(&self) -> BTreeMap<ChangeCategory, Vec<&FieldChange>> {
        let mut groups: BTreeMap<ChangeCategory, Vec<&FieldChange>> = BTreeMap::new();
        for change in &self.changes {
            groups.entry(change.category()).or_default().push(change);
        }
        groups
    }
}

/// A fully rendered notification, ready for a transport to deliver.
#[derive(Debug, Clone)]
pub struct ChangeReport {
    pub generated_at: DateTime<Utc>,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub total_changes: usize,
}

/// Outcome of one monitoring run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub fields_fetched: usize,
    pub changes_detected: usize,
    pub notified: bool,
    pub state_file: String,
}
