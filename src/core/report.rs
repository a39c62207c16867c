use crate::domain::model::{ChangeCategory, ChangeKind, ChangeReport, DiffResult, FieldChange};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;

/// Inner keys listed per changed object before collapsing into "+n more".
const MAX_DETAIL_LINES: usize = 4;

/// Render a non-empty diff into the notification sent to the portal owner.
/// Changes are grouped by category with per-group counts, as both a plain-text
/// and a small HTML body.
pub fn build_report(diff: &DiffResult, generated_at: DateTime<Utc>, portal_url: &str) -> ChangeReport {
    let subject = format!("🎓 Portal updates - {} change(s) detected", diff.len());

    ChangeReport {
        generated_at,
        subject,
        text_body: render_text(diff, generated_at, portal_url),
        html_body: render_html(diff, generated_at, portal_url),
        total_changes: diff.len(),
    }
}

/// One human-readable line per change (occasionally more, when an updated
/// object has several interesting inner keys).
pub fn describe_change(change: &FieldChange) -> Vec<String> {
    match change.kind() {
        ChangeKind::Added => vec![format!("New data for {}", change.field)],
        ChangeKind::Removed => vec![format!("{} is no longer reported by the portal", change.field)],
        ChangeKind::Updated => {
            let (Some(old), Some(new)) = (&change.old, &change.new) else {
                return vec![format!("{} updated", change.field)];
            };
            match (old, new) {
                (Value::Object(old_map), Value::Object(new_map)) => {
                    let details = object_change_details(old_map, new_map);
                    if details.is_empty() {
                        vec![format!("{} updated", change.field)]
                    } else {
                        details
                            .into_iter()
                            .map(|d| format!("{}: {}", change.field, d))
                            .collect()
                    }
                }
                _ => vec![format!(
                    "{}: {} -> {}",
                    change.field,
                    render_value(old),
                    render_value(new)
                )],
            }
        }
    }
}

/// 找出物件內真正變動的鍵，壓縮成簡短描述
fn object_change_details(
    old_map: &serde_json::Map<String, Value>,
    new_map: &serde_json::Map<String, Value>,
) -> Vec<String> {
    let keys: BTreeSet<&String> = old_map.keys().chain(new_map.keys()).collect();

    let mut details = Vec::new();
    let mut overflow = 0usize;
    for key in keys {
        let detail = match (old_map.get(key.as_str()), new_map.get(key.as_str())) {
            (Some(a), Some(b)) if a == b => continue,
            (Some(Value::Array(a)), Some(Value::Array(b))) if b.len() > a.len() => {
                format!("{} new entries under {}", b.len() - a.len(), key)
            }
            (Some(a), Some(b)) if is_scalar(a) && is_scalar(b) => {
                format!("{}: {} -> {}", key, render_value(a), render_value(b))
            }
            (None, Some(_)) => format!("new field '{}'", key),
            (Some(_), None) => format!("'{}' removed", key),
            _ => format!("{} updated", key),
        };

        if details.len() < MAX_DETAIL_LINES {
            details.push(detail);
        } else {
            overflow += 1;
        }
    }

    if overflow > 0 {
        details.push(format!("+{} more changed fields", overflow));
    }
    details
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn render_value(value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => format!("[{} items]", items.len()),
        Value::Object(_) => "{...}".to_string(),
        other => other.to_string(),
    };

    if rendered.chars().count() > 48 {
        let truncated: String = rendered.chars().take(45).collect();
        format!("{}...", truncated)
    } else {
        rendered
    }
}

fn render_text(diff: &DiffResult, generated_at: DateTime<Utc>, portal_url: &str) -> String {
    let mut body = String::new();
    body.push_str("PORTAL UPDATES\n");
    body.push_str("==============\n\n");
    body.push_str(&format!("Total changes detected: {}\n\n", diff.len()));

    for (category, changes) in diff.by_category() {
        body.push_str(&format!(
            "{} ({}):\n",
            category.label().to_uppercase(),
            changes.len()
        ));
        let mut index = 1;
        for change in changes {
            for line in describe_change(change) {
                body.push_str(&format!("  {}. {}\n", index, line));
                index += 1;
            }
        }
        body.push('\n');
    }

    body.push_str(&format!(
        "Checked at: {} UTC\n",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    body.push_str(&format!("Portal: {}\n", portal_url));
    body
}

fn category_color(category: ChangeCategory) -> &'static str {
    match category {
        ChangeCategory::Grades => "#10B981",
        ChangeCategory::Attendance => "#3B82F6",
        ChangeCategory::Transcript => "#8B5CF6",
        ChangeCategory::Other => "#6B7280",
    }
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn render_html(diff: &DiffResult, generated_at: DateTime<Utc>, portal_url: &str) -> String {
    let mut sections = String::new();
    for (category, changes) in diff.by_category() {
        let mut items = String::new();
        for change in &changes {
            for line in describe_change(change) {
                items.push_str(&format!(
                    "<li style=\"padding: 4px 0; color: #374151;\">{}</li>",
                    escape_html(&line)
                ));
            }
        }
        sections.push_str(&format!(
            concat!(
                "<h3 style=\"color: {color}; border-left: 4px solid {color}; ",
                "padding-left: 10px; margin: 18px 0 6px 0;\">{label} ({count})</h3>",
                "<ul style=\"margin: 0; padding-left: 20px; font-size: 14px;\">{items}</ul>"
            ),
            color = category_color(category),
            label = category.label(),
            count = changes.len(),
            items = items,
        ));
    }

    format!(
        concat!(
            "<!DOCTYPE html><html><body style=\"margin: 0; padding: 0; ",
            "font-family: 'Segoe UI', Tahoma, sans-serif; background-color: #f5f5f5;\">",
            "<div style=\"max-width: 600px; margin: 20px auto; background-color: #ffffff; ",
            "border-radius: 8px; padding: 24px;\">",
            "<h2 style=\"margin: 0 0 4px 0;\">🎓 Portal updates</h2>",
            "<p style=\"margin: 0 0 12px 0; color: #6B7280;\">{count} change(s) detected</p>",
            "{sections}",
            "<p style=\"margin-top: 24px; color: #6B7280; font-size: 12px;\">",
            "⏰ Checked at: {checked_at} UTC<br>",
            "🔗 <a href=\"{portal_url}\">Open the portal</a></p>",
            "</div></body></html>"
        ),
        count = diff.len(),
        sections = sections,
        checked_at = generated_at.format("%Y-%m-%d %H:%M:%S"),
        portal_url = portal_url,
    )
}
