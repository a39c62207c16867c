use crate::domain::model::{DiffResult, FieldChange, Snapshot};
use std::collections::BTreeSet;

/// Compare the previous snapshot (if any) against the current one.
///
/// A first run (`previous = None`) reports every field as added, so the very
/// first fetch produces a non-empty result and the "monitoring started"
/// notification goes out.
pub fn diff(previous: Option<&Snapshot>, current: &Snapshot) -> DiffResult {
    match previous {
        Some(old) => diff_snapshots(old, current),
        None => DiffResult {
            changes: current
                .fields
                .iter()
                .map(|(field, value)| FieldChange {
                    field: field.clone(),
                    old: None,
                    new: Some(value.clone()),
                })
                .collect(),
        },
    }
}

/// Pure field-wise comparison. Deterministic: fields are visited as the sorted
/// union of both key sets, so insertion order never matters.
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> DiffResult {
    let fields: BTreeSet<&String> = old.fields.keys().chain(new.fields.keys()).collect();

    let mut changes = Vec::new();
    for field in fields {
        match (old.get(field), new.get(field)) {
            (Some(a), Some(b)) if a == b => {}
            (old_value, new_value) => changes.push(FieldChange {
                field: field.clone(),
                old: old_value.cloned(),
                new: new_value.cloned(),
            }),
        }
    }

    DiffResult { changes }
}
