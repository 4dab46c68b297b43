//! Deep select: equality predicates over dot-separated record paths

use crate::record::Record;
use crate::schema::DeepSelect;
use serde_json::Value;

/// Resolve a dot path like `data.zipcode` against a record.
///
/// Returns `None` if any segment is absent or an intermediate value is not
/// an object.
pub fn fetch_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = record.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// True if the value at the predicate's path equals the predicate's value.
///
/// A missing path never matches, and a nested object never equals a scalar.
pub fn matches(record: &Record, predicate: &DeepSelect) -> bool {
    fetch_path(record, &predicate.property) == Some(&predicate.value)
}

/// Keep the records matching every predicate.
pub fn filter_list(list: Vec<Record>, predicates: &[DeepSelect]) -> Vec<Record> {
    if predicates.is_empty() {
        return list;
    }
    list.into_iter()
        .filter(|record| predicates.iter().all(|p| matches(record, p)))
        .collect()
}
