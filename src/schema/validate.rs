//! Schema validation
//!
//! The wire format has no protection against duplicate result fields or
//! runaway nesting. Both are rejected here, before any dispatch happens.

use super::{AppendSpec, JoinSpec, RelationshipSpec, SchemaError};
use std::collections::HashSet;

/// Default maximum nesting depth for joins and relationship trees.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Validate the joins and appends that enrich one record.
///
/// Joins and appends at the same level write into the same record, so
/// their result names must be unique across both lists. Nested joins and
/// appends enrich the related record and form a level of their own.
pub fn validate_enrichment(
    joins: &[JoinSpec],
    appends: &[AppendSpec],
    max_depth: usize,
) -> Result<(), SchemaError> {
    validate_level(joins, appends, 1, max_depth)
}

fn validate_level(
    joins: &[JoinSpec],
    appends: &[AppendSpec],
    depth: usize,
    max_depth: usize,
) -> Result<(), SchemaError> {
    if (!joins.is_empty() || !appends.is_empty()) && depth > max_depth {
        return Err(SchemaError::TooDeep(max_depth));
    }

    let mut names = HashSet::new();
    for join in joins {
        if !names.insert(join.result_name().to_string()) {
            return Err(SchemaError::DuplicateResultName(join.result_name().to_string()));
        }
    }
    for append in appends {
        let name = append.result_name().ok_or(SchemaError::MissingResultName)?;
        if !names.insert(name.to_string()) {
            return Err(SchemaError::DuplicateResultName(name.to_string()));
        }
    }

    for join in joins {
        validate_level(&join.joins, &join.appends, depth + 1, max_depth)?;
    }
    Ok(())
}

/// Validate a cascade-delete tree.
///
/// A relationship whose link location and inbound id field already appear
/// on the path from the root would walk the same links again; such trees
/// are rejected as cycles.
pub fn validate_relationships(
    relationships: &[RelationshipSpec],
    max_depth: usize,
) -> Result<(), SchemaError> {
    let mut path = Vec::new();
    walk_relationships(relationships, &mut path, max_depth)
}

fn walk_relationships(
    relationships: &[RelationshipSpec],
    path: &mut Vec<String>,
    max_depth: usize,
) -> Result<(), SchemaError> {
    if relationships.is_empty() {
        return Ok(());
    }
    if path.len() >= max_depth {
        return Err(SchemaError::TooDeep(max_depth));
    }

    for relationship in relationships {
        let key = format!("{}#{}", relationship.location, relationship.in_idname);
        if path.contains(&key) {
            return Err(SchemaError::Cycle(key));
        }
        path.push(key);
        walk_relationships(&relationship.relationships, path, max_depth)?;
        path.pop();
    }
    Ok(())
}
