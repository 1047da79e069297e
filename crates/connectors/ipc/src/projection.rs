//! Maps the fields a scan needs onto top-level columns of a file.

use arrow::datatypes::Schema;
use igloo_common::Result;
use igloo_dataset::FieldRef;

/// Top-level column indices to read for `materialized_fields`.
///
/// Nested references select their enclosing top-level column. References that
/// match nothing are skipped: they name partition or virtual columns which the
/// scanner fills in itself. Indices keep first-seen order without repeats, and
/// an empty result means every column.
pub fn included_fields(schema: &Schema, materialized_fields: &[FieldRef]) -> Result<Vec<usize>> {
    let mut included = Vec::new();
    for field in materialized_fields {
        let Some(path) = field.find_one_or_none(schema)? else {
            continue;
        };
        let column = path[0];
        if !included.contains(&column) {
            included.push(column);
        }
    }
    Ok(included)
}
