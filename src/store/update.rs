// store/update.rs — update-operator application.
//
// The mutation paths issue exactly three operators: `$set` for field
// replacement, `$push` to append a pending-task id, and `$pull` to remove
// ids (by literal value or by an operator condition such as `{"$in": [...]}`).

use serde_json::Value;

use crate::query::filter;
use crate::store::Document;

/// Apply an update document to `doc` in place. Returns true when the
/// document content changed. Unknown operators are ignored; `_id` is never
/// touched.
pub fn apply(doc: &mut Document, update: &Document) -> bool {
    let mut changed = false;
    for (op, spec) in update {
        let Some(fields) = spec.as_object() else {
            continue;
        };
        match op.as_str() {
            "$set" => {
                for (field, value) in fields {
                    if field == "_id" {
                        continue;
                    }
                    if doc.get(field).map_or(true, |old| !filter::value_eq(old, value)) {
                        doc.insert(field.clone(), value.clone());
                        changed = true;
                    }
                }
            }
            "$push" => {
                for (field, value) in fields {
                    match doc.get_mut(field) {
                        Some(Value::Array(elems)) => {
                            elems.push(value.clone());
                            changed = true;
                        }
                        None => {
                            doc.insert(field.clone(), Value::Array(vec![value.clone()]));
                            changed = true;
                        }
                        // scalar field: $push is undefined, leave it alone
                        Some(_) => {}
                    }
                }
            }
            "$pull" => {
                for (field, cond) in fields {
                    if let Some(Value::Array(elems)) = doc.get_mut(field) {
                        let before = elems.len();
                        elems.retain(|e| !filter::clause_matches(Some(e), cond));
                        changed |= elems.len() != before;
                    }
                }
            }
            _ => {}
        }
    }
    changed
}
