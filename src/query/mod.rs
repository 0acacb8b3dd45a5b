// query/mod.rs — the dynamic query layer shared by both collections.
//
// Translates the untyped parameter map of a read request (`where`, `sort`,
// `select`/`filter`, `skip`, `limit`, `count`) into a typed [`QuerySpec`]
// and executes it against a store. Parameter parsing is total: anything
// that fails to parse falls back to its default instead of erroring. Only
// store failures propagate.

pub mod filter;

use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;
use serde_json::{json, Value};

use crate::store::{Collection, Document, EntityStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProjMode {
    Include,
    Exclude,
}

/// Field projection: either "keep these fields" or "drop these fields",
/// with `_id` kept unless explicitly excluded.
#[derive(Debug, Clone)]
pub struct Projection {
    mode: ProjMode,
    fields: Vec<String>,
    include_id: bool,
}

impl Projection {
    fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let mut include_id = true;
        let mut mode = None;
        let mut fields = Vec::new();
        for (field, flag) in map {
            let keep = truthy(flag);
            if field == "_id" {
                include_id = keep;
                continue;
            }
            // the first non-_id entry fixes the mode; conflicting entries
            // are dropped rather than rejected
            let entry_mode = if keep { ProjMode::Include } else { ProjMode::Exclude };
            match mode {
                None => {
                    mode = Some(entry_mode);
                    fields.push(field.clone());
                }
                Some(m) if m == entry_mode => fields.push(field.clone()),
                Some(_) => {}
            }
        }
        match (mode, include_id) {
            // {"_id": 0} alone is a valid exclusion
            (None, false) => Some(Self {
                mode: ProjMode::Exclude,
                fields,
                include_id,
            }),
            (None, true) => None,
            (Some(mode), _) => Some(Self {
                mode,
                fields,
                include_id,
            }),
        }
    }

    pub fn apply(&self, doc: Document) -> Document {
        match self.mode {
            ProjMode::Include => doc
                .into_iter()
                .filter(|(k, _)| {
                    if k == "_id" {
                        self.include_id
                    } else {
                        self.fields.iter().any(|f| f == k)
                    }
                })
                .collect(),
            ProjMode::Exclude => doc
                .into_iter()
                .filter(|(k, _)| {
                    if k == "_id" {
                        self.include_id
                    } else {
                        !self.fields.iter().any(|f| f == k)
                    }
                })
                .collect(),
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

/// A parsed read request.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub filter: Document,
    pub sort: Option<Vec<(String, SortDir)>>,
    pub projection: Option<Projection>,
    pub skip: usize,
    pub limit: usize,
    pub count: bool,
}

impl QuerySpec {
    /// Total parser from the raw parameter map. `default_limit` applies when
    /// no parseable `limit` is present (0 = uncapped).
    pub fn from_params(params: &HashMap<String, String>, default_limit: usize) -> Self {
        let filter = parse_json(params.get("where"))
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default();

        let sort = parse_json(params.get("sort")).and_then(|v| parse_sort(&v));

        // `select` wins over its `filter` alias
        let projection = parse_json(params.get("select"))
            .and_then(|v| Projection::from_value(&v))
            .or_else(|| {
                parse_json(params.get("filter")).and_then(|v| Projection::from_value(&v))
            });

        let skip = parse_usize(params.get("skip")).unwrap_or(0);
        let limit = parse_usize(params.get("limit")).unwrap_or(default_limit);
        let count = params.get("count").map(String::as_str) == Some("true");

        Self {
            filter,
            sort,
            projection,
            skip,
            limit,
            count,
        }
    }
}

fn parse_json(raw: Option<&String>) -> Option<Value> {
    serde_json::from_str(raw?).ok()
}

fn parse_usize(raw: Option<&String>) -> Option<usize> {
    raw?.trim().parse::<usize>().ok()
}

fn parse_sort(value: &Value) -> Option<Vec<(String, SortDir)>> {
    let map = value.as_object()?;
    let keys: Vec<(String, SortDir)> = map
        .iter()
        .filter_map(|(field, dir)| {
            let dir = dir.as_f64()?;
            if dir > 0.0 {
                Some((field.clone(), SortDir::Asc))
            } else if dir < 0.0 {
                Some((field.clone(), SortDir::Desc))
            } else {
                None
            }
        })
        .collect();
    if keys.is_empty() {
        None
    } else {
        Some(keys)
    }
}

/// A query result: shaped documents, or a bare count when `count=true`.
#[derive(Debug)]
pub enum QueryOutcome {
    Documents(Vec<Document>),
    Count(usize),
}

impl QueryOutcome {
    pub fn into_value(self) -> Value {
        match self {
            QueryOutcome::Documents(docs) => {
                Value::Array(docs.into_iter().map(Value::Object).collect())
            }
            QueryOutcome::Count(n) => json!({ "count": n }),
        }
    }
}

/// Execute a spec against a collection. Shaping order is fixed:
/// filter → project → sort → skip → limit. Count mode short-circuits
/// everything but the filter.
pub async fn execute(
    store: &dyn EntityStore,
    coll: Collection,
    spec: &QuerySpec,
) -> Result<QueryOutcome> {
    if spec.count {
        return Ok(QueryOutcome::Count(store.count(coll, &spec.filter).await?));
    }

    let mut docs = store.find(coll, &spec.filter).await?;
    if let Some(projection) = &spec.projection {
        docs = docs.into_iter().map(|d| projection.apply(d)).collect();
    }
    if let Some(sort) = &spec.sort {
        sort_documents(&mut docs, sort);
    }
    let shaped = docs.into_iter().skip(spec.skip);
    let docs: Vec<Document> = if spec.limit > 0 {
        shaped.take(spec.limit).collect()
    } else {
        shaped.collect()
    };
    Ok(QueryOutcome::Documents(docs))
}

fn sort_documents(docs: &mut [Document], sort: &[(String, SortDir)]) {
    docs.sort_by(|a, b| {
        for (field, dir) in sort {
            let ord = compare_for_sort(a.get(field), b.get(field));
            let ord = match dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Total ordering for sorting: values bucket by type (missing/null lowest),
/// then compare within the bucket. Arrays and objects tie.
fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn bucket(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }
    match bucket(a).cmp(&bucket(b)) {
        Ordering::Equal => match (a, b) {
            (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
            (Some(Value::Number(x)), Some(Value::Number(y))) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
            _ => Ordering::Equal,
        },
        other => other,
    }
}
