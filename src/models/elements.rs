// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tagged-variant element trees backing every read-only API view.
//!
//! Live records (devices, logs, streams) stay plain structs; endpoints render
//! them into [`Element`] snapshots keyed by registered field ids, and the
//! serializers below walk the snapshot. The field registry is populated at
//! startup and stays frozen while the server runs; renames requested by a
//! field-summarization body are applied at emit time and never mutate the
//! snapshot itself.

use std::{
    collections::{BTreeMap, HashMap},
    sync::RwLock,
};

use anyhow::{Result, bail};
use serde_json::{Map as JsonMap, Value, json};
use uuid::Uuid;

use crate::models::mac::MacAddr;

pub type FieldId = u16;

#[derive(Debug, Clone)]
pub struct FieldMeta {
    pub name: String,
    pub description: String,
}

#[derive(Default)]
struct RegistryInner {
    by_name: HashMap<String, FieldId>,
    meta: Vec<FieldMeta>,
}

/// Process-lifetime map of field name → stable id.
///
/// Registering the same name twice returns the original id; ids are dense
/// and never recycled.
#[derive(Default)]
pub struct FieldRegistry {
    inner: RwLock<RegistryInner>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, description: &str) -> FieldId {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if let Some(id) = inner.by_name.get(name) {
            return *id;
        }

        let id = inner.meta.len() as FieldId;
        inner.meta.push(FieldMeta {
            name: name.to_string(),
            description: description.to_string(),
        });
        inner.by_name.insert(name.to_string(), id);
        id
    }

    pub fn name_of(&self, id: FieldId) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.meta.get(id as usize).map(|m| m.name.clone())
    }

    pub fn id_of(&self, name: &str) -> Option<FieldId> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_name.get(name).copied()
    }

    pub fn all(&self) -> Vec<(FieldId, FieldMeta)> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .meta
            .iter()
            .enumerate()
            .map(|(i, m)| (i as FieldId, m.clone()))
            .collect()
    }
}

/// One node of a snapshot tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    String(String),
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I32(i32),
    I64(i64),
    Double(f64),
    Mac(MacAddr),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    Vector(Vec<Element>),
    Map(BTreeMap<FieldId, Element>),
}

impl Element {
    pub fn map() -> Self {
        Element::Map(BTreeMap::new())
    }

    pub fn insert(&mut self, field: FieldId, value: Element) {
        if let Element::Map(m) = self {
            m.insert(field, value);
        }
    }

    pub fn get(&self, field: FieldId) -> Option<&Element> {
        match self {
            Element::Map(m) => m.get(&field),
            _ => None,
        }
    }

    /// Descends a `a/b/c` path of registered field names.
    pub fn descend<'a>(&'a self, path: &str, reg: &FieldRegistry) -> Option<&'a Element> {
        let mut cur = self;

        for seg in path.split('/').filter(|s| !s.is_empty()) {
            let id = reg.id_of(seg)?;
            cur = cur.get(id)?;
        }

        Some(cur)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON emission

/// Renames collected during a summarization walk, keyed by field id and
/// consulted only at emit time.
pub type RenameMap = HashMap<FieldId, String>;

pub fn to_json(el: &Element, reg: &FieldRegistry, renames: &RenameMap) -> Value {
    match el {
        Element::String(s) => json!(s),
        Element::Bool(b) => json!(b),
        Element::U8(v) => json!(v),
        Element::U16(v) => json!(v),
        Element::U32(v) => json!(v),
        Element::U64(v) => json!(v),
        Element::I32(v) => json!(v),
        Element::I64(v) => json!(v),
        Element::Double(v) => json!(v),
        Element::Mac(m) => json!(m.to_string()),
        Element::Uuid(u) => json!(u.to_string()),
        Element::Bytes(b) => json!(hex::encode(b)),
        Element::Vector(v) => {
            Value::Array(v.iter().map(|e| to_json(e, reg, renames)).collect())
        },
        Element::Map(m) => {
            let mut out = JsonMap::with_capacity(m.len());
            for (id, val) in m {
                let key = renames
                    .get(id)
                    .cloned()
                    .or_else(|| reg.name_of(*id))
                    .unwrap_or_else(|| format!("unknown.{id}"));
                out.insert(key, to_json(val, reg, renames));
            }
            Value::Object(out)
        },
    }
}

/// Rebuilds an element tree from JSON, interning unknown map keys. Numeric
/// and string-encoded leaves come back in their widest form; use
/// [`structurally_eq`] to compare against a typed source tree.
pub fn from_json(value: &Value, reg: &FieldRegistry) -> Element {
    match value {
        Value::Null => Element::String(String::new()),
        Value::Bool(b) => Element::Bool(*b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Element::U64(u)
            } else if let Some(i) = n.as_i64() {
                Element::I64(i)
            } else {
                Element::Double(n.as_f64().unwrap_or(0.0))
            }
        },
        Value::String(s) => Element::String(s.clone()),
        Value::Array(a) => {
            Element::Vector(a.iter().map(|v| from_json(v, reg)).collect())
        },
        Value::Object(o) => {
            let mut m = BTreeMap::new();
            for (k, v) in o {
                let id = reg.register(k, "");
                m.insert(id, from_json(v, reg));
            }
            Element::Map(m)
        },
    }
}

/// Structural equality across a serialize/parse round trip: typed leaves
/// (mac, uuid, bytes, narrow ints) compare equal to their wide/stringified
/// forms, map ordering is irrelevant.
pub fn structurally_eq(a: &Element, b: &Element) -> bool {
    fn as_num(e: &Element) -> Option<f64> {
        Some(match e {
            Element::U8(v) => *v as f64,
            Element::U16(v) => *v as f64,
            Element::U32(v) => *v as f64,
            Element::U64(v) => *v as f64,
            Element::I32(v) => *v as f64,
            Element::I64(v) => *v as f64,
            Element::Double(v) => *v,
            _ => return None,
        })
    }

    fn as_text(e: &Element) -> Option<String> {
        Some(match e {
            Element::String(s) => s.clone(),
            Element::Mac(m) => m.to_string(),
            Element::Uuid(u) => u.to_string(),
            Element::Bytes(b) => hex::encode(b),
            _ => return None,
        })
    }

    if let (Some(x), Some(y)) = (as_num(a), as_num(b)) {
        return x == y;
    }

    if let (Some(x), Some(y)) = (as_text(a), as_text(b)) {
        return x == y;
    }

    match (a, b) {
        (Element::Bool(x), Element::Bool(y)) => x == y,
        (Element::Vector(x), Element::Vector(y)) => {
            x.len() == y.len()
                && x.iter().zip(y.iter()).all(|(l, r)| structurally_eq(l, r))
        },
        (Element::Map(x), Element::Map(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| {
                    y.get(k).map(|o| structurally_eq(v, o)).unwrap_or(false)
                })
        },
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Field summarization

/// One requested field: a `a/b/c` path plus an optional emit-time rename.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub path: String,
    pub rename: Option<String>,
}

impl FieldSpec {
    /// Accepts the wire forms `"path"` and `["path", "rename"]`.
    pub fn from_json(v: &Value) -> Result<Self> {
        match v {
            Value::String(s) => Ok(Self { path: s.clone(), rename: None }),
            Value::Array(a) if a.len() == 2 => {
                let path = a[0]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_default();
                let rename = a[1].as_str().map(str::to_string);
                if path.is_empty() {
                    bail!("field entry path must be a string");
                }
                Ok(Self { path, rename })
            },
            _ => bail!("field entry must be a string or [path, rename] pair"),
        }
    }
}

/// Projects the requested paths out of a snapshot. The returned tree holds
/// clones of only the selected nodes; renames land in the rename map, not
/// the tree. A vector root is summarized per item.
pub fn summarize(
    src: &Element,
    fields: &[FieldSpec],
    reg: &FieldRegistry,
) -> (Element, RenameMap) {
    if fields.is_empty() {
        return (src.clone(), RenameMap::new());
    }

    if let Element::Vector(items) = src {
        let mut renames = RenameMap::new();
        let out = items
            .iter()
            .map(|item| {
                let (el, rn) = summarize(item, fields, reg);
                renames.extend(rn);
                el
            })
            .collect();
        return (Element::Vector(out), renames);
    }

    let mut out = BTreeMap::new();
    let mut renames = RenameMap::new();

    for spec in fields {
        let Some(found) = src.descend(&spec.path, reg) else {
            continue;
        };

        let leaf = spec.path.rsplit('/').next().unwrap_or(&spec.path);
        let Some(leaf_id) = reg.id_of(leaf) else {
            continue;
        };

        if let Some(rename) = &spec.rename {
            renames.insert(leaf_id, rename.clone());
        } else if spec.path.contains('/') {
            // Flattened nested fields keep their full path as the key.
            renames.insert(leaf_id, spec.path.replace('/', "."));
        }

        out.insert(leaf_id, found.clone());
    }

    (Element::Map(out), renames)
}

// ─────────────────────────────────────────────────────────────────────────────
// Output formats

/// Serialization formats selected by URI extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializeFormat {
    #[default]
    Json,
    PrettyJson,
    /// One top-level vector entry per line.
    EkJson,
    /// Like EkJson but map roots stream one field per line.
    ItJson,
}

impl SerializeFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "prettyjson" => Self::PrettyJson,
            "ekjson" => Self::EkJson,
            "itjson" => Self::ItJson,
            _ => Self::Json,
        }
    }

    pub fn content_type(&self) -> &'static str {
        "application/json"
    }

    pub fn render(
        &self,
        el: &Element,
        reg: &FieldRegistry,
        renames: &RenameMap,
    ) -> String {
        match self {
            Self::Json => to_json(el, reg, renames).to_string(),
            Self::PrettyJson => {
                serde_json::to_string_pretty(&to_json(el, reg, renames))
                    .unwrap_or_default()
            },
            Self::EkJson => match el {
                Element::Vector(items) => {
                    let mut out = String::new();
                    for item in items {
                        out.push_str(&to_json(item, reg, renames).to_string());
                        out.push('\n');
                    }
                    out
                },
                other => {
                    let mut s = to_json(other, reg, renames).to_string();
                    s.push('\n');
                    s
                },
            },
            Self::ItJson => match el {
                Element::Vector(items) => {
                    let mut out = String::new();
                    for item in items {
                        out.push_str(&to_json(item, reg, renames).to_string());
                        out.push('\n');
                    }
                    out
                },
                Element::Map(m) => {
                    let mut out = String::new();
                    for (id, v) in m {
                        let key = renames
                            .get(id)
                            .cloned()
                            .or_else(|| reg.name_of(*id))
                            .unwrap_or_else(|| format!("unknown.{id}"));
                        out.push_str(
                            &json!({key: to_json(v, reg, renames)}).to_string(),
                        );
                        out.push('\n');
                    }
                    out
                },
                other => {
                    let mut s = to_json(other, reg, renames).to_string();
                    s.push('\n');
                    s
                },
            },
        }
    }
}
