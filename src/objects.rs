// Copyright © 2016, Canal TP and/or its affiliates. All rights reserved.
//
// This file is part of Navitia,
//     the software to build cool stuff with public transport.
//
// Hope you'll enjoy and contribute to this project,
//     powered by Canal TP (www.canaltp.fr).
// Help us simplify mobility and open public transport:
//     a non ending quest to the responsive locomotion way of traveling!
//
// LICENCE: This program is free software; you can redistribute it
// and/or modify it under the terms of the GNU Affero General Public
// License as published by the Free Software Foundation, either
// version 3 of the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
// Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public
// License along with this program. If not, see
// <http://www.gnu.org/licenses/>.
//
// Stay tuned using
// twitter @navitia
// IRC #navitia on freenode
// https://groups.google.com/d/forum/navitia
// www.navitia.io

//! Views over raw Elasticsearch responses.
//!
//! A decoded response body is classified by its signature fields and wrapped in
//! one of the views below. Keys starting with an underscore (`_index`, `_id`,
//! `_source`, ...) are exposed without it.

use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use slog_scope::warn;
use snafu::Snafu;
use std::ops::Index;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Attribute Not Found: {}", name))]
    AttributeNotFound { name: String },

    #[snafu(display("Key Not Found: {}", key))]
    KeyNotFound { key: String },

    #[snafu(display("Index Out Of Range: {} (length {})", index, len))]
    IndexOutOfRange { index: usize, len: usize },

    #[snafu(display("Unexpected Response Shape: '{}' should be {}", field, expected))]
    UnexpectedShape {
        field: String,
        expected: &'static str,
    },
}

/// Remove one leading underscore from a payload key.
pub fn strip_underscore(key: &str) -> &str {
    key.strip_prefix('_').unwrap_or(key)
}

// Exposed keys Elasticsearch sends with a leading underscore.
const UNDERSCORED: [&str; 12] = [
    "index",
    "type",
    "id",
    "version",
    "score",
    "source",
    "routing",
    "seq_no",
    "primary_term",
    "shards",
    "explanation",
    "ignored",
];

// Keys with a dedicated field in `Metadata`.
const KNOWN_FIELDS: [&str; 13] = [
    "index",
    "type",
    "id",
    "version",
    "score",
    "ok",
    "found",
    "exists",
    "acknowledged",
    "count",
    "took",
    "timed_out",
    "shards",
];

fn conceal(key: String) -> String {
    if UNDERSCORED.contains(&key.as_str()) {
        format!("_{}", key)
    } else {
        key
    }
}

fn expose(payload: Map<String, Value>) -> Map<String, Value> {
    payload
        .into_iter()
        .map(|(key, val)| match key.strip_prefix('_') {
            Some(stripped) => (stripped.to_string(), val),
            None => (key, val),
        })
        .collect()
}

/// Attributes of a response, once the leading underscores are stripped.
///
/// The keys Elasticsearch commonly sends back have their own field, anything
/// else is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub took: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shards: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    /// Decode already exposed fields.
    ///
    /// If one of the known keys does not have the expected type, nothing is
    /// decoded and every field ends up in `extra`.
    pub fn from_fields(fields: Map<String, Value>) -> Metadata {
        let value = Value::Object(fields);
        match Metadata::deserialize(&value) {
            Ok(meta) => meta,
            Err(err) => {
                warn!("could not decode response metadata, keeping raw fields: {}", err);
                let extra = match value {
                    Value::Object(fields) => fields,
                    _ => Map::new(),
                };
                Metadata {
                    extra,
                    ..Metadata::default()
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let known = match key {
            "index" => self.index.clone().map(Value::from),
            "type" => self.doc_type.clone().map(Value::from),
            "id" => self.id.clone().map(Value::from),
            "version" => self.version.map(Value::from),
            "score" => self.score.map(Value::from),
            "ok" => self.ok.map(Value::from),
            "found" => self.found.map(Value::from),
            "exists" => self.exists.map(Value::from),
            "acknowledged" => self.acknowledged.map(Value::from),
            "count" => self.count.map(Value::from),
            "took" => self.took.map(Value::from),
            "timed_out" => self.timed_out.map(Value::from),
            "shards" => self.shards.clone().map(Value::Object),
            _ => None,
        };
        known.or_else(|| self.extra.get(key).cloned())
    }

    /// Every attribute as an exposed mapping, the reverse of `from_fields`.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields: Map<String, Value> = KNOWN_FIELDS
            .iter()
            .filter_map(|key| self.get(key).map(|val| (key.to_string(), val)))
            .collect();
        fields.extend(self.extra.clone());
        fields
    }
}

/// Attribute access shared by every response view.
pub trait View {
    fn metadata(&self) -> &Metadata;

    /// Mapping-style lookup over the exposed attributes.
    fn get(&self, key: &str) -> Option<Value> {
        self.metadata().get(key)
    }

    fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    fn attribute(&self, name: &str) -> Result<Value, Error> {
        self.get(name).ok_or_else(|| Error::AttributeNotFound {
            name: name.to_string(),
        })
    }
}

/// Any response without a signature field: acknowledgements, counts, ...
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GenericResult {
    pub meta: Metadata,
}

impl GenericResult {
    pub fn from_payload(payload: Map<String, Value>) -> Self {
        GenericResult {
            meta: Metadata::from_fields(expose(payload)),
        }
    }
}

impl View for GenericResult {
    fn metadata(&self) -> &Metadata {
        &self.meta
    }
}

/// A single document, usable as a mutable mapping over its `_source`.
///
/// The source belongs to the document: `source()` and `source_mut()` hand out
/// references to it, and every container operation reads or writes that same
/// mapping. Serializing a document yields its source alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub meta: Metadata,
    source: Option<Map<String, Value>>,
}

impl Document {
    pub fn from_payload(payload: Map<String, Value>) -> Result<Self, Error> {
        let mut fields = expose(payload);
        let source = match fields.remove("source") {
            Some(Value::Object(source)) => Some(source),
            Some(_) => {
                return Err(Error::UnexpectedShape {
                    field: String::from("_source"),
                    expected: "an object",
                })
            }
            None => None,
        };
        Ok(Document {
            meta: Metadata::from_fields(fields),
            source,
        })
    }

    /// A document with no metadata around the given source.
    pub fn from_source(source: Map<String, Value>) -> Self {
        Document {
            meta: Metadata::default(),
            source: Some(source),
        }
    }

    pub fn source(&self) -> Result<&Map<String, Value>, Error> {
        self.source.as_ref().ok_or_else(missing_source)
    }

    pub fn source_mut(&mut self) -> Result<&mut Map<String, Value>, Error> {
        self.source.as_mut().ok_or_else(missing_source)
    }

    pub fn into_source(self) -> Option<Map<String, Value>> {
        self.source
    }

    /// The document the way Elasticsearch lists it, metadata and `_source`
    /// side by side.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut fields = self.meta.to_fields();
        if let Some(source) = &self.source {
            fields.insert(String::from("source"), Value::Object(source.clone()));
        }
        fields
            .into_iter()
            .map(|(key, val)| (conceal(key), val))
            .collect()
    }

    pub fn get_item(&self, key: &str) -> Result<&Value, Error> {
        self.source
            .as_ref()
            .and_then(|source| source.get(key))
            .ok_or_else(|| Error::KeyNotFound {
                key: key.to_string(),
            })
    }

    /// Insert or overwrite `key` in the source, returning the previous value.
    pub fn set_item<K, V>(&mut self, key: K, val: V) -> Result<Option<Value>, Error>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Ok(self.source_mut()?.insert(key.into(), val.into()))
    }

    pub fn del_item(&mut self, key: &str) -> Result<Value, Error> {
        self.source
            .as_mut()
            .and_then(|source| source.remove(key))
            .ok_or_else(|| Error::KeyNotFound {
                key: key.to_string(),
            })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.source
            .as_ref()
            .map_or(false, |source| source.contains_key(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.source.iter().flat_map(|source| source.keys())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.source.iter().flat_map(|source| source.iter())
    }

    pub fn len(&self) -> usize {
        self.source.as_ref().map_or(0, Map::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn missing_source() -> Error {
    Error::AttributeNotFound {
        name: String::from("source"),
    }
}

impl View for Document {
    fn metadata(&self) -> &Metadata {
        &self.meta
    }

    fn get(&self, key: &str) -> Option<Value> {
        match key {
            "source" => self.source.clone().map(Value::Object),
            _ => self.meta.get(key),
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.source {
            Some(source) => source.serialize(serializer),
            None => Err(ser::Error::custom("document has no source")),
        }
    }
}

/// Read-only ordered access to the documents of a response.
pub trait DocumentSequence {
    fn documents(&self) -> &[Document];

    fn len(&self) -> usize {
        self.documents().len()
    }

    fn is_empty(&self) -> bool {
        self.documents().is_empty()
    }

    fn document(&self, index: usize) -> Result<&Document, Error> {
        let documents = self.documents();
        documents.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: documents.len(),
        })
    }

    fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents().iter()
    }
}

fn list_payloads(documents: &[Document]) -> Value {
    Value::Array(
        documents
            .iter()
            .map(|doc| Value::Object(doc.to_payload()))
            .collect(),
    )
}

fn wrap_documents(field: &str, value: Value) -> Result<Vec<Document>, Error> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(payload) => Document::from_payload(payload),
                _ => Err(Error::UnexpectedShape {
                    field: field.to_string(),
                    expected: "an array of objects",
                }),
            })
            .collect(),
        _ => Err(Error::UnexpectedShape {
            field: field.to_string(),
            expected: "an array",
        }),
    }
}

/// Documents listed under `docs`, as returned by a multi get.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSet {
    pub meta: Metadata,
    docs: Vec<Document>,
}

impl DocumentSet {
    pub fn from_payload(payload: Map<String, Value>) -> Result<Self, Error> {
        let mut fields = expose(payload);
        let docs = fields.remove("docs").ok_or_else(|| Error::AttributeNotFound {
            name: String::from("docs"),
        })?;
        let docs = wrap_documents("docs", docs)?;
        Ok(DocumentSet {
            meta: Metadata::from_fields(fields),
            docs,
        })
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.docs
    }
}

impl DocumentSequence for DocumentSet {
    fn documents(&self) -> &[Document] {
        &self.docs
    }
}

impl View for DocumentSet {
    fn metadata(&self) -> &Metadata {
        &self.meta
    }

    fn get(&self, key: &str) -> Option<Value> {
        match key {
            "docs" => Some(list_payloads(&self.docs)),
            _ => self.meta.get(key),
        }
    }
}

impl Serialize for DocumentSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.docs.serialize(serializer)
    }
}

impl Index<usize> for DocumentSet {
    type Output = Document;

    fn index(&self, index: usize) -> &Document {
        &self.docs[index]
    }
}

impl<'a> IntoIterator for &'a DocumentSet {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.iter()
    }
}

/// The hits of a search.
///
/// `hits` is the envelope Elasticsearch sends (`total`, `max_score`, ...) left
/// as a plain mapping; its inner `hits` list is moved out and wrapped as
/// documents. `get("hits")` puts the list back, built from the current
/// documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub meta: Metadata,
    pub hits: Map<String, Value>,
    documents: Vec<Document>,
}

impl SearchResult {
    pub fn from_payload(payload: Map<String, Value>) -> Result<Self, Error> {
        let mut fields = expose(payload);
        let mut hits = match fields.remove("hits") {
            Some(Value::Object(hits)) => hits,
            Some(_) => {
                return Err(Error::UnexpectedShape {
                    field: String::from("hits"),
                    expected: "an object",
                })
            }
            None => {
                return Err(Error::AttributeNotFound {
                    name: String::from("hits"),
                })
            }
        };
        let inner = hits.remove("hits").ok_or_else(|| Error::AttributeNotFound {
            name: String::from("hits.hits"),
        })?;
        let documents = wrap_documents("hits.hits", inner)?;
        Ok(SearchResult {
            meta: Metadata::from_fields(fields),
            hits,
            documents,
        })
    }

    /// Total number of matches, whether Elasticsearch sent it as a number or
    /// as `{ "value": n, "relation": ... }`.
    pub fn total(&self) -> Option<u64> {
        match self.hits.get("total")? {
            Value::Object(total) => total.get("value")?.as_u64(),
            total => total.as_u64(),
        }
    }

    pub fn max_score(&self) -> Option<f64> {
        self.hits.get("max_score")?.as_f64()
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}

impl DocumentSequence for SearchResult {
    fn documents(&self) -> &[Document] {
        &self.documents
    }
}

impl View for SearchResult {
    fn metadata(&self) -> &Metadata {
        &self.meta
    }

    fn get(&self, key: &str) -> Option<Value> {
        match key {
            "hits" => {
                let mut hits = self.hits.clone();
                hits.insert(String::from("hits"), list_payloads(&self.documents));
                Some(Value::Object(hits))
            }
            _ => self.meta.get(key),
        }
    }
}

impl Serialize for SearchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.documents.serialize(serializer)
    }
}

impl Index<usize> for SearchResult {
    type Output = Document;

    fn index(&self, index: usize) -> &Document {
        &self.documents[index]
    }
}

impl<'a> IntoIterator for &'a SearchResult {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Document,
    Search,
    DocumentSet,
    Generic,
}

// Signature fields, in priority order: the first one present wins. Multi get
// responses only carry `docs`, hence the last entry.
const SIGNATURES: [(&str, Kind); 3] = [
    ("_source", Kind::Document),
    ("hits", Kind::Search),
    ("docs", Kind::DocumentSet),
];

/// Find which view a raw payload calls for.
pub fn classify(payload: &Map<String, Value>) -> Kind {
    SIGNATURES
        .iter()
        .find(|(field, _)| payload.contains_key(*field))
        .map_or(Kind::Generic, |(_, kind)| *kind)
}

/// A decoded response, wrapped in the view matching its shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Document(Document),
    Search(SearchResult),
    DocumentSet(DocumentSet),
    Generic(GenericResult),
}

impl Response {
    pub fn from_payload(payload: Value) -> Result<Self, Error> {
        match payload {
            Value::Object(payload) => Response::from_map(payload),
            _ => Err(Error::UnexpectedShape {
                field: String::from("response"),
                expected: "an object",
            }),
        }
    }

    pub fn from_map(payload: Map<String, Value>) -> Result<Self, Error> {
        match classify(&payload) {
            Kind::Document => Document::from_payload(payload).map(Response::Document),
            Kind::Search => SearchResult::from_payload(payload).map(Response::Search),
            Kind::DocumentSet => DocumentSet::from_payload(payload).map(Response::DocumentSet),
            Kind::Generic => Ok(Response::Generic(GenericResult::from_payload(payload))),
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Response::Document(_) => Kind::Document,
            Response::Search(_) => Kind::Search,
            Response::DocumentSet(_) => Kind::DocumentSet,
            Response::Generic(_) => Kind::Generic,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Response::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_search(&self) -> Option<&SearchResult> {
        match self {
            Response::Search(res) => Some(res),
            _ => None,
        }
    }

    pub fn as_document_set(&self) -> Option<&DocumentSet> {
        match self {
            Response::DocumentSet(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_generic(&self) -> Option<&GenericResult> {
        match self {
            Response::Generic(res) => Some(res),
            _ => None,
        }
    }

    pub fn into_document(self) -> Option<Document> {
        match self {
            Response::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn into_search(self) -> Option<SearchResult> {
        match self {
            Response::Search(res) => Some(res),
            _ => None,
        }
    }

    pub fn into_document_set(self) -> Option<DocumentSet> {
        match self {
            Response::DocumentSet(set) => Some(set),
            _ => None,
        }
    }

    pub fn into_generic(self) -> Option<GenericResult> {
        match self {
            Response::Generic(res) => Some(res),
            _ => None,
        }
    }
}

impl View for Response {
    fn metadata(&self) -> &Metadata {
        match self {
            Response::Document(doc) => doc.metadata(),
            Response::Search(res) => res.metadata(),
            Response::DocumentSet(set) => set.metadata(),
            Response::Generic(res) => res.metadata(),
        }
    }

    fn get(&self, key: &str) -> Option<Value> {
        match self {
            Response::Document(doc) => doc.get(key),
            Response::Search(res) => res.get(key),
            Response::DocumentSet(set) => set.get(key),
            Response::Generic(res) => res.get(key),
        }
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Response::Document(doc) => doc.serialize(serializer),
            Response::Search(res) => res.serialize(serializer),
            Response::DocumentSet(set) => set.serialize(serializer),
            Response::Generic(res) => res.serialize(serializer),
        }
    }
}
