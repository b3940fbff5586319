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

//! Elasticsearch client handing back response views instead of raw JSON.

use serde::Serialize;
use serde_json::Value;
use slog_scope::debug;
use snafu::{ResultExt, Snafu};
use std::time::Duration;

use crate::objects::{self, Response};
use crate::remote::{HttpTransport, Transport};
use crate::rubber::{self, Query, Rubber};
use crate::settings::ElasticsearchSettings;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Anything the underlying client reports, untouched.
    #[snafu(display("{}", source))]
    Client { source: rubber::Error },

    #[snafu(display("Response Wrapping Error: {}", source))]
    Wrapping { source: objects::Error },
}

/// Drop-in replacement for [`Rubber`]: same operations, same arguments, but
/// each successful payload is wrapped by [`ObjectSearch::prep_response`].
///
/// Request bodies may be views: a [`Document`](crate::objects::Document) is
/// sent as its source, a document set or search result as the list of its
/// documents' sources.
#[derive(Debug, Clone)]
pub struct ObjectSearch<T = HttpTransport> {
    rubber: Rubber<T>,
}

impl ObjectSearch<HttpTransport> {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, Error> {
        let rubber = Rubber::new(url, timeout).context(Client)?;
        Ok(ObjectSearch { rubber })
    }

    pub fn from_settings(settings: &ElasticsearchSettings) -> Result<Self, Error> {
        let rubber = Rubber::from_settings(settings).context(Client)?;
        Ok(ObjectSearch { rubber })
    }
}

impl<T: Transport> From<Rubber<T>> for ObjectSearch<T> {
    fn from(rubber: Rubber<T>) -> Self {
        ObjectSearch { rubber }
    }
}

impl<T: Transport> ObjectSearch<T> {
    pub fn with_transport(transport: T) -> Self {
        ObjectSearch {
            rubber: Rubber::with_transport(transport),
        }
    }

    pub fn rubber(&self) -> &Rubber<T> {
        &self.rubber
    }

    /// Wrap a decoded payload in the view its signature fields call for.
    pub fn prep_response(&self, payload: Value) -> Result<Response, Error> {
        let response = Response::from_payload(payload).context(Wrapping)?;
        debug!("wrapped response as {:?}", response.kind());
        Ok(response)
    }

    /// The raw JSON a value is sent as: views give back their backing
    /// structure, any other value is serialized as is.
    pub fn from_view<D: Serialize + ?Sized>(&self, value: &D) -> Result<Value, Error> {
        self.rubber.to_value(value).context(Client)
    }

    fn wrap(&self, payload: Result<Value, rubber::Error>) -> Result<Response, Error> {
        self.prep_response(payload.context(Client)?)
    }

    pub fn index<D: Serialize + ?Sized>(
        &self,
        index: &str,
        doc_type: &str,
        doc: &D,
        id: Option<&str>,
        force_insert: bool,
    ) -> Result<Response, Error> {
        self.wrap(self.rubber.index(index, doc_type, doc, id, force_insert))
    }

    pub fn bulk_index<D: Serialize>(
        &self,
        index: &str,
        doc_type: &str,
        docs: &[D],
        id_field: Option<&str>,
    ) -> Result<Response, Error> {
        self.wrap(self.rubber.bulk_index(index, doc_type, docs, id_field))
    }

    pub fn get(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        params: &[(&str, &str)],
    ) -> Result<Response, Error> {
        self.wrap(self.rubber.get(index, doc_type, id, params))
    }

    pub fn multi_get(&self, index: &str, doc_type: &str, ids: &[&str]) -> Result<Response, Error> {
        self.wrap(self.rubber.multi_get(index, doc_type, ids))
    }

    pub fn update<D: Serialize + ?Sized>(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        doc: &D,
    ) -> Result<Response, Error> {
        self.wrap(self.rubber.update(index, doc_type, id, doc))
    }

    pub fn delete(&self, index: &str, doc_type: &str, id: &str) -> Result<Response, Error> {
        self.wrap(self.rubber.delete(index, doc_type, id))
    }

    pub fn delete_all(&self, index: &str, doc_type: &str) -> Result<Response, Error> {
        self.wrap(self.rubber.delete_all(index, doc_type))
    }

    pub fn search(
        &self,
        query: &Query,
        indexes: &[&str],
        doc_types: &[&str],
        params: &[(&str, &str)],
    ) -> Result<Response, Error> {
        self.wrap(self.rubber.search(query, indexes, doc_types, params))
    }

    pub fn count(
        &self,
        query: &Query,
        indexes: &[&str],
        doc_types: &[&str],
        params: &[(&str, &str)],
    ) -> Result<Response, Error> {
        self.wrap(self.rubber.count(query, indexes, doc_types, params))
    }

    pub fn more_like_this(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        mlt_fields: &[&str],
        params: &[(&str, &str)],
    ) -> Result<Response, Error> {
        self.wrap(
            self.rubber
                .more_like_this(index, doc_type, id, mlt_fields, params),
        )
    }

    pub fn create_index(&self, index: &str, settings: Option<&Value>) -> Result<Response, Error> {
        self.wrap(self.rubber.create_index(index, settings))
    }

    pub fn delete_index(&self, index: &str) -> Result<Response, Error> {
        self.wrap(self.rubber.delete_index(index))
    }

    pub fn open_index(&self, index: &str) -> Result<Response, Error> {
        self.wrap(self.rubber.open_index(index))
    }

    pub fn close_index(&self, index: &str) -> Result<Response, Error> {
        self.wrap(self.rubber.close_index(index))
    }

    pub fn refresh(&self, indexes: &[&str]) -> Result<Response, Error> {
        self.wrap(self.rubber.refresh(indexes))
    }

    pub fn put_mapping(
        &self,
        index: &str,
        doc_type: &str,
        mapping: &Value,
    ) -> Result<Response, Error> {
        self.wrap(self.rubber.put_mapping(index, doc_type, mapping))
    }

    pub fn get_mapping(&self, indexes: &[&str], doc_types: &[&str]) -> Result<Response, Error> {
        self.wrap(self.rubber.get_mapping(indexes, doc_types))
    }

    pub fn health(&self, indexes: &[&str], params: &[(&str, &str)]) -> Result<Response, Error> {
        self.wrap(self.rubber.health(indexes, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Document, DocumentSet, Kind, View};
    use crate::remote::{self, RawResponse, Request};
    use serde_json::json;

    struct Unreachable;

    impl Transport for Unreachable {
        fn perform(&self, _request: &Request) -> Result<RawResponse, remote::Error> {
            Err(remote::Error::CannotBeABase {
                url: String::from("unreachable"),
            })
        }
    }

    fn source_of(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {}", other),
        }
    }

    #[test]
    fn should_give_back_document_source() {
        let client = ObjectSearch::with_transport(Unreachable);
        let doc = match client
            .prep_response(json!({ "_id": "1", "_source": { "user": "Joe" } }))
            .unwrap()
        {
            Response::Document(doc) => doc,
            other => panic!("expected a document, got {:?}", other.kind()),
        };
        let raw = client.from_view(&doc).unwrap();
        assert_eq!(raw, json!({ "user": "Joe" }));
        let text = serde_json::to_string(&raw).unwrap();
        let thawed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(thawed["user"], json!("Joe"));
    }

    #[test]
    fn should_give_back_document_set_sequence() {
        let client = ObjectSearch::with_transport(Unreachable);
        let set = DocumentSet::from_payload(source_of(json!({
            "docs": [ { "_source": { "n": 1 } }, { "_source": { "n": 2 } } ]
        })))
        .unwrap();
        assert_eq!(
            client.from_view(&set).unwrap(),
            json!([{ "n": 1 }, { "n": 2 }])
        );
    }

    #[test]
    fn should_pass_other_values_through() {
        let client = ObjectSearch::with_transport(Unreachable);
        let value = json!({ "_source": { "user": "Joe" } });
        assert_eq!(client.from_view(&value).unwrap(), value);
        assert_eq!(client.from_view("plain").unwrap(), json!("plain"));
        let doc = Document::from_source(source_of(json!({ "user": "Joe" })));
        assert_eq!(client.from_view(&vec![doc]).unwrap(), json!([{ "user": "Joe" }]));
    }

    #[test]
    fn should_surface_client_errors_unchanged() {
        let client = ObjectSearch::with_transport(Unreachable);
        let err = client.delete_index("test-index").unwrap_err();
        assert!(matches!(
            err,
            Error::Client {
                source: rubber::Error::Remote { .. }
            }
        ));
        assert_eq!(
            err.to_string(),
            "Invalid Elasticsearch URL: unreachable cannot be a base"
        );
    }

    #[test]
    fn should_report_wrapping_errors() {
        let client = ObjectSearch::with_transport(Unreachable);
        let err = client.prep_response(json!({ "hits": [] })).unwrap_err();
        assert!(matches!(err, Error::Wrapping { .. }));
    }

    #[test]
    fn should_prefer_source_over_hits() {
        let client = ObjectSearch::with_transport(Unreachable);
        let res = client
            .prep_response(json!({ "_source": {}, "hits": { "hits": [] } }))
            .unwrap();
        assert_eq!(res.kind(), Kind::Document);
        assert_eq!(res.get("source"), Some(json!({})));
    }
}
