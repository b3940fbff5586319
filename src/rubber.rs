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

use serde::Serialize;
use serde_json::{json, Value};
use slog_scope::debug;
use snafu::{ResultExt, Snafu};
use std::time::Duration;

use crate::remote::{self, HttpTransport, Method, RawResponse, Request, Transport};
use crate::settings::ElasticsearchSettings;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{}", source))]
    Remote { source: remote::Error },

    /// Elasticsearch answered 404
    #[snafu(display("Elasticsearch Not Found: {}", error))]
    NotFound { error: Value },

    /// Any other error status
    #[snafu(display("Elasticsearch Error: {} [{}]", status, error))]
    ElasticHttp { status: u16, error: Value },

    #[snafu(display("JSON Serialization Error: {}", source))]
    JsonSerialization { source: serde_json::Error },

    #[snafu(display("JSON Deserialization Error: {} [{}]", source, details))]
    JsonDeserialization {
        details: String,
        source: serde_json::Error,
    },
}

/// Either a Lucene query string, sent as `q`, or a query DSL body.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    QueryString(String),
    QueryDSL(Value),
}

impl From<&str> for Query {
    fn from(query: &str) -> Self {
        Query::QueryString(query.to_string())
    }
}

impl From<String> for Query {
    fn from(query: String) -> Self {
        Query::QueryString(query)
    }
}

impl From<Value> for Query {
    fn from(dsl: Value) -> Self {
        Query::QueryDSL(dsl)
    }
}

// Rubber is a wrapper around the elasticsearch API, it hands back decoded JSON
#[derive(Debug, Clone)]
pub struct Rubber<T = HttpTransport> {
    transport: T,
}

impl Rubber<HttpTransport> {
    // build a rubber with a connection string (http://host:port)
    pub fn new(url: &str, timeout: Duration) -> Result<Self, Error> {
        let transport = HttpTransport::new(url, timeout).context(Remote)?;
        Ok(Rubber { transport })
    }

    pub fn from_settings(settings: &ElasticsearchSettings) -> Result<Self, Error> {
        Rubber::new(&settings.url, Duration::from_millis(settings.timeout))
    }
}

impl<T: Transport> Rubber<T> {
    pub fn with_transport(transport: T) -> Self {
        Rubber { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn send_request(&self, request: Request) -> Result<Value, Error> {
        debug!("{} {}", request.method, request.path_str());
        let response = self.transport.perform(&request).context(Remote)?;
        prep_response(response)
    }

    /// Turn a value into the JSON sent in a request body.
    pub fn to_value<D: Serialize + ?Sized>(&self, value: &D) -> Result<Value, Error> {
        serde_json::to_value(value).context(JsonSerialization)
    }

    fn encode<D: Serialize + ?Sized>(&self, value: &D) -> Result<String, Error> {
        let value = self.to_value(value)?;
        serde_json::to_string(&value).context(JsonSerialization)
    }

    /// Index a document, under `id` if given. With `force_insert`, an
    /// existing document with the same id makes the call fail.
    pub fn index<D: Serialize + ?Sized>(
        &self,
        index: &str,
        doc_type: &str,
        doc: &D,
        id: Option<&str>,
        force_insert: bool,
    ) -> Result<Value, Error> {
        let mut request = match id {
            Some(id) => Request::new(Method::Put, &[index, doc_type, id]),
            None => Request::new(Method::Post, &[index, doc_type]),
        };
        if force_insert {
            request = request.with_param("op_type", "create");
        }
        self.send_request(request.with_body(self.encode(doc)?))
    }

    /// Index all the documents in one bulk request.
    ///
    /// With `id_field`, each document's id is read from that field.
    pub fn bulk_index<D: Serialize>(
        &self,
        index: &str,
        doc_type: &str,
        docs: &[D],
        id_field: Option<&str>,
    ) -> Result<Value, Error> {
        let mut body = String::new();
        for doc in docs {
            let doc = self.to_value(doc)?;
            let mut action = json!({ "_index": index, "_type": doc_type });
            if let Some(id) = id_field.and_then(|field| doc.get(field)) {
                action["_id"] = id.clone();
            }
            body.push_str(&self.encode(&json!({ "index": action }))?);
            body.push('\n');
            body.push_str(&self.encode(&doc)?);
            body.push('\n');
        }
        self.send_request(Request::new(Method::Post, &["_bulk"]).with_body(body))
    }

    pub fn get(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, Error> {
        let request = Request::new(Method::Get, &[index, doc_type, id]).with_params(params);
        self.send_request(request)
    }

    pub fn multi_get(&self, index: &str, doc_type: &str, ids: &[&str]) -> Result<Value, Error> {
        let request = Request::new(Method::Post, &[index, doc_type, "_mget"])
            .with_body(self.encode(&json!({ "ids": ids }))?);
        self.send_request(request)
    }

    /// Partial update, `doc` is merged into the stored document.
    pub fn update<D: Serialize + ?Sized>(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        doc: &D,
    ) -> Result<Value, Error> {
        let body = json!({ "doc": self.to_value(doc)? });
        let request = Request::new(Method::Post, &[index, doc_type, id, "_update"])
            .with_body(self.encode(&body)?);
        self.send_request(request)
    }

    pub fn delete(&self, index: &str, doc_type: &str, id: &str) -> Result<Value, Error> {
        self.send_request(Request::new(Method::Delete, &[index, doc_type, id]))
    }

    pub fn delete_all(&self, index: &str, doc_type: &str) -> Result<Value, Error> {
        self.send_request(Request::new(Method::Delete, &[index, doc_type]))
    }

    pub fn search(
        &self,
        query: &Query,
        indexes: &[&str],
        doc_types: &[&str],
        params: &[(&str, &str)],
    ) -> Result<Value, Error> {
        self.search_or_count("_search", query, indexes, doc_types, params)
    }

    pub fn count(
        &self,
        query: &Query,
        indexes: &[&str],
        doc_types: &[&str],
        params: &[(&str, &str)],
    ) -> Result<Value, Error> {
        self.search_or_count("_count", query, indexes, doc_types, params)
    }

    fn search_or_count(
        &self,
        kind: &str,
        query: &Query,
        indexes: &[&str],
        doc_types: &[&str],
        params: &[(&str, &str)],
    ) -> Result<Value, Error> {
        let indexes = join_indexes(indexes, doc_types);
        let doc_types = doc_types.join(",");
        let path = [indexes.as_str(), doc_types.as_str(), kind];
        let request = match query {
            Query::QueryString(q) => Request::new(Method::Get, &path).with_param("q", q.as_str()),
            Query::QueryDSL(dsl) => Request::new(Method::Post, &path).with_body(self.encode(dsl)?),
        };
        self.send_request(request.with_params(params))
    }

    /// Documents similar to the one at `id`, compared on `mlt_fields`.
    pub fn more_like_this(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        mlt_fields: &[&str],
        params: &[(&str, &str)],
    ) -> Result<Value, Error> {
        let request = Request::new(Method::Get, &[index, doc_type, id, "_mlt"])
            .with_param("mlt_fields", mlt_fields.join(","))
            .with_params(params);
        self.send_request(request)
    }

    pub fn create_index(&self, index: &str, settings: Option<&Value>) -> Result<Value, Error> {
        let mut request = Request::new(Method::Put, &[index]);
        if let Some(settings) = settings {
            request = request.with_body(self.encode(settings)?);
        }
        self.send_request(request)
    }

    pub fn delete_index(&self, index: &str) -> Result<Value, Error> {
        self.send_request(Request::new(Method::Delete, &[index]))
    }

    pub fn open_index(&self, index: &str) -> Result<Value, Error> {
        self.send_request(Request::new(Method::Post, &[index, "_open"]))
    }

    pub fn close_index(&self, index: &str) -> Result<Value, Error> {
        self.send_request(Request::new(Method::Post, &[index, "_close"]))
    }

    pub fn refresh(&self, indexes: &[&str]) -> Result<Value, Error> {
        let indexes = indexes.join(",");
        self.send_request(Request::new(Method::Post, &[indexes.as_str(), "_refresh"]))
    }

    pub fn put_mapping(&self, index: &str, doc_type: &str, mapping: &Value) -> Result<Value, Error> {
        let request = Request::new(Method::Put, &[index, doc_type, "_mapping"])
            .with_body(self.encode(mapping)?);
        self.send_request(request)
    }

    pub fn get_mapping(&self, indexes: &[&str], doc_types: &[&str]) -> Result<Value, Error> {
        let indexes = join_indexes(indexes, doc_types);
        let doc_types = doc_types.join(",");
        self.send_request(Request::new(
            Method::Get,
            &[indexes.as_str(), doc_types.as_str(), "_mapping"],
        ))
    }

    pub fn health(&self, indexes: &[&str], params: &[(&str, &str)]) -> Result<Value, Error> {
        let indexes = indexes.join(",");
        let request =
            Request::new(Method::Get, &["_cluster", "health", indexes.as_str()]).with_params(params);
        self.send_request(request)
    }
}

// Types can only be given after an index, so without index we target all of them.
fn join_indexes(indexes: &[&str], doc_types: &[&str]) -> String {
    if indexes.is_empty() && !doc_types.is_empty() {
        String::from("_all")
    } else {
        indexes.join(",")
    }
}

fn prep_response(response: RawResponse) -> Result<Value, Error> {
    let RawResponse { status, body } = response;
    if status >= 400 {
        let payload = serde_json::from_str::<Value>(&body).unwrap_or_else(|_| Value::String(body));
        let error = match payload {
            Value::Object(mut fields) => match fields.remove("error") {
                Some(error) => error,
                None => Value::Object(fields),
            },
            other => other,
        };
        return if status == 404 {
            Err(Error::NotFound { error })
        } else {
            Err(Error::ElasticHttp { status, error })
        };
    }
    serde_json::from_str(&body).context(JsonDeserialization {
        details: format!("response with status {}", status),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ReplayTransport {
        requests: RefCell<Vec<Request>>,
        responses: RefCell<VecDeque<RawResponse>>,
    }

    impl ReplayTransport {
        fn replying(status: u16, body: &str) -> Self {
            let transport = ReplayTransport::default();
            transport.responses.borrow_mut().push_back(RawResponse {
                status,
                body: body.to_string(),
            });
            transport
        }

        fn last_request(&self) -> Request {
            self.requests
                .borrow()
                .last()
                .cloned()
                .expect("a request was sent")
        }
    }

    impl Transport for ReplayTransport {
        fn perform(&self, request: &Request) -> Result<RawResponse, remote::Error> {
            self.requests.borrow_mut().push(request.clone());
            Ok(self
                .responses
                .borrow_mut()
                .pop_front()
                .unwrap_or(RawResponse {
                    status: 200,
                    body: String::from("{\"ok\":true}"),
                }))
        }
    }

    #[test]
    fn should_put_document_with_id() {
        let rubber = Rubber::with_transport(ReplayTransport::default());
        rubber
            .index("test-index", "user", &json!({ "user": "Joe" }), Some("1"), true)
            .expect("index");
        let request = rubber.transport().last_request();
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.path, vec!["test-index", "user", "1"]);
        assert_eq!(
            request.params,
            vec![(String::from("op_type"), String::from("create"))]
        );
        assert_eq!(request.body.as_deref(), Some("{\"user\":\"Joe\"}"));
    }

    #[test]
    fn should_post_document_without_id() {
        let rubber = Rubber::with_transport(ReplayTransport::default());
        rubber
            .index("test-index", "user", &json!({ "user": "Joe" }), None, false)
            .expect("index");
        let request = rubber.transport().last_request();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, vec!["test-index", "user"]);
        assert!(request.params.is_empty());
    }

    #[test]
    fn should_send_query_string_as_param() {
        let rubber = Rubber::with_transport(ReplayTransport::default());
        rubber
            .search(&Query::from("user:Tester"), &[], &[], &[("size", "5")])
            .expect("search");
        let request = rubber.transport().last_request();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, vec!["_search"]);
        assert_eq!(
            request.params,
            vec![
                (String::from("q"), String::from("user:Tester")),
                (String::from("size"), String::from("5"))
            ]
        );
        assert_eq!(request.body, None);
    }

    #[test]
    fn should_send_query_dsl_as_body() {
        let rubber = Rubber::with_transport(ReplayTransport::default());
        let dsl = json!({ "query": { "match_all": {} } });
        rubber
            .count(&Query::from(dsl.clone()), &["a", "b"], &["user"], &[])
            .expect("count");
        let request = rubber.transport().last_request();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, vec!["a,b", "user", "_count"]);
        let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, dsl);
    }

    #[test]
    fn should_target_all_indexes_when_only_types_are_given() {
        let rubber = Rubber::with_transport(ReplayTransport::default());
        rubber
            .search(&Query::from("*"), &[], &["user"], &[])
            .expect("search");
        assert_eq!(
            rubber.transport().last_request().path,
            vec!["_all", "user", "_search"]
        );
    }

    #[test]
    fn should_build_bulk_body() {
        let rubber = Rubber::with_transport(ReplayTransport::default());
        let docs = vec![
            json!({ "id": "1", "user": "Joe" }),
            json!({ "user": "Jane" }),
        ];
        rubber
            .bulk_index("test-index", "user", &docs, Some("id"))
            .expect("bulk");
        let request = rubber.transport().last_request();
        assert_eq!(request.path, vec!["_bulk"]);
        let lines: Vec<Value> = request
            .body
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(
            lines,
            vec![
                json!({ "index": { "_index": "test-index", "_type": "user", "_id": "1" } }),
                json!({ "id": "1", "user": "Joe" }),
                json!({ "index": { "_index": "test-index", "_type": "user" } }),
                json!({ "user": "Jane" }),
            ]
        );
    }

    #[test]
    fn should_wrap_update_doc() {
        let rubber = Rubber::with_transport(ReplayTransport::default());
        rubber
            .update("test-index", "user", "1", &json!({ "age": 42 }))
            .expect("update");
        let request = rubber.transport().last_request();
        assert_eq!(request.path, vec!["test-index", "user", "1", "_update"]);
        assert_eq!(request.body.as_deref(), Some("{\"doc\":{\"age\":42}}"));
    }

    #[test]
    fn should_join_mlt_fields() {
        let rubber = Rubber::with_transport(ReplayTransport::default());
        rubber
            .more_like_this("test-index", "user", "1", &["user", "bio"], &[("min_term_freq", "1")])
            .expect("mlt");
        let request = rubber.transport().last_request();
        assert_eq!(request.path, vec!["test-index", "user", "1", "_mlt"]);
        assert_eq!(
            request.params,
            vec![
                (String::from("mlt_fields"), String::from("user,bio")),
                (String::from("min_term_freq"), String::from("1"))
            ]
        );
    }

    #[test]
    fn should_extract_error_on_not_found() {
        let rubber = Rubber::with_transport(ReplayTransport::replying(
            404,
            r#"{"error": "IndexMissingException[[foo] missing]", "status": 404}"#,
        ));
        let err = rubber.delete_index("foo").unwrap_err();
        match err {
            Error::NotFound { error } => {
                assert_eq!(error, json!("IndexMissingException[[foo] missing]"))
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn should_report_error_status() {
        let rubber = Rubber::with_transport(ReplayTransport::replying(
            400,
            r#"{"reason": "bad request"}"#,
        ));
        let err = rubber.create_index("foo", None).unwrap_err();
        match err {
            Error::ElasticHttp { status, error } => {
                assert_eq!(status, 400);
                assert_eq!(error, json!({ "reason": "bad request" }));
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn should_keep_non_json_error_body() {
        let rubber =
            Rubber::with_transport(ReplayTransport::replying(503, "Service Unavailable"));
        let err = rubber.health(&[], &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Elasticsearch Error: 503 [\"Service Unavailable\"]"
        );
    }

    #[test]
    fn should_fail_on_invalid_json() {
        let rubber = Rubber::with_transport(ReplayTransport::replying(200, "not json"));
        let err = rubber.refresh(&["test-index"]).unwrap_err();
        assert!(matches!(err, Error::JsonDeserialization { .. }));
    }
}
