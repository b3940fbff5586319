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

use elasticobjects::remote::{self, RawResponse, Request, Transport};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::VecDeque;

/// In-memory stand-in for an Elasticsearch node: it records every request
/// and answers with the replies queued beforehand, in order.
#[derive(Default)]
pub struct FakeElasticsearch {
    requests: RefCell<Vec<Request>>,
    replies: RefCell<VecDeque<RawResponse>>,
}

impl FakeElasticsearch {
    pub fn new() -> Self {
        FakeElasticsearch::default()
    }

    pub fn reply(self, status: u16, body: Value) -> Self {
        self.replies.borrow_mut().push_back(RawResponse {
            status,
            body: body.to_string(),
        });
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    pub fn last_request(&self) -> Request {
        self.requests
            .borrow()
            .last()
            .cloned()
            .expect("no request sent to elasticsearch")
    }
}

impl Transport for FakeElasticsearch {
    fn perform(&self, request: &Request) -> Result<RawResponse, remote::Error> {
        self.requests.borrow_mut().push(request.clone());
        Ok(self
            .replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| RawResponse {
                status: 500,
                body: json!({ "error": "no reply queued" }).to_string(),
            }))
    }
}

pub fn body_of(request: &Request) -> Value {
    let body = request.body.as_deref().expect("request without body");
    serde_json::from_str(body).expect("request body is not JSON")
}

pub fn index_ack(id: &str) -> Value {
    json!({
        "ok": true,
        "_index": "test-index",
        "_type": "user",
        "_id": id,
        "_version": 1
    })
}

pub fn hit(id: &str, score: f64, user: &str) -> Value {
    json!({
        "_index": "test-index",
        "_type": "user",
        "_id": id,
        "_score": score,
        "_source": { "user": user }
    })
}

pub fn search_reply(hits: Vec<Value>) -> Value {
    let max_score = hits
        .iter()
        .filter_map(|hit| hit["_score"].as_f64())
        .fold(0.0, f64::max);
    json!({
        "took": 4,
        "timed_out": false,
        "_shards": { "total": 5, "successful": 5, "failed": 0 },
        "hits": {
            "total": hits.len(),
            "max_score": max_score,
            "hits": hits
        }
    })
}
