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

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use slog_scope::info;
use snafu::{ResultExt, Snafu};
use std::fmt;
use std::time::Duration;
use url::Url;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Invalid Elasticsearch URL: {}, {}", details, source))]
    InvalidUrl {
        details: String,
        source: url::ParseError,
    },

    #[snafu(display("Invalid Elasticsearch URL: {} cannot be a base", url))]
    CannotBeABase { url: String },

    /// HTTP client or connection failure
    #[snafu(display("Elasticsearch Connection Error: {} [{}]", source, details))]
    HttpClient {
        details: String,
        source: reqwest::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A request to the Elasticsearch REST API.
///
/// `path` holds the unencoded segments, empty ones are dropped on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: Vec<String>,
    pub params: Vec<(String, String)>,
    pub body: Option<String>,
}

impl Request {
    pub fn new(method: Method, path: &[&str]) -> Self {
        Request {
            method,
            path: path
                .iter()
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_string())
                .collect(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn with_param<K: Into<String>, V: Into<String>>(mut self, key: K, val: V) -> Self {
        self.params.push((key.into(), val.into()));
        self
    }

    pub fn with_params(mut self, params: &[(&str, &str)]) -> Self {
        self.params.extend(
            params
                .iter()
                .map(|(key, val)| (key.to_string(), val.to_string())),
        );
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// The bulk API expects newline delimited JSON, everything else plain JSON.
    pub fn content_type(&self) -> &'static str {
        if self.path.last().map_or(false, |segment| segment == "_bulk") {
            "application/x-ndjson"
        } else {
            "application/json"
        }
    }

    pub fn path_str(&self) -> String {
        format!("/{}", self.path.join("/"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Moves a request to Elasticsearch and brings back the status and body.
pub trait Transport {
    fn perform(&self, request: &Request) -> Result<RawResponse, Error>;
}

/// Blocking HTTP transport to a single Elasticsearch node.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, Error> {
        let base = Url::parse(url).context(InvalidUrl {
            details: String::from("could not parse Elasticsearch URL"),
        })?;
        if base.cannot_be_a_base() {
            return Err(Error::CannotBeABase {
                url: url.to_string(),
            });
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context(HttpClient {
                details: String::from("could not build HTTP client"),
            })?;
        info!("elasticsearch url {}, timeout {:?}", base, timeout);
        Ok(HttpTransport { client, base })
    }

    pub fn url_for(&self, request: &Request) -> Result<Url, Error> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::CannotBeABase {
                url: self.base.to_string(),
            })?
            .pop_if_empty()
            .extend(&request.path);
        if !request.params.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.params);
        }
        Ok(url)
    }
}

impl Transport for HttpTransport {
    fn perform(&self, request: &Request) -> Result<RawResponse, Error> {
        let url = self.url_for(request)?;
        let mut builder = self.client.request(request.method.into(), url.clone());
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, request.content_type())
                .body(body.clone());
        }
        let response = builder.send().context(HttpClient {
            details: format!("{} {}", request.method, url),
        })?;
        let status = response.status().as_u16();
        let body = response.text().context(HttpClient {
            details: format!("cannot read response body from {}", url),
        })?;
        Ok(RawResponse { status, body })
    }
}
