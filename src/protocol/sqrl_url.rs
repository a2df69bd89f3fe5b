// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use base64::Engine;
use url::Url;

use crate::{
    common::BASE64URL,
    errors::{Error, Result},
};

pub const SQRL_SCHEME: &str = "sqrl";

/// A `sqrl://` login link as presented by a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqrlUrl {
    raw: String,
    host: String,
    port: Option<u16>,
    path: String,
    query: String,
    nut: String,
    domain: String,
    cancel_url: Option<String>,
}

impl SqrlUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let url = Url::parse(raw)?;
        if url.scheme() != SQRL_SCHEME {
            return Err(Error::InvalidUrl(format!(
                "unexpected scheme:{}, expect {SQRL_SCHEME}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidUrl(format!("no host in url:{raw}")))?
            .to_ascii_lowercase();
        let path = url.path().to_string();

        let mut nut = None;
        let mut extension = 0usize;
        let mut cancel_url = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "nut" => nut = Some(value.into_owned()),
                "x" => {
                    extension = value.parse().map_err(|e| {
                        Error::InvalidUrl(format!("invalid path extension x:{value}, err:{e}"))
                    })?
                }
                "can" => {
                    let decoded = BASE64URL.decode(value.as_bytes())?;
                    cancel_url = Some(String::from_utf8_lossy(&decoded).into_owned());
                }
                _ => {}
            }
        }

        let nut = nut
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::InvalidUrl(format!("no nut in url:{raw}")))?;
        let extension = path.get(..extension).ok_or_else(|| {
            Error::InvalidUrl(format!(
                "path extension:{extension} longer than path:{path}"
            ))
        })?;
        let domain = format!("{host}{extension}");

        Ok(Self {
            raw: raw.to_string(),
            host,
            port: url.port(),
            query: url.query().unwrap_or_default().to_string(),
            path,
            nut,
            domain,
            cancel_url,
        })
    }

    /// The domain the site keys are derived for.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn nut(&self) -> &str {
        &self.nut
    }

    pub fn cancel_url(&self) -> Option<&str> {
        self.cancel_url.as_deref()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Where the first request of a session is posted to.
    pub fn query_url(&self) -> String {
        self.url_for_qry(&format!("{}?{}", self.path, self.query))
    }

    /// Resolve the `qry` path of a server response against this site.
    pub fn url_for_qry(&self, qry: &str) -> String {
        match self.port {
            Some(port) => format!("https://{}:{port}{qry}", self.host),
            None => format!("https://{}{qry}", self.host),
        }
    }

    /// The `server` value of the first request.
    pub fn to_server_value(&self) -> String {
        BASE64URL.encode(self.raw.as_bytes())
    }
}
