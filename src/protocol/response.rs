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

use std::collections::BTreeMap;

use base64::Engine;

use super::{decode_params, encode_params, request::decode_key, Tif, PROTOCOL_VERSION};
use crate::{
    common::{BASE64URL, KEY_LEN},
    errors::{Error, Result},
};

/// A decoded server reply.
///
/// `raw` is kept verbatim because it is echoed back as the `server` value of
/// the next request and covered by the signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResponse {
    pub raw: String,
    pub ver: String,
    pub nut: String,
    pub tif: Tif,
    pub qry: String,
    pub url: Option<String>,
    pub sin: Option<String>,
    pub suk: Option<[u8; KEY_LEN]>,
    pub ask: Option<String>,
    pub can: Option<String>,
    /// Parameters this client does not interpret.
    pub extra: BTreeMap<String, String>,
}

impl ServerResponse {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let mut params = decode_params(raw)?;
        let mut take = |name: &str| params.remove(name);

        let ver = take("ver").ok_or_else(|| missing("ver"))?;
        if !ver.split(',').any(|v| v == PROTOCOL_VERSION) {
            return Err(Error::Protocol(format!("unsupported version:{ver}")));
        }
        let nut = take("nut").ok_or_else(|| missing("nut"))?;
        let tif = Tif::parse(&take("tif").ok_or_else(|| missing("tif"))?)?;
        let qry = take("qry").ok_or_else(|| missing("qry"))?;
        let url = take("url");
        let sin = take("sin");
        let suk = take("suk").map(|v| decode_key(&v)).transpose()?;
        let ask = take("ask");
        let can = take("can");

        Ok(Self {
            raw: raw.to_string(),
            ver,
            nut,
            tif,
            qry,
            url,
            sin,
            suk,
            ask,
            can,
            extra: params,
        })
    }

    /// Builds and encodes a response, `raw` is filled accordingly.
    pub fn build(nut: impl Into<String>, tif: Tif, qry: impl Into<String>) -> Self {
        let mut resp = Self {
            raw: String::new(),
            ver: PROTOCOL_VERSION.to_string(),
            nut: nut.into(),
            tif,
            qry: qry.into(),
            url: None,
            sin: None,
            suk: None,
            ask: None,
            can: None,
            extra: BTreeMap::new(),
        };
        resp.raw = resp.encode();
        resp
    }

    #[must_use]
    pub fn with_suk(mut self, suk: [u8; KEY_LEN]) -> Self {
        self.suk = Some(suk);
        self.raw = self.encode();
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self.raw = self.encode();
        self
    }

    pub fn encode(&self) -> String {
        let mut params = vec![
            ("ver", self.ver.clone()),
            ("nut", self.nut.clone()),
            ("tif", self.tif.to_string()),
            ("qry", self.qry.clone()),
        ];
        if let Some(url) = &self.url {
            params.push(("url", url.clone()));
        }
        if let Some(sin) = &self.sin {
            params.push(("sin", sin.clone()));
        }
        if let Some(suk) = &self.suk {
            params.push(("suk", BASE64URL.encode(suk)));
        }
        if let Some(ask) = &self.ask {
            params.push(("ask", ask.clone()));
        }
        if let Some(can) = &self.can {
            params.push(("can", can.clone()));
        }
        for (name, value) in &self.extra {
            params.push((name.as_str(), value.clone()));
        }

        BASE64URL.encode(encode_params(&params))
    }
}

fn missing(name: &str) -> Error {
    Error::Protocol(format!("server response misses {name}"))
}
