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

//! SQRL client/server messages.

mod request;
mod response;
mod sqrl_url;
mod tif;

use std::collections::BTreeMap;

use base64::Engine;
pub use request::{verify_signature, ClientRequest, Command, RequestBody, RequestOption};
pub use response::ServerResponse;
pub use sqrl_url::{SqrlUrl, SQRL_SCHEME};
pub use tif::Tif;

use crate::{
    common::BASE64URL,
    errors::{Error, Result},
};

pub const PROTOCOL_VERSION: &str = "1";

/// `name=value` lines, each terminated by CRLF.
fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{name}={value}\r\n"))
        .collect()
}

/// Decodes a base64url blob of CRLF separated `name=value` lines.
fn decode_params(encoded: &str) -> Result<BTreeMap<String, String>> {
    let decoded = BASE64URL.decode(encoded.trim())?;
    let text = String::from_utf8(decoded)
        .map_err(|e| Error::Protocol(format!("parameters are not utf8, err:{e}")))?;

    let mut params = BTreeMap::new();
    for line in text.split("\r\n").filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once('=')
            .ok_or_else(|| Error::Protocol(format!("malformed parameter line:{line}")))?;
        params.insert(name.to_string(), value.to_string());
    }
    Ok(params)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_params() {
        let text = encode_params(&[("ver", "1".to_string()), ("qry", "/a?b=c".to_string())]);
        assert_eq!(text, "ver=1\r\nqry=/a?b=c\r\n");

        let params = decode_params(&BASE64URL.encode(&text)).unwrap();
        assert_eq!(params.len(), 2);
        // Only the first '=' separates name and value.
        assert_eq!(params["qry"], "/a?b=c");

        assert!(decode_params(&BASE64URL.encode("novalue\r\n")).is_err());
    }
}
