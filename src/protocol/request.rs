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

use std::{collections::BTreeMap, fmt, str::FromStr};

use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use url::form_urlencoded;

use super::{decode_params, encode_params, PROTOCOL_VERSION};
use crate::{
    common::{BASE64URL, KEY_LEN},
    errors::{Error, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Ask whether the site knows the identity, changes nothing.
    Query,
    /// Log in, creating the association when needed.
    Ident,
    /// Block SQRL logins until re-enabled with the rescue code.
    Disable,
    Enable,
    Remove,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Query => "query",
            Command::Ident => "ident",
            Command::Disable => "disable",
            Command::Enable => "enable",
            Command::Remove => "remove",
        }
    }

    /// Whether the request must carry an unlock request signature.
    pub fn needs_unlock(&self) -> bool {
        matches!(self, Command::Enable | Command::Remove)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let cmd = match s {
            "query" => Command::Query,
            "ident" => Command::Ident,
            "disable" => Command::Disable,
            "enable" => Command::Enable,
            "remove" => Command::Remove,
            _ => return Err(Error::Protocol(format!("unknown command:{s}"))),
        };
        Ok(cmd)
    }
}

/// Options sent in the `opt` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestOption {
    /// Don't compare the request ip with the one that fetched the url.
    NoIpTest,
    /// Only allow SQRL logins for this account.
    SqrlOnly,
    /// Don't allow identity recovery by other means.
    HardLock,
    /// The client supports client provided session.
    Cps,
    /// Ask the server to return the stored SUK.
    Suk,
}

impl RequestOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOption::NoIpTest => "noiptest",
            RequestOption::SqrlOnly => "sqrlonly",
            RequestOption::HardLock => "hardlock",
            RequestOption::Cps => "cps",
            RequestOption::Suk => "suk",
        }
    }
}

impl FromStr for RequestOption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let opt = match s {
            "noiptest" => RequestOption::NoIpTest,
            "sqrlonly" => RequestOption::SqrlOnly,
            "hardlock" => RequestOption::HardLock,
            "cps" => RequestOption::Cps,
            "suk" => RequestOption::Suk,
            _ => return Err(Error::Protocol(format!("unknown option:{s}"))),
        };
        Ok(opt)
    }
}

/// The `client` parameter of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    pub command: Command,
    pub idk: [u8; KEY_LEN],
    pub pidk: Option<[u8; KEY_LEN]>,
    pub suk: Option<[u8; KEY_LEN]>,
    pub vuk: Option<[u8; KEY_LEN]>,
    pub options: Vec<RequestOption>,
    pub ins: Option<String>,
    pub pins: Option<String>,
    pub btn: Option<u8>,
}

impl ClientRequest {
    pub fn new(command: Command, idk: [u8; KEY_LEN]) -> Self {
        Self {
            command,
            idk,
            pidk: None,
            suk: None,
            vuk: None,
            options: Vec::new(),
            ins: None,
            pins: None,
            btn: None,
        }
    }

    pub fn has_option(&self, option: RequestOption) -> bool {
        self.options.contains(&option)
    }

    /// base64url of the CRLF separated parameters.
    pub fn encode(&self) -> String {
        let mut params = vec![
            ("ver", PROTOCOL_VERSION.to_string()),
            ("cmd", self.command.to_string()),
            ("idk", BASE64URL.encode(self.idk)),
        ];
        if let Some(pidk) = &self.pidk {
            params.push(("pidk", BASE64URL.encode(pidk)));
        }
        if let Some(suk) = &self.suk {
            params.push(("suk", BASE64URL.encode(suk)));
        }
        if let Some(vuk) = &self.vuk {
            params.push(("vuk", BASE64URL.encode(vuk)));
        }
        if !self.options.is_empty() {
            let opt: Vec<&str> = self.options.iter().map(|o| o.as_str()).collect();
            params.push(("opt", opt.join("~")));
        }
        if let Some(ins) = &self.ins {
            params.push(("ins", ins.clone()));
        }
        if let Some(pins) = &self.pins {
            params.push(("pins", pins.clone()));
        }
        if let Some(btn) = self.btn {
            params.push(("btn", btn.to_string()));
        }

        BASE64URL.encode(encode_params(&params))
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let params = decode_params(encoded)?;
        let ver = required(&params, "ver")?;
        if !ver.split(',').any(|v| v == PROTOCOL_VERSION) {
            return Err(Error::Protocol(format!("unsupported version:{ver}")));
        }

        let options = match params.get("opt") {
            Some(opt) => opt
                .split('~')
                .filter(|o| !o.is_empty())
                .map(RequestOption::from_str)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        let btn = params
            .get("btn")
            .map(|b| {
                b.parse::<u8>()
                    .map_err(|e| Error::Protocol(format!("invalid btn:{b}, err:{e}")))
            })
            .transpose()?;

        Ok(Self {
            command: required(&params, "cmd")?.parse()?,
            idk: decode_key(required(&params, "idk")?)?,
            pidk: params.get("pidk").map(|v| decode_key(v)).transpose()?,
            suk: params.get("suk").map(|v| decode_key(v)).transpose()?,
            vuk: params.get("vuk").map(|v| decode_key(v)).transpose()?,
            options,
            ins: params.get("ins").cloned(),
            pins: params.get("pins").cloned(),
            btn,
        })
    }
}

/// The form posted to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    pub client: String,
    pub server: String,
    pub ids: String,
    pub pids: Option<String>,
    pub urs: Option<String>,
}

impl RequestBody {
    /// Signs `client || server` with the site key and, when given, the
    /// previous site key and the unlock request signing key.
    pub fn sign(
        client: String,
        server: String,
        site_key: &SigningKey,
        previous_site_key: Option<&SigningKey>,
        unlock_request_key: Option<&SigningKey>,
    ) -> Self {
        let message = format!("{client}{server}");
        let sign = |key: &SigningKey| BASE64URL.encode(key.sign(message.as_bytes()).to_bytes());
        Self {
            ids: sign(site_key),
            pids: previous_site_key.map(sign),
            urs: unlock_request_key.map(sign),
            client,
            server,
        }
    }

    pub fn signed_message(&self) -> String {
        format!("{}{}", self.client, self.server)
    }

    pub fn to_form(&self) -> String {
        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("client", &self.client);
        form.append_pair("server", &self.server);
        form.append_pair("ids", &self.ids);
        if let Some(pids) = &self.pids {
            form.append_pair("pids", pids);
        }
        if let Some(urs) = &self.urs {
            form.append_pair("urs", urs);
        }
        form.finish()
    }

    pub fn from_form(form: &str) -> Result<Self> {
        let pairs: BTreeMap<String, String> = form_urlencoded::parse(form.as_bytes())
            .into_owned()
            .collect();
        Ok(Self {
            client: required(&pairs, "client")?.to_string(),
            server: required(&pairs, "server")?.to_string(),
            ids: required(&pairs, "ids")?.to_string(),
            pids: pairs.get("pids").cloned(),
            urs: pairs.get("urs").cloned(),
        })
    }
}

/// Checks a base64url encoded signature over `message`.
pub fn verify_signature(key: &[u8; KEY_LEN], message: &str, signature: &str) -> Result<()> {
    let key = VerifyingKey::from_bytes(key)
        .map_err(|e| Error::Protocol(format!("invalid public key, err:{e}")))?;
    let signature: [u8; 64] = BASE64URL.decode(signature)?.as_slice().try_into()?;
    key.verify(message.as_bytes(), &Signature::from_bytes(&signature))
        .map_err(|e| Error::Protocol(format!("bad signature, err:{e}")))
}

fn required<'a>(params: &'a BTreeMap<String, String>, name: &str) -> Result<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::Protocol(format!("missing parameter:{name}")))
}

pub(crate) fn decode_key(value: &str) -> Result<[u8; KEY_LEN]> {
    Ok(BASE64URL.decode(value)?.as_slice().try_into()?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::random_key;

    #[test]
    fn test_encode_decode_client() {
        let mut req = ClientRequest::new(Command::Ident, [1u8; KEY_LEN]);
        req.suk = Some([2u8; KEY_LEN]);
        req.vuk = Some([3u8; KEY_LEN]);
        req.options = vec![RequestOption::SqrlOnly, RequestOption::Suk];

        let encoded = req.encode();
        let text = String::from_utf8(BASE64URL.decode(&encoded).unwrap()).unwrap();
        assert!(text.starts_with("ver=1\r\ncmd=ident\r\nidk="));
        assert!(text.contains("opt=sqrlonly~suk\r\n"));
        assert!(text.ends_with("\r\n"));

        let decoded = ClientRequest::decode(&encoded).unwrap();
        assert_eq!(decoded, req);
        assert!(decoded.has_option(RequestOption::Suk));
        assert!(!decoded.has_option(RequestOption::HardLock));
    }

    #[test]
    fn test_decode_rejects_bad_requests() {
        let no_cmd = BASE64URL.encode("ver=1\r\nidk=AAAA\r\n");
        assert!(matches!(ClientRequest::decode(&no_cmd), Err(Error::Protocol(_))));

        let bad_ver = BASE64URL.encode("ver=2\r\ncmd=query\r\n");
        assert!(ClientRequest::decode(&bad_ver).is_err());

        let bad_cmd = BASE64URL.encode(format!(
            "ver=1\r\ncmd=jump\r\nidk={}\r\n",
            BASE64URL.encode([0u8; 32])
        ));
        assert!(ClientRequest::decode(&bad_cmd).is_err());
    }

    #[test]
    fn test_signed_body() {
        let site_key = SigningKey::from_bytes(&random_key());
        let previous_key = SigningKey::from_bytes(&random_key());
        let body = RequestBody::sign(
            "client".to_string(),
            "server".to_string(),
            &site_key,
            Some(&previous_key),
            None,
        );
        assert!(body.urs.is_none());

        let message = body.signed_message();
        assert_eq!(message, "clientserver");
        verify_signature(&site_key.verifying_key().to_bytes(), &message, &body.ids).unwrap();
        verify_signature(
            &previous_key.verifying_key().to_bytes(),
            &message,
            body.pids.as_ref().unwrap(),
        )
        .unwrap();
        assert!(
            verify_signature(&previous_key.verifying_key().to_bytes(), &message, &body.ids)
                .is_err()
        );

        let parsed = RequestBody::from_form(&body.to_form()).unwrap();
        assert_eq!(parsed, body);
    }

    #[test]
    fn test_commands() {
        for cmd in [
            Command::Query,
            Command::Ident,
            Command::Disable,
            Command::Enable,
            Command::Remove,
        ] {
            assert_eq!(cmd.as_str().parse::<Command>().unwrap(), cmd);
        }
        assert!(Command::Remove.needs_unlock());
        assert!(!Command::Disable.needs_unlock());
    }
}
