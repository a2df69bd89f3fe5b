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

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use base64::Engine;
use dashmap::{DashMap, DashSet};
use tracing::debug;

use super::{RequestContext, SqrlTransport};
use crate::{
    common::{self, BASE64URL, KEY_LEN},
    errors::Result,
    protocol::{
        verify_signature, ClientRequest, Command, RequestBody, RequestOption, ServerResponse, Tif,
    },
};

const QRY_PATH: &str = "/sqrl";

/// What a site stores for an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub suk: [u8; KEY_LEN],
    pub vuk: [u8; KEY_LEN],
    pub disabled: bool,
    pub sqrl_only: bool,
    pub hardlock: bool,
}

/// In memory SQRL server used for testing.
///
/// Associations are keyed by the identity key. Every response carries a fresh
/// nut, and a request echoing a server value that was not issued (or was
/// expired with [`MockSqrlServer::expire_nuts`]) gets a transient error.
pub struct MockSqrlServer {
    host: String,
    pub associations: Arc<DashMap<[u8; KEY_LEN], Association>>,
    /// Successful logins per identity key.
    pub logins: Arc<DashMap<[u8; KEY_LEN], usize>>,
    issued: DashSet<String>,
    ip_matched: AtomicBool,
}

impl MockSqrlServer {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            associations: Arc::new(DashMap::new()),
            logins: Arc::new(DashMap::new()),
            issued: DashSet::new(),
            ip_matched: AtomicBool::new(true),
        }
    }

    /// A fresh `sqrl://` link, as a login page would show it.
    pub fn login_url(&self) -> String {
        let url = format!("sqrl://{}{QRY_PATH}?nut={}", self.host, new_nut());
        self.issued.insert(BASE64URL.encode(url.as_bytes()));
        url
    }

    /// Forget every nut handed out so far.
    pub fn expire_nuts(&self) {
        self.issued.clear();
    }

    pub fn set_ip_matched(&self, matched: bool) {
        self.ip_matched.store(matched, Ordering::Relaxed);
    }

    pub fn login_count(&self, idk: &[u8; KEY_LEN]) -> usize {
        self.logins.get(idk).map(|v| *v).unwrap_or_default()
    }

    fn respond(&self, tif: Tif, suk: Option<[u8; KEY_LEN]>, logged_in: bool) -> String {
        let nut = new_nut();
        let mut resp = ServerResponse::build(nut.clone(), tif, format!("{QRY_PATH}?nut={nut}"));
        if let Some(suk) = suk {
            resp = resp.with_suk(suk);
        }
        if logged_in {
            resp = resp.with_url(format!("https://{}/account", self.host));
        }
        self.issued.insert(resp.raw.clone());
        resp.raw
    }

    fn process(&self, body: &RequestBody) -> String {
        let failure = Tif::COMMAND_FAILED | Tif::CLIENT_FAILURE;
        let req = match ClientRequest::decode(&body.client) {
            Ok(v) => v,
            Err(e) => {
                debug!("Mock server rejects client, err:{e}");
                return self.respond(failure, None, false);
            }
        };

        let message = body.signed_message();
        if verify_signature(&req.idk, &message, &body.ids).is_err() {
            return self.respond(failure, None, false);
        }
        let pidk = match (req.pidk, &body.pids) {
            (Some(pidk), Some(pids)) if verify_signature(&pidk, &message, pids).is_ok() => {
                Some(pidk)
            }
            (None, None) => None,
            _ => return self.respond(failure, None, false),
        };

        if self.issued.remove(&body.server).is_none() {
            return self.respond(Tif::TRANSIENT_ERROR | Tif::COMMAND_FAILED, None, false);
        }

        let mut tif = Tif::empty();
        if self.ip_matched.load(Ordering::Relaxed) {
            tif |= Tif::IP_MATCHED;
        }
        let current = self.associations.get(&req.idk).map(|v| v.value().clone());
        let previous = match (&current, pidk) {
            (None, Some(pidk)) => self.associations.get(&pidk).map(|v| v.value().clone()),
            _ => None,
        };

        match (&current, &previous) {
            (Some(assoc), _) => {
                tif |= Tif::CURRENT_ID_MATCH;
                if assoc.disabled {
                    tif |= Tif::SQRL_DISABLED;
                }
            }
            (None, Some(assoc)) => {
                tif |= Tif::PREVIOUS_ID_MATCH;
                if assoc.disabled {
                    tif |= Tif::SQRL_DISABLED;
                }
            }
            (None, None) => {}
        }
        let known = current.as_ref().or(previous.as_ref());

        match req.command {
            Command::Query => {
                let send_suk = known.filter(|assoc| {
                    assoc.disabled || previous.is_some() || req.has_option(RequestOption::Suk)
                });
                self.respond(tif, send_suk.map(|assoc| assoc.suk), false)
            }
            Command::Ident => {
                if known.is_some_and(|assoc| assoc.disabled) {
                    return self.respond(tif | Tif::COMMAND_FAILED, None, false);
                }
                let sqrl_only = req.has_option(RequestOption::SqrlOnly);
                let hardlock = req.has_option(RequestOption::HardLock);

                if let Some(mut assoc) = current {
                    assoc.sqrl_only = sqrl_only;
                    assoc.hardlock = hardlock;
                    self.associations.insert(req.idk, assoc);
                } else {
                    let (Some(suk), Some(vuk)) = (req.suk, req.vuk) else {
                        return self.respond(tif | failure, None, false);
                    };
                    if let Some(pidk) = pidk.filter(|_| previous.is_some()) {
                        self.associations.remove(&pidk);
                        tif = Tif(tif.bits() & !Tif::PREVIOUS_ID_MATCH.bits());
                    }
                    self.associations.insert(
                        req.idk,
                        Association {
                            suk,
                            vuk,
                            disabled: false,
                            sqrl_only,
                            hardlock,
                        },
                    );
                    tif |= Tif::CURRENT_ID_MATCH;
                }

                *self.logins.entry(req.idk).or_default() += 1;
                self.respond(tif, None, true)
            }
            Command::Disable => match self.associations.get_mut(&req.idk) {
                Some(mut assoc) => {
                    assoc.disabled = true;
                    self.respond(tif | Tif::SQRL_DISABLED, None, false)
                }
                None => self.respond(tif | Tif::COMMAND_FAILED, None, false),
            },
            Command::Enable | Command::Remove => {
                let Some(assoc) = current else {
                    return self.respond(tif | Tif::COMMAND_FAILED, None, false);
                };
                let unlocked = body
                    .urs
                    .as_deref()
                    .is_some_and(|urs| verify_signature(&assoc.vuk, &message, urs).is_ok());
                if !unlocked {
                    return self.respond(tif | Tif::COMMAND_FAILED, None, false);
                }

                let cleared = Tif::SQRL_DISABLED.bits();
                if req.command == Command::Enable {
                    if let Some(mut assoc) = self.associations.get_mut(&req.idk) {
                        assoc.disabled = false;
                    }
                    self.respond(Tif(tif.bits() & !cleared), None, false)
                } else {
                    self.associations.remove(&req.idk);
                    let cleared = cleared | Tif::CURRENT_ID_MATCH.bits();
                    self.respond(Tif(tif.bits() & !cleared), None, false)
                }
            }
        }
    }
}

#[async_trait]
impl SqrlTransport for MockSqrlServer {
    async fn post(&self, _ctx: &RequestContext, url: &str, body: String) -> Result<String> {
        debug!("Mock server receives request, url:{url}");
        let body = match RequestBody::from_form(&body) {
            Ok(v) => v,
            Err(_) => {
                let tif = Tif::COMMAND_FAILED | Tif::CLIENT_FAILURE;
                return Ok(self.respond(tif, None, false));
            }
        };
        Ok(self.process(&body))
    }
}

fn new_nut() -> String {
    BASE64URL.encode(common::random_bytes::<12>())
}
