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

//! A login conversation with one site.

use ed25519_dalek::SigningKey;
use tracing::{debug, info, warn};

use crate::{
    client::UnlockedIdentity,
    common::KEY_LEN,
    config::SessionConfig,
    errors::{Error, Result, ServerError},
    protocol::{ClientRequest, Command, RequestBody, RequestOption, ServerResponse, SqrlUrl, Tif},
    transport::{RequestContext, SqrlTransport},
};

/// Builder for [`SqrlSession`].
pub struct SessionBuilder {
    url: String,
    config: SessionConfig,
}

impl SessionBuilder {
    /// `url` is the `sqrl://` link shown by the site.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            config: SessionConfig::default(),
        }
    }

    #[inline]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build<T: SqrlTransport>(self, transport: T) -> Result<SqrlSession<T>> {
        let url = SqrlUrl::parse(&self.url)?;
        Ok(SqrlSession::new(url, transport, self.config))
    }
}

/// Tracks the nut chain of a conversation.
///
/// Every request echoes the previous server reply and is posted to the path
/// that reply named, so commands must be issued in order. `query` has to come
/// first, the other commands act on what it found out.
pub struct SqrlSession<T: SqrlTransport> {
    transport: T,
    config: SessionConfig,
    url: SqrlUrl,
    server: String,
    next_url: String,
    last_response: Option<ServerResponse>,
    /// Site state from the last successful query or command. Cleared when a
    /// query starts, so a failed query leaves nothing to act on.
    known_state: Option<Tif>,
    /// Index of the previous identity the site knows, set by `query`.
    previous_match: Option<usize>,
}

impl<T: SqrlTransport> SqrlSession<T> {
    pub fn new(url: SqrlUrl, transport: T, config: SessionConfig) -> Self {
        Self {
            server: url.to_server_value(),
            next_url: url.query_url(),
            transport,
            config,
            url,
            last_response: None,
            known_state: None,
            previous_match: None,
        }
    }

    pub fn url(&self) -> &SqrlUrl {
        &self.url
    }

    pub fn last_response(&self) -> Option<&ServerResponse> {
        self.last_response.as_ref()
    }

    /// The SUK the site returned last, needed to build the unlock request
    /// signing key.
    pub fn server_unlock_key(&self) -> Option<[u8; KEY_LEN]> {
        self.last_response.as_ref().and_then(|resp| resp.suk)
    }

    /// Asks whether the site knows the identity or one of its previous
    /// identities.
    pub async fn query(&mut self, identity: &UnlockedIdentity) -> Result<ServerResponse> {
        self.query_with(identity, &[]).await
    }

    /// Queries with the `suk` option and returns the stored SUK.
    pub async fn fetch_server_unlock_key(
        &mut self,
        identity: &UnlockedIdentity,
    ) -> Result<[u8; KEY_LEN]> {
        let resp = self.query_with(identity, &[RequestOption::Suk]).await?;
        resp.suk
            .ok_or_else(|| Error::Protocol("server did not return the suk".to_string()))
    }

    /// Logs in.
    ///
    /// A site that knows neither the identity nor a previous one gets a new
    /// association. A site that knows a previous identity has it replaced.
    pub async fn ident(&mut self, identity: &UnlockedIdentity) -> Result<ServerResponse> {
        let tif = self.queried()?;
        if tif.is_disabled() {
            return Err(Error::Client(
                "sqrl is disabled for this site, enable it with the rescue code".to_string(),
            ));
        }

        let domain = self.url.domain().to_string();
        let site_key = identity.site_key(&domain)?;
        let mut request = self.request(Command::Ident, &site_key);
        let previous = identity.previous_site_keys(&domain)?;
        let mut previous_key = None;

        if !tif.is_current_id_match() {
            if let Some(key) = self.previous_match.and_then(|i| previous.get(i)) {
                request.pidk = Some(key.verifying_key().to_bytes());
                previous_key = Some(key);
            }
            let (suk, vuk) = identity.generate_server_unlock_keys();
            request.suk = Some(suk);
            request.vuk = Some(vuk);
        }

        let resp = self.send(&request, &site_key, previous_key, None).await?;
        self.known_state = Some(resp.tif);
        self.previous_match = None;
        info!("Sqrl login succeeded, domain:{domain}");
        Ok(resp)
    }

    pub async fn disable(&mut self, identity: &UnlockedIdentity) -> Result<ServerResponse> {
        if !self.queried()?.is_current_id_match() {
            return Err(unknown_identity());
        }
        let site_key = identity.site_key(self.url.domain())?;
        let request = self.request(Command::Disable, &site_key);
        let resp = self.send(&request, &site_key, None, None).await?;
        self.known_state = Some(resp.tif);
        Ok(resp)
    }

    /// `unlock_request_key` comes from
    /// [`SqrlClient::unlock_request_signing_key`](crate::SqrlClient::unlock_request_signing_key).
    pub async fn enable(
        &mut self,
        identity: &UnlockedIdentity,
        unlock_request_key: &SigningKey,
    ) -> Result<ServerResponse> {
        self.unlock_command(Command::Enable, identity, unlock_request_key)
            .await
    }

    /// Deletes the association, the site forgets the identity.
    pub async fn remove(
        &mut self,
        identity: &UnlockedIdentity,
        unlock_request_key: &SigningKey,
    ) -> Result<ServerResponse> {
        self.unlock_command(Command::Remove, identity, unlock_request_key)
            .await
    }

    async fn unlock_command(
        &mut self,
        command: Command,
        identity: &UnlockedIdentity,
        unlock_request_key: &SigningKey,
    ) -> Result<ServerResponse> {
        if !self.queried()?.is_current_id_match() {
            return Err(unknown_identity());
        }
        let site_key = identity.site_key(self.url.domain())?;
        let request = self.request(command, &site_key);
        let resp = self
            .send(&request, &site_key, None, Some(unlock_request_key))
            .await?;
        self.known_state = Some(resp.tif);
        Ok(resp)
    }

    async fn query_with(
        &mut self,
        identity: &UnlockedIdentity,
        options: &[RequestOption],
    ) -> Result<ServerResponse> {
        self.known_state = None;
        self.previous_match = None;
        let resp = self.send_query(identity, options).await?;
        self.known_state = Some(resp.tif);
        Ok(resp)
    }

    async fn send_query(
        &mut self,
        identity: &UnlockedIdentity,
        options: &[RequestOption],
    ) -> Result<ServerResponse> {
        let domain = self.url.domain().to_string();
        let site_key = identity.site_key(&domain)?;
        let previous = identity.previous_site_keys(&domain)?;
        let mut request = self.request(Command::Query, &site_key);
        for option in options {
            if !request.has_option(*option) {
                request.options.push(*option);
            }
        }

        if previous.is_empty() {
            return self.send(&request, &site_key, None, None).await;
        }

        // One query per previous identity until the site recognizes one.
        let mut last = None;
        for (i, key) in previous.iter().enumerate() {
            request.pidk = Some(key.verifying_key().to_bytes());
            let resp = self.send(&request, &site_key, Some(key), None).await?;
            if resp.tif.is_current_id_match() {
                return Ok(resp);
            }
            if resp.tif.is_previous_id_match() {
                debug!("Site knows previous identity, index:{i}");
                self.previous_match = Some(i);
                return Ok(resp);
            }
            last = Some(resp);
        }
        last.ok_or_else(|| Error::Client("no query has been sent".to_string()))
    }

    fn queried(&self) -> Result<Tif> {
        self.known_state
            .ok_or_else(|| Error::Client("query the site before other commands".to_string()))
    }

    fn request(&self, command: Command, site_key: &SigningKey) -> ClientRequest {
        let mut request = ClientRequest::new(command, site_key.verifying_key().to_bytes());
        request.options = self.config.options.clone();
        request
    }

    /// Posts one command, following the nut chain and resending after
    /// transient errors.
    async fn send(
        &mut self,
        request: &ClientRequest,
        site_key: &SigningKey,
        previous_key: Option<&SigningKey>,
        unlock_request_key: Option<&SigningKey>,
    ) -> Result<ServerResponse> {
        let client = request.encode();
        let timeout = self.config.request_timeout;
        let mut retries = 0;

        loop {
            let body = RequestBody::sign(
                client.clone(),
                self.server.clone(),
                site_key,
                previous_key,
                unlock_request_key,
            );
            let ctx = RequestContext::default().timeout(timeout);
            let raw = tokio::time::timeout(
                timeout,
                self.transport.post(&ctx, &self.next_url, body.to_form()),
            )
            .await
            .map_err(|_| Error::Transport(format!("request to {} timed out", self.next_url)))??;

            let resp = ServerResponse::parse(&raw)?;
            self.server = resp.raw.clone();
            self.next_url = self.url.url_for_qry(&resp.qry);
            self.last_response = Some(resp.clone());
            debug!(
                "Sqrl command done, cmd:{}, tif:{}",
                request.command, resp.tif
            );

            if !resp.tif.is_command_failed() {
                return Ok(resp);
            }
            if resp.tif.is_transient_error() && retries < self.config.max_transient_retries {
                retries += 1;
                warn!(
                    "Sqrl command hit a transient error, retry:{retries}, cmd:{}",
                    request.command
                );
                continue;
            }
            return Err(Error::Server(ServerError {
                tif: resp.tif,
                msg: resp.tif.failure_reason().to_string(),
            }));
        }
    }
}

fn unknown_identity() -> Error {
    Error::Client("identity is not associated with this site".to_string())
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        client::SqrlClient,
        common::TEST_LOG_N,
        config::{ClientConfig, EnScryptWork},
        transport::MockSqrlServer,
    };

    const HOST: &str = "example.com";

    fn new_client() -> (SqrlClient, String) {
        let config = ClientConfig {
            scrypt_log_n: TEST_LOG_N,
            password_work: EnScryptWork::Iterations(1),
            rescue_code_work: EnScryptWork::Iterations(1),
            ..Default::default()
        };
        let (client, rescue_code) = SqrlClient::new("pw", config).unwrap();
        (client, rescue_code.to_string())
    }

    fn new_session(server: &Arc<MockSqrlServer>) -> SqrlSession<Arc<MockSqrlServer>> {
        SessionBuilder::new(server.login_url())
            .build(server.clone())
            .unwrap()
    }

    /// Never answers in time.
    struct StalledTransport;

    #[async_trait]
    impl SqrlTransport for StalledTransport {
        async fn post(&self, _ctx: &RequestContext, _url: &str, _body: String) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    /// Answers every request with the same reply.
    struct FixedTransport(String);

    #[async_trait]
    impl SqrlTransport for FixedTransport {
        async fn post(&self, _ctx: &RequestContext, _url: &str, _body: String) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    async fn login(server: &Arc<MockSqrlServer>, identity: &UnlockedIdentity) -> ServerResponse {
        let mut session = new_session(server);
        session.query(identity).await.unwrap();
        session.ident(identity).await.unwrap()
    }

    #[tokio::test]
    async fn test_first_login_creates_association() {
        let server = Arc::new(MockSqrlServer::new(HOST));
        let (client, _) = new_client();
        let identity = client.unlock("pw").unwrap();
        let idk = identity.site_public_key(HOST).unwrap();

        let mut session = new_session(&server);
        let resp = session.query(&identity).await.unwrap();
        assert!(!resp.tif.is_current_id_match());
        assert!(resp.tif.contains(Tif::IP_MATCHED));

        let resp = session.ident(&identity).await.unwrap();
        assert!(resp.tif.is_current_id_match());
        assert_eq!(resp.url.as_deref(), Some("https://example.com/account"));
        assert_eq!(server.login_count(&idk), 1);
        assert!(server.associations.contains_key(&idk));

        // The second login reuses the association.
        let resp = login(&server, &identity).await;
        assert!(resp.tif.is_current_id_match());
        assert_eq!(server.login_count(&idk), 2);
        assert_eq!(server.associations.len(), 1);
    }

    #[tokio::test]
    async fn test_commands_need_query() {
        let server = Arc::new(MockSqrlServer::new(HOST));
        let (client, _) = new_client();
        let identity = client.unlock("pw").unwrap();

        let mut session = new_session(&server);
        assert!(matches!(
            session.ident(&identity).await,
            Err(Error::Client(_))
        ));
        session.query(&identity).await.unwrap();
        assert!(matches!(
            session.disable(&identity).await,
            Err(Error::Client(_))
        ));
    }

    #[tokio::test]
    async fn test_disable_then_enable() {
        let server = Arc::new(MockSqrlServer::new(HOST));
        let (client, rescue_code) = new_client();
        let identity = client.unlock("pw").unwrap();
        login(&server, &identity).await;

        let mut session = new_session(&server);
        session.query(&identity).await.unwrap();
        let resp = session.disable(&identity).await.unwrap();
        assert!(resp.tif.is_disabled());

        // A disabled site refuses logins and hands out the suk.
        let mut session = new_session(&server);
        let resp = session.query(&identity).await.unwrap();
        assert!(resp.tif.is_disabled());
        let suk = session.server_unlock_key().unwrap();
        assert!(matches!(
            session.ident(&identity).await,
            Err(Error::Client(_))
        ));

        // A key derived from a wrong suk is rejected.
        let wrong = client
            .unlock_request_signing_key(&rescue_code, &[7u8; KEY_LEN])
            .unwrap();
        let err = session.enable(&identity, &wrong).await.unwrap_err();
        assert!(matches!(err, Error::Server(ref e) if e.tif.is_command_failed()));

        let mut session = new_session(&server);
        session.query(&identity).await.unwrap();
        let ursk = client
            .unlock_request_signing_key(&rescue_code, &suk)
            .unwrap();
        let resp = session.enable(&identity, &ursk).await.unwrap();
        assert!(!resp.tif.is_disabled());

        let resp = login(&server, &identity).await;
        assert!(resp.tif.is_current_id_match());
    }

    #[tokio::test]
    async fn test_remove_association() {
        let server = Arc::new(MockSqrlServer::new(HOST));
        let (client, rescue_code) = new_client();
        let identity = client.unlock("pw").unwrap();
        let idk = identity.site_public_key(HOST).unwrap();
        login(&server, &identity).await;

        let mut session = new_session(&server);
        let suk = session.fetch_server_unlock_key(&identity).await.unwrap();
        let ursk = client
            .unlock_request_signing_key(&rescue_code, &suk)
            .unwrap();
        let resp = session.remove(&identity, &ursk).await.unwrap();
        assert!(!resp.tif.is_current_id_match());
        assert!(!server.associations.contains_key(&idk));
    }

    #[tokio::test]
    async fn test_login_after_rekey_replaces_previous_identity() {
        let server = Arc::new(MockSqrlServer::new(HOST));
        let (mut client, rescue_code) = new_client();
        let old_idk = {
            let identity = client.unlock("pw").unwrap();
            login(&server, &identity).await;
            identity.site_public_key(HOST).unwrap()
        };

        client.rekey_identity(&rescue_code, "pw2").unwrap();
        let identity = client.unlock("pw2").unwrap();
        let new_idk = identity.site_public_key(HOST).unwrap();
        assert_ne!(new_idk, old_idk);

        let mut session = new_session(&server);
        let resp = session.query(&identity).await.unwrap();
        assert!(resp.tif.is_previous_id_match());
        assert!(resp.suk.is_some());

        let resp = session.ident(&identity).await.unwrap();
        assert!(resp.tif.is_current_id_match());
        assert!(!resp.tif.is_previous_id_match());
        assert!(server.associations.contains_key(&new_idk));
        assert!(!server.associations.contains_key(&old_idk));
    }

    #[tokio::test]
    async fn test_retry_after_transient_error() {
        let server = Arc::new(MockSqrlServer::new(HOST));
        let (client, _) = new_client();
        let identity = client.unlock("pw").unwrap();

        let mut session = new_session(&server);
        server.expire_nuts();
        let resp = session.query(&identity).await.unwrap();
        assert!(!resp.tif.is_command_failed());

        let config = SessionConfig {
            max_transient_retries: 0,
            ..Default::default()
        };
        let mut session = SessionBuilder::new(server.login_url())
            .config(config)
            .build(server.clone())
            .unwrap();
        server.expire_nuts();
        let err = session.query(&identity).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_options_are_sent() {
        let server = Arc::new(MockSqrlServer::new(HOST));
        let (client, _) = new_client();
        let identity = client.unlock("pw").unwrap();
        let idk = identity.site_public_key(HOST).unwrap();

        let config = SessionConfig {
            options: vec![RequestOption::SqrlOnly, RequestOption::HardLock],
            ..Default::default()
        };
        let mut session = SessionBuilder::new(server.login_url())
            .config(config)
            .build(server.clone())
            .unwrap();
        session.query(&identity).await.unwrap();
        session.ident(&identity).await.unwrap();

        let assoc = server.associations.get(&idk).unwrap().clone();
        assert!(assoc.sqrl_only);
        assert!(assoc.hardlock);
    }

    #[test]
    fn test_builder_rejects_bad_url() {
        let server = MockSqrlServer::new(HOST);
        assert!(matches!(
            SessionBuilder::new("https://example.com/sqrl?nut=1").build(server),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let (client, _) = new_client();
        let identity = client.unlock("pw").unwrap();
        let config = SessionConfig {
            request_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let mut session = SessionBuilder::new("sqrl://example.com/sqrl?nut=abc")
            .config(config)
            .build(StalledTransport)
            .unwrap();

        assert!(matches!(
            session.query(&identity).await,
            Err(Error::Transport(_))
        ));
        assert!(session.last_response().is_none());
    }

    #[tokio::test]
    async fn test_failed_query_blocks_commands() {
        let (client, _) = new_client();
        let identity = client.unlock("pw").unwrap();
        let failed = ServerResponse::build("n", Tif::COMMAND_FAILED, "/sqrl?nut=n");
        let mut session = SessionBuilder::new("sqrl://example.com/sqrl?nut=abc")
            .build(FixedTransport(failed.raw))
            .unwrap();

        assert!(matches!(
            session.query(&identity).await,
            Err(Error::Server(_))
        ));
        // The failed reply is kept for inspection but is not a query result.
        assert!(session.last_response().is_some());
        assert!(matches!(
            session.ident(&identity).await,
            Err(Error::Client(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_query_forgets_earlier_state() {
        let server = Arc::new(MockSqrlServer::new(HOST));
        let (client, _) = new_client();
        let identity = client.unlock("pw").unwrap();
        login(&server, &identity).await;

        let config = SessionConfig {
            max_transient_retries: 0,
            ..Default::default()
        };
        let mut session = SessionBuilder::new(server.login_url())
            .config(config)
            .build(server.clone())
            .unwrap();
        session.query(&identity).await.unwrap();
        server.expire_nuts();
        assert!(session.query(&identity).await.is_err());
        assert!(matches!(
            session.disable(&identity).await,
            Err(Error::Client(_))
        ));
    }
}
