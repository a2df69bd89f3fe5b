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

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::{RequestContext, SqrlTransport};
use crate::{config::SessionConfig, errors::Result};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Transport over https, backed by [`reqwest`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("sqrl-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SqrlTransport for HttpTransport {
    async fn post(&self, ctx: &RequestContext, url: &str, body: String) -> Result<String> {
        debug!("Post sqrl request, url:{url}, body len:{}", body.len());
        let mut req = self
            .client
            .post(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body);
        if let Some(timeout) = ctx.timeout {
            req = req.timeout(timeout);
        }

        let resp = req.send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_server() {
        let transport = HttpTransport::new(&SessionConfig::default()).unwrap();
        let ctx = RequestContext::default().timeout(std::time::Duration::from_secs(2));
        let err = transport
            .post(&ctx, "http://127.0.0.1:1/sqrl?nut=abc", "client=x".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::errors::Error::Transport(_)));
    }
}
