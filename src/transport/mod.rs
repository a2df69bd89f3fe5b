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

mod http_transport;
mod mock_sqrl_server;

use std::time::Duration;

use async_trait::async_trait;
pub use http_transport::HttpTransport;
pub use mock_sqrl_server::{Association, MockSqrlServer};

use crate::errors::Result;

/// Context for one request.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub timeout: Option<Duration>,
}

impl RequestContext {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Delivers form encoded requests to a SQRL server.
#[async_trait]
pub trait SqrlTransport: Send + Sync {
    /// Posts `body` to `url`, returning the raw (base64url) response body.
    async fn post(&self, ctx: &RequestContext, url: &str, body: String) -> Result<String>;
}

#[async_trait]
impl<T: SqrlTransport + ?Sized> SqrlTransport for std::sync::Arc<T> {
    async fn post(&self, ctx: &RequestContext, url: &str, body: String) -> Result<String> {
        (**self).post(ctx, url, body).await
    }
}
