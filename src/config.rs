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

use std::time::Duration;

use crate::{model::IdentitySettings, protocol::RequestOption};

/// How much EnScrypt work to spend when encrypting a block.
///
/// Decryption always replays the iteration count stored in the block, so
/// this only matters when a block is (re-)encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnScryptWork {
    /// Run as many iterations as fit into the duration (at least one).
    Duration(Duration),
    /// Run exactly this many iterations.
    Iterations(u32),
}

/// Config for creating and re-encrypting identities.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The scrypt memory factor, N = 2^scrypt_log_n.
    ///
    /// Default value is 9 (N = 512, 128MB of memory with r = 256).
    pub scrypt_log_n: u8,
    /// Work spent on the password protected block.
    ///
    /// Default value is 5s, matching the default password verify time.
    pub password_work: EnScryptWork,
    /// Work spent on the rescue code protected block.
    ///
    /// Default value is 60s.
    pub rescue_code_work: EnScryptWork,
    /// User settings written into new password blocks.
    pub settings: IdentitySettings,
    /// The max number of previous identities kept after rekeying.
    ///
    /// Default value is 4, which is also the max the S4 format allows.
    pub max_previous_identities: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scrypt_log_n: 9,
            password_work: EnScryptWork::Duration(Duration::from_secs(5)),
            rescue_code_work: EnScryptWork::Duration(Duration::from_secs(60)),
            settings: IdentitySettings::default(),
            max_previous_identities: 4,
        }
    }
}

/// Config for talking to a SQRL server.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for each request.
    ///
    /// Default value is 10s.
    pub request_timeout: Duration,
    /// How many times a command is resent after the server reported a
    /// transient error (usually a stale nut).
    ///
    /// Default value is 1.
    pub max_transient_retries: usize,
    /// Options sent with every request.
    pub options: Vec<RequestOption>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_transient_retries: 1,
            options: Vec::new(),
        }
    }
}
