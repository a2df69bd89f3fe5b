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

//! Client side of the SQRL login protocol.
//!
//! [`SqrlClient`] keeps an identity in the S4 format and unlocks it with a
//! password or the rescue code. [`SqrlSession`] uses the unlocked keys to talk
//! to a site over any [`SqrlTransport`].

pub mod client;
pub mod common;
pub mod config;
pub mod errors;
pub mod model;
pub mod protocol;
pub mod session;
pub mod transport;

pub use crate::{
    client::{S4Format, SqrlClient, UnlockedIdentity},
    config::{ClientConfig, EnScryptWork, SessionConfig},
    errors::{Error, Result, ServerError},
    model::{IdentitySettings, OptionFlags},
    protocol::{ServerResponse, SqrlUrl, Tif},
    session::{SessionBuilder, SqrlSession},
    transport::{HttpTransport, RequestContext, SqrlTransport},
};
