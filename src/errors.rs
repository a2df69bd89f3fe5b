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

use std::array::TryFromSliceError;

use thiserror::Error;

use crate::protocol::Tif;

#[derive(Debug, Error)]
pub enum Error {
    /// Error from reading or writing identity files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The S4 data is truncated, malformed or has an unexpected layout.
    #[error("invalid identity data: {0}")]
    InvalidData(String),
    /// AES-GCM authentication failed.
    ///
    /// Nearly always caused by a wrong password or rescue code, the message
    /// is meant to be shown to the user as is.
    #[error("{0}")]
    DecryptionFailed(String),
    /// Error from the underlying crypto primitives.
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("invalid rescue code: {0}")]
    InvalidRescueCode(String),
    #[error("invalid sqrl url: {0}")]
    InvalidUrl(String),
    /// The server answered with something that is not a valid SQRL response.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The server processed the request but reported a failure in the tif.
    #[error("server error: {0}")]
    Server(ServerError),
    /// Error from the http layer, the request may not have reached the
    /// server at all.
    #[error("transport error: {0}")]
    Transport(String),
    /// Error from the client and basically no request has been sent yet.
    #[error("client error: {0}")]
    Client(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub tif: Tif,
    pub msg: String,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tif:{}, msg:{}", self.tif, self.msg)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn wrong_password() -> Self {
        Error::DecryptionFailed("Decryption failed. Check your password!".to_owned())
    }

    pub(crate) fn wrong_rescue_code() -> Self {
        Error::DecryptionFailed("Decryption failed. Check your rescue code!".to_owned())
    }

    /// Whether the server asked the client to retry with a fresh nut.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Server(e) if e.tif.is_transient_error())
    }
}

impl From<TryFromSliceError> for Error {
    fn from(e: TryFromSliceError) -> Self {
        Error::InvalidData(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::InvalidData(format!("bad base64url:{e}"))
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidUrl(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}
