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

use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
};

use crate::errors::{Error, Result};

/// Transaction information flags returned by the server, hex on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Tif(pub u32);

impl Tif {
    pub const CURRENT_ID_MATCH: Self = Self(0x01);
    pub const PREVIOUS_ID_MATCH: Self = Self(0x02);
    pub const IP_MATCHED: Self = Self(0x04);
    pub const SQRL_DISABLED: Self = Self(0x08);
    pub const FUNCTION_NOT_SUPPORTED: Self = Self(0x10);
    pub const TRANSIENT_ERROR: Self = Self(0x20);
    pub const COMMAND_FAILED: Self = Self(0x40);
    pub const CLIENT_FAILURE: Self = Self(0x80);
    pub const BAD_ID_ASSOCIATION: Self = Self(0x100);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_current_id_match(&self) -> bool {
        self.contains(Self::CURRENT_ID_MATCH)
    }

    pub fn is_previous_id_match(&self) -> bool {
        self.contains(Self::PREVIOUS_ID_MATCH)
    }

    pub fn is_disabled(&self) -> bool {
        self.contains(Self::SQRL_DISABLED)
    }

    pub fn is_transient_error(&self) -> bool {
        self.contains(Self::TRANSIENT_ERROR)
    }

    pub fn is_command_failed(&self) -> bool {
        self.contains(Self::COMMAND_FAILED)
    }

    /// Human readable reason of a failure, used in error messages.
    pub fn failure_reason(&self) -> &'static str {
        if self.contains(Self::TRANSIENT_ERROR) {
            "transient error, retry with the new nut"
        } else if self.contains(Self::CLIENT_FAILURE) {
            "server could not parse the client request"
        } else if self.contains(Self::BAD_ID_ASSOCIATION) {
            "identity is not associated with this session"
        } else if self.contains(Self::FUNCTION_NOT_SUPPORTED) {
            "function not supported by the server"
        } else {
            "command failed"
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        u32::from_str_radix(s.trim(), 16)
            .map(Self)
            .map_err(|e| Error::Protocol(format!("invalid tif:{s}, err:{e}")))
    }
}

impl BitOr for Tif {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Tif {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Tif {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}
