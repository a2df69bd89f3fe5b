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
    ops::{BitAnd, BitOr, BitOrAssign},
};

/// Option flags kept in the password block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionFlags(pub u16);

impl OptionFlags {
    pub const CHECK_FOR_UPDATES: Self = Self(0x0001);
    pub const UPDATE_ANONYMOUSLY: Self = Self(0x0002);
    pub const SQRL_ONLY: Self = Self(0x0004);
    pub const HARD_LOCK: Self = Self(0x0008);
    pub const WARN_MITM: Self = Self(0x0010);
    pub const CLEAR_QUICK_PASS_ON_SLEEP: Self = Self(0x0020);
    pub const CLEAR_QUICK_PASS_ON_SWITCHING_USER: Self = Self(0x0040);
    pub const CLEAR_QUICK_PASS_ON_IDLE: Self = Self(0x0080);
    pub const WARN_NON_CPS: Self = Self(0x0100);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: Self, on: bool) {
        if on {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

impl Default for OptionFlags {
    fn default() -> Self {
        Self::CHECK_FOR_UPDATES
            | Self::WARN_MITM
            | Self::CLEAR_QUICK_PASS_ON_SLEEP
            | Self::CLEAR_QUICK_PASS_ON_SWITCHING_USER
            | Self::CLEAR_QUICK_PASS_ON_IDLE
            | Self::WARN_NON_CPS
    }
}

impl BitOr for OptionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OptionFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for OptionFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for OptionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// User preferences stored in plain text (but authenticated) in the password
/// block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentitySettings {
    pub options: OptionFlags,
    /// Number of password characters asked for when re-authenticating.
    pub hint_length: u8,
    /// Seconds of EnScrypt spent verifying the password.
    pub pw_verify_sec: u8,
    /// Minutes of idle time before the hint is cleared.
    pub idle_timeout_min: u16,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            options: OptionFlags::default(),
            hint_length: 4,
            pw_verify_sec: 5,
            idle_timeout_min: 15,
        }
    }
}
