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

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::errors::Result;

/// Type of a block inside S4 identity storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Password protected IMK and ILK plus user settings.
    UserAccess,
    /// Rescue code protected IUK.
    RescueCode,
    /// IMK protected list of previous IUKs.
    PreviousIdentity,
    /// A block this client does not understand, kept as is.
    Unknown(u16),
}

impl DataType {
    pub fn as_u16(&self) -> u16 {
        match self {
            DataType::UserAccess => 1,
            DataType::RescueCode => 2,
            DataType::PreviousIdentity => 3,
            DataType::Unknown(v) => *v,
        }
    }

    pub fn to_binary(&self, output: &mut impl Write) -> Result<()> {
        output.write_u16::<LittleEndian>(self.as_u16())?;
        Ok(())
    }
}

impl From<u16> for DataType {
    fn from(value: u16) -> Self {
        match value {
            1 => DataType::UserAccess,
            2 => DataType::RescueCode,
            3 => DataType::PreviousIdentity,
            v => DataType::Unknown(v),
        }
    }
}
