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

use std::collections::VecDeque;

use byteorder::{LittleEndian, WriteBytesExt};

use super::DataType;
use crate::errors::Result;

/// A typed block of S4 storage.
///
/// The length and type prefix are handled here, implementors only deal with
/// the payload that follows them.
pub(crate) trait WritableDataBlock: Sized {
    fn get_type(&self) -> DataType;

    /// Length of the whole block, including length and type.
    fn len(&self) -> u16;

    /// Parse the payload, the length and type have already been consumed.
    fn from_binary(binary: &mut VecDeque<u8>) -> Result<Self>;

    fn to_binary_inner(&self, output: &mut Vec<u8>) -> Result<()>;

    fn to_binary(&self, output: &mut Vec<u8>) -> Result<()> {
        output.write_u16::<LittleEndian>(self.len())?;
        self.get_type().to_binary(output)?;
        self.to_binary_inner(output)
    }
}
