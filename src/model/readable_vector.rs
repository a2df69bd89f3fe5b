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

use crate::errors::{Error, Result};

/// Little-endian cursor over the bytes of an S4 blob.
pub(crate) trait ReadableVector {
    fn next_u8(&mut self) -> Result<u8>;
    fn next_u16(&mut self) -> Result<u16>;
    fn next_u32(&mut self) -> Result<u32>;
    fn next_sub_array(&mut self, size: usize) -> Result<Vec<u8>>;

    fn next_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        Ok(self.next_sub_array(N)?.as_slice().try_into()?)
    }
}

impl ReadableVector for VecDeque<u8> {
    fn next_u8(&mut self) -> Result<u8> {
        self.pop_front()
            .ok_or_else(|| Error::InvalidData("unexpected end of data".to_string()))
    }

    fn next_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.next_array()?))
    }

    fn next_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.next_array()?))
    }

    fn next_sub_array(&mut self, size: usize) -> Result<Vec<u8>> {
        if self.len() < size {
            return Err(Error::InvalidData(format!(
                "need {size} more bytes, only {} left",
                self.len()
            )));
        }

        Ok(self.drain(..size).collect())
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use super::ReadableVector;
    use crate::errors::Error;

    #[test]
    fn test_read_little_endian() {
        let mut data: VecDeque<u8> = vec![1, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 9, 9].into();
        assert_eq!(data.next_u8().unwrap(), 1);
        assert_eq!(data.next_u16().unwrap(), 0x1234);
        assert_eq!(data.next_u32().unwrap(), 0x1234_5678);
        assert_eq!(data.next_array::<2>().unwrap(), [9, 9]);
        assert!(data.is_empty());
    }

    #[test]
    fn test_read_past_end() {
        let mut data: VecDeque<u8> = vec![1, 2, 3].into();
        assert!(matches!(data.next_u32(), Err(Error::InvalidData(_))));
        // Nothing is consumed by a failed read.
        assert_eq!(data.len(), 3);
        assert!(matches!(data.next_sub_array(4), Err(Error::InvalidData(_))));
        assert_eq!(data.next_sub_array(3).unwrap(), vec![1, 2, 3]);
        assert!(data.next_u8().is_err());
    }
}
