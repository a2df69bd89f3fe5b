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

use std::{collections::VecDeque, io::Write};

use byteorder::{LittleEndian, WriteBytesExt};

use super::readable_vector::ReadableVector;
use crate::{
    common::{self, Key, MAX_EN_SCRYPT_ITERATIONS, MAX_SCRYPT_LOG_N},
    config::EnScryptWork,
    errors::{Error, Result},
};

pub const SALT_LEN: usize = 16;
pub const DEFAULT_LOG_N: u8 = 9;

/// EnScrypt parameters stored next to every password or rescue code
/// protected block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScryptConfig {
    pub salt: [u8; SALT_LEN],
    pub log_n_factor: u8,
    pub iteration_count: u32,
}

impl ScryptConfig {
    pub const BINARY_LEN: u16 = 21;

    /// Random salt, the iteration count is filled by [`Self::derive_new`].
    pub fn new() -> Self {
        Self::with_log_n(DEFAULT_LOG_N)
    }

    pub fn with_log_n(log_n_factor: u8) -> Self {
        Self {
            salt: common::random_bytes(),
            log_n_factor,
            iteration_count: 0,
        }
    }

    /// Re-derive the key from the stored parameters.
    pub fn derive(&self, secret: &[u8]) -> Result<Key> {
        common::en_scrypt(secret, &self.salt, self.log_n_factor, self.iteration_count)
    }

    /// Pick a fresh salt, spend `work` on the key and remember the
    /// iteration count.
    pub fn derive_new(&mut self, secret: &[u8], work: EnScryptWork) -> Result<Key> {
        self.salt = common::random_bytes();
        let (key, iterations) =
            common::en_scrypt_with_work(secret, &self.salt, self.log_n_factor, work)?;
        self.iteration_count = iterations;
        Ok(key)
    }

    pub fn from_binary(binary: &mut VecDeque<u8>) -> Result<Self> {
        if binary.len() < Self::BINARY_LEN as usize {
            return Err(Error::InvalidData(format!(
                "scrypt config needs {} bytes, only {} left",
                Self::BINARY_LEN,
                binary.len()
            )));
        }

        let config = Self {
            salt: binary.next_array()?,
            log_n_factor: binary.next_u8()?,
            iteration_count: binary.next_u32()?,
        };
        if config.log_n_factor == 0 || config.log_n_factor > MAX_SCRYPT_LOG_N {
            return Err(Error::InvalidData(format!(
                "scrypt log_n:{} out of range 1..={MAX_SCRYPT_LOG_N}",
                config.log_n_factor
            )));
        }
        if config.iteration_count == 0 || config.iteration_count > MAX_EN_SCRYPT_ITERATIONS {
            return Err(Error::InvalidData(format!(
                "EnScrypt iterations:{} out of range 1..={MAX_EN_SCRYPT_ITERATIONS}",
                config.iteration_count
            )));
        }
        Ok(config)
    }

    pub fn to_binary(&self, output: &mut impl Write) -> Result<()> {
        output.write_all(&self.salt)?;
        output.write_u8(self.log_n_factor)?;
        output.write_u32::<LittleEndian>(self.iteration_count)?;
        Ok(())
    }
}

impl Default for ScryptConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use super::*;
    use crate::common::TEST_LOG_N;

    #[test]
    fn test_binary_layout() {
        let config = ScryptConfig {
            salt: [0xAB; SALT_LEN],
            log_n_factor: 9,
            iteration_count: 0x0102_0304,
        };
        let mut out = Vec::new();
        config.to_binary(&mut out).unwrap();
        assert_eq!(out.len(), ScryptConfig::BINARY_LEN as usize);
        assert_eq!(&out[16..], &[9, 4, 3, 2, 1]);

        let mut input: VecDeque<u8> = out.into();
        assert_eq!(ScryptConfig::from_binary(&mut input).unwrap(), config);
    }

    #[test]
    fn test_derive_new_records_work() {
        let mut config = ScryptConfig::with_log_n(TEST_LOG_N);
        let old_salt = config.salt;
        let key = config
            .derive_new(b"secret", EnScryptWork::Iterations(2))
            .unwrap();
        assert_ne!(config.salt, old_salt);
        assert_eq!(config.iteration_count, 2);
        assert_eq!(*config.derive(b"secret").unwrap(), *key);
    }

    #[test]
    fn test_reject_unbounded_work() {
        let encode = |log_n_factor: u8, iteration_count: u32| {
            let mut out = Vec::new();
            ScryptConfig {
                salt: [1; SALT_LEN],
                log_n_factor,
                iteration_count,
            }
            .to_binary(&mut out)
            .unwrap();
            VecDeque::from(out)
        };

        assert!(ScryptConfig::from_binary(&mut encode(MAX_SCRYPT_LOG_N, 1)).is_ok());
        for (log_n, iterations) in [
            (40, 1),
            (0, 1),
            (9, 0),
            (9, u32::MAX),
            (9, MAX_EN_SCRYPT_ITERATIONS + 1),
        ] {
            assert!(matches!(
                ScryptConfig::from_binary(&mut encode(log_n, iterations)),
                Err(Error::InvalidData(_))
            ));
        }
    }
}
