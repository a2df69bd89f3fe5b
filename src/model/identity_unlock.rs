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

//! Type 2 block: the identity unlock key protected by the rescue code.

use std::{collections::VecDeque, io::Write};

use byteorder::{LittleEndian, WriteBytesExt};
use zeroize::Zeroizing;

use super::{
    readable_vector::ReadableVector, scrypt_config::ScryptConfig,
    writable_datablock::WritableDataBlock, DataType,
};
use crate::{
    common::{self, Key, IV_LEN, KEY_LEN, TAG_LEN},
    config::ClientConfig,
    errors::{Error, Result},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IdentityUnlock {
    scrypt_config: ScryptConfig,
    identity_unlock_key: [u8; KEY_LEN],
    verification_data: [u8; TAG_LEN],
}

impl IdentityUnlock {
    /// Encrypts `identity_unlock_key` under a freshly generated rescue code.
    pub(crate) fn new(
        identity_unlock_key: &[u8; KEY_LEN],
        config: &ClientConfig,
    ) -> Result<(Self, Zeroizing<String>)> {
        let mut identity_unlock = IdentityUnlock {
            scrypt_config: ScryptConfig::with_log_n(config.scrypt_log_n),
            identity_unlock_key: [0; KEY_LEN],
            verification_data: [0; TAG_LEN],
        };

        let rescue_code = identity_unlock.encrypt(identity_unlock_key, config)?;
        Ok((identity_unlock, rescue_code))
    }

    /// Replaces the stored key, returning the new rescue code and the key it
    /// replaced.
    pub(crate) fn update_unlock_key(
        &mut self,
        rescue_code: &str,
        identity_unlock_key: &[u8; KEY_LEN],
        config: &ClientConfig,
    ) -> Result<(Zeroizing<String>, Key)> {
        let previous_identity_key = self.decrypt_identity_unlock_key(rescue_code)?;
        let rescue_code = self.encrypt(identity_unlock_key, config)?;
        Ok((rescue_code, previous_identity_key))
    }

    pub(crate) fn decrypt_identity_unlock_key(&self, rescue_code: &str) -> Result<Key> {
        let rescue_code = common::normalize_rescue_code(rescue_code)?;
        let key = self.scrypt_config.derive(rescue_code.as_bytes())?;
        let plain = common::aes_gcm_decrypt(
            &key,
            &[0; IV_LEN],
            &self.aad()?,
            &self.identity_unlock_key,
            &self.verification_data,
        )?
        .ok_or_else(Error::wrong_rescue_code)?;

        Ok(Zeroizing::new(plain.as_slice().try_into()?))
    }

    fn encrypt(
        &mut self,
        identity_unlock_key: &[u8; KEY_LEN],
        config: &ClientConfig,
    ) -> Result<Zeroizing<String>> {
        let rescue_code = common::generate_rescue_code();
        self.scrypt_config.log_n_factor = config.scrypt_log_n;
        let key = self
            .scrypt_config
            .derive_new(rescue_code.as_bytes(), config.rescue_code_work)?;

        // Zero nonce: every encryption derives its key from a fresh salt.
        let (encrypted, tag) =
            common::aes_gcm_encrypt(&key, &[0; IV_LEN], &self.aad()?, identity_unlock_key)?;
        self.identity_unlock_key = encrypted.as_slice().try_into()?;
        self.verification_data = tag;
        Ok(rescue_code)
    }

    fn aad(&self) -> Result<Vec<u8>> {
        let mut result = Vec::<u8>::new();
        result.write_u16::<LittleEndian>(self.len())?;
        self.get_type().to_binary(&mut result)?;
        self.scrypt_config.to_binary(&mut result)?;
        Ok(result)
    }
}

impl WritableDataBlock for IdentityUnlock {
    fn get_type(&self) -> DataType {
        DataType::RescueCode
    }

    fn len(&self) -> u16 {
        73
    }

    fn from_binary(binary: &mut VecDeque<u8>) -> Result<Self> {
        Ok(IdentityUnlock {
            scrypt_config: ScryptConfig::from_binary(binary)?,
            identity_unlock_key: binary.next_array()?,
            verification_data: binary.next_array()?,
        })
    }

    fn to_binary_inner(&self, output: &mut Vec<u8>) -> Result<()> {
        self.scrypt_config.to_binary(output)?;
        output.write_all(&self.identity_unlock_key)?;
        output.write_all(&self.verification_data)?;
        Ok(())
    }
}
