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

//! Type 1 block: the password protected identity master and lock keys.

use std::{collections::VecDeque, io::Write};

use byteorder::{LittleEndian, WriteBytesExt};
use zeroize::Zeroizing;

use super::{
    readable_vector::ReadableVector, scrypt_config::ScryptConfig,
    writable_datablock::WritableDataBlock, DataType, IdentitySettings, OptionFlags,
};
use crate::{
    common::{self, Key, IV_LEN, KEY_LEN, TAG_LEN},
    config::ClientConfig,
    errors::{Error, Result},
};

/// Length of the authenticated but unencrypted prefix of the block.
const PT_LENGTH: u16 = 45;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IdentityInformation {
    aes_gcm_iv: [u8; IV_LEN],
    scrypt_config: ScryptConfig,
    settings: IdentitySettings,
    identity_master_key: [u8; KEY_LEN],
    identity_lock_key: [u8; KEY_LEN],
    verification_data: [u8; TAG_LEN],
}

impl IdentityInformation {
    pub(crate) fn new(
        password: &str,
        identity_master_key: &[u8; KEY_LEN],
        identity_lock_key: &[u8; KEY_LEN],
        config: &ClientConfig,
    ) -> Result<Self> {
        let mut information = IdentityInformation {
            aes_gcm_iv: [0; IV_LEN],
            scrypt_config: ScryptConfig::with_log_n(config.scrypt_log_n),
            settings: config.settings,
            identity_master_key: [0; KEY_LEN],
            identity_lock_key: [0; KEY_LEN],
            verification_data: [0; TAG_LEN],
        };
        information.encrypt(password, identity_master_key, identity_lock_key, config)?;
        Ok(information)
    }

    pub(crate) fn settings(&self) -> IdentitySettings {
        self.settings
    }

    /// Returns the (IMK, ILK) pair.
    pub(crate) fn decrypt(&self, password: &str) -> Result<(Key, [u8; KEY_LEN])> {
        let key = self.scrypt_config.derive(password.as_bytes())?;
        let mut encrypted = Vec::with_capacity(2 * KEY_LEN);
        encrypted.extend_from_slice(&self.identity_master_key);
        encrypted.extend_from_slice(&self.identity_lock_key);

        let plain = common::aes_gcm_decrypt(
            &key,
            &self.aes_gcm_iv,
            &self.aad()?,
            &encrypted,
            &self.verification_data,
        )?
        .ok_or_else(Error::wrong_password)?;

        let imk: Key = Zeroizing::new(plain[..KEY_LEN].try_into()?);
        let ilk: [u8; KEY_LEN] = plain[KEY_LEN..].try_into()?;
        Ok((imk, ilk))
    }

    pub(crate) fn verify(&self, password: &str) -> bool {
        self.decrypt(password).is_ok()
    }

    pub(crate) fn update_password(
        &mut self,
        old_password: &str,
        new_password: &str,
        config: &ClientConfig,
    ) -> Result<()> {
        let (imk, ilk) = self.decrypt(old_password)?;
        self.encrypt(new_password, &imk, &ilk, config)
    }

    /// The settings are part of the aad, so changing them re-encrypts.
    pub(crate) fn update_settings(
        &mut self,
        password: &str,
        settings: IdentitySettings,
        config: &ClientConfig,
    ) -> Result<()> {
        let (imk, ilk) = self.decrypt(password)?;
        self.settings = settings;
        self.encrypt(password, &imk, &ilk, config)
    }

    fn encrypt(
        &mut self,
        password: &str,
        identity_master_key: &[u8; KEY_LEN],
        identity_lock_key: &[u8; KEY_LEN],
        config: &ClientConfig,
    ) -> Result<()> {
        self.aes_gcm_iv = common::random_bytes();
        self.scrypt_config.log_n_factor = config.scrypt_log_n;
        let key = self
            .scrypt_config
            .derive_new(password.as_bytes(), config.password_work)?;

        let mut plain = Zeroizing::new(Vec::with_capacity(2 * KEY_LEN));
        plain.extend_from_slice(identity_master_key);
        plain.extend_from_slice(identity_lock_key);

        let (encrypted, tag) = common::aes_gcm_encrypt(&key, &self.aes_gcm_iv, &self.aad()?, &plain)?;
        self.identity_master_key = encrypted[..KEY_LEN].try_into()?;
        self.identity_lock_key = encrypted[KEY_LEN..].try_into()?;
        self.verification_data = tag;
        Ok(())
    }

    fn aad(&self) -> Result<Vec<u8>> {
        let mut result = Vec::with_capacity(PT_LENGTH as usize);
        result.write_u16::<LittleEndian>(self.len())?;
        self.get_type().to_binary(&mut result)?;
        self.write_plain_text(&mut result)?;
        Ok(result)
    }

    fn write_plain_text(&self, output: &mut Vec<u8>) -> Result<()> {
        output.write_u16::<LittleEndian>(PT_LENGTH)?;
        output.write_all(&self.aes_gcm_iv)?;
        self.scrypt_config.to_binary(output)?;
        output.write_u16::<LittleEndian>(self.settings.options.bits())?;
        output.write_u8(self.settings.hint_length)?;
        output.write_u8(self.settings.pw_verify_sec)?;
        output.write_u16::<LittleEndian>(self.settings.idle_timeout_min)?;
        Ok(())
    }
}

impl WritableDataBlock for IdentityInformation {
    fn get_type(&self) -> DataType {
        DataType::UserAccess
    }

    fn len(&self) -> u16 {
        125
    }

    fn from_binary(binary: &mut VecDeque<u8>) -> Result<Self> {
        let pt_length = binary.next_u16()?;
        if pt_length != PT_LENGTH {
            return Err(Error::InvalidData(format!(
                "unsupported plain text length:{pt_length}, expect {PT_LENGTH}"
            )));
        }

        Ok(IdentityInformation {
            aes_gcm_iv: binary.next_array()?,
            scrypt_config: ScryptConfig::from_binary(binary)?,
            settings: IdentitySettings {
                options: OptionFlags(binary.next_u16()?),
                hint_length: binary.next_u8()?,
                pw_verify_sec: binary.next_u8()?,
                idle_timeout_min: binary.next_u16()?,
            },
            identity_master_key: binary.next_array()?,
            identity_lock_key: binary.next_array()?,
            verification_data: binary.next_array()?,
        })
    }

    fn to_binary_inner(&self, output: &mut Vec<u8>) -> Result<()> {
        self.write_plain_text(output)?;
        output.write_all(&self.identity_master_key)?;
        output.write_all(&self.identity_lock_key)?;
        output.write_all(&self.verification_data)?;
        Ok(())
    }
}
