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

//! Type 3 block: identity unlock keys retired by rekeying, newest first.

use std::{collections::VecDeque, io::Write};

use byteorder::{LittleEndian, WriteBytesExt};
use zeroize::Zeroizing;

use super::{readable_vector::ReadableVector, writable_datablock::WritableDataBlock, DataType};
use crate::{
    common::{self, Key, IV_LEN, KEY_LEN, TAG_LEN},
    errors::{Error, Result},
};

pub const MAX_PREVIOUS_IDENTITIES: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PreviousIdentities {
    edition: u16,
    previous_identity_keys: Vec<[u8; KEY_LEN]>,
    verification_data: [u8; TAG_LEN],
}

impl PreviousIdentities {
    /// Encrypts `keys` (newest first) under the current identity master key.
    pub(crate) fn new(
        identity_master_key: &[u8; KEY_LEN],
        keys: &[Key],
        edition: u16,
    ) -> Result<Self> {
        if keys.is_empty() || keys.len() > MAX_PREVIOUS_IDENTITIES {
            return Err(Error::Client(format!(
                "expect 1 to {MAX_PREVIOUS_IDENTITIES} previous identities, got {}",
                keys.len()
            )));
        }

        let mut block = PreviousIdentities {
            edition,
            previous_identity_keys: vec![[0; KEY_LEN]; keys.len()],
            verification_data: [0; TAG_LEN],
        };

        let mut plain = Zeroizing::new(Vec::with_capacity(keys.len() * KEY_LEN));
        for key in keys {
            plain.extend_from_slice(key.as_slice());
        }
        let (encrypted, tag) =
            common::aes_gcm_encrypt(identity_master_key, &[0; IV_LEN], &block.aad()?, &plain)?;
        for (slot, chunk) in block
            .previous_identity_keys
            .iter_mut()
            .zip(encrypted.chunks_exact(KEY_LEN))
        {
            *slot = chunk.try_into()?;
        }
        block.verification_data = tag;
        Ok(block)
    }

    pub(crate) fn edition(&self) -> u16 {
        self.edition
    }

    pub(crate) fn count(&self) -> usize {
        self.previous_identity_keys.len()
    }

    /// Decrypts the previous identity unlock keys, newest first.
    pub(crate) fn decrypt(&self, identity_master_key: &[u8; KEY_LEN]) -> Result<Vec<Key>> {
        let encrypted: Vec<u8> = self.previous_identity_keys.concat();
        let plain = common::aes_gcm_decrypt(
            identity_master_key,
            &[0; IV_LEN],
            &self.aad()?,
            &encrypted,
            &self.verification_data,
        )?
        .ok_or_else(|| {
            Error::DecryptionFailed(
                "Previous identities do not belong to this identity".to_string(),
            )
        })?;

        plain
            .chunks_exact(KEY_LEN)
            .map(|chunk| -> Result<Key> { Ok(Zeroizing::new(chunk.try_into()?)) })
            .collect()
    }

    fn aad(&self) -> Result<Vec<u8>> {
        let mut result = Vec::<u8>::with_capacity(6);
        result.write_u16::<LittleEndian>(self.len())?;
        self.get_type().to_binary(&mut result)?;
        result.write_u16::<LittleEndian>(self.edition)?;
        Ok(result)
    }
}

impl WritableDataBlock for PreviousIdentities {
    fn get_type(&self) -> DataType {
        DataType::PreviousIdentity
    }

    fn len(&self) -> u16 {
        (6 + KEY_LEN * self.previous_identity_keys.len() + TAG_LEN) as u16
    }

    /// The whole payload must be handed in, the key count is derived from
    /// its length.
    fn from_binary(binary: &mut VecDeque<u8>) -> Result<Self> {
        let edition = binary.next_u16()?;
        let keys_len = match binary.len().checked_sub(TAG_LEN) {
            Some(v) if v % KEY_LEN == 0 => v,
            _ => {
                return Err(Error::InvalidData(format!(
                    "invalid previous identities payload length:{}",
                    binary.len() + 2
                )))
            }
        };

        let count = keys_len / KEY_LEN;
        if count == 0 || count > MAX_PREVIOUS_IDENTITIES {
            return Err(Error::InvalidData(format!(
                "invalid previous identities count:{count}"
            )));
        }

        let mut previous_identity_keys = Vec::with_capacity(count);
        for _ in 0..count {
            previous_identity_keys.push(binary.next_array::<KEY_LEN>()?);
        }

        Ok(PreviousIdentities {
            edition,
            previous_identity_keys,
            verification_data: binary.next_array()?,
        })
    }

    fn to_binary_inner(&self, output: &mut Vec<u8>) -> Result<()> {
        output.write_u16::<LittleEndian>(self.edition)?;
        for key in &self.previous_identity_keys {
            output.write_all(key)?;
        }
        output.write_all(&self.verification_data)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use super::*;

    fn keys(n: u8) -> Vec<Key> {
        (1..=n).map(|i| Zeroizing::new([i; KEY_LEN])).collect()
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let imk = [42u8; KEY_LEN];
        let block = PreviousIdentities::new(&imk, &keys(3), 7).unwrap();
        assert_eq!(block.count(), 3);
        assert_eq!(block.edition(), 7);
        assert_eq!(block.len(), 22 + 3 * 32);

        let decrypted = block.decrypt(&imk).unwrap();
        assert_eq!(decrypted.len(), 3);
        assert_eq!(*decrypted[0], [1u8; KEY_LEN]);
        assert_eq!(*decrypted[2], [3u8; KEY_LEN]);

        assert!(matches!(
            block.decrypt(&[0u8; KEY_LEN]),
            Err(Error::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_key_count_limits() {
        let imk = [1u8; KEY_LEN];
        assert!(PreviousIdentities::new(&imk, &[], 1).is_err());
        assert!(PreviousIdentities::new(&imk, &keys(5), 1).is_err());
        assert!(PreviousIdentities::new(&imk, &keys(4), 1).is_ok());
    }

    #[test]
    fn test_binary_layout() {
        let imk = [2u8; KEY_LEN];
        let block = PreviousIdentities::new(&imk, &keys(2), 3).unwrap();
        let mut out = Vec::new();
        block.to_binary(&mut out).unwrap();
        assert_eq!(out.len(), 86);
        assert_eq!(&out[..6], &[86, 0, 3, 0, 3, 0]);

        let mut input: VecDeque<u8> = out[4..].iter().copied().collect();
        let parsed = PreviousIdentities::from_binary(&mut input).unwrap();
        assert!(input.is_empty());
        assert_eq!(parsed, block);
        assert_eq!(*parsed.decrypt(&imk).unwrap()[1], [2u8; KEY_LEN]);
    }

    #[test]
    fn test_reject_ragged_payload() {
        let mut input: VecDeque<u8> = vec![0u8; 2 + 31 + TAG_LEN].into();
        assert!(matches!(
            PreviousIdentities::from_binary(&mut input),
            Err(Error::InvalidData(_))
        ));

        let mut input: VecDeque<u8> = vec![0u8; 2 + TAG_LEN].into();
        assert!(PreviousIdentities::from_binary(&mut input).is_err());
    }
}
