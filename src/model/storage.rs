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

//! The S4 container: a header followed by typed blocks.

use std::collections::VecDeque;

use base64::Engine;
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use super::{
    identity_information::IdentityInformation, identity_unlock::IdentityUnlock,
    previous_identity::PreviousIdentities, readable_vector::ReadableVector,
    writable_datablock::WritableDataBlock, DataType,
};
use crate::{
    common::BASE64URL,
    errors::{Error, Result},
};

pub const BINARY_HEADER: &[u8] = b"sqrldata";
pub const TEXTUAL_HEADER: &str = "SQRLDATA";

/// A block of a type this client does not know, preserved on save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UnknownBlock {
    data_type: u16,
    payload: Vec<u8>,
}

impl UnknownBlock {
    fn to_binary(&self, output: &mut Vec<u8>) -> Result<()> {
        output.write_u16::<LittleEndian>((self.payload.len() + 4) as u16)?;
        output.write_u16::<LittleEndian>(self.data_type)?;
        output.extend_from_slice(&self.payload);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct S4Storage {
    pub(crate) user_access: Option<IdentityInformation>,
    pub(crate) rescue_code: Option<IdentityUnlock>,
    pub(crate) previous_identities: Option<PreviousIdentities>,
    pub(crate) unknown_blocks: Vec<UnknownBlock>,
}

impl S4Storage {
    /// Accepts both the binary (`sqrldata`) and textual (`SQRLDATA`) forms.
    pub(crate) fn from_bytes(data: &[u8]) -> Result<Self> {
        if let Some(blocks) = data.strip_prefix(BINARY_HEADER) {
            return Self::from_blocks(blocks);
        }

        if let Some(encoded) = data.strip_prefix(TEXTUAL_HEADER.as_bytes()) {
            let encoded: Vec<u8> = encoded
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            return Self::from_blocks(&BASE64URL.decode(encoded)?);
        }

        Err(Error::InvalidData(
            "missing sqrldata header, not an S4 identity".to_string(),
        ))
    }

    fn from_blocks(data: &[u8]) -> Result<Self> {
        let mut binary: VecDeque<u8> = data.iter().copied().collect();
        let mut storage = S4Storage::default();

        while !binary.is_empty() {
            let len = binary.next_u16()? as usize;
            let data_type = DataType::from(binary.next_u16()?);
            let payload_len = len.checked_sub(4).ok_or_else(|| {
                Error::InvalidData(format!("block length:{len} shorter than its header"))
            })?;
            let mut payload: VecDeque<u8> = binary.next_sub_array(payload_len)?.into();

            match data_type {
                DataType::UserAccess => {
                    let block = IdentityInformation::from_binary(&mut payload)?;
                    check_block(&block, len, &payload)?;
                    storage.user_access = Some(block);
                }
                DataType::RescueCode => {
                    let block = IdentityUnlock::from_binary(&mut payload)?;
                    check_block(&block, len, &payload)?;
                    storage.rescue_code = Some(block);
                }
                DataType::PreviousIdentity => {
                    let block = PreviousIdentities::from_binary(&mut payload)?;
                    check_block(&block, len, &payload)?;
                    storage.previous_identities = Some(block);
                }
                DataType::Unknown(v) => {
                    debug!("Keep unknown S4 block, type:{v}, len:{len}");
                    storage.unknown_blocks.push(UnknownBlock {
                        data_type: v,
                        payload: payload.into(),
                    });
                }
            }
        }

        Ok(storage)
    }

    pub(crate) fn to_binary(&self) -> Result<Vec<u8>> {
        let mut output = BINARY_HEADER.to_vec();
        self.write_blocks(&mut output)?;
        Ok(output)
    }

    pub(crate) fn to_textual(&self) -> Result<String> {
        let mut blocks = Vec::new();
        self.write_blocks(&mut blocks)?;
        Ok(format!("{TEXTUAL_HEADER}{}", BASE64URL.encode(blocks)))
    }

    fn write_blocks(&self, output: &mut Vec<u8>) -> Result<()> {
        if let Some(block) = &self.user_access {
            block.to_binary(output)?;
        }
        if let Some(block) = &self.rescue_code {
            block.to_binary(output)?;
        }
        if let Some(block) = &self.previous_identities {
            block.to_binary(output)?;
        }
        for block in &self.unknown_blocks {
            block.to_binary(output)?;
        }
        Ok(())
    }
}

fn check_block(block: &impl WritableDataBlock, len: usize, rest: &VecDeque<u8>) -> Result<()> {
    if block.len() as usize != len || !rest.is_empty() {
        return Err(Error::InvalidData(format!(
            "block type:{} has length:{len}, expect {}",
            block.get_type().as_u16(),
            block.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        common::TEST_LOG_N,
        config::{ClientConfig, EnScryptWork},
    };

    fn test_storage() -> S4Storage {
        let config = ClientConfig {
            scrypt_log_n: TEST_LOG_N,
            password_work: EnScryptWork::Iterations(1),
            rescue_code_work: EnScryptWork::Iterations(1),
            ..Default::default()
        };
        let (unlock, _) = IdentityUnlock::new(&[1u8; 32], &config).unwrap();
        S4Storage {
            user_access: Some(
                IdentityInformation::new("pw", &[2u8; 32], &[3u8; 32], &config).unwrap(),
            ),
            rescue_code: Some(unlock),
            previous_identities: None,
            unknown_blocks: vec![UnknownBlock {
                data_type: 99,
                payload: vec![1, 2, 3],
            }],
        }
    }

    #[test]
    fn test_binary_and_textual_forms() {
        let storage = test_storage();

        let binary = storage.to_binary().unwrap();
        assert!(binary.starts_with(b"sqrldata"));
        assert_eq!(binary.len(), 8 + 125 + 73 + 7);
        assert_eq!(S4Storage::from_bytes(&binary).unwrap(), storage);

        let textual = storage.to_textual().unwrap();
        assert!(textual.starts_with("SQRLDATA"));
        assert!(!textual.contains('='));
        assert_eq!(S4Storage::from_bytes(textual.as_bytes()).unwrap(), storage);

        // Line wrapped text is accepted too.
        let wrapped = format!("{}\n{}\n", &textual[..40], &textual[40..]);
        assert_eq!(S4Storage::from_bytes(wrapped.as_bytes()).unwrap(), storage);
    }

    #[test]
    fn test_reject_bad_containers() {
        assert!(matches!(
            S4Storage::from_bytes(b"notsqrl"),
            Err(Error::InvalidData(_))
        ));

        let mut binary = test_storage().to_binary().unwrap();
        binary.truncate(binary.len() - 10);
        assert!(S4Storage::from_bytes(&binary).is_err());

        // A rescue code block claiming a wrong length.
        let mut bad = b"sqrldata".to_vec();
        bad.extend_from_slice(&[3, 0, 2, 0]);
        assert!(S4Storage::from_bytes(&bad).is_err());
    }

    #[test]
    fn test_empty_container() {
        let storage = S4Storage::from_bytes(b"sqrldata").unwrap();
        assert_eq!(storage, S4Storage::default());
    }
}
