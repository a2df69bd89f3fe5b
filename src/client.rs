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

//! [SqrlClient] and the keys it unlocks.

use std::{fmt, fs, path::Path};

use ed25519_dalek::SigningKey;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    common::{self, Key, KEY_LEN},
    config::ClientConfig,
    errors::{Error, Result},
    model::{
        identity_information::IdentityInformation, identity_unlock::IdentityUnlock,
        previous_identity::PreviousIdentities, storage::S4Storage, IdentitySettings,
        MAX_PREVIOUS_IDENTITIES,
    },
};

/// On-disk representation of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S4Format {
    /// `sqrldata` followed by the raw blocks.
    Binary,
    /// `SQRLDATA` followed by base64url of the blocks.
    Textual,
}

/// A SQRL identity as stored in S4.
///
/// Only encrypted material is held, every operation touching keys needs the
/// password or the rescue code.
#[derive(Debug, Clone)]
pub struct SqrlClient {
    storage: S4Storage,
    config: ClientConfig,
}

impl SqrlClient {
    /// Creates a brand new identity, returning it with its rescue code.
    ///
    /// The rescue code is not stored anywhere, it must be shown to the user.
    pub fn new(password: &str, config: ClientConfig) -> Result<(Self, Zeroizing<String>)> {
        if password.is_empty() {
            return Err(Error::Client("password must not be empty".to_string()));
        }

        let iuk = common::random_key();
        let imk = common::en_hash(&iuk);
        let ilk = common::identity_lock_key(&iuk);

        let user_access = IdentityInformation::new(password, &imk, &ilk, &config)?;
        let (rescue_code_block, rescue_code) = IdentityUnlock::new(&iuk, &config)?;
        info!("Created new sqrl identity");

        let client = SqrlClient {
            storage: S4Storage {
                user_access: Some(user_access),
                rescue_code: Some(rescue_code_block),
                ..Default::default()
            },
            config,
        };
        Ok((client, rescue_code))
    }

    /// Loads an identity from either S4 form.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let storage = S4Storage::from_bytes(data)?;
        if storage.user_access.is_none() && storage.rescue_code.is_none() {
            return Err(Error::InvalidData(
                "identity has neither a password nor a rescue code block".to_string(),
            ));
        }

        Ok(SqrlClient {
            storage,
            config: ClientConfig::default(),
        })
    }

    pub fn from_textual(text: &str) -> Result<Self> {
        Self::from_bytes(text.trim().as_bytes())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Load sqrl identity, path:{}", path.display());
        Self::from_bytes(&fs::read(path)?)
    }

    /// Imports an identity that was exported without its password block,
    /// protecting it with a new password.
    pub fn from_rescue_code(
        data: &[u8],
        rescue_code: &str,
        new_password: &str,
        config: ClientConfig,
    ) -> Result<Self> {
        let mut client = Self::from_bytes(data)?.with_config(config);
        client.reset_password(rescue_code, new_password)?;
        Ok(client)
    }

    /// Config used for any later re-encryption.
    #[must_use]
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn to_binary(&self) -> Result<Vec<u8>> {
        self.storage.to_binary()
    }

    pub fn to_textual(&self) -> Result<String> {
        self.storage.to_textual()
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>, format: S4Format) -> Result<()> {
        let data = match format {
            S4Format::Binary => self.to_binary()?,
            S4Format::Textual => self.to_textual()?.into_bytes(),
        };
        fs::write(path.as_ref(), data)?;
        debug!("Saved sqrl identity, path:{}", path.as_ref().display());
        Ok(())
    }

    /// Textual S4 without the password block, for offline backup.
    pub fn export_rescue_only(&self) -> Result<String> {
        let storage = S4Storage {
            user_access: None,
            rescue_code: Some(self.rescue_code_block()?.clone()),
            previous_identities: self.storage.previous_identities.clone(),
            unknown_blocks: Vec::new(),
        };
        storage.to_textual()
    }

    pub fn has_password(&self) -> bool {
        self.storage.user_access.is_some()
    }

    pub fn settings(&self) -> Option<IdentitySettings> {
        self.storage.user_access.as_ref().map(|b| b.settings())
    }

    pub fn previous_identity_count(&self) -> usize {
        self.storage
            .previous_identities
            .as_ref()
            .map_or(0, |b| b.count())
    }

    pub fn verify_password(&self, password: &str) -> bool {
        self.storage
            .user_access
            .as_ref()
            .is_some_and(|b| b.verify(password))
    }

    pub fn unlock(&self, password: &str) -> Result<UnlockedIdentity> {
        let (imk, ilk) = self
            .user_access_block()?
            .decrypt(password)
            .inspect_err(|e| warn!("Failed to unlock sqrl identity, err:{e}"))?;

        let previous_imks = match &self.storage.previous_identities {
            Some(block) => block
                .decrypt(&imk)?
                .iter()
                .map(|piuk| common::en_hash(piuk))
                .collect(),
            None => Vec::new(),
        };
        debug!(
            "Unlocked sqrl identity, previous identities:{}",
            previous_imks.len()
        );

        Ok(UnlockedIdentity {
            imk,
            ilk,
            previous_imks,
        })
    }

    pub fn change_password(&mut self, old_password: &str, new_password: &str) -> Result<()> {
        if new_password.is_empty() {
            return Err(Error::Client("password must not be empty".to_string()));
        }

        let config = self.config.clone();
        self.user_access_block_mut()?
            .update_password(old_password, new_password, &config)?;
        info!("Changed sqrl identity password");
        Ok(())
    }

    /// Rebuilds the password block from the rescue code, keeping the
    /// identity itself.
    pub fn reset_password(&mut self, rescue_code: &str, new_password: &str) -> Result<()> {
        if new_password.is_empty() {
            return Err(Error::Client("password must not be empty".to_string()));
        }

        let iuk = self
            .rescue_code_block()?
            .decrypt_identity_unlock_key(rescue_code)?;
        let imk = common::en_hash(&iuk);
        let ilk = common::identity_lock_key(&iuk);

        let config = self.config_keeping_settings();
        self.storage.user_access = Some(IdentityInformation::new(
            new_password,
            &imk,
            &ilk,
            &config,
        )?);
        info!("Reset sqrl identity password with rescue code");
        Ok(())
    }

    /// Replaces the identity with a new one, retiring the current unlock key
    /// into the previous identities.
    ///
    /// Returns the new rescue code, the old one stops working.
    pub fn rekey_identity(
        &mut self,
        rescue_code: &str,
        new_password: &str,
    ) -> Result<Zeroizing<String>> {
        if new_password.is_empty() {
            return Err(Error::Client("password must not be empty".to_string()));
        }

        let new_iuk = common::random_key();
        let mut rescue_code_block = self.rescue_code_block()?.clone();
        let (new_rescue_code, old_iuk) =
            rescue_code_block.update_unlock_key(rescue_code, &new_iuk, &self.config)?;
        let old_imk = common::en_hash(&old_iuk);

        let (mut previous, edition) = match &self.storage.previous_identities {
            Some(block) => (block.decrypt(&old_imk)?, block.edition().wrapping_add(1)),
            None => (Vec::new(), 1),
        };
        previous.insert(0, old_iuk);
        previous.truncate(
            self.config
                .max_previous_identities
                .min(MAX_PREVIOUS_IDENTITIES),
        );

        let imk = common::en_hash(&new_iuk);
        let ilk = common::identity_lock_key(&new_iuk);
        let previous_identities = if previous.is_empty() {
            None
        } else {
            Some(PreviousIdentities::new(&imk, &previous, edition)?)
        };
        let config = self.config_keeping_settings();
        let user_access = IdentityInformation::new(new_password, &imk, &ilk, &config)?;

        self.storage.user_access = Some(user_access);
        self.storage.rescue_code = Some(rescue_code_block);
        self.storage.previous_identities = previous_identities;
        info!(
            "Rekeyed sqrl identity, edition:{edition}, previous identities:{}",
            self.previous_identity_count()
        );
        Ok(new_rescue_code)
    }

    pub fn update_settings(&mut self, password: &str, settings: IdentitySettings) -> Result<()> {
        let config = self.config.clone();
        self.user_access_block_mut()?
            .update_settings(password, settings, &config)
    }

    /// The key that signs `enable` and `remove` requests for the server
    /// association holding `suk`.
    pub fn unlock_request_signing_key(
        &self,
        rescue_code: &str,
        suk: &[u8; KEY_LEN],
    ) -> Result<SigningKey> {
        let iuk = self
            .rescue_code_block()?
            .decrypt_identity_unlock_key(rescue_code)?;
        Ok(common::unlock_request_signing_key(&iuk, suk))
    }

    fn config_keeping_settings(&self) -> ClientConfig {
        let mut config = self.config.clone();
        if let Some(settings) = self.settings() {
            config.settings = settings;
        }
        config
    }

    fn user_access_block(&self) -> Result<&IdentityInformation> {
        self.storage
            .user_access
            .as_ref()
            .ok_or_else(no_password_block)
    }

    fn user_access_block_mut(&mut self) -> Result<&mut IdentityInformation> {
        self.storage
            .user_access
            .as_mut()
            .ok_or_else(no_password_block)
    }

    fn rescue_code_block(&self) -> Result<&IdentityUnlock> {
        self.storage.rescue_code.as_ref().ok_or_else(|| {
            Error::Client("identity has no rescue code block".to_string())
        })
    }
}

fn no_password_block() -> Error {
    Error::Client("identity has no password block, restore it with the rescue code".to_string())
}

/// Keys decrypted with the password, enough to log in anywhere.
pub struct UnlockedIdentity {
    imk: Key,
    ilk: [u8; KEY_LEN],
    previous_imks: Vec<Key>,
}

impl UnlockedIdentity {
    pub fn site_key(&self, domain: &str) -> Result<SigningKey> {
        common::site_signing_key(&self.imk, domain)
    }

    /// The identity key (IDK) a site knows this user by.
    pub fn site_public_key(&self, domain: &str) -> Result<[u8; KEY_LEN]> {
        Ok(self.site_key(domain)?.verifying_key().to_bytes())
    }

    /// Site keys of the previous identities, newest first.
    pub fn previous_site_keys(&self, domain: &str) -> Result<Vec<SigningKey>> {
        self.previous_imks
            .iter()
            .map(|imk| common::site_signing_key(imk, domain))
            .collect()
    }

    pub fn previous_identity_count(&self) -> usize {
        self.previous_imks.len()
    }

    pub fn identity_lock_key(&self) -> [u8; KEY_LEN] {
        self.ilk
    }

    /// A fresh (SUK, VUK) pair to hand to a site on association.
    pub fn generate_server_unlock_keys(&self) -> ([u8; KEY_LEN], [u8; KEY_LEN]) {
        common::server_unlock_keys(&self.ilk)
    }
}

impl fmt::Debug for UnlockedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockedIdentity")
            .field("previous_identities", &self.previous_imks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{common::TEST_LOG_N, config::EnScryptWork, model::OptionFlags};

    fn test_config() -> ClientConfig {
        ClientConfig {
            scrypt_log_n: TEST_LOG_N,
            password_work: EnScryptWork::Iterations(1),
            rescue_code_work: EnScryptWork::Iterations(1),
            ..Default::default()
        }
    }

    fn new_client(password: &str) -> (SqrlClient, Zeroizing<String>) {
        SqrlClient::new(password, test_config()).unwrap()
    }

    #[test]
    fn test_new_identity() {
        let (client, rescue_code) = new_client("correct horse");
        assert_eq!(rescue_code.len(), 24);
        assert!(client.has_password());
        assert!(client.verify_password("correct horse"));
        assert!(!client.verify_password("wrong horse"));
        assert_eq!(client.previous_identity_count(), 0);
        assert_eq!(client.settings(), Some(IdentitySettings::default()));

        let identity = client.unlock("correct horse").unwrap();
        assert_eq!(identity.previous_identity_count(), 0);
        assert!(matches!(
            client.unlock("wrong horse"),
            Err(Error::DecryptionFailed(_))
        ));

        assert!(SqrlClient::new("", test_config()).is_err());
    }

    #[test]
    fn test_site_keys_survive_reload() {
        let (client, _) = new_client("pw");
        let idk = client.unlock("pw").unwrap().site_public_key("example.com").unwrap();

        let binary = SqrlClient::from_bytes(&client.to_binary().unwrap()).unwrap();
        assert_eq!(
            binary.unlock("pw").unwrap().site_public_key("example.com").unwrap(),
            idk
        );

        let textual = SqrlClient::from_textual(&client.to_textual().unwrap()).unwrap();
        let identity = textual.unlock("pw").unwrap();
        assert_eq!(identity.site_public_key("example.com").unwrap(), idk);
        assert_ne!(identity.site_public_key("example.org").unwrap(), idk);
    }

    #[test]
    fn test_load_rejects_unbounded_scrypt_work() {
        let (client, _) = new_client("pw");
        let binary = client.to_binary().unwrap();
        // Header, block length, type, plain text length, IV and salt come first.
        assert_eq!(binary[42], TEST_LOG_N);

        let mut huge_log_n = binary.clone();
        huge_log_n[42] = 40;
        assert!(matches!(
            SqrlClient::from_bytes(&huge_log_n),
            Err(Error::InvalidData(_))
        ));

        let mut huge_iterations = binary;
        huge_iterations[43..47].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            SqrlClient::from_bytes(&huge_iterations),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = new_client("pw");

        for (name, format) in [("id.sqrl", S4Format::Binary), ("id.txt", S4Format::Textual)] {
            let path = dir.path().join(name);
            client.write_to_file(&path, format).unwrap();
            let loaded = SqrlClient::from_file(&path).unwrap();
            assert!(loaded.verify_password("pw"));
        }

        assert!(matches!(
            SqrlClient::from_file(dir.path().join("missing")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_change_password() {
        let (mut client, _) = new_client("old");
        let idk = client.unlock("old").unwrap().site_public_key("a.com").unwrap();

        assert!(client.change_password("nope", "new").is_err());
        client.change_password("old", "new").unwrap();
        assert!(!client.verify_password("old"));
        let identity = client.unlock("new").unwrap();
        assert_eq!(identity.site_public_key("a.com").unwrap(), idk);
    }

    #[test]
    fn test_reset_password_with_rescue_code() {
        let (mut client, rescue_code) = new_client("forgotten");
        let idk = client
            .unlock("forgotten")
            .unwrap()
            .site_public_key("a.com")
            .unwrap();

        assert!(client.reset_password("0000-0000-0000-0000-0000-0000", "x").is_err());
        client.reset_password(&rescue_code, "remembered").unwrap();
        assert_eq!(
            client
                .unlock("remembered")
                .unwrap()
                .site_public_key("a.com")
                .unwrap(),
            idk
        );
    }

    #[test]
    fn test_export_rescue_only() {
        let (client, rescue_code) = new_client("pw");
        let idk = client.unlock("pw").unwrap().site_public_key("a.com").unwrap();

        let exported = client.export_rescue_only().unwrap();
        let partial = SqrlClient::from_textual(&exported).unwrap();
        assert!(!partial.has_password());
        assert!(partial.unlock("pw").is_err());

        let restored =
            SqrlClient::from_rescue_code(exported.as_bytes(), &rescue_code, "new", test_config())
                .unwrap();
        assert_eq!(
            restored.unlock("new").unwrap().site_public_key("a.com").unwrap(),
            idk
        );
    }

    #[test]
    fn test_rekey_keeps_previous_identities() {
        let (mut client, first_code) = new_client("pw");
        let first_idk = client.unlock("pw").unwrap().site_public_key("a.com").unwrap();

        let second_code = client.rekey_identity(&first_code, "pw2").unwrap();
        assert_eq!(client.previous_identity_count(), 1);
        assert!(client.rekey_identity(&first_code, "pw3").is_err());

        let identity = client.unlock("pw2").unwrap();
        let second_idk = identity.site_public_key("a.com").unwrap();
        assert_ne!(second_idk, first_idk);
        let previous = identity.previous_site_keys("a.com").unwrap();
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].verifying_key().to_bytes(), first_idk);

        let mut code = second_code;
        for _ in 0..5 {
            code = client.rekey_identity(&code, "pw").unwrap();
        }
        assert_eq!(client.previous_identity_count(), MAX_PREVIOUS_IDENTITIES);
        let identity = client.unlock("pw").unwrap();
        let previous = identity.previous_site_keys("a.com").unwrap();
        // The oldest identities fell off the end.
        assert!(previous
            .iter()
            .all(|k| k.verifying_key().to_bytes() != first_idk));

        let reloaded = SqrlClient::from_bytes(&client.to_binary().unwrap()).unwrap();
        assert_eq!(reloaded.unlock("pw").unwrap().previous_identity_count(), 4);
    }

    #[test]
    fn test_rekey_without_history() {
        let config = ClientConfig {
            max_previous_identities: 0,
            ..test_config()
        };
        let (mut client, code) = SqrlClient::new("pw", config).unwrap();
        client.rekey_identity(&code, "pw").unwrap();
        assert_eq!(client.previous_identity_count(), 0);
    }

    #[test]
    fn test_update_settings_survives_rekey() {
        let (mut client, code) = new_client("pw");
        let mut settings = IdentitySettings::default();
        settings.options.set(OptionFlags::SQRL_ONLY, true);
        settings.hint_length = 8;

        client.update_settings("pw", settings).unwrap();
        assert_eq!(client.settings(), Some(settings));
        client.rekey_identity(&code, "pw").unwrap();
        assert_eq!(client.settings(), Some(settings));
    }

    #[test]
    fn test_unlock_request_key_matches_vuk() {
        let (client, code) = new_client("pw");
        let identity = client.unlock("pw").unwrap();
        let (suk, vuk) = identity.generate_server_unlock_keys();

        let ursk = client.unlock_request_signing_key(&code, &suk).unwrap();
        assert_eq!(ursk.verifying_key().to_bytes(), vuk);
        assert!(format!("{identity:?}").contains("previous_identities"));
    }
}
