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

//! Crypto building blocks shared by the data blocks and the protocol.

use std::time::{Duration, Instant};

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::{
    alphabet,
    engine::{general_purpose::GeneralPurposeConfig, DecodePaddingMode, GeneralPurpose},
};
use ed25519_dalek::SigningKey;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::{
    config::EnScryptWork,
    errors::{Error, Result},
};

pub const KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 16;
pub const IV_LEN: usize = 12;
pub const RESCUE_CODE_DIGITS: usize = 24;

const EN_HASH_ROUNDS: usize = 16;
const SCRYPT_R: u32 = 256;
const SCRYPT_P: u32 = 1;

/// Scrypt needs 128 * r * N bytes, so log_n 14 with r = 256 already takes
/// 512MB. Identities use 9.
pub const MAX_SCRYPT_LOG_N: u8 = 14;
/// Upper bound of EnScrypt iterations, written or read.
pub const MAX_EN_SCRYPT_ITERATIONS: u32 = 100_000;

pub type Key = Zeroizing<[u8; KEY_LEN]>;

/// base64url without padding on output, accepting padded input.
pub const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// Small enough to keep debug test runs fast.
#[cfg(test)]
pub(crate) const TEST_LOG_N: u8 = 4;

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

pub fn random_key() -> Key {
    Zeroizing::new(random_bytes::<KEY_LEN>())
}

/// Chained SHA-256 whose result is the XOR of every round's output.
pub fn en_hash(input: &[u8; KEY_LEN]) -> Key {
    let mut result = Zeroizing::new([0u8; KEY_LEN]);
    let mut current = Zeroizing::new(*input);
    for _ in 0..EN_HASH_ROUNDS {
        *current = Sha256::digest(current.as_slice()).into();
        xor_into(&mut result, &current);
    }
    result
}

fn xor_into(acc: &mut [u8; KEY_LEN], other: &[u8; KEY_LEN]) {
    for (a, b) in acc.iter_mut().zip(other.iter()) {
        *a ^= b;
    }
}

fn scrypt_params(log_n: u8) -> Result<scrypt::Params> {
    if log_n == 0 || log_n > MAX_SCRYPT_LOG_N {
        return Err(Error::Crypto(format!(
            "scrypt log_n:{log_n} out of range 1..={MAX_SCRYPT_LOG_N}"
        )));
    }
    scrypt::Params::new(log_n, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|e| Error::Crypto(format!("invalid scrypt params, log_n:{log_n}, err:{e}")))
}

/// Iterated scrypt, each round salted with the previous round's output.
pub fn en_scrypt(password: &[u8], salt: &[u8], log_n: u8, iterations: u32) -> Result<Key> {
    if iterations == 0 || iterations > MAX_EN_SCRYPT_ITERATIONS {
        return Err(Error::Crypto(format!(
            "EnScrypt iterations:{iterations} out of range 1..={MAX_EN_SCRYPT_ITERATIONS}"
        )));
    }

    let params = scrypt_params(log_n)?;
    let mut state = EnScryptState::new(password, salt);
    for _ in 0..iterations {
        state.round(&params)?;
    }
    Ok(state.result)
}

/// Runs EnScrypt until `duration` elapsed, returning the key and the number
/// of iterations needed to derive it again.
pub fn en_scrypt_for(
    password: &[u8],
    salt: &[u8],
    log_n: u8,
    duration: Duration,
) -> Result<(Key, u32)> {
    let params = scrypt_params(log_n)?;
    let mut state = EnScryptState::new(password, salt);
    let started = Instant::now();
    let mut iterations = 0u32;
    loop {
        state.round(&params)?;
        iterations += 1;
        if started.elapsed() >= duration || iterations == MAX_EN_SCRYPT_ITERATIONS {
            break;
        }
    }
    Ok((state.result, iterations))
}

pub fn en_scrypt_with_work(
    password: &[u8],
    salt: &[u8],
    log_n: u8,
    work: EnScryptWork,
) -> Result<(Key, u32)> {
    match work {
        EnScryptWork::Iterations(n) => Ok((en_scrypt(password, salt, log_n, n)?, n)),
        EnScryptWork::Duration(d) => en_scrypt_for(password, salt, log_n, d),
    }
}

struct EnScryptState<'a> {
    password: &'a [u8],
    salt: Zeroizing<Vec<u8>>,
    result: Key,
}

impl<'a> EnScryptState<'a> {
    fn new(password: &'a [u8], salt: &[u8]) -> Self {
        Self {
            password,
            salt: Zeroizing::new(salt.to_vec()),
            result: Zeroizing::new([0u8; KEY_LEN]),
        }
    }

    fn round(&mut self, params: &scrypt::Params) -> Result<()> {
        let mut output = Zeroizing::new([0u8; KEY_LEN]);
        scrypt::scrypt(self.password, &self.salt, params, output.as_mut_slice())
            .map_err(|e| Error::Crypto(format!("scrypt failed, err:{e}")))?;
        xor_into(&mut self.result, &output);
        self.salt = Zeroizing::new(output.to_vec());
        Ok(())
    }
}

/// A fresh 24 digit rescue code, digits only.
pub fn generate_rescue_code() -> Zeroizing<String> {
    let mut rng = OsRng;
    let code = (0..RESCUE_CODE_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect::<String>();
    Zeroizing::new(code)
}

/// Groups the digits as `dddd-dddd-dddd-dddd-dddd-dddd` for display.
pub fn format_rescue_code(rescue_code: &str) -> Result<String> {
    let digits = normalize_rescue_code(rescue_code)?;
    let groups: Vec<&str> = digits
        .as_bytes()
        .chunks(4)
        .map(|c| std::str::from_utf8(c).unwrap_or_default())
        .collect();
    Ok(groups.join("-"))
}

/// Strips every non-digit, the result must be exactly 24 digits.
pub fn normalize_rescue_code(rescue_code: &str) -> Result<Zeroizing<String>> {
    let mut digits = Zeroizing::new(String::with_capacity(RESCUE_CODE_DIGITS));
    digits.extend(rescue_code.chars().filter(|c| c.is_ascii_digit()));

    if digits.len() != RESCUE_CODE_DIGITS {
        return Err(Error::InvalidRescueCode(format!(
            "expect {RESCUE_CODE_DIGITS} digits, got {}",
            digits.len()
        )));
    }
    Ok(digits)
}

/// The X25519 public key of the identity unlock key.
pub fn identity_lock_key(iuk: &[u8; KEY_LEN]) -> [u8; KEY_LEN] {
    let secret = StaticSecret::from(*iuk);
    PublicKey::from(&secret).to_bytes()
}

/// The per-site Ed25519 key, seeded by HMAC-SHA256(imk, domain).
pub fn site_signing_key(imk: &[u8; KEY_LEN], domain: &str) -> Result<SigningKey> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(imk)
        .map_err(|e| Error::Crypto(format!("failed to create hmac, err:{e}")))?;
    mac.update(domain.as_bytes());
    let seed: Zeroizing<[u8; KEY_LEN]> = Zeroizing::new(mac.finalize().into_bytes().into());
    Ok(SigningKey::from_bytes(&seed))
}

/// A fresh (SUK, VUK) pair for a new server association.
pub fn server_unlock_keys(ilk: &[u8; KEY_LEN]) -> ([u8; KEY_LEN], [u8; KEY_LEN]) {
    let rlk = StaticSecret::from(*random_key());
    let suk = PublicKey::from(&rlk).to_bytes();
    let shared = rlk.diffie_hellman(&PublicKey::from(*ilk));
    let vuk = SigningKey::from_bytes(shared.as_bytes())
        .verifying_key()
        .to_bytes();
    (suk, vuk)
}

/// The key whose public half equals the VUK paired with `suk`.
pub fn unlock_request_signing_key(iuk: &[u8; KEY_LEN], suk: &[u8; KEY_LEN]) -> SigningKey {
    let secret = StaticSecret::from(*iuk);
    let shared = secret.diffie_hellman(&PublicKey::from(*suk));
    SigningKey::from_bytes(shared.as_bytes())
}

/// AES-256-GCM, returning the ciphertext and the detached tag.
pub fn aes_gcm_encrypt(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; TAG_LEN])> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("bad aes key, err:{e}")))?;
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(iv), Payload { msg: plaintext, aad })
        .map_err(|_| Error::Crypto("aes-gcm encryption failed".to_string()))?;
    let tag_start = sealed.len() - TAG_LEN;
    let tag: [u8; TAG_LEN] = sealed[tag_start..].try_into()?;
    sealed.truncate(tag_start);
    Ok((sealed, tag))
}

/// Counterpart of [`aes_gcm_encrypt`], `None` when the tag does not verify.
pub fn aes_gcm_decrypt(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
) -> Result<Option<Zeroizing<Vec<u8>>>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("bad aes key, err:{e}")))?;
    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);
    Ok(cipher
        .decrypt(Nonce::from_slice(iv), Payload { msg: &sealed, aad })
        .ok()
        .map(Zeroizing::new))
}
