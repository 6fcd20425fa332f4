//! Single-shot HPKE (RFC 9180) in base mode with the suite
//! DHKEM(P-256, HKDF-SHA256), HKDF-SHA256 and AES-128-GCM.
//!
//! The browser transports encrypt the `DeviceResponse` to the verifier's session key with
//! an empty `info` and the session transcript as additional authenticated data.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Nonce};
use hkdf::Hkdf;
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use sha2::Sha256;

use super::Error;

const KEM_ID: u16 = 0x0010;
const KDF_ID: u16 = 0x0001;
const AEAD_ID: u16 = 0x0001;
const MODE_BASE: u8 = 0x00;
const N_SECRET: usize = 32;
const N_K: usize = 16;
const N_N: usize = 12;

/// Encapsulated key and ciphertext produced by [`seal`].
#[derive(Debug, Clone)]
pub struct Sealed {
    /// The sender's ephemeral public key, uncompressed.
    pub enc: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Encrypt `plaintext` to `recipient`.
pub fn seal(
    recipient: &PublicKey,
    info: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Sealed, Error> {
    let ephemeral = SecretKey::random(&mut rand::thread_rng());
    let enc = ephemeral.public_key().to_encoded_point(false).as_bytes().to_vec();
    let dh = diffie_hellman(ephemeral.to_nonzero_scalar(), recipient.as_affine());
    let shared_secret = extract_and_expand(
        dh.raw_secret_bytes(),
        &[enc.as_slice(), recipient.to_encoded_point(false).as_bytes()].concat(),
    )?;
    let (key, nonce) = key_schedule(&shared_secret, info)?;
    let ciphertext = Aes128Gcm::new_from_slice(&key)
        .map_err(|_| Error::Encryption)?
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|_| Error::Encryption)?;
    Ok(Sealed { enc, ciphertext })
}

/// Decrypt a ciphertext sealed to `recipient` with the encapsulated key `enc`.
pub fn open(
    recipient: &SecretKey,
    enc: &PublicKey,
    info: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, Error> {
    let dh = diffie_hellman(recipient.to_nonzero_scalar(), enc.as_affine());
    let kem_context = [
        enc.to_encoded_point(false).as_bytes(),
        recipient.public_key().to_encoded_point(false).as_bytes(),
    ]
    .concat();
    let shared_secret = extract_and_expand(dh.raw_secret_bytes(), &kem_context)?;
    let (key, nonce) = key_schedule(&shared_secret, info)?;
    Aes128Gcm::new_from_slice(&key)
        .map_err(|_| Error::Decryption)?
        .decrypt(Nonce::from_slice(&nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| Error::Decryption)
}

fn kem_suite_id() -> Vec<u8> {
    [b"KEM".as_slice(), &KEM_ID.to_be_bytes()].concat()
}

fn hpke_suite_id() -> Vec<u8> {
    [
        b"HPKE".as_slice(),
        &KEM_ID.to_be_bytes(),
        &KDF_ID.to_be_bytes(),
        &AEAD_ID.to_be_bytes(),
    ]
    .concat()
}

fn labeled_extract(suite_id: &[u8], salt: &[u8], label: &[u8], ikm: &[u8]) -> Vec<u8> {
    let labeled_ikm = [b"HPKE-v1".as_slice(), suite_id, label, ikm].concat();
    let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), &labeled_ikm);
    prk.to_vec()
}

fn labeled_expand(
    suite_id: &[u8],
    prk: &[u8],
    label: &[u8],
    info: &[u8],
    len: usize,
) -> Result<Vec<u8>, Error> {
    let length = u16::try_from(len).map_err(|_| Error::KeyDerivation)?;
    let labeled_info = [
        length.to_be_bytes().as_slice(),
        b"HPKE-v1",
        suite_id,
        label,
        info,
    ]
    .concat();
    let hkdf = Hkdf::<Sha256>::from_prk(prk).map_err(|_| Error::KeyDerivation)?;
    let mut okm = vec![0u8; len];
    hkdf.expand(&labeled_info, &mut okm)
        .map_err(|_| Error::KeyDerivation)?;
    Ok(okm)
}

fn extract_and_expand(dh: &[u8], kem_context: &[u8]) -> Result<Vec<u8>, Error> {
    let suite_id = kem_suite_id();
    let eae_prk = labeled_extract(&suite_id, b"", b"eae_prk", dh);
    labeled_expand(&suite_id, &eae_prk, b"shared_secret", kem_context, N_SECRET)
}

fn key_schedule(shared_secret: &[u8], info: &[u8]) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let suite_id = hpke_suite_id();
    let psk_id_hash = labeled_extract(&suite_id, b"", b"psk_id_hash", b"");
    let info_hash = labeled_extract(&suite_id, b"", b"info_hash", info);
    let context = [&[MODE_BASE][..], &psk_id_hash, &info_hash].concat();
    let secret = labeled_extract(&suite_id, shared_secret, b"secret", b"");
    let key = labeled_expand(&suite_id, &secret, b"key", &context, N_K)?;
    let nonce = labeled_expand(&suite_id, &secret, b"base_nonce", &context, N_N)?;
    Ok((key, nonce))
}
