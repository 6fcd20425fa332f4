//! Compact JWE (RFC 7516) with ECDH-ES direct key agreement and A128CBC-HS256.
//!
//! This is the `direct_post.jwt` response encryption of OpenID4VP: the wallet agrees a
//! key with the verifier's advertised P-256 key and encrypts the response claims.
//! The content encryption key is derived with the Concat KDF of RFC 7518 section 4.6,
//! with `apu` and `apv` as PartyUInfo and PartyVInfo.

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use p256::ecdh::diffie_hellman;
use p256::{PublicKey, SecretKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{b64url, b64url_decode, Error, PublicKeyJwk};

pub const ALG_ECDH_ES: &str = "ECDH-ES";
pub const ENC_A128CBC_HS256: &str = "A128CBC-HS256";

const CEK_LEN: usize = 32;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// The JWE protected header.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Header {
    pub alg: String,
    pub enc: String,
    pub epk: PublicKeyJwk,
    /// Agreement PartyUInfo, base64url. For mdoc responses this is the mdoc-generated nonce.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apu: Option<String>,
    /// Agreement PartyVInfo, base64url. For mdoc responses this is the request nonce.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// A decrypted JWE.
#[derive(Clone, Debug)]
pub struct Decrypted {
    pub header: Header,
    pub plaintext: Vec<u8>,
}

/// Encrypt `plaintext` to `recipient`.
pub fn encrypt(
    plaintext: &[u8],
    recipient: &PublicKey,
    apu: Option<&str>,
    apv: Option<&str>,
) -> Result<String, Error> {
    let ephemeral = SecretKey::random(&mut rand::thread_rng());
    let header = Header {
        alg: ALG_ECDH_ES.into(),
        enc: ENC_A128CBC_HS256.into(),
        epk: PublicKeyJwk::from(&ephemeral.public_key()),
        apu: apu.map(str::to_string),
        apv: apv.map(str::to_string),
        kid: None,
    };
    let cek = derive_cek(&ephemeral, recipient, &header)?;
    let protected = b64url(serde_json::to_vec(&header)?);

    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let (mac_key, enc_key) = cek.split_at(CEK_LEN / 2);
    let ciphertext = cbc::Encryptor::<Aes128>::new_from_slices(enc_key, &iv)
        .map_err(|_| Error::Encryption)?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let tag = authentication_tag(mac_key, protected.as_bytes(), &iv, &ciphertext)?;

    Ok(format!(
        "{protected}..{}.{}.{}",
        b64url(iv),
        b64url(ciphertext),
        b64url(tag)
    ))
}

/// Decrypt a compact JWE addressed to `recipient`.
pub fn decrypt(token: &str, recipient: &SecretKey) -> Result<Decrypted, Error> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    let [protected, encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
        return Err(Error::Malformed("JWE compact serialization"));
    };
    let header: Header = serde_json::from_slice(&b64url_decode(protected)?)?;
    if header.alg != ALG_ECDH_ES {
        return Err(Error::UnsupportedAlgorithm(header.alg));
    }
    if header.enc != ENC_A128CBC_HS256 {
        return Err(Error::UnsupportedAlgorithm(header.enc));
    }
    if !encrypted_key.is_empty() {
        return Err(Error::Malformed("JWE encrypted key for direct key agreement"));
    }

    let epk = header.epk.to_public_key()?;
    let cek = derive_cek(recipient, &epk, &header)?;
    let (mac_key, enc_key) = cek.split_at(CEK_LEN / 2);

    let iv = b64url_decode(iv)?;
    let ciphertext = b64url_decode(ciphertext)?;
    let tag = b64url_decode(tag)?;
    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(Error::Malformed("JWE initialization vector or tag"));
    }

    hmac_for(mac_key, protected.as_bytes(), &iv, &ciphertext)?
        .verify_truncated_left(&tag)
        .map_err(|_| Error::Decryption)?;

    let plaintext = cbc::Decryptor::<Aes128>::new_from_slices(enc_key, &iv)
        .map_err(|_| Error::Decryption)?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| Error::Decryption)?;

    Ok(Decrypted { header, plaintext })
}

fn derive_cek(secret: &SecretKey, public: &PublicKey, header: &Header) -> Result<Vec<u8>, Error> {
    let shared = diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    let apu = header.apu.as_deref().map(b64url_decode).transpose()?;
    let apv = header.apv.as_deref().map(b64url_decode).transpose()?;
    Ok(concat_kdf(
        shared.raw_secret_bytes(),
        header.enc.as_bytes(),
        apu.as_deref().unwrap_or_default(),
        apv.as_deref().unwrap_or_default(),
    ))
}

/// NIST SP 800-56A Concat KDF with SHA-256, producing a 256-bit key.
fn concat_kdf(z: &[u8], algorithm_id: &[u8], apu: &[u8], apv: &[u8]) -> Vec<u8> {
    let with_length = |data: &[u8]| [&(data.len() as u32).to_be_bytes()[..], data].concat();
    let key_bits = (CEK_LEN as u32 * 8).to_be_bytes();
    Sha256::new()
        .chain_update(1u32.to_be_bytes())
        .chain_update(z)
        .chain_update(with_length(algorithm_id))
        .chain_update(with_length(apu))
        .chain_update(with_length(apv))
        .chain_update(key_bits)
        .finalize()
        .to_vec()
}

fn hmac_for(mac_key: &[u8], aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Hmac<Sha256>, Error> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(mac_key).map_err(|_| Error::KeyDerivation)?;
    let al = (aad.len() as u64 * 8).to_be_bytes();
    mac.update(aad);
    mac.update(iv);
    mac.update(ciphertext);
    mac.update(&al);
    Ok(mac)
}

fn authentication_tag(
    mac_key: &[u8],
    aad: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, Error> {
    let mac = hmac_for(mac_key, aad, iv, ciphertext)?;
    Ok(mac.finalize().into_bytes()[..TAG_LEN].to_vec())
}
