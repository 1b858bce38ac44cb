//! Password-derived payload ciphers.
//!
//! Key schedule for password `P` and nonce `N`:
//!
//! ```text
//! K   = MD5(P)
//! key = MD5(K || N)                          128-bit algorithms
//! key = MD5(K || N) || MD5(K || N || N)      256-bit algorithms
//! iv  = MD5(N)
//! ```
//!
//! Each `MD5(K || m)` is the keyed checksum digest with key `K`, body `m` and
//! an empty salt. Mode and key length both come from [`CipherAlgorithm`].

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use thiserror::Error;
use zeroize::Zeroizing;

use super::checksum::{digest_with_key, md5, HmacType};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Streaming read size for CTR mode.
const CHUNK_SIZE: usize = 4096;

/// Errors from payload ciphering
#[derive(Debug, Error)]
pub enum CipherError {
    /// Derived key or IV has the wrong length for the algorithm
    #[error("invalid key or IV length for {0}")]
    InvalidLength(CipherAlgorithm),

    /// CBC input is not a whole number of blocks or padding is corrupt
    #[error("bad padding in {0} ciphertext")]
    Padding(CipherAlgorithm),

    /// Unknown cipher name
    #[error("unknown cipher: {0}")]
    UnknownAlgorithm(String),

    /// Reading input or writing output failed
    #[error("cipher I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Supported payload ciphers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherAlgorithm {
    AesCtr128,
    AesCtr256,
    AesCbc128,
    AesCbc256,
}

impl CipherAlgorithm {
    /// Protocol name.
    pub fn name(self) -> &'static str {
        match self {
            Self::AesCtr128 => "aes-ctr-128",
            Self::AesCtr256 => "aes-ctr-256",
            Self::AesCbc128 => "aes-cbc-128",
            Self::AesCbc256 => "aes-cbc-256",
        }
    }

    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::AesCtr128 | Self::AesCbc128 => 16,
            Self::AesCtr256 | Self::AesCbc256 => 32,
        }
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherAlgorithm {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes-ctr-128" => Ok(Self::AesCtr128),
            "aes-ctr-256" => Ok(Self::AesCtr256),
            "aes-cbc-128" => Ok(Self::AesCbc128),
            "aes-cbc-256" => Ok(Self::AesCbc256),
            other => Err(CipherError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Direction of a cipher pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Encryption,
    Decryption,
}

/// Key and IV derived from a password and nonce.
pub struct KeyIv {
    key: Zeroizing<Vec<u8>>,
    iv: [u8; 16],
}

impl KeyIv {
    /// Derive from a clear password.
    pub fn derive(algorithm: CipherAlgorithm, password: &[u8], nonce: &[u8]) -> Self {
        Self::derive_from_digest(algorithm, &md5(password), nonce)
    }

    /// Derive from `MD5(password)`.
    pub fn derive_from_digest(algorithm: CipherAlgorithm, password_md5: &[u8], nonce: &[u8]) -> Self {
        let mut key = Zeroizing::new(digest_with_key(HmacType::Md5, password_md5, nonce, &[]));
        if algorithm.key_len() == 32 {
            let mut doubled = nonce.to_vec();
            doubled.extend_from_slice(nonce);
            key.extend(digest_with_key(HmacType::Md5, password_md5, &doubled, &[]));
        }
        Self {
            key,
            iv: md5(nonce),
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; 16] {
        &self.iv
    }
}

impl fmt::Debug for KeyIv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyIv")
            .field("key", &"[REDACTED]")
            .field("iv", &self.iv)
            .finish()
    }
}

/// Cipher `input` into `output` in one pass with a key derived from
/// `password` and `nonce`. Returns the number of bytes written.
pub fn cipher<R: Read, W: Write>(
    mode: CipherMode,
    algorithm: CipherAlgorithm,
    password: &[u8],
    nonce: &[u8],
    input: R,
    output: W,
) -> Result<u64, CipherError> {
    let key_iv = KeyIv::derive(algorithm, password, nonce);
    cipher_with_key(mode, algorithm, &key_iv, input, output)
}

/// Cipher a byte slice with a key derived from `password` and `nonce`.
pub fn cipher_bytes(
    mode: CipherMode,
    algorithm: CipherAlgorithm,
    password: &[u8],
    nonce: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let mut out = Vec::with_capacity(data.len() + 16);
    cipher(mode, algorithm, password, nonce, data, &mut out)?;
    Ok(out)
}

/// Cipher `input` into `output` with an already derived key.
pub fn cipher_with_key<R: Read, W: Write>(
    mode: CipherMode,
    algorithm: CipherAlgorithm,
    key_iv: &KeyIv,
    input: R,
    output: W,
) -> Result<u64, CipherError> {
    let (key, iv) = (key_iv.key(), key_iv.iv().as_slice());
    let invalid = |_| CipherError::InvalidLength(algorithm);

    match algorithm {
        // CTR is symmetric: the same keystream encrypts and decrypts.
        CipherAlgorithm::AesCtr128 => {
            stream(Aes128Ctr::new_from_slices(key, iv).map_err(invalid)?, input, output)
        }
        CipherAlgorithm::AesCtr256 => {
            stream(Aes256Ctr::new_from_slices(key, iv).map_err(invalid)?, input, output)
        }
        CipherAlgorithm::AesCbc128 | CipherAlgorithm::AesCbc256 => {
            let data = read_all(input)?;
            let result = match (algorithm, mode) {
                (CipherAlgorithm::AesCbc128, CipherMode::Encryption) => {
                    Aes128CbcEnc::new_from_slices(key, iv)
                        .map_err(invalid)?
                        .encrypt_padded_vec_mut::<Pkcs7>(&data)
                }
                (CipherAlgorithm::AesCbc128, CipherMode::Decryption) => {
                    Aes128CbcDec::new_from_slices(key, iv)
                        .map_err(invalid)?
                        .decrypt_padded_vec_mut::<Pkcs7>(&data)
                        .map_err(|_| CipherError::Padding(algorithm))?
                }
                (_, CipherMode::Encryption) => Aes256CbcEnc::new_from_slices(key, iv)
                    .map_err(invalid)?
                    .encrypt_padded_vec_mut::<Pkcs7>(&data),
                (_, CipherMode::Decryption) => Aes256CbcDec::new_from_slices(key, iv)
                    .map_err(invalid)?
                    .decrypt_padded_vec_mut::<Pkcs7>(&data)
                    .map_err(|_| CipherError::Padding(algorithm))?,
            };
            let mut output = output;
            output.write_all(&result)?;
            Ok(result.len() as u64)
        }
    }
}

fn stream<C: StreamCipher, R: Read, W: Write>(
    mut cipher: C,
    mut input: R,
    mut output: W,
) -> Result<u64, CipherError> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        cipher.apply_keystream(&mut buf[..n]);
        output.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok(total)
}

fn read_all<R: Read>(mut input: R) -> Result<Vec<u8>, CipherError> {
    let mut data = Vec::new();
    input.read_to_end(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const NONCE: [u8; 8] = hex!("1234567890ABCDEF");

    #[test]
    fn test_key_schedule_128() {
        assert_eq!(md5(b"password"), hex!("5f4dcc3b5aa765d61d8327deb882cf99"));

        let key_iv = KeyIv::derive(CipherAlgorithm::AesCtr128, b"password", &NONCE);
        assert_eq!(key_iv.key(), hex!("ee4f265e9aff0d543f9b76373cdcfd64"));
        assert_eq!(key_iv.iv(), &hex!("799d4f0bec27aff89de30b35e3ca4332"));
    }

    #[test]
    fn test_key_schedule_256_concatenates_two_checksums() {
        let key_iv = KeyIv::derive(CipherAlgorithm::AesCbc256, b"password", &NONCE);
        let k = md5(b"password");
        let mut doubled = NONCE.to_vec();
        doubled.extend_from_slice(&NONCE);

        let mut expected = digest_with_key(HmacType::Md5, &k, &NONCE, &[]);
        expected.extend(digest_with_key(HmacType::Md5, &k, &doubled, &[]));
        assert_eq!(key_iv.key(), expected.as_slice());
        assert_eq!(
            key_iv.key(),
            hex!("ee4f265e9aff0d543f9b76373cdcfd642aa4771474c4a6c06e74f2b7c15e030d")
        );
        assert_eq!(key_iv.iv(), &hex!("799d4f0bec27aff89de30b35e3ca4332"));
    }

    #[test]
    fn test_known_ciphertexts() {
        let cases: [(CipherAlgorithm, &[u8]); 4] = [
            (CipherAlgorithm::AesCtr128, &hex!("3f3d6e85b3")),
            (CipherAlgorithm::AesCtr256, &hex!("02d4d73ca9")),
            (CipherAlgorithm::AesCbc128, &hex!("aae7a52089ee31af317582ef7f19811d")),
            (CipherAlgorithm::AesCbc256, &hex!("16feee654efdc9cb6bec9ab488327bfb")),
        ];
        for (algorithm, expected) in cases {
            let encrypted =
                cipher_bytes(CipherMode::Encryption, algorithm, b"password", &NONCE, b"input")
                    .unwrap();
            assert_eq!(encrypted, expected, "{algorithm}");

            let decrypted =
                cipher_bytes(CipherMode::Decryption, algorithm, b"password", &NONCE, &encrypted)
                    .unwrap();
            assert_eq!(decrypted, b"input", "{algorithm}");
        }
    }

    #[test]
    fn test_ctr_streams_across_chunks() {
        let data: Vec<u8> = (0..40).collect();
        let encrypted = cipher_bytes(
            CipherMode::Encryption,
            CipherAlgorithm::AesCtr128,
            b"password",
            &NONCE,
            &data,
        )
        .unwrap();
        assert_eq!(
            encrypted,
            hex!("56521cf3c3afa4505022d249a8af74f58a84df12d4a15da5f9c862df28b42107b12627371f7e37a4")
        );
    }

    #[test]
    fn test_cbc_rejects_truncated_ciphertext() {
        let result = cipher_bytes(
            CipherMode::Decryption,
            CipherAlgorithm::AesCbc128,
            b"password",
            &NONCE,
            &[0u8; 15],
        );
        assert!(matches!(result, Err(CipherError::Padding(_))));
    }

    #[test]
    fn test_algorithm_names() {
        for algorithm in [
            CipherAlgorithm::AesCtr128,
            CipherAlgorithm::AesCtr256,
            CipherAlgorithm::AesCbc128,
            CipherAlgorithm::AesCbc256,
        ] {
            assert_eq!(algorithm.name().parse::<CipherAlgorithm>().unwrap(), algorithm);
        }
    }
}
