//! MS-CHAP version 2 (RFC 2759)
//!
//! This module implements the MS-CHAPv2 response and authenticator
//! computations of RFC 2759 Section 8, along with the RADIUS wire structures
//! that carry them (RFC 2548 Section 2.3).
//!
//! Every function here is a pure mapping from inputs to outputs. DES, MD4 and
//! SHA-1 come from the RustCrypto crates.
//!
//! ```text
//! GenerateNTResponse:
//!   ChallengeHash(PeerChallenge, AuthChallenge, UserName) -> Challenge (8)
//!   NtPasswordHash(Password)                              -> PasswordHash (16)
//!   ChallengeResponse(Challenge, PasswordHash)            -> NT-Response (24)
//! ```

use des::Des;
use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use md4::Md4;
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Length of the authenticator and peer challenges
pub const CHALLENGE_LENGTH: usize = 16;
/// Length of the NT-Response
pub const NT_RESPONSE_LENGTH: usize = 24;
/// Length of the "S=" authenticator response string
pub const AUTHENTICATOR_RESPONSE_LENGTH: usize = 42;
/// Longest password RFC 2759 allows, in Unicode characters
pub const MAX_PASSWORD_LENGTH: usize = 256;

/// "Magic server to client signing constant"
const MAGIC1: [u8; 39] = *b"Magic server to client signing constant";
/// "Pad to make it do more than one iteration"
const MAGIC2: [u8; 41] = *b"Pad to make it do more than one iteration";

/// MS-CHAPv2 errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MsChapV2Error {
    #[error("Password too long: {0} UTF-16 code units (max 256)")]
    PasswordTooLong(usize),
    #[error("Invalid {field} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid authenticator response format")]
    InvalidAuthenticatorResponse,
}

/// ChallengeHash (RFC 2759 Section 8.2)
///
/// SHA-1 over `peer_challenge || auth_challenge || username`, truncated to
/// 8 bytes. `username` is the name without any domain prefix.
pub fn challenge_hash(
    peer_challenge: &[u8; CHALLENGE_LENGTH],
    auth_challenge: &[u8; CHALLENGE_LENGTH],
    username: &str,
) -> [u8; 8] {
    let mut hasher = Sha1::new();
    hasher.update(peer_challenge);
    hasher.update(auth_challenge);
    hasher.update(username.as_bytes());
    let digest = hasher.finalize();

    let mut challenge = [0u8; 8];
    challenge.copy_from_slice(&digest[..8]);
    challenge
}

/// NtPasswordHash (RFC 2759 Section 8.3)
///
/// MD4 over the password encoded as UTF-16 little-endian with no byte order
/// mark.
///
/// # Errors
/// `PasswordTooLong` if the encoded password exceeds 256 characters, the
/// limit RFC 2759 places on MS-CHAPv2 passwords.
pub fn nt_password_hash(password: &str) -> Result<[u8; 16], MsChapV2Error> {
    let units: Vec<u16> = password.encode_utf16().collect();
    if units.len() > MAX_PASSWORD_LENGTH {
        return Err(MsChapV2Error::PasswordTooLong(units.len()));
    }

    let mut hasher = Md4::new();
    for unit in units {
        hasher.update(unit.to_le_bytes());
    }
    Ok(hasher.finalize().into())
}

/// HashNtPasswordHash (RFC 2759 Section 8.4)
pub fn hash_nt_password_hash(password_hash: &[u8; 16]) -> [u8; 16] {
    Md4::digest(password_hash).into()
}

/// Expand a 56-bit key chunk into an 8-byte DES key with odd parity.
///
/// Each output byte takes the next seven bits of the input stream in its top
/// bits; the low bit is the parity bit.
pub fn des_key_from_7_bytes(chunk: &[u8; 7]) -> [u8; 8] {
    let mut key = [0u8; 8];
    let mut carry = 0u8;

    for (i, &byte) in chunk.iter().enumerate() {
        key[i] = with_odd_parity(((byte >> i) | carry) & 0xFE);
        carry = byte << (7 - i);
    }
    key[7] = with_odd_parity(carry);

    key
}

fn with_odd_parity(byte: u8) -> u8 {
    if byte.count_ones() % 2 == 0 {
        byte | 0x01
    } else {
        byte
    }
}

/// The three DES keys ChallengeResponse derives from a password hash.
pub fn derive_des_keys(password_hash: &[u8; 16]) -> [[u8; 8]; 3] {
    let mut zero_padded = [0u8; 21];
    zero_padded[..16].copy_from_slice(password_hash);

    let mut keys = [[0u8; 8]; 3];
    for (key, chunk) in keys.iter_mut().zip(zero_padded.chunks_exact(7)) {
        let mut bytes = [0u8; 7];
        bytes.copy_from_slice(chunk);
        *key = des_key_from_7_bytes(&bytes);
    }
    keys
}

/// ChallengeResponse (RFC 2759 Section 8.5)
///
/// The password hash is zero-padded to 21 bytes and split into three DES
/// keys; the challenge is encrypted once under each and the three
/// ciphertexts are concatenated.
pub fn challenge_response(challenge: &[u8; 8], password_hash: &[u8; 16]) -> [u8; NT_RESPONSE_LENGTH] {
    let mut response = [0u8; NT_RESPONSE_LENGTH];

    for (out, key) in response
        .chunks_exact_mut(8)
        .zip(derive_des_keys(password_hash))
    {
        let cipher = Des::new(GenericArray::from_slice(&key));
        let mut block = GenericArray::clone_from_slice(challenge);
        cipher.encrypt_block(&mut block);
        out.copy_from_slice(&block);
    }

    response
}

/// GenerateNTResponse (RFC 2759 Section 8.1)
///
/// # Arguments
/// * `auth_challenge` - 16-byte challenge sent by the authenticator
/// * `peer_challenge` - 16-byte challenge chosen by the peer
/// * `username` - User name as sent in the response
/// * `password` - Clear-text password
///
/// # Returns
/// The 24-byte NT-Response, or an error if the password cannot be hashed.
/// An error means no response is computable; it is never a partial value.
pub fn generate_nt_response(
    auth_challenge: &[u8; CHALLENGE_LENGTH],
    peer_challenge: &[u8; CHALLENGE_LENGTH],
    username: &str,
    password: &str,
) -> Result<[u8; NT_RESPONSE_LENGTH], MsChapV2Error> {
    let challenge = challenge_hash(peer_challenge, auth_challenge, username);
    let password_hash = nt_password_hash(password)?;
    Ok(challenge_response(&challenge, &password_hash))
}

/// GenerateAuthenticatorResponse (RFC 2759 Section 8.7)
///
/// Returns `"S="` followed by 40 upper-case hex digits.
pub fn generate_authenticator_response(
    password: &str,
    nt_response: &[u8; NT_RESPONSE_LENGTH],
    peer_challenge: &[u8; CHALLENGE_LENGTH],
    auth_challenge: &[u8; CHALLENGE_LENGTH],
    username: &str,
) -> Result<String, MsChapV2Error> {
    let password_hash_hash = hash_nt_password_hash(&nt_password_hash(password)?);

    let mut hasher = Sha1::new();
    hasher.update(password_hash_hash);
    hasher.update(nt_response);
    hasher.update(MAGIC1);
    let digest = hasher.finalize();

    let challenge = challenge_hash(peer_challenge, auth_challenge, username);

    let mut hasher = Sha1::new();
    hasher.update(digest);
    hasher.update(challenge);
    hasher.update(MAGIC2);
    let digest = hasher.finalize();

    Ok(format!("S={}", hex::encode_upper(digest)))
}

/// Authenticator-side check of a peer's NT-Response
pub fn verify_nt_response(
    received: &[u8; NT_RESPONSE_LENGTH],
    auth_challenge: &[u8; CHALLENGE_LENGTH],
    peer_challenge: &[u8; CHALLENGE_LENGTH],
    username: &str,
    password: &str,
) -> Result<bool, MsChapV2Error> {
    let expected = generate_nt_response(auth_challenge, peer_challenge, username, password)?;
    Ok(constant_time_eq(received, &expected))
}

/// CheckAuthenticatorResponse (RFC 2759 Section 8.8)
///
/// Peer-side check of the "S=" string returned by the authenticator.
pub fn check_authenticator_response(
    received: &str,
    password: &str,
    nt_response: &[u8; NT_RESPONSE_LENGTH],
    peer_challenge: &[u8; CHALLENGE_LENGTH],
    auth_challenge: &[u8; CHALLENGE_LENGTH],
    username: &str,
) -> Result<bool, MsChapV2Error> {
    if received.len() != AUTHENTICATOR_RESPONSE_LENGTH || !received.starts_with("S=") {
        return Err(MsChapV2Error::InvalidAuthenticatorResponse);
    }
    let expected =
        generate_authenticator_response(password, nt_response, peer_challenge, auth_challenge, username)?;
    Ok(constant_time_eq(received.as_bytes(), expected.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// MS-CHAP2-Response attribute value (RFC 2548 Section 2.3.2)
///
/// ```text
/// | Ident (1) | Flags (1) | Peer-Challenge (16) | Reserved (8) | Response (24) |
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsChap2Response {
    pub ident: u8,
    pub flags: u8,
    pub peer_challenge: [u8; CHALLENGE_LENGTH],
    pub nt_response: [u8; NT_RESPONSE_LENGTH],
}

impl MsChap2Response {
    pub const LENGTH: usize = 50;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MsChapV2Error> {
        if bytes.len() != Self::LENGTH {
            return Err(MsChapV2Error::InvalidLength {
                field: "MS-CHAP2-Response",
                expected: Self::LENGTH,
                actual: bytes.len(),
            });
        }

        let mut peer_challenge = [0u8; CHALLENGE_LENGTH];
        peer_challenge.copy_from_slice(&bytes[2..18]);
        let mut nt_response = [0u8; NT_RESPONSE_LENGTH];
        nt_response.copy_from_slice(&bytes[26..50]);

        Ok(MsChap2Response {
            ident: bytes[0],
            flags: bytes[1],
            peer_challenge,
            nt_response,
        })
    }

    /// Reserved bytes are written as zero.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::LENGTH);
        bytes.push(self.ident);
        bytes.push(self.flags);
        bytes.extend_from_slice(&self.peer_challenge);
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend_from_slice(&self.nt_response);
        bytes
    }
}

/// MS-CHAP2-Success attribute value (RFC 2548 Section 2.3.3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsChap2Success {
    pub ident: u8,
    /// "S=" followed by 40 hex digits
    pub authenticator_response: String,
}

impl MsChap2Success {
    pub const LENGTH: usize = 1 + AUTHENTICATOR_RESPONSE_LENGTH;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MsChapV2Error> {
        if bytes.len() != Self::LENGTH {
            return Err(MsChapV2Error::InvalidLength {
                field: "MS-CHAP2-Success",
                expected: Self::LENGTH,
                actual: bytes.len(),
            });
        }
        let authenticator_response = std::str::from_utf8(&bytes[1..])
            .map_err(|_| MsChapV2Error::InvalidAuthenticatorResponse)?;
        if !authenticator_response.starts_with("S=") {
            return Err(MsChapV2Error::InvalidAuthenticatorResponse);
        }

        Ok(MsChap2Success {
            ident: bytes[0],
            authenticator_response: authenticator_response.to_string(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::LENGTH);
        bytes.push(self.ident);
        bytes.extend_from_slice(self.authenticator_response.as_bytes());
        bytes
    }
}
