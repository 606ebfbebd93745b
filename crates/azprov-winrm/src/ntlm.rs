//! NTLMv2 over HTTP.
//!
//! Three messages carried in `Authorization` / `WWW-Authenticate` headers:
//! the client's NEGOTIATE, the server's CHALLENGE and the client's
//! AUTHENTICATE. The exchange authenticates the TCP connection, so the
//! transport keeps using the same connection afterwards.

use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use log::debug;
use md4::{Digest, Md4};
use md5::Md5;

use crate::auth::AuthProvider;
use crate::types::*;

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;
const NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
const NEGOTIATE_128: u32 = 0x2000_0000;
const NEGOTIATE_56: u32 = 0x8000_0000;

const CLIENT_FLAGS: u32 = NEGOTIATE_UNICODE
    | REQUEST_TARGET
    | NEGOTIATE_NTLM
    | NEGOTIATE_ALWAYS_SIGN
    | NEGOTIATE_EXTENDED_SESSIONSECURITY
    | NEGOTIATE_128
    | NEGOTIATE_56;

const MSV_AV_EOL: u16 = 0;
const MSV_AV_TIMESTAMP: u16 = 7;

/// Fixed part of an AUTHENTICATE message without version and MIC.
const AUTHENTICATE_HEADER_LEN: u32 = 64;

/// Seconds from 1601-01-01 to 1970-01-01.
const FILETIME_UNIX_OFFSET: i64 = 11_644_473_600;

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
}

fn auth_error(message: impl Into<String>) -> WinRmError {
    WinRmError::new(WinRmErrorKind::Auth, message)
}

fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> WinRmResult<[u8; 16]> {
    let mut mac = Hmac::<Md5>::new_from_slice(key)
        .map_err(|e| auth_error(format!("HMAC-MD5 key rejected: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// MD4 of the UTF-16LE password.
pub fn nt_hash(password: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Md4::digest(utf16le(password)));
    out
}

/// NTOWFv2: HMAC-MD5 keyed with the NT hash over `UPPER(user) || domain`.
pub fn ntowf_v2(password: &str, username: &str, domain: &str) -> WinRmResult<[u8; 16]> {
    let identity = utf16le(&format!("{}{}", username.to_uppercase(), domain));
    hmac_md5(&nt_hash(password), &[identity.as_slice()])
}

pub fn lmv2_response(
    key: &[u8; 16],
    server_challenge: &[u8; 8],
    client_challenge: &[u8; 8],
) -> WinRmResult<[u8; 24]> {
    let proof = hmac_md5(key, &[server_challenge.as_slice(), client_challenge.as_slice()])?;
    let mut out = [0u8; 24];
    out[..16].copy_from_slice(&proof);
    out[16..].copy_from_slice(client_challenge);
    Ok(out)
}

/// NTProofStr followed by the client blob it signs.
pub fn ntlmv2_response(
    key: &[u8; 16],
    server_challenge: &[u8; 8],
    client_challenge: &[u8; 8],
    timestamp: u64,
    target_info: &[u8],
) -> WinRmResult<Vec<u8>> {
    let mut blob = Vec::with_capacity(32 + target_info.len());
    blob.extend_from_slice(&[0x01, 0x01, 0, 0, 0, 0, 0, 0]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(client_challenge);
    blob.extend_from_slice(&[0; 4]);
    blob.extend_from_slice(target_info);
    blob.extend_from_slice(&[0; 4]);

    let proof = hmac_md5(key, &[server_challenge.as_slice(), blob.as_slice()])?;
    let mut response = proof.to_vec();
    response.extend_from_slice(&blob);
    Ok(response)
}

/// Current time as a Windows FILETIME (100 ns ticks since 1601).
pub fn filetime_now() -> u64 {
    let now = Utc::now();
    let secs = (now.timestamp() + FILETIME_UNIX_OFFSET).max(0) as u64;
    secs * 10_000_000 + u64::from(now.timestamp_subsec_nanos() / 100)
}

pub fn negotiate_message() -> Vec<u8> {
    let mut msg = Vec::with_capacity(32);
    msg.extend_from_slice(SIGNATURE);
    msg.extend_from_slice(&1u32.to_le_bytes());
    msg.extend_from_slice(&CLIENT_FLAGS.to_le_bytes());
    // empty domain and workstation fields
    msg.extend_from_slice(&[0u8; 16]);
    msg
}

/// The parts of a CHALLENGE message the response depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub flags: u32,
    pub server_challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

impl Challenge {
    pub fn parse(msg: &[u8]) -> WinRmResult<Self> {
        if msg.len() < 32 || &msg[..8] != SIGNATURE || msg[8..12] != 2u32.to_le_bytes() {
            return Err(auth_error("response is not an NTLM challenge message"));
        }
        let flags = u32::from_le_bytes([msg[20], msg[21], msg[22], msg[23]]);
        let mut server_challenge = [0u8; 8];
        server_challenge.copy_from_slice(&msg[24..32]);

        let target_info = if msg.len() >= 48 {
            let len = usize::from(u16::from_le_bytes([msg[40], msg[41]]));
            let offset = u32::from_le_bytes([msg[44], msg[45], msg[46], msg[47]]) as usize;
            msg.get(offset..offset + len)
                .ok_or_else(|| auth_error("NTLM target info lies outside the challenge"))?
                .to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            flags,
            server_challenge,
            target_info,
        })
    }

    /// Server time from the `MsvAvTimestamp` pair.
    pub fn timestamp(&self) -> Option<u64> {
        let mut rest = self.target_info.as_slice();
        while rest.len() >= 4 {
            let id = u16::from_le_bytes([rest[0], rest[1]]);
            let len = usize::from(u16::from_le_bytes([rest[2], rest[3]]));
            let value = rest.get(4..4 + len)?;
            match id {
                MSV_AV_EOL => return None,
                MSV_AV_TIMESTAMP => return value.try_into().ok().map(u64::from_le_bytes),
                _ => rest = &rest[4 + len..],
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NtlmState {
    Initial,
    NegotiateSent,
    Done,
}

/// Client side of the NTLM handshake for one local or domain account.
pub struct NtlmAuth {
    scheme: &'static str,
    username: String,
    password: String,
    domain: String,
    workstation: String,
    state: NtlmState,
}

impl NtlmAuth {
    pub fn new(credential: &WinRmCredential) -> Self {
        Self::with_scheme("NTLM", credential)
    }

    /// Same exchange announced under another HTTP scheme, e.g. `Negotiate`.
    pub fn with_scheme(scheme: &'static str, credential: &WinRmCredential) -> Self {
        let explicit_domain = credential.domain.clone().filter(|d| !d.is_empty());
        let (domain, username) = match (explicit_domain, credential.username.split_once('\\')) {
            (Some(domain), _) => (domain, credential.username.clone()),
            (None, Some((domain, user))) => (domain.to_string(), user.to_string()),
            (None, None) => (String::new(), credential.username.clone()),
        };
        let workstation = std::env::var("COMPUTERNAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_default()
            .to_uppercase();

        Self {
            scheme,
            username,
            password: credential.password.clone(),
            domain,
            workstation,
            state: NtlmState::Initial,
        }
    }

    pub fn authenticate_message(
        &self,
        challenge: &Challenge,
        client_challenge: [u8; 8],
        now: u64,
    ) -> WinRmResult<Vec<u8>> {
        let key = ntowf_v2(&self.password, &self.username, &self.domain)?;
        // With a server timestamp the LM response must be empty zeros.
        let (timestamp, lm) = match challenge.timestamp() {
            Some(ts) => (ts, vec![0u8; 24]),
            None => (
                now,
                lmv2_response(&key, &challenge.server_challenge, &client_challenge)?.to_vec(),
            ),
        };
        let nt = ntlmv2_response(
            &key,
            &challenge.server_challenge,
            &client_challenge,
            timestamp,
            &challenge.target_info,
        )?;
        let domain = utf16le(&self.domain);
        let user = utf16le(&self.username);
        let workstation = utf16le(&self.workstation);
        let payloads: [&[u8]; 5] = [
            lm.as_slice(),
            nt.as_slice(),
            domain.as_slice(),
            user.as_slice(),
            workstation.as_slice(),
        ];

        let mut msg = Vec::with_capacity(
            AUTHENTICATE_HEADER_LEN as usize + payloads.iter().map(|p| p.len()).sum::<usize>(),
        );
        msg.extend_from_slice(SIGNATURE);
        msg.extend_from_slice(&3u32.to_le_bytes());
        let mut offset = AUTHENTICATE_HEADER_LEN;
        for payload in payloads {
            let len = u16::try_from(payload.len())
                .map_err(|_| auth_error("NTLM field longer than 65535 bytes"))?;
            msg.extend_from_slice(&len.to_le_bytes());
            msg.extend_from_slice(&len.to_le_bytes());
            msg.extend_from_slice(&offset.to_le_bytes());
            offset += u32::from(len);
        }
        // no session key exchange
        msg.extend_from_slice(&[0u8; 4]);
        msg.extend_from_slice(&offset.to_le_bytes());
        let flags = CLIENT_FLAGS | (challenge.flags & NEGOTIATE_TARGET_INFO);
        msg.extend_from_slice(&flags.to_le_bytes());

        for payload in payloads {
            msg.extend_from_slice(payload);
        }
        Ok(msg)
    }

    fn header(&self, msg: &[u8]) -> String {
        format!(
            "{} {}",
            self.scheme,
            base64::engine::general_purpose::STANDARD.encode(msg)
        )
    }
}

/// The token of a `WWW-Authenticate` value for `scheme`, if it carries one.
pub fn challenge_token<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    let (name, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (name.eq_ignore_ascii_case(scheme) && !token.is_empty()).then_some(token)
}

impl AuthProvider for NtlmAuth {
    fn name(&self) -> &str {
        self.scheme
    }

    fn initial_header(&mut self) -> WinRmResult<String> {
        if self.username.is_empty() {
            return Err(WinRmError::new(WinRmErrorKind::Config, "username is required"));
        }
        self.state = NtlmState::NegotiateSent;
        Ok(self.header(&negotiate_message()))
    }

    fn process_challenge(&mut self, challenges: &[String]) -> WinRmResult<Option<String>> {
        if self.state != NtlmState::NegotiateSent {
            return Ok(None);
        }
        let Some(token) = challenges.iter().find_map(|c| challenge_token(c, self.scheme)) else {
            return Ok(None);
        };
        let raw = base64::engine::general_purpose::STANDARD
            .decode(token)
            .map_err(|e| auth_error(format!("undecodable NTLM challenge: {}", e)))?;
        let challenge = Challenge::parse(&raw)?;
        debug!(
            "NTLM challenge received (flags {:#010x}, {} bytes target info)",
            challenge.flags,
            challenge.target_info.len()
        );
        let msg = self.authenticate_message(&challenge, rand::random(), filetime_now())?;
        self.state = NtlmState::Done;
        Ok(Some(self.header(&msg)))
    }

    fn connection_oriented(&self) -> bool {
        true
    }
}

/// CHALLENGE message as a listener would send it.
#[cfg(test)]
pub(crate) fn challenge_message(flags: u32, server_challenge: [u8; 8], target_info: &[u8]) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.extend_from_slice(SIGNATURE);
    msg.extend_from_slice(&2u32.to_le_bytes());
    // empty target name
    msg.extend_from_slice(&0u16.to_le_bytes());
    msg.extend_from_slice(&0u16.to_le_bytes());
    msg.extend_from_slice(&48u32.to_le_bytes());
    msg.extend_from_slice(&flags.to_le_bytes());
    msg.extend_from_slice(&server_challenge);
    msg.extend_from_slice(&[0u8; 8]);
    let len = target_info.len() as u16;
    msg.extend_from_slice(&len.to_le_bytes());
    msg.extend_from_slice(&len.to_le_bytes());
    msg.extend_from_slice(&48u32.to_le_bytes());
    msg.extend_from_slice(target_info);
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_CHALLENGE: [u8; 8] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
    const CLIENT_CHALLENGE: [u8; 8] = [0xaa; 8];

    // NetBIOS domain "Domain", computer "Server", end of list.
    const TARGET_INFO: [u8; 36] = [
        0x02, 0x00, 0x0c, 0x00, b'D', 0, b'o', 0, b'm', 0, b'a', 0, b'i', 0, b'n', 0, 0x01, 0x00,
        0x0c, 0x00, b'S', 0, b'e', 0, b'r', 0, b'v', 0, b'e', 0, b'r', 0, 0x00, 0x00, 0x00, 0x00,
    ];

    fn field<'a>(msg: &'a [u8], at: usize) -> &'a [u8] {
        let len = usize::from(u16::from_le_bytes([msg[at], msg[at + 1]]));
        let offset = u32::from_le_bytes([msg[at + 4], msg[at + 5], msg[at + 6], msg[at + 7]]) as usize;
        &msg[offset..offset + len]
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn hashes_match_published_vectors() {
        assert_eq!(hex(&nt_hash("Password")), "a4f49c406510bdcab6824ee7c30fd852");
        let key = ntowf_v2("Password", "User", "Domain").unwrap();
        assert_eq!(hex(&key), "0c868a403bfd7a93a3001ef22ef02e3f");
        assert_eq!(
            hex(&lmv2_response(&key, &SERVER_CHALLENGE, &CLIENT_CHALLENGE).unwrap()),
            "86c35097ac9cec102554764a57cccc19aaaaaaaaaaaaaaaa"
        );
        let nt = ntlmv2_response(&key, &SERVER_CHALLENGE, &CLIENT_CHALLENGE, 0, &TARGET_INFO).unwrap();
        assert_eq!(hex(&nt[..16]), "68cd0ab851e51c96aabc927bebef6a1c");
        assert_eq!(nt.len(), 16 + 28 + TARGET_INFO.len() + 4);
    }

    #[test]
    fn negotiate_message_layout() {
        let msg = negotiate_message();
        assert_eq!(&msg[..8], b"NTLMSSP\0");
        assert_eq!(msg[8], 1);
        assert_eq!(msg.len(), 32);
        let flags = u32::from_le_bytes([msg[12], msg[13], msg[14], msg[15]]);
        assert_ne!(flags & NEGOTIATE_NTLM, 0);
        assert_ne!(flags & NEGOTIATE_UNICODE, 0);
    }

    #[test]
    fn challenge_parsing() {
        let raw = challenge_message(NEGOTIATE_TARGET_INFO, SERVER_CHALLENGE, &TARGET_INFO);
        let c = Challenge::parse(&raw).unwrap();
        assert_eq!(c.server_challenge, SERVER_CHALLENGE);
        assert_eq!(c.target_info, TARGET_INFO.to_vec());
        assert_eq!(c.timestamp(), None);

        assert!(Challenge::parse(&negotiate_message()).is_err());
        assert!(Challenge::parse(b"NTLMSSP\0").is_err());
        let mut truncated = raw.clone();
        truncated.truncate(50);
        assert_eq!(Challenge::parse(&truncated).unwrap_err().kind, WinRmErrorKind::Auth);
    }

    #[test]
    fn server_timestamp_is_found() {
        let mut info = vec![0x07, 0x00, 0x08, 0x00];
        info.extend_from_slice(&0x01d9_0000_0000_0000u64.to_le_bytes());
        info.extend_from_slice(&[0, 0, 0, 0]);
        let c = Challenge::parse(&challenge_message(0, SERVER_CHALLENGE, &info)).unwrap();
        assert_eq!(c.timestamp(), Some(0x01d9_0000_0000_0000));
    }

    #[test]
    fn authenticate_message_fields() {
        let auth = NtlmAuth::new(&WinRmCredential::new("vm1\\azureuser", "P@ssw0rd!"));
        let c = Challenge::parse(&challenge_message(NEGOTIATE_TARGET_INFO, SERVER_CHALLENGE, &TARGET_INFO))
            .unwrap();
        let msg = auth.authenticate_message(&c, CLIENT_CHALLENGE, 42).unwrap();

        assert_eq!(&msg[..8], b"NTLMSSP\0");
        assert_eq!(msg[8], 3);
        assert_eq!(field(&msg, 28), utf16le("vm1").as_slice());
        assert_eq!(field(&msg, 36), utf16le("azureuser").as_slice());

        let key = ntowf_v2("P@ssw0rd!", "azureuser", "vm1").unwrap();
        let expected_nt = ntlmv2_response(&key, &SERVER_CHALLENGE, &CLIENT_CHALLENGE, 42, &TARGET_INFO).unwrap();
        assert_eq!(field(&msg, 20), expected_nt.as_slice());
        let expected_lm = lmv2_response(&key, &SERVER_CHALLENGE, &CLIENT_CHALLENGE).unwrap();
        assert_eq!(field(&msg, 12), expected_lm.as_slice());
        let flags = u32::from_le_bytes([msg[60], msg[61], msg[62], msg[63]]);
        assert_ne!(flags & NEGOTIATE_TARGET_INFO, 0);
    }

    #[test]
    fn server_timestamp_replaces_lm_response() {
        let mut info = vec![0x07, 0x00, 0x08, 0x00];
        info.extend_from_slice(&7u64.to_le_bytes());
        info.extend_from_slice(&[0, 0, 0, 0]);
        let c = Challenge::parse(&challenge_message(0, SERVER_CHALLENGE, &info)).unwrap();
        let auth = NtlmAuth::new(&WinRmCredential::new("azureuser", "pw"));
        let msg = auth.authenticate_message(&c, CLIENT_CHALLENGE, 42).unwrap();

        assert_eq!(field(&msg, 12), [0u8; 24].as_slice());
        // blob timestamp follows the 16-byte proof and 8 header bytes
        assert_eq!(&field(&msg, 20)[24..32], 7u64.to_le_bytes().as_slice());
    }

    #[test]
    fn handshake_states() {
        let mut auth = NtlmAuth::with_scheme("Negotiate", &WinRmCredential::new("azureuser", "pw"));
        assert_eq!(auth.name(), "Negotiate");
        assert!(auth.connection_oriented());
        // a challenge before the negotiate message is ignored
        assert_eq!(auth.process_challenge(&["Negotiate abc".to_string()]).unwrap(), None);

        assert!(auth.initial_header().unwrap().starts_with("Negotiate TlRMTVNTUAABAAAA"));
        // bare scheme without a token: credentials rejected
        assert_eq!(auth.process_challenge(&["Negotiate".to_string()]).unwrap(), None);

        let token = base64::engine::general_purpose::STANDARD
            .encode(challenge_message(0, SERVER_CHALLENGE, &TARGET_INFO));
        let challenges = vec!["Basic realm=\"WSMAN\"".to_string(), format!("Negotiate {}", token)];
        let next = auth.process_challenge(&challenges).unwrap().unwrap();
        assert!(next.starts_with("Negotiate TlRMTVNTUAADAAAA"));
        assert_eq!(auth.process_challenge(&challenges).unwrap(), None);
    }

    #[test]
    fn empty_username_rejected() {
        let mut auth = NtlmAuth::new(&WinRmCredential::new("", "pw"));
        assert_eq!(auth.initial_header().unwrap_err().kind, WinRmErrorKind::Config);
    }

    #[test]
    fn challenge_token_matching() {
        assert_eq!(challenge_token("Negotiate  TlRM ", "negotiate"), Some("TlRM"));
        assert_eq!(challenge_token("NTLM TlRM", "Negotiate"), None);
        assert_eq!(challenge_token("Negotiate", "Negotiate"), None);
    }

    #[test]
    fn filetime_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(filetime_now() > 132_223_104_000_000_000);
    }
}
