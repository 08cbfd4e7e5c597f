//! 봉인/검증
//!
//! 1. 배치를 정규 바이트 형식(구조체 필드 순서 + `BTreeMap` 키 순서의 JSON)으로 직렬화
//! 2. 설정 시 gzip 압축
//! 3. 알고리즘별 봉인
//!    - `ed25519`: `payload = signature(64) || body`, nonce 없음
//!    - `xchacha20poly1305`: 호출마다 새 24바이트 난수 nonce로 AEAD 암호화
//!
//! 봉투 헤더(client_id, 시각, 버전, 알고리즘, 압축 여부)는 서명/AAD에 포함되어
//! 헤더만 바꿔치기하는 변조도 검증에 실패합니다.

use std::io::{Read, Write};

use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use ed25519_dalek::{Signature, Signer, Verifier};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use logpost_core::envelope::{Envelope, FORMAT_VERSION};
use logpost_core::event::LogBatch;

use crate::error::SealError;
use crate::keys::{Algorithm, ClientKeyMaterial, PublicKeyLookup, SecretKey, VerificationKey};

/// XChaCha20-Poly1305 nonce 길이
pub const NONCE_LEN: usize = 24;

/// ed25519 서명 길이
pub const SIGNATURE_LEN: usize = 64;

/// 압축 해제 상한 (압축 폭탄 방지)
pub const MAX_DECOMPRESSED_BYTES: u64 = 64 * 1024 * 1024;

/// 배치의 정규 바이트 형식
pub fn canonical_bytes(batch: &LogBatch) -> Result<Zeroizing<Vec<u8>>, serde_json::Error> {
    serde_json::to_vec(batch).map(Zeroizing::new)
}

/// 배치를 봉인합니다.
///
/// 실패 시 [`SealError::SealingFailure`]를 반환하며, 호출자는 배치를 폐기해야 합니다.
pub fn seal(
    batch: &LogBatch,
    keys: &ClientKeyMaterial,
    compress: bool,
) -> Result<Envelope, SealError> {
    let plain =
        canonical_bytes(batch).map_err(|e| SealError::SealingFailure(e.to_string()))?;
    let body = if compress {
        gzip(&plain).map_err(|e| SealError::SealingFailure(e.to_string()))?
    } else {
        plain
    };

    let mut envelope = Envelope {
        client_id: keys.client_id().to_owned(),
        created_at: chrono::Utc::now().timestamp(),
        format_version: FORMAT_VERSION,
        algorithm: keys.algorithm().as_str().to_owned(),
        nonce: Vec::new(),
        payload: Vec::new(),
        compressed: compress,
    };
    let header = associated_data(&envelope);

    match keys.secret() {
        SecretKey::Signing(signing_key) => {
            let signature = signing_key.sign(&signed_message(&header, &body));
            let mut payload = Vec::with_capacity(SIGNATURE_LEN + body.len());
            payload.extend_from_slice(&signature.to_bytes());
            payload.extend_from_slice(&body);
            envelope.payload = payload;
        }
        SecretKey::Aead(key) => {
            let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
            let mut nonce = [0u8; NONCE_LEN];
            OsRng.fill_bytes(&mut nonce);
            envelope.payload = cipher
                .encrypt(
                    XNonce::from_slice(&nonce),
                    Payload {
                        msg: body.as_slice(),
                        aad: &header,
                    },
                )
                .map_err(|e| SealError::SealingFailure(format!("encryption failed: {e:?}")))?;
            envelope.nonce = nonce.to_vec();
        }
    }

    Ok(envelope)
}

/// 봉투를 검증하고 배치를 복원합니다.
///
/// 서명/태그 불일치, 알 수 없는 알고리즘이나 버전, 잘못된 페이로드, 미등록 클라이언트는
/// 모두 [`SealError::VerificationFailed`] 하나로 보고됩니다.
pub fn unseal(envelope: &Envelope, keys: &impl PublicKeyLookup) -> Result<LogBatch, SealError> {
    if envelope.format_version != FORMAT_VERSION {
        return Err(SealError::VerificationFailed);
    }
    let algorithm: Algorithm = envelope
        .algorithm
        .parse()
        .map_err(|_| SealError::VerificationFailed)?;
    let key = keys
        .lookup(&envelope.client_id, algorithm)
        .ok_or(SealError::VerificationFailed)?;
    let header = associated_data(envelope);

    let body: Zeroizing<Vec<u8>> = match (algorithm, &key) {
        (Algorithm::Ed25519, VerificationKey::Ed25519(verifying_key)) => {
            if !envelope.nonce.is_empty() || envelope.payload.len() < SIGNATURE_LEN {
                return Err(SealError::VerificationFailed);
            }
            let (sig_bytes, body) = envelope.payload.split_at(SIGNATURE_LEN);
            let signature =
                Signature::from_slice(sig_bytes).map_err(|_| SealError::VerificationFailed)?;
            verifying_key
                .verify(&signed_message(&header, body), &signature)
                .map_err(|_| SealError::VerificationFailed)?;
            Zeroizing::new(body.to_vec())
        }
        (Algorithm::XChaCha20Poly1305, VerificationKey::Aead(aead_key)) => {
            if envelope.nonce.len() != NONCE_LEN {
                return Err(SealError::VerificationFailed);
            }
            let cipher = XChaCha20Poly1305::new(Key::from_slice(aead_key.as_bytes()));
            cipher
                .decrypt(
                    XNonce::from_slice(&envelope.nonce),
                    Payload {
                        msg: &envelope.payload,
                        aad: &header,
                    },
                )
                .map(Zeroizing::new)
                .map_err(|_| SealError::VerificationFailed)?
        }
        _ => return Err(SealError::VerificationFailed),
    };

    let plain = if envelope.compressed {
        gunzip(&body).map_err(|_| SealError::VerificationFailed)?
    } else {
        body
    };
    serde_json::from_slice(&plain).map_err(|_| SealError::VerificationFailed)
}

/// 서명/AAD에 포함되는 봉투 헤더
fn associated_data(envelope: &Envelope) -> Vec<u8> {
    format!(
        "logpost/{}\n{}\n{}\n{}\n{}",
        envelope.format_version,
        envelope.client_id,
        envelope.created_at,
        envelope.algorithm,
        envelope.compressed,
    )
    .into_bytes()
}

fn signed_message(header: &[u8], body: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut message = Vec::with_capacity(header.len() + 1 + body.len());
    message.extend_from_slice(header);
    message.push(0);
    message.extend_from_slice(body);
    Zeroizing::new(message)
}

fn gzip(data: &[u8]) -> std::io::Result<Zeroizing<Vec<u8>>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish().map(Zeroizing::new)
}

fn gunzip(data: &[u8]) -> std::io::Result<Zeroizing<Vec<u8>>> {
    let mut out = Zeroizing::new(Vec::new());
    GzDecoder::new(data)
        .take(MAX_DECOMPRESSED_BYTES + 1)
        .read_to_end(&mut out)?;
    if out.len() as u64 > MAX_DECOMPRESSED_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "decompressed payload exceeds limit",
        ));
    }
    Ok(out)
}
