//! 클라이언트 키 관리
//!
//! 키 파일은 32바이트 값을 hex 텍스트로 저장합니다.
//!
//! | 파일 | 내용 | 보관 위치 |
//! |---|---|---|
//! | `client.key` | ed25519 서명 키 (비밀) | 클라이언트 |
//! | `client.pub` | ed25519 검증 키 | 인테이크 `<client_id>.pub` |
//! | `client.aead` | XChaCha20-Poly1305 공유 키 (비밀) | 양쪽 (`<client_id>.aead`) |
//!
//! 비밀 키 버퍼는 drop 시 zeroize 됩니다. 심볼릭 링크 키 파일은 읽지 않습니다.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use logpost_core::config::{ALGORITHM_ED25519, ALGORITHM_XCHACHA20POLY1305, SealingConfig};

use crate::error::SealError;

/// 키 길이 (ed25519 시드, XChaCha20-Poly1305 키 모두 32바이트)
pub const KEY_LEN: usize = 32;

/// 봉인 알고리즘
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// 서명된 평문 (무결성/인증, 기밀성 없음)
    Ed25519,
    /// 인증 암호화
    XChaCha20Poly1305,
}

impl Algorithm {
    /// 와이어 식별자
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ed25519 => ALGORITHM_ED25519,
            Self::XChaCha20Poly1305 => ALGORITHM_XCHACHA20POLY1305,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ALGORITHM_ED25519 => Ok(Self::Ed25519),
            ALGORITHM_XCHACHA20POLY1305 => Ok(Self::XChaCha20Poly1305),
            other => Err(SealError::UnsupportedAlgorithm(other.to_owned())),
        }
    }
}

/// XChaCha20-Poly1305 공유 키
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_LEN]);

impl AeadKey {
    /// OS 난수로 새 키를 생성합니다.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// 원시 바이트에서 생성합니다.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// 키 비교용 지문 (blake3 앞 8바이트, hex). 키 자체는 드러내지 않습니다.
    pub fn fingerprint(&self) -> String {
        let digest = blake3::hash(&self.0);
        hex::encode(&digest.as_bytes()[..8])
    }
}

impl fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AeadKey(..)")
    }
}

/// 클라이언트 비밀 키
pub enum SecretKey {
    /// ed25519 서명 키
    Signing(SigningKey),
    /// AEAD 공유 키
    Aead(AeadKey),
}

impl SecretKey {
    /// 키가 속한 알고리즘
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Signing(_) => Algorithm::Ed25519,
            Self::Aead(_) => Algorithm::XChaCha20Poly1305,
        }
    }
}

/// 검증 측 키 (ed25519 검증 키 또는 AEAD 공유 키)
#[derive(Clone)]
pub enum VerificationKey {
    /// ed25519 검증 키
    Ed25519(VerifyingKey),
    /// AEAD 공유 키
    Aead(AeadKey),
}

impl VerificationKey {
    /// 키가 속한 알고리즘
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ed25519(_) => Algorithm::Ed25519,
            Self::Aead(_) => Algorithm::XChaCha20Poly1305,
        }
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519(vk) => write!(f, "Ed25519({})", hex::encode(&vk.as_bytes()[..8])),
            Self::Aead(_) => f.write_str("Aead(..)"),
        }
    }
}

/// 클라이언트 키 재료
///
/// 비밀 키는 전송되지 않습니다. 상대 키([`VerificationKey`])는
/// 대역 외로 인테이크에 등록합니다.
pub struct ClientKeyMaterial {
    client_id: String,
    secret: SecretKey,
}

impl ClientKeyMaterial {
    /// 비밀 키로 생성합니다.
    pub fn new(client_id: impl Into<String>, secret: SecretKey) -> Self {
        Self {
            client_id: client_id.into(),
            secret,
        }
    }

    /// 설정된 알고리즘에 맞는 키 파일을 로드합니다.
    pub fn load(config: &SealingConfig) -> Result<Self, SealError> {
        let algorithm: Algorithm = config.algorithm.parse()?;
        let secret = match algorithm {
            Algorithm::Ed25519 => {
                let seed = read_key_file(Path::new(&config.signing_key_path))?;
                SecretKey::Signing(SigningKey::from_bytes(&seed))
            }
            Algorithm::XChaCha20Poly1305 => {
                let bytes = read_key_file(Path::new(&config.encryption_key_path))?;
                SecretKey::Aead(AeadKey::from_bytes(*bytes))
            }
        };
        tracing::debug!(
            client_id = %config.client_id,
            algorithm = %algorithm,
            "client key material loaded"
        );
        Ok(Self::new(config.client_id.clone(), secret))
    }

    /// 클라이언트 ID
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// 알고리즘
    pub fn algorithm(&self) -> Algorithm {
        self.secret.algorithm()
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// 인테이크에 등록할 상대 키
    pub fn verification_key(&self) -> VerificationKey {
        match &self.secret {
            SecretKey::Signing(sk) => VerificationKey::Ed25519(sk.verifying_key()),
            SecretKey::Aead(key) => VerificationKey::Aead(key.clone()),
        }
    }
}

impl fmt::Debug for ClientKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientKeyMaterial")
            .field("client_id", &self.client_id)
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

/// client_id와 알고리즘으로 검증 키를 찾는 조회 인터페이스
pub trait PublicKeyLookup {
    /// 등록된 키가 없으면 `None`
    fn lookup(&self, client_id: &str, algorithm: Algorithm) -> Option<VerificationKey>;
}

/// 32바이트 hex 키 파일을 읽습니다.
pub fn read_key_file(path: &Path) -> Result<Zeroizing<[u8; KEY_LEN]>, SealError> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| SealError::key(path, e.to_string()))?;
    if meta.file_type().is_symlink() {
        return Err(SealError::key(path, "refusing to read key file: path is a symlink"));
    }

    let text = Zeroizing::new(
        std::fs::read_to_string(path).map_err(|e| SealError::key(path, e.to_string()))?,
    );
    let decoded = Zeroizing::new(
        hex::decode(text.trim()).map_err(|_| SealError::key(path, "invalid hex encoding"))?,
    );
    if decoded.len() != KEY_LEN {
        return Err(SealError::key(
            path,
            format!("expected {KEY_LEN} bytes, got {}", decoded.len()),
        ));
    }
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&decoded);
    Ok(key)
}

/// 공개 검증 키 파일(`.pub`)을 읽습니다.
pub fn read_verifying_key(path: &Path) -> Result<VerifyingKey, SealError> {
    let bytes = read_key_file(path)?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| SealError::key(path, e.to_string()))
}

/// hex 키를 0600 권한으로 새로 씁니다. 파일이 이미 있으면 실패합니다.
pub fn write_key_file(path: &Path, bytes: &[u8; KEY_LEN]) -> Result<(), SealError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SealError::key(path, e.to_string()))?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .map_err(|e| SealError::key(path, e.to_string()))?;

    let encoded = Zeroizing::new(hex::encode(bytes));
    file.write_all(encoded.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .map_err(|e| SealError::key(path, e.to_string()))
}

/// 새 ed25519 키 쌍을 생성하여 `<path>`와 `<path>.pub`에 씁니다.
pub fn generate_signing_key(path: &Path) -> Result<VerifyingKey, SealError> {
    let signing_key = SigningKey::generate(&mut OsRng);
    let seed = Zeroizing::new(signing_key.to_bytes());
    write_key_file(path, &seed)?;

    let verifying_key = signing_key.verifying_key();
    write_key_file(&path.with_extension("pub"), verifying_key.as_bytes())?;
    Ok(verifying_key)
}

/// 새 AEAD 공유 키를 생성하여 `path`에 씁니다.
pub fn generate_aead_key(path: &Path) -> Result<AeadKey, SealError> {
    let key = AeadKey::generate();
    write_key_file(path, key.as_bytes())?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_parses_wire_identifiers() {
        assert_eq!(
            "xchacha20poly1305".parse::<Algorithm>().unwrap(),
            Algorithm::XChaCha20Poly1305
        );
        assert_eq!("ed25519".parse::<Algorithm>().unwrap(), Algorithm::Ed25519);
        assert!("aes256gcm".parse::<Algorithm>().is_err());
    }

    #[test]
    fn generated_signing_key_loads_back() {
        // Given: 임시 디렉토리에 생성한 키 쌍
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.key");
        let vk = generate_signing_key(&path).unwrap();

        // When
        let config = SealingConfig {
            client_id: "edge-01".to_owned(),
            algorithm: "ed25519".to_owned(),
            signing_key_path: path.display().to_string(),
            ..SealingConfig::default()
        };
        let material = ClientKeyMaterial::load(&config).unwrap();

        // Then
        assert_eq!(material.algorithm(), Algorithm::Ed25519);
        match material.verification_key() {
            VerificationKey::Ed25519(loaded) => assert_eq!(loaded, vk),
            other => panic!("unexpected key {other:?}"),
        }
        assert_eq!(read_verifying_key(&path.with_extension("pub")).unwrap(), vk);
    }

    #[test]
    fn aead_fingerprint_is_stable_and_short() {
        let key = AeadKey::from_bytes([9; KEY_LEN]);
        assert_eq!(key.fingerprint(), key.clone().fingerprint());
        assert_eq!(key.fingerprint().len(), 16);
        assert_ne!(key.fingerprint(), AeadKey::from_bytes([8; KEY_LEN]).fingerprint());
    }

    #[cfg(unix)]
    #[test]
    fn key_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.aead");
        generate_aead_key(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn generate_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.aead");
        generate_aead_key(&path).unwrap();
        assert!(matches!(
            generate_aead_key(&path),
            Err(SealError::Key { .. })
        ));
    }

    #[test]
    fn wrong_length_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.key");
        std::fs::write(&path, "abcd").unwrap();
        let err = read_key_file(&path).unwrap_err();
        assert!(err.to_string().contains("expected 32 bytes"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.aead");
        generate_aead_key(&real).unwrap();
        let link = dir.path().join("link.aead");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        assert!(read_key_file(&link).unwrap_err().to_string().contains("symlink"));
    }

    #[test]
    fn debug_output_hides_secret() {
        let material = ClientKeyMaterial::new("c", SecretKey::Aead(AeadKey::from_bytes([9; 32])));
        let text = format!("{material:?}");
        assert!(!text.contains("09"));
        assert!(text.contains("xchacha20poly1305") || text.contains("XChaCha20Poly1305"));
    }
}
