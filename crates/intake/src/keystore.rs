//! 클라이언트 검증 키 저장소
//!
//! `keys_dir` 아래에서 client_id별 키 파일을 찾습니다.
//!
//! | 알고리즘 | 파일 |
//! |---|---|
//! | ed25519 | `<client_id>.pub` |
//! | xchacha20poly1305 | `<client_id>.aead` |
//!
//! 한 번 읽은 키는 캐시하며, [`KeyStore::reload`]로 캐시를 비웁니다 (SIGHUP).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, warn};

use logpost_seal::keys::{read_key_file, read_verifying_key};
use logpost_seal::{AeadKey, Algorithm, PublicKeyLookup, SealError, VerificationKey};

/// 파일 기반 검증 키 저장소
#[derive(Debug)]
pub struct KeyStore {
    dir: Option<PathBuf>,
    cache: RwLock<HashMap<(String, Algorithm), VerificationKey>>,
}

impl KeyStore {
    /// `dir`에서 키 파일을 읽는 저장소를 생성합니다.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// 파일을 읽지 않고 등록된 키만 쓰는 저장소를 생성합니다.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// 키를 직접 등록합니다.
    pub fn insert(&self, client_id: impl Into<String>, key: VerificationKey) {
        let algorithm = key.algorithm();
        if let Ok(mut cache) = self.cache.write() {
            cache.insert((client_id.into(), algorithm), key);
        }
    }

    /// 캐시를 비웁니다. 다음 조회부터 파일을 다시 읽습니다.
    ///
    /// 메모리 전용 저장소에서는 아무것도 하지 않습니다.
    pub fn reload(&self) {
        if self.dir.is_none() {
            return;
        }
        if let Ok(mut cache) = self.cache.write() {
            let dropped = cache.len();
            cache.clear();
            debug!(dropped, "intake key cache cleared");
        }
    }

    /// 캐시된 키 수
    pub fn cached(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    fn load(&self, dir: &Path, client_id: &str, algorithm: Algorithm) -> Result<VerificationKey, SealError> {
        match algorithm {
            Algorithm::Ed25519 => {
                let path = dir.join(format!("{client_id}.pub"));
                Ok(VerificationKey::Ed25519(read_verifying_key(&path)?))
            }
            Algorithm::XChaCha20Poly1305 => {
                let path = dir.join(format!("{client_id}.aead"));
                let bytes = read_key_file(&path)?;
                Ok(VerificationKey::Aead(AeadKey::from_bytes(*bytes)))
            }
        }
    }
}

impl PublicKeyLookup for KeyStore {
    fn lookup(&self, client_id: &str, algorithm: Algorithm) -> Option<VerificationKey> {
        let cache_key = (client_id.to_owned(), algorithm);
        if let Some(key) = self.cache.read().ok()?.get(&cache_key) {
            return Some(key.clone());
        }

        let dir = self.dir.as_deref()?;
        if !is_safe_client_id(client_id) {
            warn!(client_id, "rejecting client id unusable as key file name");
            return None;
        }
        match self.load(dir, client_id, algorithm) {
            Ok(key) => {
                debug!(client_id, algorithm = %algorithm, "client key loaded");
                if let Ok(mut cache) = self.cache.write() {
                    cache.insert(cache_key, key.clone());
                }
                Some(key)
            }
            Err(e) => {
                warn!(client_id, algorithm = %algorithm, error = %e, "no usable key for client");
                None
            }
        }
    }
}

/// 파일 이름으로 안전한 client_id인지 확인합니다 (`[A-Za-z0-9._-]`, 점으로 시작하지 않음).
pub fn is_safe_client_id(client_id: &str) -> bool {
    !client_id.is_empty()
        && client_id.len() <= 128
        && !client_id.starts_with('.')
        && client_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpost_seal::keys::{generate_aead_key, generate_signing_key};

    #[test]
    fn loads_aead_and_signing_keys_from_dir() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        generate_aead_key(&dir.path().join("edge-01.aead")).unwrap();
        generate_signing_key(&dir.path().join("edge-02.key")).unwrap();
        let store = KeyStore::new(dir.path());

        // When / Then
        let aead = store.lookup("edge-01", Algorithm::XChaCha20Poly1305).unwrap();
        assert_eq!(aead.algorithm(), Algorithm::XChaCha20Poly1305);
        let ed = store.lookup("edge-02", Algorithm::Ed25519).unwrap();
        assert_eq!(ed.algorithm(), Algorithm::Ed25519);
        assert!(store.lookup("edge-01", Algorithm::Ed25519).is_none());
        assert_eq!(store.cached(), 2);
    }

    #[test]
    fn reload_picks_up_rotated_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        assert!(store.lookup("edge-01", Algorithm::XChaCha20Poly1305).is_none());

        generate_aead_key(&dir.path().join("edge-01.aead")).unwrap();
        store.reload();

        assert!(store.lookup("edge-01", Algorithm::XChaCha20Poly1305).is_some());
    }

    #[test]
    fn path_like_client_ids_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        assert!(store.lookup("../etc/passwd", Algorithm::Ed25519).is_none());
        assert!(!is_safe_client_id(".hidden"));
        assert!(!is_safe_client_id("a/b"));
        assert!(is_safe_client_id("edge-01.prod_eu"));
    }

    #[test]
    fn in_memory_store_serves_inserted_keys() {
        let store = KeyStore::in_memory();
        store.insert("edge-01", VerificationKey::Aead(AeadKey::generate()));
        store.reload();
        assert!(store.lookup("edge-01", Algorithm::XChaCha20Poly1305).is_some());
        assert!(store.lookup("edge-02", Algorithm::XChaCha20Poly1305).is_none());
    }
}
