//! Bearer 토큰 인증
//!
//! 토큰 비교는 상수 시간으로 수행하며, 등록된 모든 토큰과 비교를 끝낸 뒤
//! 결과를 반환합니다.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use subtle::ConstantTimeEq;

use logpost_core::config::IntakeClient;

use crate::error::IntakeError;

/// 인증된 호출자 신원
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// 등록된 client_id
    pub client_id: String,
}

/// 토큰 → client_id 레지스트리
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Vec<IntakeClient>,
}

impl ClientRegistry {
    /// 설정의 클라이언트 목록으로 생성합니다. 빈 토큰은 등록하지 않습니다.
    pub fn new(clients: &[IntakeClient]) -> Self {
        Self {
            clients: clients
                .iter()
                .filter(|c| !c.token.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// 등록된 클라이언트 수
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// 토큰으로 신원을 찾습니다.
    pub fn identify(&self, token: &str) -> Option<ClientIdentity> {
        let mut found = None;
        for client in &self.clients {
            if bool::from(client.token.as_bytes().ct_eq(token.as_bytes())) {
                found = Some(ClientIdentity {
                    client_id: client.client_id.clone(),
                });
            }
        }
        found
    }

    /// `Authorization: Bearer <token>` 헤더로 호출자를 인증합니다.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<ClientIdentity, IntakeError> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(IntakeError::Unauthorized)?;
        self.identify(token).ok_or(IntakeError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn registry() -> ClientRegistry {
        ClientRegistry::new(&[
            IntakeClient {
                client_id: "edge-01".to_owned(),
                token: "token-one".to_owned(),
            },
            IntakeClient {
                client_id: "edge-02".to_owned(),
                token: "token-two".to_owned(),
            },
            IntakeClient {
                client_id: "disabled".to_owned(),
                token: String::new(),
            },
        ])
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_resolves_client() {
        let identity = registry().authenticate(&headers("Bearer token-two")).unwrap();
        assert_eq!(identity.client_id, "edge-02");
    }

    #[test]
    fn unknown_or_missing_token_is_rejected() {
        let registry = registry();
        assert!(matches!(
            registry.authenticate(&headers("Bearer nope")),
            Err(IntakeError::Unauthorized)
        ));
        assert!(matches!(
            registry.authenticate(&HeaderMap::new()),
            Err(IntakeError::Unauthorized)
        ));
        assert!(matches!(
            registry.authenticate(&headers("Basic token-one")),
            Err(IntakeError::Unauthorized)
        ));
    }

    #[test]
    fn empty_tokens_are_never_registered() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.identify("").is_none());
        assert!(matches!(
            registry.authenticate(&headers("Bearer ")),
            Err(IntakeError::Unauthorized)
        ));
    }
}
