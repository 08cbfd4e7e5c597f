//! 플러그인 시스템 -- 컴포넌트 등록과 생명주기 관리
//!
//! [`Plugin`] trait은 [`Pipeline`]의 상위 추상화로,
//! 메타데이터와 초기화 단계를 추가합니다. [`PipelinePlugin`]은 임의의
//! `Pipeline` 구현을 플러그인으로 감싸는 어댑터입니다.
//!
//! [`PluginRegistry`]는 데몬이 시작 시 명시적으로 소유하는 레지스트리입니다.
//! 전역 상태 없이 등록 순서대로 시작/정지합니다.
//!
//! # 생명주기
//! ```text
//! Created → init() → Initialized → start() → Running → stop() → Stopped
//! ```

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::{LogpostError, PipelineError, PluginError};
use crate::pipeline::{BoxFuture, HealthStatus, Pipeline};

// ─── PluginType ──────────────────────────────────────────────────────

/// 플러그인 유형
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginType {
    /// 소스 → 프로세서 → 봉인 → 버퍼
    Collector,
    /// 버퍼 → 원격 인테이크
    Transport,
    /// HTTP 인테이크 서버
    Intake,
    /// 사용자 정의 플러그인
    Custom(String),
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collector => write!(f, "collector"),
            Self::Transport => write!(f, "transport"),
            Self::Intake => write!(f, "intake"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

// ─── PluginInfo ──────────────────────────────────────────────────────

/// 플러그인 메타데이터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// 플러그인 고유 이름 (예: `"collector"`)
    pub name: String,
    /// 플러그인 버전
    pub version: String,
    /// 플러그인 설명
    pub description: String,
    /// 플러그인 유형
    pub plugin_type: PluginType,
}

impl PluginInfo {
    /// 크레이트 버전으로 메타데이터를 생성합니다.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        plugin_type: PluginType,
    ) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            description: description.into(),
            plugin_type,
        }
    }
}

// ─── PluginState ─────────────────────────────────────────────────────

/// 플러그인 생명주기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginState {
    /// 생성됨 (init 전)
    Created,
    /// 초기화 완료 (start 가능)
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
    /// 오류 상태
    Failed,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Initialized => write!(f, "initialized"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ─── Plugin Trait ────────────────────────────────────────────────────

/// 레지스트리에 등록 가능한 컴포넌트
pub trait Plugin: Send + Sync {
    /// 플러그인 메타데이터를 반환합니다.
    fn info(&self) -> &PluginInfo;

    /// 현재 플러그인 상태를 반환합니다.
    fn state(&self) -> PluginState;

    /// 플러그인을 초기화합니다.
    fn init(&mut self) -> impl Future<Output = Result<(), LogpostError>> + Send;

    /// 플러그인을 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), LogpostError>> + Send;

    /// 플러그인을 정지합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), LogpostError>> + Send;

    /// 플러그인의 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

// ─── DynPlugin Trait ─────────────────────────────────────────────────

/// dyn-compatible 플러그인 trait
///
/// `Plugin`은 RPITIT를 사용하므로 `dyn Plugin`이 불가합니다.
/// `DynPlugin`은 `BoxFuture`를 반환하여 `Vec<Box<dyn DynPlugin>>`으로
/// 플러그인을 동적 관리할 수 있게 합니다.
pub trait DynPlugin: Send + Sync {
    /// 플러그인 메타데이터를 반환합니다.
    fn info(&self) -> &PluginInfo;

    /// 현재 플러그인 상태를 반환합니다.
    fn state(&self) -> PluginState;

    /// 플러그인을 초기화합니다.
    fn init(&mut self) -> BoxFuture<'_, Result<(), LogpostError>>;

    /// 플러그인을 시작합니다.
    fn start(&mut self) -> BoxFuture<'_, Result<(), LogpostError>>;

    /// 플러그인을 정지합니다.
    fn stop(&mut self) -> BoxFuture<'_, Result<(), LogpostError>>;

    /// 플러그인의 건강 상태를 확인합니다.
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Plugin> DynPlugin for T {
    fn info(&self) -> &PluginInfo {
        Plugin::info(self)
    }

    fn state(&self) -> PluginState {
        Plugin::state(self)
    }

    fn init(&mut self) -> BoxFuture<'_, Result<(), LogpostError>> {
        Box::pin(Plugin::init(self))
    }

    fn start(&mut self) -> BoxFuture<'_, Result<(), LogpostError>> {
        Box::pin(Plugin::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), LogpostError>> {
        Box::pin(Plugin::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Plugin::health_check(self))
    }
}

// ─── PipelinePlugin ──────────────────────────────────────────────────

/// `Pipeline` 구현을 플러그인 생명주기로 감싸는 어댑터
pub struct PipelinePlugin<P> {
    info: PluginInfo,
    state: PluginState,
    inner: P,
}

impl<P: Pipeline> PipelinePlugin<P> {
    /// 새 어댑터를 생성합니다.
    pub fn new(info: PluginInfo, inner: P) -> Self {
        Self {
            info,
            state: PluginState::Created,
            inner,
        }
    }

    /// 내부 파이프라인 참조
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: Pipeline> Plugin for PipelinePlugin<P> {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn state(&self) -> PluginState {
        self.state
    }

    async fn init(&mut self) -> Result<(), LogpostError> {
        if self.state != PluginState::Created {
            return Err(PipelineError::InitFailed(format!(
                "{} cannot be initialized from state {}",
                self.info.name, self.state
            ))
            .into());
        }
        self.state = PluginState::Initialized;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), LogpostError> {
        match self.inner.start().await {
            Ok(()) => {
                self.state = PluginState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = PluginState::Failed;
                Err(e)
            }
        }
    }

    async fn stop(&mut self) -> Result<(), LogpostError> {
        if self.state != PluginState::Running {
            return Ok(());
        }
        let result = self.inner.stop().await;
        self.state = if result.is_ok() {
            PluginState::Stopped
        } else {
            PluginState::Failed
        };
        result
    }

    async fn health_check(&self) -> HealthStatus {
        self.inner.health_check().await
    }
}

// ─── PluginRegistry ──────────────────────────────────────────────────

/// 플러그인 레지스트리
///
/// 등록 순서가 보존되며, 생산자를 먼저 등록하고 소비자를 나중에 등록합니다.
/// 정지도 같은 순서로 진행되어 소비자가 잔여 데이터를 드레인할 수 있습니다.
pub struct PluginRegistry {
    plugins: Vec<Box<dyn DynPlugin>>,
}

impl PluginRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// 플러그인을 등록합니다. 같은 이름이 이미 있으면 에러를 반환합니다.
    pub fn register(&mut self, plugin: Box<dyn DynPlugin>) -> Result<(), LogpostError> {
        let name = plugin.info().name.clone();
        if self.plugins.iter().any(|p| p.info().name == name) {
            return Err(PluginError::AlreadyRegistered { name }.into());
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// 이름으로 플러그인을 조회합니다.
    pub fn get(&self, name: &str) -> Option<&dyn DynPlugin> {
        self.plugins
            .iter()
            .find(|p| p.info().name == name)
            .map(|p| p.as_ref())
    }

    /// 모든 플러그인을 등록 순서대로 초기화합니다 (fail-fast).
    pub async fn init_all(&mut self) -> Result<(), LogpostError> {
        for plugin in &mut self.plugins {
            plugin.init().await?;
        }
        Ok(())
    }

    /// 모든 플러그인을 등록 순서대로 시작합니다 (fail-fast).
    ///
    /// 이미 시작된 플러그인은 롤백하지 않으므로, 호출자가 `stop_all`을 호출해야 합니다.
    pub async fn start_all(&mut self) -> Result<(), LogpostError> {
        for plugin in &mut self.plugins {
            tracing::debug!(plugin = %plugin.info().name, "starting plugin");
            plugin.start().await?;
        }
        Ok(())
    }

    /// 모든 플러그인을 등록 순서대로 정지합니다.
    ///
    /// 개별 실패에도 나머지 플러그인의 정지를 계속하고, 에러를 모아 반환합니다.
    pub async fn stop_all(&mut self) -> Result<(), LogpostError> {
        let mut errors = Vec::new();
        for plugin in &mut self.plugins {
            tracing::debug!(plugin = %plugin.info().name, "stopping plugin");
            if let Err(e) = plugin.stop().await {
                errors.push(format!("{}: {}", plugin.info().name, e));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PluginError::StopFailed(errors.join("; ")).into())
        }
    }

    /// 등록된 플러그인 수
    pub fn count(&self) -> usize {
        self.plugins.len()
    }

    /// 등록된 모든 플러그인의 정보
    pub fn list(&self) -> Vec<&PluginInfo> {
        self.plugins.iter().map(|p| p.info()).collect()
    }

    /// 모든 플러그인의 건강 상태를 조회합니다.
    pub async fn health_check_all(&self) -> Vec<(String, PluginState, HealthStatus)> {
        let mut statuses = Vec::new();
        for plugin in &self.plugins {
            let name = plugin.info().name.clone();
            let state = plugin.state();
            let health = plugin.health_check().await;
            statuses.push((name, state, health));
        }
        statuses
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
