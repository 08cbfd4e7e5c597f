//! Health aggregation tests.

use logpost_core::pipeline::HealthStatus;
use logpost_daemon::health::{ModuleHealth, aggregate_status};

fn module(name: &str, enabled: bool, status: HealthStatus) -> ModuleHealth {
    ModuleHealth {
        name: name.to_owned(),
        enabled,
        status,
    }
}

#[test]
fn test_aggregate_status_all_healthy() {
    // Given
    let modules = vec![
        module("collector", true, HealthStatus::Healthy),
        module("transport", true, HealthStatus::Healthy),
        module("intake", true, HealthStatus::Healthy),
    ];

    // When
    let status = aggregate_status(&modules);

    // Then
    assert!(status.is_healthy());
}

#[test]
fn test_aggregate_status_empty_is_healthy() {
    assert!(aggregate_status(&[]).is_healthy());
}

#[test]
fn test_aggregate_status_degraded_carries_reason() {
    // Given: transport breaker open
    let modules = vec![
        module("collector", true, HealthStatus::Healthy),
        module(
            "transport",
            true,
            HealthStatus::Degraded("circuit breaker open".to_owned()),
        ),
    ];

    // When
    let status = aggregate_status(&modules);

    // Then
    assert_eq!(
        status,
        HealthStatus::Degraded("transport: circuit breaker open".to_owned())
    );
}

#[test]
fn test_aggregate_status_unhealthy_wins_over_degraded() {
    // Given
    let modules = vec![
        module("collector", true, HealthStatus::Degraded("source retrying".to_owned())),
        module("transport", true, HealthStatus::Unhealthy("stopped".to_owned())),
        module("intake", true, HealthStatus::Unhealthy("server task exited".to_owned())),
    ];

    // When
    let status = aggregate_status(&modules);

    // Then: only the unhealthy reasons are reported
    assert_eq!(
        status,
        HealthStatus::Unhealthy("transport: stopped; intake: server task exited".to_owned())
    );
}

#[test]
fn test_aggregate_status_ignores_disabled_modules() {
    let modules = vec![
        module("collector", true, HealthStatus::Healthy),
        module("intake", false, HealthStatus::Unhealthy("not started".to_owned())),
    ];

    assert!(aggregate_status(&modules).is_healthy());
}
