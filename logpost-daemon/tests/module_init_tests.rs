//! Module initialization tests.
//!
//! Tests each component's init function and the SIGHUP reload handles.

use logpost_core::config::LogpostConfig;
use logpost_core::plugin::PluginType;
use logpost_daemon::modules::{self, ReloadHandles};
use logpost_seal::keys::generate_aead_key;
use logpost_spool::DurableBuffer;

fn config(data_dir: &std::path::Path) -> LogpostConfig {
    let mut config = LogpostConfig::default();
    config.general.data_dir = data_dir.display().to_string();
    config.general.pid_file = String::new();
    config.collector.enabled = false;
    config.transport.enabled = false;
    config.intake.enabled = false;
    config
}

async fn buffer(dir: &std::path::Path) -> DurableBuffer {
    DurableBuffer::open_with_config(dir.join("buffer.db"), &LogpostConfig::default().buffer)
        .await
        .expect("buffer should open")
}

#[tokio::test]
async fn test_disabled_modules_return_none() {
    // Given
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    // When / Then
    assert!(modules::collector::init(&config, None).unwrap().is_none());
    assert!(modules::transport::init(&config, None).unwrap().is_none());
    assert!(modules::intake::init(&config).await.unwrap().is_none());
}

#[tokio::test]
async fn test_transport_requires_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.transport.enabled = true;

    let err = modules::transport::init(&config, None)
        .err()
        .expect("init without buffer should fail");

    assert!(err.to_string().contains("durable buffer"));
}

#[tokio::test]
async fn test_transport_init_registers_transport_plugin() {
    // Given
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.transport.enabled = true;
    let buffer = buffer(dir.path()).await;

    // When
    let plugin = modules::transport::init(&config, Some(&buffer))
        .unwrap()
        .expect("enabled transport should be built");

    // Then
    assert_eq!(plugin.info().name, modules::transport::NAME);
    assert_eq!(plugin.info().plugin_type, PluginType::Transport);
}

#[tokio::test]
async fn test_collector_init_loads_keys_and_reloads() {
    // Given: an AEAD key on disk
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("client.aead");
    generate_aead_key(&key_path).unwrap();
    let mut config = config(dir.path());
    config.collector.enabled = true;
    config.sealing.client_id = "edge-01".to_owned();
    config.sealing.encryption_key_path = key_path.display().to_string();
    let buffer = buffer(dir.path()).await;

    // When
    let (plugin, reloader) = modules::collector::init(&config, Some(&buffer))
        .unwrap()
        .expect("enabled collector should be built");

    // Then
    assert_eq!(plugin.info().plugin_type, PluginType::Collector);
    assert!(reloader.reload().await.is_ok());

    // A vanished key file fails the reload without panicking
    std::fs::remove_file(&key_path).unwrap();
    assert!(reloader.reload().await.is_err());
}

#[tokio::test]
async fn test_intake_init_opens_store_in_data_dir() {
    // Given
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.intake.enabled = true;
    config.intake.bind_addr = "127.0.0.1:0".to_owned();
    config.intake.keys_dir = dir.path().join("keys").display().to_string();
    config.intake.clients = vec![logpost_core::config::IntakeClient {
        client_id: "edge-01".to_owned(),
        token: "t".to_owned(),
    }];

    // When
    let (plugin, _keys) = modules::intake::init(&config)
        .await
        .unwrap()
        .expect("enabled intake should be built");

    // Then
    assert_eq!(plugin.info().name, modules::intake::NAME);
    assert!(dir.path().join("intake.db").exists());
}

#[tokio::test]
async fn test_empty_reload_handles() {
    let handles = ReloadHandles::default();

    assert!(handles.is_empty());
    handles.reload().await;
}
