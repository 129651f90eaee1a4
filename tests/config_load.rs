//! Integration tests for configuration loading.

use std::path::Path;

use nutri_voice::config::{Config, SecretRef};
use nutri_voice::store::DayZone;

#[tokio::test]
async fn template_config_parses() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates/config.yaml");
    let cfg = Config::load(&path)
        .await
        .unwrap_or_else(|e| panic!("templates/config.yaml failed to load: {e:#}"));

    assert_eq!(cfg.model.model, "gpt-4o-realtime-preview");
    assert_eq!(cfg.model.voice.as_deref(), Some("alloy"));
    assert_eq!(
        cfg.model.api_key,
        SecretRef::Plain("$OPENAI_API_KEY".to_string())
    );
    assert_eq!(cfg.day_zone().unwrap(), DayZone::Named(chrono_tz::UTC));
    assert!(cfg.store_path().is_absolute() || cfg.store_path().ends_with("food.db"));
    // Instructions fall back to the built-in prompt.
    assert!(cfg.assistant.instructions.contains("track food consumption"));
}

#[tokio::test]
async fn missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config::load(&dir.path().join("config.yaml"))
        .await
        .expect("missing config should fall back to defaults");
    assert_eq!(cfg.room.participant, "local-user");
    assert_eq!(cfg.day_zone().unwrap(), DayZone::Local);
}

#[tokio::test]
async fn partial_file_keeps_other_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    let db = dir.path().join("data").join("food.db");
    std::fs::write(
        &path,
        format!(
            "room:\n  participant: bob\nstore:\n  path: {}\nday_boundary:\n  timezone: America/New_York\n",
            db.display()
        ),
    )
    .unwrap();

    let cfg = Config::load(&path).await.unwrap();
    assert_eq!(cfg.room.participant, "bob");
    assert_eq!(cfg.store_path(), db);
    assert_eq!(
        cfg.day_zone().unwrap(),
        DayZone::Named(chrono_tz::America::New_York)
    );
    assert_eq!(cfg.model.modalities, vec!["text", "audio"]);
}

// ── validation ──────────────────────────────────────────────

#[tokio::test]
async fn unknown_field_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "model:\n  model: x\n  temperature: 0.2\n").unwrap();

    let result = Config::load(&path).await;
    assert!(result.is_err(), "unknown field should cause a parse error");
    let err_msg = format!("{:?}", result.unwrap_err());
    assert!(
        err_msg.contains("unknown field") || err_msg.contains("temperature"),
        "error should mention the unknown field, got: {err_msg}"
    );
}

#[tokio::test]
async fn invalid_timezone_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tz.yaml");
    std::fs::write(&path, "day_boundary:\n  timezone: Atlantis/Lost\n").unwrap();
    assert!(Config::load(&path).await.is_err());
}

#[tokio::test]
async fn empty_participant_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("room.yaml");
    std::fs::write(&path, "room:\n  participant: \"\"\n").unwrap();
    assert!(Config::load(&path).await.is_err());
}

#[tokio::test]
async fn pointer_secret_parses() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secret.yaml");
    std::fs::write(
        &path,
        "model:\n  api_key: { key: NUTRI_CFG_TEST_KEY, source: env }\n",
    )
    .unwrap();
    std::env::set_var("NUTRI_CFG_TEST_KEY", "sk-from-env");

    let cfg = Config::load(&path).await.unwrap();
    assert_eq!(
        cfg.model.api_key.resolve().unwrap(),
        Some("sk-from-env".to_string())
    );
}
