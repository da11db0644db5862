//! Config files on disk.

use localchat::AppConfig;
use localchat::config::ModelRecord;

#[test]
fn partial_file_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
use_worker = true
greeting = "Ask me anything."

[[models]]
model_id = "tiny"
repo_id = "someone/tiny-GGUF"
gguf_file = "tiny.Q4_K_M.gguf"

[ui]
port = 8080
"#,
    )
    .unwrap();

    let config = AppConfig::from_file(&path).unwrap();
    assert!(config.use_worker);
    assert_eq!(config.greeting, "Ask me anything.");
    assert_eq!(config.models.len(), 1);
    assert_eq!(config.default_model().unwrap().model_id, "tiny");
    assert_eq!(config.default_model().unwrap().tokenizer_id, "");
    assert_eq!(config.ui.port, 8080);
    assert_eq!(config.ui.host, "127.0.0.1");
    assert!((config.sampling.temperature - 0.7).abs() < f64::EPSILON);
    config.validate().unwrap();
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let mut config = AppConfig::default();
    config.models.push(ModelRecord {
        model_id: "second".into(),
        ..Default::default()
    });
    config.sampling.max_tokens = 512;
    config.save_to_file(&path).unwrap();

    let loaded = AppConfig::from_file(&path).unwrap();
    assert_eq!(loaded.models, config.models);
    assert_eq!(loaded.sampling.max_tokens, 512);
}
