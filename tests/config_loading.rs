use std::io::Write;
use std::path::PathBuf;

use relay_core::config::AppConfig;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[workspace]
dir = "/tmp/relay-test"

[chains]
dir = "/srv/chains"
validate_before_run = false

[tools]
timeout_secs = 5
working_dir = "/tmp/relay-work"

[log]
enabled = true
dir = "runs"
level = 3
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.workspace_dir(), PathBuf::from("/tmp/relay-test"));
    assert_eq!(config.chains_dir(), PathBuf::from("/srv/chains"));
    assert!(!config.chains.validate_before_run);
    assert_eq!(config.tools.timeout_secs, 5);
    assert_eq!(config.tools.working_dir, "/tmp/relay-work");
    assert!(config.log.enabled);
    assert_eq!(config.log.level, 3);
    assert_eq!(config.log_dir(), PathBuf::from("/tmp/relay-test/runs"));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("RELAY_TEST_CHAINS_DIR", "/opt/expanded-chains");

    let toml_content = r#"
[chains]
dir = "${RELAY_TEST_CHAINS_DIR}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.chains_dir(), PathBuf::from("/opt/expanded-chains"));

    std::env::remove_var("RELAY_TEST_CHAINS_DIR");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[workspace]
dir = "/tmp/relay-minimal"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(
        config.chains_dir(),
        PathBuf::from("/tmp/relay-minimal/chains")
    );
    assert!(config.chains.validate_before_run);
    assert_eq!(config.tools.timeout_secs, 30);
    assert_eq!(config.tools.working_dir, ".");
    assert!(!config.log.enabled);
    assert_eq!(config.log.level, 2);
}

#[test]
fn test_missing_file_is_config_not_found() {
    let err = AppConfig::load(std::path::Path::new("/definitely/not/here/relay.toml"))
        .expect_err("missing file should fail");
    assert!(err.to_string().contains("/definitely/not/here/relay.toml"));
}

#[test]
fn test_malformed_toml_is_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[tools]\ntimeout_secs = \"soon\"\n")
        .expect("write toml");

    assert!(AppConfig::load(tmp.path()).is_err());
}
