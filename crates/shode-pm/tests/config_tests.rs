//! Home-directory configuration lookup
//!
//! Kept to a single test: it points HOME at a scratch directory, which is
//! process-wide state.

#![cfg(unix)]

use shode_pm::config::{config_dir, PmConfig};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_home_directory_config() {
    let home = TempDir::new().unwrap();
    std::env::set_var("HOME", home.path());

    let dir = config_dir().unwrap();
    assert_eq!(dir, home.path().join(".shode"));

    // Nothing on disk yet
    let config = PmConfig::load_default().unwrap();
    assert_eq!(config, PmConfig::default());
    assert_eq!(
        config.trust_store_path().unwrap(),
        home.path().join(".shode").join("trusted_signers.json")
    );

    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("config.toml"),
        "registry-url = \"https://mirror.example.com\"\nallow-unsigned = true\n",
    )
    .unwrap();

    let config = PmConfig::load_default().unwrap();
    assert_eq!(config.registry_url, "https://mirror.example.com");
    assert!(config.allow_unsigned);
    assert_eq!(config.lockfile_name, "shode-lock.json");

    fs::write(dir.join("config.toml"), "allow-unsigned = \"sometimes\"\n").unwrap();
    assert!(PmConfig::load_default().is_err());
}
