//! End-to-end tests for the install workflow: manifest, resolution,
//! artifact verification and lockfile

use ed25519_dalek::SigningKey;
use shode_pm::trust::{checksum, encode_public_key, sign_detached};
use shode_pm::{
    resolve_project, ArtifactClaim, ArtifactVerifier, InMemoryCatalog, LockFile, Manifest,
    PmConfig, Version, VerifyError,
};
use std::collections::BTreeMap;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_package("http", v("2.1.0"), &[("log", "^1.2.0")])
        .with_package("http", v("2.2.0"), &[("log", "^1.3.0")])
        .with_versions("log", vec![v("1.2.0"), v("1.3.4"), v("2.0.0")])
        .with_package("test-kit", v("0.9.1"), &[("log", ">=1.0.0")])
}

/// Pretend archive for a package version
fn tarball(name: &str, version: &Version) -> Vec<u8> {
    format!("{}-{}.tgz", name, version).into_bytes()
}

struct Workspace {
    _temp: TempDir,
    manifest_path: std::path::PathBuf,
    config: PmConfig,
    key: SigningKey,
}

fn workspace() -> Workspace {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("app");
    std::fs::create_dir_all(&project).unwrap();

    let mut manifest = Manifest::new("app", "1.0.0");
    manifest.add_dependency("http", "^2.0.0", false).unwrap();
    manifest.add_dependency("test-kit", "~0.9.0", true).unwrap();
    let manifest_path = project.join("shode.json");
    manifest.save(&manifest_path).unwrap();

    let config = PmConfig {
        registry_url: "https://registry.example.test".to_string(),
        trust_store_path: Some(temp.path().join("home").join("trusted_signers.json")),
        ..PmConfig::default()
    };

    Workspace {
        _temp: temp,
        manifest_path,
        config,
        key: SigningKey::from_bytes(&[7u8; 32]),
    }
}

#[test]
fn test_install_workflow() {
    init_tracing();
    let ws = workspace();
    let verifier = ArtifactVerifier::from_config(&ws.config).unwrap();
    verifier
        .store()
        .add_signer("publisher", &encode_public_key(&ws.key.verifying_key()), "")
        .unwrap();

    let manifest = Manifest::load(&ws.manifest_path).unwrap();
    let mut project = resolve_project(&manifest, &catalog()).unwrap();
    assert_eq!(project.tree.install_order.first().map(String::as_str), Some("log"));

    let versions = project.tree.versions.clone();
    for (name, version) in &versions {
        let bytes = tarball(name, version);
        let sum = checksum(&bytes);
        let signature = sign_detached(&ws.key, &bytes);
        let claim = ArtifactClaim::unsigned(&bytes, &sum).with_signature("publisher", &signature);

        let accepted = verifier.verify(&claim).unwrap();
        assert!(accepted.verified);
        project.tree.record_integrity(name, &accepted.checksum);
    }

    // Split roots were taken before integrity was recorded
    let runtime = project.tree.roots[..project.runtime.len()].to_vec();
    let dev = project.tree.roots[project.runtime.len()..].to_vec();
    let lockfile = LockFile::generate(&runtime, &dev, &ws.config.registry_url);

    let lock_path = LockFile::path_for(&ws.manifest_path, &ws.config.lockfile_name);
    lockfile.save(&lock_path).unwrap();

    let loaded = LockFile::load(&lock_path).unwrap();
    loaded.verify().unwrap();

    let declared: BTreeMap<String, String> = manifest.all_dependencies().into_iter().collect();
    loaded.validate(&declared).unwrap();

    let http = loaded.get("http").unwrap();
    assert_eq!(http.version, "2.2.0");
    assert_eq!(http.dependencies["log"], "1.3.4");
    assert_eq!(
        http.integrity,
        format!("sha256-{}", checksum(&tarball("http", &v("2.2.0"))))
    );
    assert_eq!(
        http.resolved,
        "https://registry.example.test/http/-/http-2.2.0.tgz"
    );
    assert!(loaded.dev_dependencies.contains_key("test-kit"));
}

#[test]
fn test_untrusted_artifact_stops_install() {
    let ws = workspace();
    let verifier = ArtifactVerifier::from_config(&ws.config).unwrap();

    let manifest = Manifest::load(&ws.manifest_path).unwrap();
    let project = resolve_project(&manifest, &catalog()).unwrap();

    let bytes = tarball("http", &project.tree.versions["http"]);
    let sum = checksum(&bytes);
    let signature = sign_detached(&ws.key, &bytes);
    let claim = ArtifactClaim::unsigned(&bytes, &sum).with_signature("publisher", &signature);

    assert_eq!(
        verifier.verify(&claim),
        Err(VerifyError::UntrustedSigner("publisher".to_string()))
    );
}

#[test]
fn test_stale_lock_detected_after_manifest_change() {
    let ws = workspace();
    let manifest = Manifest::load(&ws.manifest_path).unwrap();
    let project = resolve_project(&manifest, &catalog()).unwrap();
    let lockfile = LockFile::generate(&project.runtime, &project.dev, &ws.config.registry_url);

    let mut bumped = manifest.clone();
    bumped.add_dependency("log", "^2.0.0", false).unwrap();
    let declared: BTreeMap<String, String> = bumped.all_dependencies().into_iter().collect();

    assert!(lockfile.validate(&declared).is_err());
}
