//! Integration tests for local package links

use shode_pm::links::{LINKS_FILE, LINK_PREFIX};
use shode_pm::{
    resolve_project, InMemoryCatalog, LinkError, LinkManager, LinkedCatalog, LockFile, Manifest,
    Version,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_package("utils", v("1.4.0"), &[])
        .with_package("http", v("2.0.0"), &[("utils", "^1.0.0")])
        .with_versions("log", vec![v("1.0.0"), v("1.1.0"), v("2.0.0")])
}

/// A checked-out package with its own manifest
fn checkout(root: &Path, name: &str, version: &str, deps: &[(&str, &str)]) -> PathBuf {
    let dir = root.join("src").join(name);
    fs::create_dir_all(&dir).unwrap();
    let mut manifest = Manifest::new(name, version);
    for (dep, range) in deps {
        manifest.add_dependency(dep, range, false).unwrap();
    }
    manifest.save(&dir.join("shode.json")).unwrap();
    dir
}

#[test]
fn test_links_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let utils = checkout(temp.path(), "utils", "1.5.0-dev", &[]);

    let links = LinkManager::open(temp.path()).unwrap();
    links.link("utils", &utils).unwrap();
    assert!(temp.path().join(LINKS_FILE).is_file());

    let reopened = LinkManager::open(temp.path()).unwrap();
    assert!(reopened.is_linked("utils"));
    assert_eq!(reopened.get_link("utils"), Some(utils.clone()));
    assert_eq!(reopened.list_links().len(), 1);

    assert_eq!(reopened.unlink("utils").unwrap(), utils);
    let again = LinkManager::open(temp.path()).unwrap();
    assert!(again.is_empty());
    assert!(matches!(again.unlink("utils"), Err(LinkError::NotLinked(_))));
}

#[test]
fn test_corrupt_link_file() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(LINKS_FILE), "{not json").unwrap();
    assert!(matches!(
        LinkManager::open(temp.path()),
        Err(LinkError::ParseError(_))
    ));
}

#[test]
fn test_linked_package_shadows_registry() {
    let temp = TempDir::new().unwrap();
    let utils = checkout(temp.path(), "utils", "1.3.0", &[("log", "^1.0.0")]);
    let links = LinkManager::open(temp.path()).unwrap();
    links.link("utils", &utils).unwrap();

    let mut manifest = Manifest::new("app", "1.0.0");
    manifest.add_dependency("http", "^2.0.0", false).unwrap();

    let registry = catalog();
    let linked = LinkedCatalog::new(&registry, &links).unwrap();
    let project = resolve_project(&manifest, &linked).unwrap();

    // The local checkout wins over the newer registry release
    assert_eq!(project.tree.versions["utils"], v("1.3.0"));
    assert_eq!(project.tree.versions["log"], v("1.1.0"));

    let mut lockfile = LockFile::generate(&project.runtime, &project.dev, "https://r.io");
    assert_eq!(links.apply_to_lockfile(&mut lockfile), 1);

    let entry = lockfile.get("utils").unwrap();
    assert_eq!(entry.resolved, format!("{}{}", LINK_PREFIX, utils.display()));
    assert!(entry.integrity.is_empty());
    assert!(lockfile.get("http").unwrap().resolved.starts_with("https://r.io/"));
    lockfile.verify().unwrap();
}

#[test]
fn test_linked_catalog_rechecks_manifests() {
    let temp = TempDir::new().unwrap();
    let utils = checkout(temp.path(), "utils", "1.5.0", &[]);
    let links = LinkManager::open(temp.path()).unwrap();
    links.link("utils", &utils).unwrap();

    fs::remove_file(utils.join("shode.json")).unwrap();
    let registry = catalog();
    assert!(matches!(
        LinkedCatalog::new(&registry, &links),
        Err(LinkError::NotAPackage(_))
    ));
}
