//! Binary-level coverage: exit codes and on-disk outputs.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent directories");
    }
    std::fs::write(&path, contents).expect("write file");
}

fn tsbundle() -> Command {
    Command::cargo_bin("tsbundle").expect("binary built")
}

#[test]
fn bundles_a_project_end_to_end() {
    let temp = TempDir::new().unwrap();
    write_file(
        temp.path(),
        "tsbundle.json",
        r#"{
            "entry": {"index": "src/index.ts"},
            "outDir": "dist",
            "declarationDir": "types",
            "rootDir": "src",
            "cache": false
        }"#,
    );
    write_file(
        temp.path(),
        "types/index.d.ts",
        "import { User } from \"./user\";\nexport { User };\n",
    );
    write_file(
        temp.path(),
        "types/user.d.ts",
        "export interface User { name: string }\n",
    );

    tsbundle()
        .arg("-p")
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("built 1 bundle"));

    let bundled = std::fs::read_to_string(temp.path().join("dist/index.d.ts")).unwrap();
    assert!(bundled.contains("interface User { name: string }"));
    assert!(bundled.contains("export type { User };"));
}

#[test]
fn invalid_config_exits_3() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "tsbundle.json", "{invalid json");

    tsbundle()
        .arg("-p")
        .arg(temp.path())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn missing_entry_declaration_exits_2() {
    let temp = TempDir::new().unwrap();
    write_file(
        temp.path(),
        "tsbundle.json",
        r#"{
            "entry": {"index": "src/index.ts"},
            "declarationDir": "types",
            "cache": false
        }"#,
    );

    tsbundle()
        .arg("-p")
        .arg(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("declaration bundling failed"));
}

#[test]
fn lowercase_v_prints_version() {
    tsbundle()
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn clear_cache_flag_removes_cache_dir() {
    let temp = TempDir::new().unwrap();
    write_file(
        temp.path(),
        "tsbundle.json",
        r#"{
            "entry": {"index": "src/index.ts"},
            "declarationDir": "types",
            "outDir": "dist"
        }"#,
    );
    write_file(
        temp.path(),
        "types/index.d.ts",
        "export declare const VERSION: string;\n",
    );
    // Prime the cache.
    tsbundle().arg("-p").arg(temp.path()).assert().success();
    assert!(temp.path().join(".tsbundle").exists());

    tsbundle()
        .arg("-p")
        .arg(temp.path())
        .arg("-c")
        .assert()
        .success();
}
