//! The `bitpack` binary against temporary directories.

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct CliEnv {
    temp: TempDir,
}

impl CliEnv {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        for dir in ["home", "module", "project"] {
            std::fs::create_dir_all(temp.path().join(dir)).unwrap();
        }
        Self {
            temp,
        }
    }

    fn path(&self, dir: &str) -> PathBuf {
        self.temp.path().join(dir)
    }

    fn bitpack(&self) -> Command {
        let mut cmd = Command::cargo_bin("bitpack").unwrap();
        cmd.current_dir(self.path("project"))
            .env("HOME", self.path("home"))
            .env("BITPACK_MODULE_PATH", self.path("module"))
            .env_remove("BITPACK_PACK_TYPE")
            .env_remove("RUST_LOG");
        cmd
    }
}

fn read_config(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
#[serial]
fn test_config_get_prefix_defaults_to_usr_local() {
    let env = CliEnv::new();
    env.bitpack().args(["config", "get", "prefix"]).assert().success().stdout("/usr/local\n");
}

#[test]
#[serial]
fn test_config_set_then_get() {
    let env = CliEnv::new();
    env.bitpack()
        .args(["--pack-type", "gulp", "config", "set", "registry", "staging"])
        .assert()
        .success()
        .stdout(predicate::str::contains("registry"));

    let path = env.path("project").join(".gulprc");
    assert_eq!(read_config(&path)["registry"], "staging");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        assert_eq!(std::fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
    }

    env.bitpack()
        .args(["--pack-type", "gulp", "config", "get", "registry"])
        .assert()
        .success()
        .stdout("staging\n");
}

#[test]
#[serial]
fn test_config_set_user_target() {
    let env = CliEnv::new();
    env.bitpack()
        .args(["--target", "user", "config", "set", "retries", "3"])
        .assert()
        .success();

    assert_eq!(read_config(&env.path("home").join(".packrc"))["retries"], 3);
    assert!(!env.path("project").join(".packrc").exists());
}

#[test]
#[serial]
fn test_config_delete() {
    let env = CliEnv::new();
    env.bitpack().args(["config", "set", "registry", "staging"]).assert().success();
    env.bitpack().args(["config", "delete", "registry"]).assert().success();

    assert!(read_config(&env.path("project").join(".packrc")).get("registry").is_none());
    env.bitpack()
        .args(["config", "get", "registry"])
        .assert()
        .success()
        .stdout("")
        .stderr(predicate::str::contains("is not set"));
}

#[test]
#[serial]
fn test_invalid_target_fails() {
    let env = CliEnv::new();
    env.bitpack()
        .args(["--target", "system", "config", "get", "prefix"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config target"));
}

#[cfg(unix)]
#[test]
#[serial]
fn test_bad_permissions_fail() {
    use std::os::unix::fs::PermissionsExt;

    let env = CliEnv::new();
    let path = env.path("project").join(".packrc");
    std::fs::write(&path, "{}").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

    env.bitpack().args(["config", "get", "prefix"]).assert().failure().stderr(predicate::str::contains("chmod 600"));
}

#[test]
#[serial]
fn test_publish_requires_login() {
    let env = CliEnv::new();
    let project = env.path("project");
    std::fs::write(project.join("gulp.json"), r#"{"name": "clean", "version": "1.0.0"}"#).unwrap();

    env.bitpack()
        .args(["--pack-type", "gulp", "publish", "task"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be logged in to publish"));
}
