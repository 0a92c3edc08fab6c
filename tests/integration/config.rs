//! Layered config resolution through the public API.

use crate::common::TestBitPack;
use bitpack::config::ConfigValue;
use bitpack::core::BitpackError;
use serde_json::json;

#[tokio::test]
async fn test_layer_precedence() {
    let t = TestBitPack::new().unwrap();
    let ctx = &t.ctx;

    ctx.write_config(
        &ctx.module_path.join("resources"),
        json!({"a": 5, "b": 5, "c": 5, "d": 5, "e": 5, "prefix": ctx.global_path}),
    )
    .unwrap();
    ctx.write_config(&ctx.global_path, json!({"a": 4, "b": 4, "c": 4, "d": 4})).unwrap();
    ctx.write_config(&ctx.home_path, json!({"a": 3, "b": 3, "c": 3})).unwrap();
    ctx.write_config(&ctx.exec_path, json!({"a": 2, "b": 2})).unwrap();
    t.bitpack.configure(json!({"a": 1})).unwrap();

    for (key, expected) in [("a", 1i64), ("b", 2), ("c", 3), ("d", 4), ("e", 5)] {
        let value = t.bitpack.config_get(key, t.options()).await.unwrap();
        assert_eq!(value, Some(ConfigValue::from(expected)), "property {key}");
    }
}

#[tokio::test]
async fn test_user_target_skips_project_layer() {
    let t = TestBitPack::new().unwrap();
    t.ctx.write_config(&t.ctx.exec_path, json!({"registry": "project"})).unwrap();
    t.ctx.write_config(&t.ctx.home_path, json!({"registry": "user"})).unwrap();

    let project = t.bitpack.config_get("registry", t.options()).await.unwrap();
    let user = t.bitpack.config_get("registry", t.options().with_target("user")).await.unwrap();
    let global = t.bitpack.config_get("registry", t.options().with_target("global")).await.unwrap();

    assert_eq!(project, Some(ConfigValue::from("project")));
    assert_eq!(user, Some(ConfigValue::from("user")));
    assert_eq!(global, None);
}

#[tokio::test]
async fn test_writes_follow_target() {
    let t = TestBitPack::new().unwrap();
    for target in ["project", "user", "global"] {
        t.bitpack
            .config_set("owner", ConfigValue::from(target), t.options().with_target(target))
            .await
            .unwrap();
    }

    let read = |dir: &std::path::Path| -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(dir.join(".gulprc")).unwrap()).unwrap()
    };
    assert_eq!(read(&t.ctx.exec_path)["owner"], "project");
    assert_eq!(read(&t.ctx.home_path)["owner"], "user");
    assert_eq!(read(&t.ctx.global_path)["owner"], "global");
}

#[cfg(unix)]
#[tokio::test]
async fn test_world_readable_config_is_rejected() {
    use std::os::unix::fs::PermissionsExt;

    let t = TestBitPack::new().unwrap();
    let path = t.ctx.write_config(&t.ctx.exec_path, json!({"prefix": "/opt"})).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

    let err = t.bitpack.config_get("prefix", t.options()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BitpackError>(),
        Some(BitpackError::BadConfigPermissions { .. })
    ));
}

#[tokio::test]
async fn test_malformed_config_is_fatal() {
    let t = TestBitPack::new().unwrap();
    let path = t.ctx.write_config(&t.ctx.home_path, json!({})).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    assert!(t.bitpack.config_get("prefix", t.options()).await.is_err());
}

#[tokio::test]
async fn test_unknown_target_is_rejected() {
    let t = TestBitPack::new().unwrap();
    let err = t.bitpack.config_get("prefix", t.options().with_target("system")).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<BitpackError>(), Some(BitpackError::InvalidTarget { .. })));
}
