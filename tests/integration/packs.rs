//! Query, install and publish through the facade.

use crate::common::{PACK_TYPE, TestBitPack, write_pack_dir};
use bitpack::core::BitpackError;
use std::path::Path;
use std::sync::Arc;

async fn seeded() -> TestBitPack {
    let t = TestBitPack::new().unwrap();
    for version in ["1.0.0", "1.2.0", "2.0.0"] {
        t.seed_version("task", "clean", version).await.unwrap();
    }
    t
}

fn error_of(err: &anyhow::Error) -> Option<&BitpackError> {
    err.downcast_ref::<BitpackError>()
}

#[tokio::test]
async fn test_query_picks_highest_matching_version() {
    let t = seeded().await;

    let pack = t.bitpack.install(PACK_TYPE, "task", "public", "clean@^1.0.0", t.options()).await.unwrap();
    assert_eq!(pack.version(), "1.2.0");

    let pack = t.bitpack.install(PACK_TYPE, "task", "public", "clean", t.options()).await.unwrap();
    assert_eq!(pack.version(), "2.0.0");

    let err = t.bitpack.install(PACK_TYPE, "task", "public", "clean@^9.0.0", t.options()).await.unwrap_err();
    assert!(matches!(error_of(&err), Some(BitpackError::NoVersionMatch { .. })));
}

#[tokio::test]
async fn test_install_extracts_into_exec_path() {
    let t = seeded().await;
    let pack = t.bitpack.install(PACK_TYPE, "task", "public", "clean@1.0.0", t.options()).await.unwrap();

    let expected = t.ctx.exec_path.join(".gulp").join("task").join("public").join("clean").join("1.0.0");
    assert_eq!(pack.pack_path(), expected.as_path());
    assert!(expected.join("gulp.json").is_file());
    assert_eq!(pack.main_path(), Some(expected.join("index.js")));
    assert_eq!(t.installer.load_count(), 1);
}

#[tokio::test]
async fn test_repeated_get_reuses_installed_pack() {
    let t = seeded().await;
    let first = t.bitpack.get(PACK_TYPE, "task", "public", "clean@^1.0.0", t.options()).await.unwrap();
    let second = t.bitpack.get(PACK_TYPE, "task", "public", "clean@^1.0.0", t.options()).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(t.fetcher.fetch_count(), 1);
}

#[tokio::test]
async fn test_unknown_pack() {
    let t = TestBitPack::new().unwrap();
    let err = t.bitpack.get(PACK_TYPE, "task", "public", "nothing", t.options()).await.unwrap_err();
    assert!(matches!(error_of(&err), Some(BitpackError::PackNotFound { .. })));
}

#[tokio::test]
async fn test_publish_uploads_with_publish_key() {
    let t = TestBitPack::new().unwrap();
    write_pack_dir(&t.ctx.exec_path.join("lint"), "lint", "0.1.0").unwrap();

    t.bitpack.sign_up("alice", "alice@example.com", "secret", t.options()).await.unwrap();
    let key = t.bitpack.publish(PACK_TYPE, "task", "public", Some(Path::new("lint")), t.options()).await.unwrap();
    assert_eq!(key.pack_version_number, "0.1.0");

    let uploads = t.transport.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].url, "https://bitpack.io/api/v1/publish");
    assert_eq!(uploads[0].auth_token, key.key);
}

#[tokio::test]
async fn test_publish_by_non_collaborator_is_denied() {
    let t = TestBitPack::new().unwrap();
    let user = || t.options().with_target("user");
    write_pack_dir(&t.ctx.exec_path.join("lint"), "lint", "0.1.0").unwrap();

    t.bitpack.sign_up("alice", "alice@example.com", "secret", user()).await.unwrap();
    t.bitpack.publish(PACK_TYPE, "task", "public", Some(Path::new("lint")), user()).await.unwrap();

    write_pack_dir(&t.ctx.exec_path.join("lint"), "lint", "0.2.0").unwrap();
    t.bitpack.sign_up("bob", "bob@example.com", "secret", user()).await.unwrap();
    let err = t
        .bitpack
        .publish(PACK_TYPE, "task", "public", Some(Path::new("lint")), user())
        .await
        .unwrap_err();
    assert!(matches!(error_of(&err), Some(BitpackError::AccessDenied { .. })));
}

#[tokio::test]
async fn test_published_version_cannot_be_republished() {
    let t = seeded().await;
    let source = t.ctx.exec_path.join("clean");
    write_pack_dir(&source, "clean", "1.2.0").unwrap();

    t.bitpack.sign_up("carol", "carol@example.com", "secret", t.options()).await.unwrap();
    let err = t
        .bitpack
        .publish(PACK_TYPE, "task", "public", Some(Path::new("clean")), t.options())
        .await
        .unwrap_err();
    assert!(matches!(error_of(&err), Some(BitpackError::PackVersionExists { .. })));
}
