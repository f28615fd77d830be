use super::*;

fn store() -> Arc<dyn ObjectStoreImpl> {
    memory_store()
}

#[tokio::test]
async fn get_on_missing_key_is_none_not_error() {
    let s = store();
    assert_eq!(ObjectStore::get(&s, "nope").await.unwrap(), None);
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let s = store();
    ObjectStore::put(&s, "a/b", b"hello".to_vec()).await.unwrap();
    assert_eq!(ObjectStore::get(&s, "a/b").await.unwrap(), Some(b"hello".to_vec()));
}

#[tokio::test]
async fn delete_removes_key() {
    let s = store();
    ObjectStore::put(&s, "k", b"v".to_vec()).await.unwrap();
    ObjectStore::delete(&s, "k").await.unwrap();
    assert_eq!(ObjectStore::get(&s, "k").await.unwrap(), None);
}

#[tokio::test]
async fn delete_on_missing_key_is_not_an_error() {
    let s = store();
    ObjectStore::delete(&s, "nope").await.unwrap();
}

#[tokio::test]
async fn head_reflects_existence() {
    let s = store();
    assert!(!ObjectStore::head(&s, "k").await.unwrap());
    ObjectStore::put(&s, "k", b"v".to_vec()).await.unwrap();
    assert!(ObjectStore::head(&s, "k").await.unwrap());
}

#[tokio::test]
async fn list_returns_keys_under_prefix() {
    let s = store();
    ObjectStore::put(&s, "wal/wal-1", b"a".to_vec()).await.unwrap();
    ObjectStore::put(&s, "wal/wal-2", b"b".to_vec()).await.unwrap();
    ObjectStore::put(&s, "checkpoint/latest", b"c".to_vec()).await.unwrap();

    let mut keys = ObjectStore::list(&s, "wal/").await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["wal/wal-1".to_string(), "wal/wal-2".to_string()]);
}

#[tokio::test]
async fn put_is_last_writer_wins() {
    let s = store();
    ObjectStore::put(&s, "k", b"first".to_vec()).await.unwrap();
    ObjectStore::put(&s, "k", b"second".to_vec()).await.unwrap();
    assert_eq!(ObjectStore::get(&s, "k").await.unwrap(), Some(b"second".to_vec()));
}
