use ledgerllm::memory::{EphemeralMemory, MemoryStore, StoredMessage};

fn msg(role: &str, content: &str) -> StoredMessage {
    StoredMessage::new(role, content)
}

#[tokio::test]
async fn append_extends_thread_in_order() {
    let store = EphemeralMemory::new(24);
    store
        .append("t1", "user-1", &[msg("user", "one")])
        .await
        .unwrap();
    store
        .append(
            "t1",
            "user-1",
            &[msg("assistant", "two"), msg("assistant", "three")],
        )
        .await
        .unwrap();

    let loaded = store.load("t1").await.unwrap();
    let contents: Vec<&str> = loaded.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn audit_indexes_are_strictly_monotonic() {
    let store = EphemeralMemory::new(24);
    for i in 0..5 {
        store
            .append("t2", "user-1", &[msg("user", &format!("m{}", i))])
            .await
            .unwrap();
    }
    store
        .append(
            "t2",
            "user-1",
            &[msg("assistant", "a"), msg("assistant", "b")],
        )
        .await
        .unwrap();

    let records = store.audit_records("t2").await;
    assert_eq!(records.len(), 7);
    for (expected, record) in records.iter().enumerate() {
        assert_eq!(record.message_index, expected as u64);
    }
    // Append order matches index order.
    assert_eq!(records[5].content, "a");
    assert_eq!(records[6].content, "b");
}

#[tokio::test]
async fn unknown_thread_loads_empty() {
    let store = EphemeralMemory::new(24);
    assert!(store.load("missing").await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_thread_is_absent_but_audit_survives() {
    let store = EphemeralMemory::new(24);
    store
        .append("t3", "user-1", &[msg("user", "hello"), msg("assistant", "hi")])
        .await
        .unwrap();

    store.backdate("t3", 25).await;

    assert!(store.load("t3").await.unwrap().is_empty());
    let records = store.audit_records("t3").await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].content, "hello");
}

#[tokio::test]
async fn close_removes_active_and_stamps_audit() {
    let store = EphemeralMemory::new(24);
    store
        .append("t4", "user-1", &[msg("user", "hello")])
        .await
        .unwrap();

    store.close("t4").await.unwrap();

    assert!(store.load("t4").await.unwrap().is_empty());
    let records = store.audit_records("t4").await;
    assert_eq!(records.len(), 1);
    assert!(records[0].closed_at.is_some());
}

#[tokio::test]
async fn append_after_close_starts_a_fresh_active_view() {
    let store = EphemeralMemory::new(24);
    store
        .append("t5", "user-1", &[msg("user", "first")])
        .await
        .unwrap();
    store.close("t5").await.unwrap();
    store
        .append("t5", "user-1", &[msg("user", "second")])
        .await
        .unwrap();

    let loaded = store.load("t5").await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].content, "second");

    // The audit trail spans both lives of the thread.
    let records = store.audit_records("t5").await;
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn concurrent_appends_serialize_per_thread() {
    use std::sync::Arc;
    let store = Arc::new(EphemeralMemory::new(24));

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .append("t6", "user-1", &[msg("user", &format!("m{}", i))])
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let records = store.audit_records("t6").await;
    assert_eq!(records.len(), 8);
    let mut indexes: Vec<u64> = records.iter().map(|r| r.message_index).collect();
    indexes.sort_unstable();
    assert_eq!(indexes, (0..8).collect::<Vec<u64>>());
}
