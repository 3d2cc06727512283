//! `EventStore` resumability: replayed events must keep their original ids
//! and must not be re-stored, so a stream resumed twice in a row replays
//! the same history rather than growing it.

use std::sync::{Arc, Mutex};

use mcp_runtime::model::{
    ProgressNotificationParam, ProgressToken, ServerJsonRpcMessage, ServerNotification,
};
use mcp_runtime::transport::event_store::{EventStore, LocalEventStore};

fn progress(value: f64) -> ServerJsonRpcMessage {
    ServerJsonRpcMessage::notification(ServerNotification::ProgressNotification(ProgressNotificationParam {
        progress_token: ProgressToken::from(value as u32),
        progress: value,
        total: None,
        message: None,
    }))
}

#[tokio::test]
async fn replay_preserves_order_and_original_ids() {
    let store = LocalEventStore::default();
    let stream_id = "req-1".to_string();

    let id0 = store.store_event(stream_id.clone(), progress(0.0)).await.unwrap();
    let id1 = store.store_event(stream_id.clone(), progress(1.0)).await.unwrap();
    let id2 = store.store_event(stream_id.clone(), progress(2.0)).await.unwrap();

    let replayed: Arc<Mutex<Vec<(String, ServerJsonRpcMessage)>>> = Arc::new(Mutex::new(Vec::new()));
    let resumed_stream = {
        let replayed = replayed.clone();
        store
            .replay_events_after(id0.clone(), move |event_id, message| {
                let replayed = replayed.clone();
                async move {
                    replayed.lock().unwrap().push((event_id, message));
                }
            })
            .await
            .unwrap()
    };

    assert_eq!(resumed_stream.as_deref(), Some(stream_id.as_str()));
    let replayed = replayed.lock().unwrap();
    assert_eq!(replayed.len(), 2, "everything after id0, not including it");
    assert_eq!(replayed[0].0, id1);
    assert_eq!(replayed[1].0, id2);
}

#[tokio::test]
async fn replaying_does_not_restore_events() {
    let store = LocalEventStore::default();
    let stream_id = "req-2".to_string();
    let id0 = store.store_event(stream_id.clone(), progress(0.0)).await.unwrap();
    let _id1 = store.store_event(stream_id.clone(), progress(1.0)).await.unwrap();

    let first_pass: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let first_pass = first_pass.clone();
        store
            .replay_events_after(id0.clone(), move |event_id, _message| {
                let first_pass = first_pass.clone();
                async move {
                    first_pass.lock().unwrap().push(event_id);
                }
            })
            .await
            .unwrap();
    }

    // Replaying again from the same point must produce the same single
    // event, not a second copy appended by the first replay.
    let second_pass: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let second_pass = second_pass.clone();
        store
            .replay_events_after(id0.clone(), move |event_id, _message| {
                let second_pass = second_pass.clone();
                async move {
                    second_pass.lock().unwrap().push(event_id);
                }
            })
            .await
            .unwrap();
    }

    assert_eq!(*first_pass.lock().unwrap(), *second_pass.lock().unwrap());
    assert_eq!(first_pass.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_last_event_id_reports_no_stream() {
    let store = LocalEventStore::default();
    let result = store.replay_events_after("nonexistent_0".to_string(), |_, _| async {}).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn old_events_are_evicted_once_the_per_stream_cap_is_exceeded() {
    let store = LocalEventStore::new(2);
    let stream_id = "req-3".to_string();
    let id0 = store.store_event(stream_id.clone(), progress(0.0)).await.unwrap();
    let _id1 = store.store_event(stream_id.clone(), progress(1.0)).await.unwrap();
    let _id2 = store.store_event(stream_id.clone(), progress(2.0)).await.unwrap();

    // id0 has been evicted, so resuming from it is no longer possible.
    let result = store.replay_events_after(id0, |_, _| async {}).await.unwrap();
    assert!(result.is_none());
}
