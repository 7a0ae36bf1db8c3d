use lasershot_session::queue::{
    DeliveryError, DeliveryWorker, FileMessageStore, MemoryMessageStore, MessageStore,
    OutboundMessage, QueueError, QueueHandle, QueueParams, SharedStore,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn fast_params() -> QueueParams {
    QueueParams {
        retry_backoff_ms: 5,
        idle_poll_ms: 20,
    }
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    done()
}

#[test]
fn failures_are_retried_in_fifo_order() {
    const N: usize = 5;
    const K: usize = 3;

    let store = SharedStore::new(MemoryMessageStore::new());
    let attempts: Arc<Mutex<Vec<String>>> = Arc::default();
    let delivered: Arc<Mutex<Vec<String>>> = Arc::default();

    {
        let handle = QueueHandle::detached(store.clone());
        for i in 0..N {
            handle.enqueue(&format!("msg-{i}")).expect("enqueue");
        }
    }

    let transport = {
        let attempts = Arc::clone(&attempts);
        let delivered = Arc::clone(&delivered);
        let mut failures_left = K;
        move |m: &OutboundMessage| {
            attempts.lock().expect("lock").push(m.payload.clone());
            if failures_left > 0 {
                failures_left -= 1;
                return Err(DeliveryError::Status(503));
            }
            delivered.lock().expect("lock").push(m.payload.clone());
            Ok(())
        }
    };

    let worker = DeliveryWorker::spawn(store.clone(), transport, fast_params()).expect("spawn");
    let drained = wait_until(Duration::from_secs(10), || {
        store.pending().map(|p| p.is_empty()).unwrap_or(false)
    });
    worker.shutdown();
    assert!(drained, "queue did not drain");

    let expected: Vec<String> = (0..N).map(|i| format!("msg-{i}")).collect();
    assert_eq!(*delivered.lock().expect("lock"), expected);

    let attempts = attempts.lock().expect("lock");
    let first = attempts.iter().filter(|p| *p == "msg-0").count();
    assert_eq!(first, K + 1);
    assert_eq!(attempts.len(), N + K);
}

#[test]
fn enqueue_wakes_an_idle_worker() {
    let store = SharedStore::new(MemoryMessageStore::new());
    let delivered: Arc<Mutex<Vec<String>>> = Arc::default();
    let transport = {
        let delivered = Arc::clone(&delivered);
        move |m: &OutboundMessage| -> Result<(), DeliveryError> {
            delivered.lock().expect("lock").push(m.payload.clone());
            Ok(())
        }
    };
    let params = QueueParams {
        retry_backoff_ms: 5,
        idle_poll_ms: 60_000,
    };
    let worker = DeliveryWorker::spawn(store.clone(), transport, params).expect("spawn");
    // Let the worker reach its idle wait.
    std::thread::sleep(Duration::from_millis(50));

    worker.handle().enqueue("late").expect("enqueue");
    let ok = wait_until(Duration::from_secs(5), || {
        delivered.lock().map(|d| d.len() == 1).unwrap_or(false)
    });
    worker.shutdown();
    assert!(ok, "wake did not reach the worker");
}

#[test]
fn undelivered_rows_survive_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("outbound.json");

    {
        let store = SharedStore::new(FileMessageStore::open(&path).expect("open"));
        let offline = |_: &OutboundMessage| -> Result<(), DeliveryError> {
            Err(DeliveryError::Transport("no route".into()))
        };
        let worker = DeliveryWorker::spawn(store.clone(), offline, fast_params()).expect("spawn");
        let handle = worker.handle();
        handle.enqueue("one").expect("enqueue");
        handle.enqueue("two").expect("enqueue");
        std::thread::sleep(Duration::from_millis(30));
        worker.shutdown();
    }

    let store = SharedStore::new(FileMessageStore::open(&path).expect("reopen"));
    let pending: Vec<String> = store
        .pending()
        .expect("pending")
        .into_iter()
        .map(|m| m.payload)
        .collect();
    assert_eq!(pending, vec!["one", "two"]);

    let delivered: Arc<Mutex<Vec<String>>> = Arc::default();
    let transport = {
        let delivered = Arc::clone(&delivered);
        move |m: &OutboundMessage| -> Result<(), DeliveryError> {
            delivered.lock().expect("lock").push(m.payload.clone());
            Ok(())
        }
    };
    let worker = DeliveryWorker::spawn(store.clone(), transport, fast_params()).expect("spawn");
    let ok = wait_until(Duration::from_secs(5), || {
        store.pending().map(|p| p.is_empty()).unwrap_or(false)
    });
    worker.shutdown();
    assert!(ok);
    assert_eq!(*delivered.lock().expect("lock"), vec!["one", "two"]);
    assert!(FileMessageStore::open(&path).expect("reopen").pending().expect("pending").is_empty());
}

#[test]
fn failed_write_is_reported_and_keeps_earlier_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lane = dir.path().join("lane");
    std::fs::create_dir(&lane).expect("mkdir");
    let path = lane.join("outbound.json");

    let store = SharedStore::new(FileMessageStore::open(&path).expect("open"));
    let handle = QueueHandle::detached(store.clone());
    handle.enqueue("first").expect("enqueue");
    handle.enqueue("second").expect("enqueue");

    std::fs::remove_dir_all(&lane).expect("remove store dir");
    let err = handle.enqueue("lost").unwrap_err();
    assert!(matches!(err, QueueError::Store(_)), "{err:?}");

    let payloads = |h: &QueueHandle<FileMessageStore>| -> Vec<String> {
        h.pending()
            .expect("pending")
            .into_iter()
            .map(|m| m.payload)
            .collect()
    };
    assert_eq!(payloads(&handle), vec!["first", "second"]);

    std::fs::create_dir(&lane).expect("restore store dir");
    let delivered: Arc<Mutex<Vec<String>>> = Arc::default();
    let transport = {
        let delivered = Arc::clone(&delivered);
        move |m: &OutboundMessage| -> Result<(), DeliveryError> {
            delivered.lock().expect("lock").push(m.payload.clone());
            Ok(())
        }
    };
    let worker = DeliveryWorker::spawn(store.clone(), transport, fast_params()).expect("spawn");
    let ok = wait_until(Duration::from_secs(5), || {
        store.pending().map(|p| p.is_empty()).unwrap_or(false)
    });
    worker.shutdown();
    assert!(ok, "earlier rows were not drained");
    assert_eq!(*delivered.lock().expect("lock"), vec!["first", "second"]);
    assert!(payloads(&handle).is_empty());
}
