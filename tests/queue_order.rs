use a11y_relay::queue;
use a11y_relay::report::AnalyzeJob;
use std::time::Duration;
use uuid::Uuid;

fn job(marker: usize) -> AnalyzeJob {
    AnalyzeJob::new(Uuid::new_v4(), format!("https://example.com/{marker}"), "")
}

#[tokio::test]
async fn jobs_come_out_in_submission_order() {
    let (tx, rx) = queue::bounded(16);
    for i in 0..16 {
        tx.enqueue(job(i)).await.expect("enqueue");
    }
    drop(tx);

    let mut seen = Vec::new();
    while let Some(j) = rx.dequeue().await {
        seen.push(j.url);
    }
    let expected: Vec<String> = (0..16).map(|i| format!("https://example.com/{i}")).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn enqueue_is_immediate_below_capacity() {
    let (tx, _rx) = queue::bounded(3);
    for i in 0..3 {
        tokio::time::timeout(Duration::from_millis(50), tx.enqueue(job(i)))
            .await
            .expect("enqueue should not wait")
            .expect("enqueue");
    }
    assert_eq!(tx.pending(), 3);
}

#[tokio::test]
async fn enqueue_waits_at_capacity_until_a_slot_frees() {
    let (tx, rx) = queue::bounded(2);
    tx.enqueue(job(0)).await.expect("enqueue");
    tx.enqueue(job(1)).await.expect("enqueue");

    let blocked = tokio::time::timeout(Duration::from_millis(100), tx.enqueue(job(2))).await;
    assert!(blocked.is_err(), "third enqueue should wait for space");

    let producer = {
        let tx = tx.clone();
        tokio::spawn(async move { tx.enqueue(job(3)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!producer.is_finished());

    let first = rx.dequeue().await.expect("job");
    assert_eq!(first.url, "https://example.com/0");

    tokio::time::timeout(Duration::from_secs(1), producer)
        .await
        .expect("producer should resume")
        .expect("join")
        .expect("enqueue");

    drop(tx);
    assert_eq!(rx.dequeue().await.expect("job").url, "https://example.com/1");
    assert_eq!(rx.dequeue().await.expect("job").url, "https://example.com/3");
    assert!(rx.dequeue().await.is_none());
}

#[tokio::test]
async fn workers_share_one_queue_without_duplicates() {
    let (tx, rx) = queue::bounded(8);
    let mut handles = Vec::new();
    for _ in 0..3 {
        let rx = rx.clone();
        handles.push(tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(j) = rx.dequeue().await {
                got.push(j.url);
            }
            got
        }));
    }
    drop(rx);
    for i in 0..30 {
        tx.enqueue(job(i)).await.expect("enqueue");
    }
    drop(tx);

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.expect("join"));
    }
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 30);
}
