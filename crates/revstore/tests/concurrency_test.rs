use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use revstore::DocumentStore;
use revstore_config::testing::TestEnvironment;

#[test]
fn concurrent_adds_never_share_an_id() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    let env = TestEnvironment::new().unwrap();
    let store = Arc::new(DocumentStore::from_config(&env.config()));
    let src = env.create_source("shared.txt", b"shared content").unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let src = src.clone();
            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|_| store.add(&src).unwrap().get())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(ids.insert(id), "id {} handed out twice", id);
        }
    }

    let total = (THREADS * PER_THREAD) as u64;
    assert_eq!(ids.len() as u64, total);
    assert_eq!(store.next_id(), total + 1);
    assert_eq!(store.stats().unwrap().document_count, total);
}
