//! Arbitrary bytes as a bootstrap snapshot.
//!
//! Restoring must either reject the snapshot or yield a worker whose own
//! snapshot restores to the same state.

#![no_main]

use lamport_core::{Worker, WorkerConfig};
use lamport_proto::Snapshot;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(snapshot) = Snapshot::from_cbor(data) else {
        return;
    };
    let Ok(worker) = Worker::from_snapshot(snapshot, WorkerConfig::default()) else {
        return;
    };

    let saved = worker.to_snapshot();
    let restored = Worker::from_snapshot(saved.clone(), WorkerConfig::default())
        .expect("saved snapshot restores");
    assert_eq!(restored.to_snapshot(), saved);
});
