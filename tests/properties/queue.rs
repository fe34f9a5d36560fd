//! Property tests for queue snapshot persistence.

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use proptest::prelude::*;
use tempfile::tempdir;

use dirsync::fslisten::{ChangeEvent, ChangeKind};
use dirsync::queue::{DurableQueue, QueueStore, SnapshotFile};

fn kind() -> impl Strategy<Value = ChangeKind> {
    prop_oneof![
        Just(ChangeKind::Create),
        Just(ChangeKind::Modify),
        Just(ChangeKind::Delete),
        Just(ChangeKind::Ignore),
    ]
}

fn event() -> impl Strategy<Value = ChangeEvent> {
    (proptest::string::string_regex("[a-z0-9_ .-]{1,12}(/[a-z0-9_ .-]{1,12}){0,3}").unwrap(), kind())
        .prop_map(|(path, kind)| ChangeEvent::new(PathBuf::from("/hot").join(path), kind))
}

/// Any byte string the kernel could hand back as a file name.
fn raw_name_event() -> impl Strategy<Value = ChangeEvent> {
    (
        proptest::collection::vec(any::<u8>().prop_filter("no separators", |b| *b != b'/' && *b != 0), 1..16),
        kind(),
    )
        .prop_map(|(name, kind)| ChangeEvent::new(PathBuf::from("/hot").join(OsStr::from_bytes(&name)), kind))
}

#[derive(Debug, Clone)]
enum Op {
    Push(ChangeEvent),
    Pop,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![3 => event().prop_map(Op::Push), 2 => Just(Op::Pop)]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: Saving then loading a snapshot yields the same sequence.
    #[test]
    fn property_snapshot_round_trip(
        events in proptest::collection::vec(prop_oneof![event(), raw_name_event()], 0..24)
    ) {
        let dir = tempdir().unwrap();
        let store = SnapshotFile::new(dir.path().join("state.json"));
        let items: VecDeque<ChangeEvent> = events.iter().cloned().collect();

        store.save(&items).unwrap();
        prop_assert_eq!(store.load().unwrap(), events);
    }

    /// PROPERTY: After any push/pop sequence the file holds exactly the
    /// in-memory queue, and a reopened queue resumes it.
    #[test]
    fn property_state_file_tracks_queue(ops in proptest::collection::vec(op(), 0..32)) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let queue = DurableQueue::open(SnapshotFile::new(&path));
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                Op::Push(event) => {
                    queue.push(event.clone());
                    model.push_back(event);
                }
                Op::Pop => {
                    prop_assert_eq!(queue.try_pop(), model.pop_front());
                }
            }
        }

        let expected: Vec<_> = model.into_iter().collect();
        prop_assert_eq!(queue.snapshot(), expected.clone());
        let reopened = DurableQueue::open(SnapshotFile::<ChangeEvent>::new(&path));
        prop_assert_eq!(reopened.snapshot(), expected);
    }
}
