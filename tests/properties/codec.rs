//! Property tests for inotify record decoding and classification.

use proptest::prelude::*;

use dirsync::fslisten::codec::{decode, encode_record, HEADER_LEN};
use dirsync::fslisten::{classify, ChangeKind, EventMask, WatchHandle};

fn name_bytes() -> impl Strategy<Value = Vec<u8>> {
    // Kernel names never contain NUL or '/'.
    proptest::collection::vec(any::<u8>().prop_filter("no NUL or slash", |b| *b != 0 && *b != b'/'), 0..=40)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: Every mask classifies, and only the six watched flags produce
    /// anything but Ignore.
    #[test]
    fn property_classify_is_total(bits in any::<u32>()) {
        let kind = classify(EventMask::from_bits(bits));
        let acted = EventMask::CLOSE_WRITE.bits()
            | EventMask::CREATE.bits()
            | EventMask::MOVED_TO.bits()
            | EventMask::MODIFY.bits()
            | EventMask::DELETE.bits()
            | EventMask::MOVED_FROM.bits();
        if bits & acted == 0 {
            prop_assert_eq!(kind, ChangeKind::Ignore);
        } else {
            prop_assert_ne!(kind, ChangeKind::Ignore);
        }
    }

    /// PROPERTY: Close-after-write dominates every other flag.
    #[test]
    fn property_close_write_wins(bits in any::<u32>()) {
        let mask = EventMask::from_bits(bits | EventMask::CLOSE_WRITE.bits());
        prop_assert_eq!(classify(mask), ChangeKind::Modify);
    }

    /// PROPERTY: The decoder never panics, whatever the kernel hands it.
    #[test]
    fn property_decode_never_panics(buf in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut errors = 0;
        for record in decode(&buf) {
            if record.is_err() {
                errors += 1;
            }
        }
        prop_assert!(errors <= 1);
    }

    /// PROPERTY: Well-formed batches decode to exactly the records encoded.
    #[test]
    fn property_batches_decode_in_order(
        records in proptest::collection::vec((1i32..1024, any::<u32>(), any::<u32>(), name_bytes()), 0..16),
    ) {
        let mut buf = Vec::new();
        for (wd, mask, cookie, name) in &records {
            encode_record(&mut buf, WatchHandle::from_raw(*wd), EventMask::from_bits(*mask), *cookie, name);
        }
        prop_assert_eq!(buf.len() % HEADER_LEN, 0);

        let decoded: Vec<_> = decode(&buf).collect::<Result<_, _>>().unwrap();
        prop_assert_eq!(decoded.len(), records.len());
        for (record, (wd, mask, cookie, name)) in decoded.iter().zip(&records) {
            prop_assert_eq!(record.handle.as_raw(), *wd);
            prop_assert_eq!(record.mask.bits(), *mask);
            prop_assert_eq!(record.cookie, *cookie);
            let got = record.name().map(|n| n.as_encoded_bytes().to_vec()).unwrap_or_default();
            prop_assert_eq!(&got, name);
        }
    }
}
