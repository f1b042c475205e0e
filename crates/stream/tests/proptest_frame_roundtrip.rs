//! Property-based round-trip tests for the frame header codec.

use std::io::Cursor;

use proptest::prelude::*;
use stream::{read_frame_header, write_frame_header, FrameKind};

fn any_kind() -> impl Strategy<Value = FrameKind> {
    prop_oneof![
        Just(FrameKind::Meta),
        Just(FrameKind::Data),
        Just(FrameKind::Zero),
        Just(FrameKind::Stop),
    ]
}

proptest! {
    /// Any (kind, start, length) triple written as a header reads back
    /// unchanged, regardless of how large start/length are.
    #[test]
    fn frame_header_roundtrips_arbitrary_fields(kind in any_kind(), start in any::<u64>(), length in any::<u64>()) {
        let mut buf = Vec::new();
        write_frame_header(&mut buf, kind, start, length).unwrap();

        let mut cursor = Cursor::new(buf);
        let header = read_frame_header(&mut cursor).unwrap();
        prop_assert_eq!(header.kind, kind);
        prop_assert_eq!(header.start, start);
        prop_assert_eq!(header.length, length);
    }
}
