use std::path::Path;

use proptest::prelude::*;
use revstore::resolver::{parse_shard_path, revision_dir, shard_segments};
use revstore::{DocId, Revision};

proptest! {
    #[test]
    fn ones_segment_matches_id(id in 1u64..=DocId::MAX, rev in 0u32..=Revision::MAX) {
        let doc = DocId::new(id).unwrap();
        let segments = shard_segments(doc);

        let ones = segments.last().unwrap();
        prop_assert_eq!(ones, &format!("{:03}", id % 1000));
        prop_assert_eq!(segments.iter().any(|s| s.starts_with('k')), id > 999);
        prop_assert_eq!(segments.iter().any(|s| s.starts_with('M')), id > 999_999);

        let path = revision_dir(Path::new(""), doc, Revision::new(rev).unwrap());
        let last = path.file_name().unwrap().to_str().unwrap().to_string();
        prop_assert_eq!(last, format!("{:03}", rev));
    }

    #[test]
    fn parse_inverts_revision_dir(id in 1u64..=DocId::MAX, rev in 0u32..=Revision::MAX) {
        let doc = DocId::new(id).unwrap();
        let revision = Revision::new(rev).unwrap();
        let relative = revision_dir(Path::new(""), doc, revision);
        prop_assert_eq!(parse_shard_path(&relative), Some((doc, revision)));
    }
}
