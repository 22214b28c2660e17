strong_type!(EntryId, u64);
strong_type!(FragmentId, u64);
strong_type!(InodeId, u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id() {
        let id = EntryId::new(12345);
        assert_eq!(id.raw(), 12345u64);
        assert_eq!(format!("{:?}", id), "EntryId(12345)");
    }

    #[test]
    fn test_fragment_id() {
        let a = FragmentId::new(10);
        let b = FragmentId::new(20);
        assert!(a < b);
        let raw: u64 = a.into();
        assert_eq!(raw, 10);
    }

    #[test]
    fn test_inode_id_serde() {
        let id = InodeId::new(77);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "77");
        let parsed: InodeId = serde_json::from_str("77").unwrap();
        assert_eq!(parsed, id);
    }
}
