use super::*;

fn iset(xs: &[u32]) -> IntSet {
    xs.iter().copied().collect()
}

fn sample_entry() -> HistoryEntry {
    HistoryEntry {
        id: 7,
        ts: 1_700_000_000,
        comment: "tag added".into(),
        version: 3,
        changes: vec![Change {
            keyword: "in:inbox".into(),
            record: 2001,
            iset_before: iset(&[1, 2, 3]),
            oset_after: iset(&[2, 3, 4]),
        }],
    }
}

#[test]
fn test_slot_wraps_at_ring_size() {
    let mut entry = sample_entry();
    entry.id = 1999;
    assert_eq!(entry.slot(), RING_BEGIN + 999);
    entry.id = 2000;
    assert_eq!(entry.slot(), RING_BEGIN + 0);
}

#[test]
fn test_encode_decode_round_trip() {
    let entry = sample_entry();
    let buf = entry.encode().unwrap();
    let back = HistoryEntry::decode(&buf).unwrap();
    assert_eq!(back.id, entry.id);
    assert_eq!(back.comment, entry.comment);
    assert_eq!(back.version, entry.version);
    assert_eq!(back.changes.len(), 1);
    assert_eq!(back.changes[0].keyword, "in:inbox");
    assert_eq!(back.changes[0].iset_before, iset(&[1, 2, 3]));
    assert_eq!(back.changes[0].oset_after, iset(&[2, 3, 4]));
}

#[test]
fn test_redo_reproduces_oset_from_iset() {
    let entry = sample_entry();
    let (keyword, record, add_bits, sub_bits) = historic_mutations(&entry, false).remove(0);
    assert_eq!(keyword, "in:inbox");
    assert_eq!(record, 2001);

    let mut live = entry.changes[0].iset_before.clone();
    live |= &add_bits;
    live -= &sub_bits;
    assert_eq!(live, entry.changes[0].oset_after);
}

#[test]
fn test_undo_reproduces_iset_from_oset() {
    let entry = sample_entry();
    let (_, _, add_bits, sub_bits) = historic_mutations(&entry, true).remove(0);

    let mut live = entry.changes[0].oset_after.clone();
    live |= &add_bits;
    live -= &sub_bits;
    assert_eq!(live, entry.changes[0].iset_before);
}

#[test]
fn test_allocate_history_slot_increments_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let key = [7u8; 32];

    let id0;
    {
        let mut store = crate::store::Store::open(dir.path(), &[key]).unwrap();
        id0 = allocate_history_slot(&mut store).unwrap();
        assert_eq!(allocate_history_slot(&mut store).unwrap(), id0 + 1);
        store.flush().unwrap();
    }

    let mut store = crate::store::Store::open(dir.path(), &[key]).unwrap();
    assert_eq!(allocate_history_slot(&mut store).unwrap(), id0 + 2);
}
