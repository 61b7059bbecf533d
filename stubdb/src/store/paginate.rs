use crate::record::RecordKey;

/// Apply cursor and take to an already filtered and sorted key list.
///
/// A cursor that is not part of the list (deleted, or filtered out) yields
/// nothing. Forward pages exclude the cursor; backward pages (negative
/// `take`) walk from the record just before the cursor towards the start.
pub(crate) fn paginate(
    keys: Vec<RecordKey>,
    cursor: Option<RecordKey>,
    take: Option<i64>,
) -> Vec<RecordKey> {
    let (before, after) = match cursor {
        Some(cursor) => match keys.iter().position(|k| *k == cursor) {
            Some(index) => (&keys[..index], &keys[index + 1..]),
            None => return Vec::new(),
        },
        None => (&keys[..], &keys[..]),
    };

    match take {
        None => after.to_vec(),
        Some(n) if n >= 0 => after.iter().take(n as usize).copied().collect(),
        Some(n) => before
            .iter()
            .rev()
            .take(n.unsigned_abs() as usize)
            .copied()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CollectionId;

    fn keys(seqs: impl IntoIterator<Item = u64>) -> Vec<RecordKey> {
        seqs.into_iter()
            .map(|seq| RecordKey::new(CollectionId::new(0, 0), seq))
            .collect()
    }

    #[test]
    fn test_no_cursor() {
        assert_eq!(paginate(keys(1..=5), None, None), keys(1..=5));
        assert_eq!(paginate(keys(1..=5), None, Some(2)), keys([1, 2]));
        assert_eq!(paginate(keys(1..=5), None, Some(-2)), keys([5, 4]));
        assert!(paginate(keys(1..=5), None, Some(0)).is_empty());
    }

    #[test]
    fn test_forward_from_cursor() {
        let cursor = Some(RecordKey::new(CollectionId::new(0, 0), 7));
        assert_eq!(paginate(keys(1..=10), cursor, None), keys([8, 9, 10]));
        assert_eq!(paginate(keys(1..=10), cursor, Some(3)), keys([8, 9, 10]));
        assert_eq!(paginate(keys(1..=10), cursor, Some(2)), keys([8, 9]));
    }

    #[test]
    fn test_backward_from_cursor() {
        let cursor = Some(RecordKey::new(CollectionId::new(0, 0), 10));
        assert_eq!(paginate(keys(1..=10), cursor, Some(-3)), keys([9, 8, 7]));

        let cursor = Some(RecordKey::new(CollectionId::new(0, 0), 2));
        assert_eq!(paginate(keys(1..=10), cursor, Some(-3)), keys([1]));
    }

    #[test]
    fn test_missing_cursor_yields_nothing() {
        let cursor = Some(RecordKey::new(CollectionId::new(0, 0), 99));
        assert!(paginate(keys(1..=10), cursor, None).is_empty());
        assert!(paginate(keys(1..=10), cursor, Some(-1)).is_empty());
    }
}
