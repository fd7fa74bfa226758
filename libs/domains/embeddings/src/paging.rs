//! Offset/limit slicing shared by offset-capable stores.

/// Returns a copy of `items` with the first `offset` items skipped and at
/// most `limit` items kept.
///
/// Non-positive `offset` skips nothing; an `offset` past the end yields an
/// empty result. Non-positive `limit`, or one larger than what remains,
/// keeps every remaining item. Order is preserved.
pub fn apply_offset_limit<T: Clone>(items: &[T], offset: i64, limit: i64) -> Vec<T> {
    let start = usize::try_from(offset).unwrap_or(0);
    if start >= items.len() {
        return Vec::new();
    }

    let rest = &items[start..];
    let take = match usize::try_from(limit) {
        Ok(n) if n > 0 => n.min(rest.len()),
        _ => rest.len(),
    };

    rest[..take].to_vec()
}
