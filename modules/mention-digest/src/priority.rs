use mention_digest_common::SummaryResult;

/// Order results P0, P1, P2, then everything else. The sort is stable:
/// results with the same rank keep their relative order.
pub fn sort_by_priority(results: &mut [SummaryResult]) {
    results.sort_by_key(|r| r.priority.rank().unwrap_or(u8::MAX));
}
