/// quorum is a simple majority of `n` replicas.
pub fn quorum(n: usize) -> usize {
    n / 2 + 1
}

/// fast_quorum is the number of fast replies that decides a fast round: `2 * (n/2 + 1) + 1`.
/// It is larger than `n` for every `n`, so a fast round is also decided once every replica
/// replied. See `ProposalReplyInfo`.
pub fn fast_quorum(n: usize) -> usize {
    let failures = n / 2 + 1;
    2 * failures + 1
}
