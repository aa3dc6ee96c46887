//! Plurality tally over one round of sampled responses.

/// Returns the plurality value of `votes` and its occurrence count.
///
/// Scanning the input in order, the value that first reaches the running
/// maximum count wins; later values reaching the same count do not displace
/// it. An empty input yields `(0, 0)`.
///
/// Example: `[1, 2, 2, 3, 3, 3]` -> `(3, 3)`
///
/// Sample sizes stay in the single digits, so the quadratic scan is fine.
pub fn tally(votes: &[i64]) -> (i64, usize) {
    let mut winning_value = 0;
    let mut max_count = 0;

    for value in votes {
        let count = votes.iter().filter(|v| *v == value).count();
        if count > max_count {
            max_count = count;
            winning_value = *value;
        }
    }
    (winning_value, max_count)
}
