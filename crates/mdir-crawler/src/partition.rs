use std::cmp;
use std::ops::Range;

/// Splits `rows_count` rows into `workers_count` contiguous ranges.
///
/// Every range but the last holds `round(rows_count / workers_count)` rows,
/// the last one absorbs the rounding remainder. When there are fewer rows than
/// workers the trailing ranges are empty.
pub fn partition(rows_count: usize, workers_count: usize) -> Vec<Range<usize>> {
    let workers_count = cmp::max(1, workers_count);
    // rounds half up
    let chunk = (2 * rows_count + workers_count) / (2 * workers_count);

    (0..workers_count)
        .map(|i| {
            let from = cmp::min(i * chunk, rows_count);
            let to = if i == workers_count - 1 {
                rows_count
            } else {
                cmp::min((i + 1) * chunk, rows_count)
            };
            from..to
        })
        .collect()
}
