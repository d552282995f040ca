use im::Vector;

use crate::filter::{ResidualPredicate, name_contains};
use crate::record::EventRecord;

/// The records actually rendered: those passing the residual predicate and
/// containing `free_text` in their name, in their original order.
pub fn project<'a>(
    records: impl IntoIterator<Item = &'a EventRecord>,
    residual: &ResidualPredicate,
    free_text: &str,
) -> Vector<EventRecord> {
    let needle = free_text.trim().to_lowercase();
    records
        .into_iter()
        .filter(|record| residual.matches(record))
        .filter(|record| needle.is_empty() || name_contains(record, &needle))
        .cloned()
        .collect()
}
