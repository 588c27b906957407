use crate::models::punch::RawPunchEvent;
use tracing::{debug, warn};

/// Orders a fetched batch and drops what we already hold at its boundary.
/// `last_known_id` is the highest source id currently staged. Consecutive
/// pull windows overlap, so the first record of a batch is often the last one
/// we stored.
pub fn verify_and_filter(
    mut batch: Vec<RawPunchEvent>,
    last_known_id: Option<i64>,
) -> Vec<RawPunchEvent> {
    // 1) Ascending source id, duplicates inside the page collapse
    batch.sort_by_key(|e| e.source_id);
    batch.dedup_by_key(|e| e.source_id);

    let Some(last) = last_known_id else {
        return batch;
    };
    let Some(first) = batch.first().map(|e| e.source_id) else {
        return batch;
    };

    // 2) Boundary overlap / continuity check
    if first == last {
        debug!(source_id = first, "Dropping boundary overlap record");
        batch.remove(0);
    } else if first > last + 1 {
        warn!(
            last_known = last,
            first_fetched = first,
            skipped = first - last - 1,
            "Continuity gap between staged and fetched source ids"
        );
    } else if first < last {
        debug!(
            last_known = last,
            first_fetched = first,
            "Batch reaches below the staged maximum (recovery re-poll)"
        );
    }

    batch
}
