//! Distance-based eviction
//!
//! The retained set is the `capacity` pages nearest the focused page, not the
//! most recently used ones, so both neighbours of the current page stay warm
//! whichever direction the reader is swiping.

use std::cmp::Reverse;

/// Pages to evict so that at most `capacity` remain.
///
/// Pages are ranked by `|page - focus|`; on a tie the page after the focus
/// wins over the page before it. Returned pages are in ascending order.
pub fn select_evictions<I>(resident: I, focus: u32, capacity: usize) -> Vec<u32>
where
    I: IntoIterator<Item = u32>,
{
    let mut pages: Vec<u32> = resident.into_iter().collect();
    if pages.len() <= capacity {
        return Vec::new();
    }

    pages.sort_by_key(|&page| (page.abs_diff(focus), Reverse(page)));
    let mut evicted = pages.split_off(capacity);
    evicted.sort_unstable();
    evicted
}
