//! In-place sorts over handle-linked nodes.
//!
//! All three algorithms move values between a fixed set of nodes. They never
//! touch `next`/`prev`, so a handle held by a caller keeps pointing at the
//! same node while the value stored there may change.

use crate::error::NullAccessError;
use crate::list::NodeHandle;
use tracing::{debug, trace};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SortAlgorithm {
    Quick,
    Bubble,
    Insertion,
}

impl SortAlgorithm {
    pub const ALL: [SortAlgorithm; 3] = [
        SortAlgorithm::Quick,
        SortAlgorithm::Bubble,
        SortAlgorithm::Insertion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SortAlgorithm::Quick => "quick",
            SortAlgorithm::Bubble => "bubble",
            SortAlgorithm::Insertion => "insertion",
        }
    }
}

/// Quicksort the inclusive range `[low, high]`.
///
/// Range ends are compared by node identity. The range is empty or a single
/// node when `high` is null, `low` is `high`, or `low` is `high`'s successor.
/// Only the smaller side of each partition is sorted recursively; the larger
/// side is sorted by the enclosing loop, so stack depth stays logarithmic.
pub fn quick_sort<T>(low: &NodeHandle<T>, high: &NodeHandle<T>) -> Result<(), NullAccessError>
where
    T: PartialOrd + Clone,
{
    let mut low = low.clone();
    let mut high = high.clone();
    loop {
        if high.is_null() || low.equals_handle(&high) || low.equals_handle(&high.next()?) {
            return Ok(());
        }
        trace!(low = %low.identity(), high = %high.identity(), "quick sort range");
        let split = partition(&low, &high)?;
        if split.below < split.above {
            quick_sort(&low, &split.pivot.prev()?)?;
            low = split.pivot.next()?;
        } else {
            quick_sort(&split.pivot.next()?, &high)?;
            high = split.pivot.prev()?;
        }
    }
}

/// Pivot node of a partition and the number of nodes on either side of it.
struct Split<T> {
    pivot: NodeHandle<T>,
    below: usize,
    above: usize,
}

/// Lomuto partition around the value at `high`.
fn partition<T>(low: &NodeHandle<T>, high: &NodeHandle<T>) -> Result<Split<T>, NullAccessError>
where
    T: PartialOrd + Clone,
{
    let pivot = high.value()?;
    // Null means "before low": the first advance lands on low itself.
    let mut i = low.prev()?;
    let mut j = low.clone();
    let mut scanned = 0usize;
    let mut below = 0usize;
    while !j.equals_handle(high) {
        if j.with(|n| n.value <= pivot)? {
            i = advance(&i, low)?;
            i.swap_values(&j)?;
            below += 1;
        }
        scanned += 1;
        j = j.next()?;
    }
    i = advance(&i, low)?;
    i.swap_values(high)?;
    trace!(pivot = %i.identity(), below, "partitioned");
    Ok(Split {
        pivot: i,
        below,
        above: scanned - below,
    })
}

fn advance<T>(i: &NodeHandle<T>, low: &NodeHandle<T>) -> Result<NodeHandle<T>, NullAccessError> {
    if i.is_null() {
        Ok(low.clone())
    } else {
        i.next()
    }
}

fn greater<T: PartialOrd>(a: &NodeHandle<T>, b: &NodeHandle<T>) -> Result<bool, NullAccessError> {
    let a = a.get()?;
    let b = b.get()?;
    Ok(a.value > b.value)
}

/// Bubble sort from `head` to the end of the chain.
pub fn bubble_sort<T>(head: &NodeHandle<T>) -> Result<(), NullAccessError>
where
    T: PartialOrd,
{
    if head.is_null() {
        return Ok(());
    }
    debug!(head = %head.identity(), "bubble sort");
    let mut passes = 0usize;
    loop {
        passes += 1;
        let mut swapped = false;
        let mut cur = head.clone();
        loop {
            let next = cur.next()?;
            if next.is_null() {
                break;
            }
            if greater(&cur, &next)? {
                cur.swap_values(&next)?;
                swapped = true;
            }
            cur = next;
        }
        if !swapped {
            break;
        }
    }
    trace!(passes, "bubble sort done");
    Ok(())
}

/// Insertion sort from `head` to the end of the chain.
///
/// Larger values are shifted forward by copying; when the backward walk runs
/// off the start of the chain the key lands in `head`.
pub fn insertion_sort<T>(head: &NodeHandle<T>) -> Result<(), NullAccessError>
where
    T: PartialOrd + Clone,
{
    if head.is_null() {
        return Ok(());
    }
    debug!(head = %head.identity(), "insertion sort");
    let mut current = head.next()?;
    while !current.is_null() {
        let key = current.value()?;
        let mut j = current.prev()?;
        while !j.is_null() && j.with(|n| n.value > key)? {
            let shifted = j.value()?;
            j.next()?.set_value(shifted)?;
            j = j.prev()?;
        }
        if j.is_null() {
            head.set_value(key)?;
        } else {
            j.next()?.set_value(key)?;
        }
        current = current.next()?;
    }
    Ok(())
}
