//! Wall-clock position resolution for broadcasts.
//!
//! Every listener derives the current item and offset from the broadcast's
//! anchor time and its own clock; nothing is shared between listeners. All
//! arithmetic is in integer nanoseconds so loops never drift and item
//! boundaries compare exactly.

use crate::broadcast::BroadcastDescriptor;
use crate::error::SchedulingError;
use crate::timeline::TimelineItem;
use chrono::{DateTime, Utc};
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Where a broadcast is at a given instant.
#[derive(Debug, Clone, PartialEq)]
pub enum Position<'a> {
    /// `now` precedes the broadcast's anchor.
    NotStarted { starts_in: Duration },
    Playing {
        index: usize,
        item: &'a TimelineItem,
        offset: Duration,
        total: Duration,
    },
    /// Non-looping broadcast past its last item.
    Ended { total: Duration },
    /// Broadcast was stopped by its author at `since`.
    OffAir { since: DateTime<Utc> },
}

impl Position<'_> {
    /// True when nothing will play from this broadcast again.
    pub fn has_ended(&self) -> bool {
        matches!(self, Position::Ended { .. } | Position::OffAir { .. })
    }
}

/// Resolve which item is playing at `now` and how far into it.
///
/// Pure: the same descriptor and instant always give the same answer. An
/// instant exactly on a boundary selects the later item at offset zero. A
/// stop takes effect from its own instant onwards.
pub fn resolve_position(
    descriptor: &BroadcastDescriptor,
    now: DateTime<Utc>,
) -> Result<Position<'_>, SchedulingError> {
    if let Some(since) = descriptor.stopped_at {
        if now >= since {
            return Ok(Position::OffAir { since });
        }
    }

    let items = descriptor.timeline();
    if items.is_empty() {
        return Err(SchedulingError::EmptyTimeline);
    }
    let total = descriptor.total_duration();
    if total.is_zero() {
        return Err(SchedulingError::NoCurrentItem);
    }

    let anchor = descriptor.anchor();
    let elapsed = match (now - anchor).to_std() {
        Ok(elapsed) => elapsed,
        Err(_) => {
            let starts_in = (anchor - now).to_std().unwrap_or_default();
            return Ok(Position::NotStarted { starts_in });
        }
    };

    let position = if descriptor.is_looping {
        from_nanos(elapsed.as_nanos() % total.as_nanos())
    } else if elapsed >= total {
        return Ok(Position::Ended { total });
    } else {
        elapsed
    };

    let mut item_start = Duration::ZERO;
    for (index, item) in items.iter().enumerate() {
        let item_end = item_start.saturating_add(item.duration);
        if position < item_end {
            return Ok(Position::Playing {
                index,
                item,
                offset: position - item_start,
                total,
            });
        }
        item_start = item_end;
    }

    Err(SchedulingError::NoCurrentItem)
}

fn from_nanos(nanos: u128) -> Duration {
    Duration::new(
        (nanos / NANOS_PER_SEC) as u64,
        (nanos % NANOS_PER_SEC) as u32,
    )
}
