use ulid::Ulid;

use crate::interval;
use crate::model::*;

use super::{Engine, EngineError};

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.end <= span.start {
        return Err(EngineError::validation("end date must be after start date"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// Query windows may be a single instant, but never inverted.
pub(crate) fn validate_window(window: &Span) -> Result<(), EngineError> {
    if window.end < window.start {
        return Err(EngineError::validation("window end precedes window start"));
    }
    Ok(())
}

pub(crate) fn validate_allocation(value: i64) -> Result<u8, EngineError> {
    interval::allocation_percentage(value).ok_or_else(|| {
        EngineError::validation(format!("allocation must be between 1 and 100, got {value}"))
    })
}

/// Sum of allocations of every engagement overlapping `window`, skipping
/// `exclude`. Any overlap counts the engagement's full allocation; there is
/// no weighting by how much of the window it covers.
pub fn committed_capacity(ps: &PersonState, window: &Span, exclude: Option<Ulid>) -> u32 {
    ps.overlapping(window)
        .filter(|e| Some(e.id) != exclude)
        .map(|e| e.allocation as u32)
        .sum()
}

/// Admission rule: reject when committed + requested exceeds the person's
/// capacity. Updates pass their own id as `exclude`.
pub fn admit(ps: &PersonState, window: &Span, requested: u8, exclude: Option<Ulid>) -> Admission {
    let committed = committed_capacity(ps, window, exclude);
    let max = ps.person.max_capacity;
    if committed + requested as u32 > max {
        Admission::Reject {
            committed,
            requested,
            available: max as i64 - committed as i64,
        }
    } else {
        Admission::Accept
    }
}

/// Point-in-time load across `window`, as contiguous segments of constant
/// committed allocation. Segments tile the window exactly.
pub fn load_profile(ps: &PersonState, window: &Span) -> Vec<LoadSegment> {
    // +allocation where an engagement starts, -allocation one ms after it ends.
    let mut events: Vec<(Ms, i64)> = Vec::new();
    for e in ps.overlapping(window) {
        let start = e.span.start.max(window.start);
        let end = e.span.end.min(window.end);
        events.push((start, e.allocation as i64));
        events.push((end + 1, -(e.allocation as i64)));
    }
    events.sort_by_key(|ev| ev.0);

    let mut segments: Vec<LoadSegment> = Vec::new();
    let mut load: i64 = 0;
    let mut cursor = window.start;
    let mut i = 0;
    while i < events.len() {
        let t = events[i].0;
        if t > cursor {
            push_segment(&mut segments, Span::new(cursor, t - 1), load as u32);
            cursor = t;
        }
        while i < events.len() && events[i].0 == t {
            load += events[i].1;
            i += 1;
        }
    }
    if cursor <= window.end {
        push_segment(&mut segments, Span::new(cursor, window.end), load as u32);
    }
    segments
}

fn push_segment(segments: &mut Vec<LoadSegment>, span: Span, committed: u32) {
    if let Some(last) = segments.last_mut()
        && last.committed == committed
        && last.span.end + 1 == span.start
    {
        last.span.end = span.end;
        return;
    }
    segments.push(LoadSegment { span, committed });
}

impl Engine {
    pub async fn committed_capacity(
        &self,
        person_id: Ulid,
        window: Span,
        exclude: Option<Ulid>,
    ) -> Result<u32, EngineError> {
        validate_window(&window)?;
        let shared = self
            .store
            .get_person(&person_id)
            .ok_or(EngineError::NotFound(person_id))?;
        let guard = shared.read().await;
        Ok(committed_capacity(&guard, &window, exclude))
    }

    /// Advisory admission check. The authoritative check runs again inside
    /// `create_engagement` / `update_engagement` under the person's lock.
    pub async fn admit(
        &self,
        person_id: Ulid,
        window: Span,
        requested: i64,
        exclude: Option<Ulid>,
    ) -> Result<Admission, EngineError> {
        let requested = validate_allocation(requested)?;
        validate_window(&window)?;
        let shared = self
            .store
            .get_person(&person_id)
            .ok_or(EngineError::NotFound(person_id))?;
        let guard = shared.read().await;
        Ok(admit(&guard, &window, requested, exclude))
    }

    pub async fn load_profile(
        &self,
        person_id: Ulid,
        window: Span,
    ) -> Result<Vec<LoadSegment>, EngineError> {
        validate_window(&window)?;
        let shared = self
            .store
            .get_person(&person_id)
            .ok_or(EngineError::NotFound(person_id))?;
        let guard = shared.read().await;
        Ok(load_profile(&guard, &window))
    }
}
