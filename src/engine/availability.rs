use chrono::NaiveDate;

use crate::model::*;

// ── Availability Resolver ──────────────────────────────────────────

/// Open ranges for `date`: active weekly rules for that weekday, merged,
/// minus every exception on that date. Sorted and disjoint. A weekday with
/// no rules resolves to an empty list.
pub fn resolve_open_ranges(bs: &BarberState, date: NaiveDate) -> Vec<Span> {
    let mut open: Vec<Span> = bs
        .rules_for(weekday_index(date))
        .map(|r| r.span_on(date))
        .collect();
    if open.is_empty() {
        return open;
    }
    open.sort_by_key(|s| s.start);
    let open = merge_overlapping(&open);

    let blocked = blocked_spans(bs, date);
    if blocked.is_empty() {
        open
    } else {
        subtract_intervals(&open, &blocked)
    }
}

/// Exception spans on `date`, sorted and merged.
pub fn blocked_spans(bs: &BarberState, date: NaiveDate) -> Vec<Span> {
    let mut blocked: Vec<Span> = bs.exceptions_on(date).map(|e| e.span()).collect();
    blocked.sort_by_key(|s| s.start);
    merge_overlapping(&blocked)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`. Both sorted by start; `base` disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < b.end {
            result.push(Span::new(current_start, b.end));
        }
    }

    result
}
