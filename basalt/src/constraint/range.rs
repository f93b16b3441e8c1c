use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::ops::Bound;
use std::ops::Bound::{Excluded, Included, Unbounded};

use crate::datum::{compare_datums, Datum};

/// A contiguous range of datums with inclusive, exclusive or open ends.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Range {
    start: Bound<Datum>,
    end: Bound<Datum>,
}

fn bound_value(bound: &Bound<Datum>) -> Option<&Datum> {
    match bound {
        Included(v) | Excluded(v) => Some(v),
        Unbounded => None,
    }
}

/// Orders lower bounds: an open bound sorts first, and at the same value an inclusive bound
/// starts before an exclusive one.
pub(crate) fn cmp_start(left: &Bound<Datum>, right: &Bound<Datum>) -> Ordering {
    match (left, right) {
        (Unbounded, Unbounded) => Ordering::Equal,
        (Unbounded, _) => Ordering::Less,
        (_, Unbounded) => Ordering::Greater,
        (l, r) => {
            let ord = compare_datums(bound_value(l).unwrap_or(&Datum::Null), bound_value(r).unwrap_or(&Datum::Null));
            match (ord, l, r) {
                (Ordering::Equal, Included(_), Excluded(_)) => Ordering::Less,
                (Ordering::Equal, Excluded(_), Included(_)) => Ordering::Greater,
                (ord, _, _) => ord,
            }
        }
    }
}

/// Orders upper bounds: an open bound sorts last, and at the same value an exclusive bound
/// ends before an inclusive one.
pub(crate) fn cmp_end(left: &Bound<Datum>, right: &Bound<Datum>) -> Ordering {
    match (left, right) {
        (Unbounded, Unbounded) => Ordering::Equal,
        (Unbounded, _) => Ordering::Greater,
        (_, Unbounded) => Ordering::Less,
        (l, r) => {
            let ord = compare_datums(bound_value(l).unwrap_or(&Datum::Null), bound_value(r).unwrap_or(&Datum::Null));
            match (ord, l, r) {
                (Ordering::Equal, Excluded(_), Included(_)) => Ordering::Less,
                (Ordering::Equal, Included(_), Excluded(_)) => Ordering::Greater,
                (ord, _, _) => ord,
            }
        }
    }
}

fn flip(bound: &Bound<Datum>) -> Bound<Datum> {
    match bound {
        Included(v) => Excluded(v.clone()),
        Excluded(v) => Included(v.clone()),
        Unbounded => Unbounded,
    }
}

impl Range {
    pub fn new(start: Bound<Datum>, end: Bound<Datum>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::new(Unbounded, Unbounded)
    }

    pub fn point(value: Datum) -> Self {
        Self::new(Included(value.clone()), Included(value))
    }

    pub fn less_than(value: Datum, inclusive: bool) -> Self {
        let end = if inclusive {
            Included(value)
        } else {
            Excluded(value)
        };
        Self::new(Unbounded, end)
    }

    pub fn greater_than(value: Datum, inclusive: bool) -> Self {
        let start = if inclusive {
            Included(value)
        } else {
            Excluded(value)
        };
        Self::new(start, Unbounded)
    }

    pub fn start(&self) -> &Bound<Datum> {
        &self.start
    }

    pub fn end(&self) -> &Bound<Datum> {
        &self.end
    }

    pub fn start_value(&self) -> Option<&Datum> {
        bound_value(&self.start)
    }

    pub fn end_value(&self) -> Option<&Datum> {
        bound_value(&self.end)
    }

    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Unbounded, _) | (_, Unbounded) => false,
            (s, e) => {
                let ord = compare_datums(
                    bound_value(s).unwrap_or(&Datum::Null),
                    bound_value(e).unwrap_or(&Datum::Null),
                );
                match ord {
                    Ordering::Greater => true,
                    Ordering::Equal => !matches!((s, e), (Included(_), Included(_))),
                    Ordering::Less => false,
                }
            }
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!((&self.start, &self.end), (Unbounded, Unbounded))
    }

    /// The single value of a point range.
    pub fn as_point(&self) -> Option<&Datum> {
        match (&self.start, &self.end) {
            (Included(s), Included(e)) if compare_datums(s, e) == Ordering::Equal => Some(s),
            _ => None,
        }
    }

    pub fn contains(&self, value: &Datum) -> bool {
        let after_start = match &self.start {
            Unbounded => true,
            Included(s) => compare_datums(value, s) != Ordering::Less,
            Excluded(s) => compare_datums(value, s) == Ordering::Greater,
        };
        let before_end = match &self.end {
            Unbounded => true,
            Included(e) => compare_datums(value, e) != Ordering::Greater,
            Excluded(e) => compare_datums(value, e) == Ordering::Less,
        };
        after_start && before_end
    }

    pub fn intersect(&self, other: &Range) -> Option<Range> {
        let start = if cmp_start(&self.start, &other.start) == Ordering::Less {
            other.start.clone()
        } else {
            self.start.clone()
        };
        let end = if cmp_end(&self.end, &other.end) == Ordering::Greater {
            other.end.clone()
        } else {
            self.end.clone()
        };

        let ret = Range::new(start, end);
        if ret.is_empty() {
            None
        } else {
            Some(ret)
        }
    }

    /// Whether `next`, which must not start before `self`, overlaps or touches `self`.
    fn touches(&self, next: &Range) -> bool {
        match (&self.end, &next.start) {
            (Unbounded, _) | (_, Unbounded) => true,
            (e, s) => {
                let ord = compare_datums(
                    bound_value(s).unwrap_or(&Datum::Null),
                    bound_value(e).unwrap_or(&Datum::Null),
                );
                match ord {
                    Ordering::Less => true,
                    Ordering::Equal => matches!(e, Included(_)) || matches!(s, Included(_)),
                    Ordering::Greater => false,
                }
            }
        }
    }

    /// Sorts ranges by lower bound, drops empty ones and merges overlapping ones.
    pub fn normalize(ranges: Vec<Range>) -> Vec<Range> {
        let mut ranges: Vec<Range> = ranges.into_iter().filter(|r| !r.is_empty()).collect();
        ranges.sort_by(|a, b| cmp_start(&a.start, &b.start));

        let mut ret: Vec<Range> = Vec::with_capacity(ranges.len());
        for r in ranges {
            match ret.last_mut() {
                Some(last) if last.touches(&r) => {
                    if cmp_end(&r.end, &last.end) == Ordering::Greater {
                        last.end = r.end;
                    }
                }
                _ => ret.push(r),
            }
        }
        ret
    }

    /// Complement of normalized ranges.
    pub fn complement(ranges: &[Range]) -> Vec<Range> {
        let mut ret = Vec::with_capacity(ranges.len() + 1);
        let mut lower: Bound<Datum> = Unbounded;
        let mut open_end = true;
        for r in ranges {
            if !matches!(r.start, Unbounded) {
                ret.push(Range::new(lower.clone(), flip(&r.start)));
            }
            match &r.end {
                Unbounded => {
                    open_end = false;
                    break;
                }
                e => lower = flip(e),
            }
        }

        if open_end {
            ret.push(Range::new(lower, Unbounded));
        }

        Range::normalize(ret)
    }
}

impl Debug for Range {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.start {
            Unbounded => write!(f, "(-inf")?,
            Included(v) => write!(f, "[{}", v)?,
            Excluded(v) => write!(f, "({}", v)?,
        }
        write!(f, ", ")?;
        match &self.end {
            Unbounded => write!(f, "inf)"),
            Included(v) => write!(f, "{}]", v),
            Excluded(v) => write!(f, "{})", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use datafusion_common::ScalarValue;

    use crate::constraint::Range;

    fn int(v: i32) -> ScalarValue {
        ScalarValue::Int32(Some(v))
    }

    #[test]
    fn test_normalize_merges_overlapping_ranges() {
        let ranges = Range::normalize(vec![
            Range::greater_than(int(10), false),
            Range::less_than(int(3), true),
            Range::point(int(3)),
            Range::point(int(20)),
        ]);

        assert_eq!(2, ranges.len());
        assert_eq!("(-inf, 3]", format!("{:?}", ranges[0]));
        assert_eq!("(10, inf)", format!("{:?}", ranges[1]));
    }

    #[test]
    fn test_intersect() {
        let r = Range::less_than(int(5), false)
            .intersect(&Range::greater_than(int(1), true))
            .unwrap();
        assert_eq!("[1, 5)", format!("{:?}", r));
        assert!(r.contains(&int(1)));
        assert!(!r.contains(&int(5)));

        assert!(Range::point(int(5))
            .intersect(&Range::less_than(int(5), false))
            .is_none());
    }

    #[test]
    fn test_complement() {
        let complement = Range::complement(&[Range::point(int(5))]);
        assert_eq!(2, complement.len());
        assert_eq!("(-inf, 5)", format!("{:?}", complement[0]));
        assert_eq!("(5, inf)", format!("{:?}", complement[1]));

        assert!(Range::complement(&[Range::unbounded()]).is_empty());
        assert_eq!(
            vec![Range::unbounded()],
            Range::complement(&[])
        );
    }
}
