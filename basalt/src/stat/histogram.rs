use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};

use crate::constraint::Range;
use crate::datum::{compare_datums, datum_to_f64, is_integral, Datum};
use crate::stat::DEFAULT_SELECTIVITY;

const EPSILON: f64 = 1e-9;

/// A value on a histogram axis.
#[derive(Clone, PartialEq)]
pub struct Point(Datum);

impl Point {
    pub fn new(value: Datum) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Datum {
        &self.0
    }

    /// Distance to `other`, `None` when the type has no numeric mapping.
    pub fn distance(&self, other: &Point) -> Option<f64> {
        match (datum_to_f64(&self.0), datum_to_f64(&other.0)) {
            (Some(l), Some(r)) => Some((l - r).abs()),
            _ => None,
        }
    }
}

impl Eq for Point {}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Point {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_datums(&self.0, &other.0)
    }
}

impl Debug for Point {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A histogram bucket. `frequency` is the fraction of all rows falling into the bucket.
#[derive(Clone, PartialEq)]
pub struct Bucket {
    lower: Point,
    upper: Point,
    lower_closed: bool,
    upper_closed: bool,
    frequency: f64,
    distinct: f64,
}

impl Bucket {
    pub fn new(
        lower: Datum,
        upper: Datum,
        lower_closed: bool,
        upper_closed: bool,
        frequency: f64,
        distinct: f64,
    ) -> Self {
        Self {
            lower: Point::new(lower),
            upper: Point::new(upper),
            lower_closed,
            upper_closed,
            frequency,
            distinct,
        }
    }

    pub fn singleton(value: Datum, frequency: f64) -> Self {
        Self::new(value.clone(), value, true, true, frequency, 1.0)
    }

    pub fn lower(&self) -> &Point {
        &self.lower
    }

    pub fn upper(&self) -> &Point {
        &self.upper
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn distinct(&self) -> f64 {
        self.distinct
    }

    pub fn is_singleton(&self) -> bool {
        self.lower == self.upper
    }

    fn as_range(&self) -> Range {
        use std::ops::Bound::{Excluded, Included};
        let start = if self.lower_closed {
            Included(self.lower.0.clone())
        } else {
            Excluded(self.lower.0.clone())
        };
        let end = if self.upper_closed {
            Included(self.upper.0.clone())
        } else {
            Excluded(self.upper.0.clone())
        };
        Range::new(start, end)
    }

    /// Width of the bucket on the numeric axis. Integral closed buckets count both ends.
    fn width(&self) -> Option<f64> {
        let w = self.upper.distance(&self.lower)?;
        if is_integral(&self.lower.0) {
            let mut w = w + 1.0;
            if !self.lower_closed {
                w -= 1.0;
            }
            if !self.upper_closed {
                w -= 1.0;
            }
            Some(w.max(0.0))
        } else {
            Some(w)
        }
    }

    /// Fraction of the bucket's rows inside `range`.
    pub fn overlap_fraction(&self, range: &Range) -> f64 {
        if self.is_singleton() {
            return if range.contains(&self.lower.0) { 1.0 } else { 0.0 };
        }

        let overlap = match self.as_range().intersect(range) {
            Some(o) => o,
            None => return 0.0,
        };
        if let Some(v) = overlap.as_point() {
            return if self.as_range().contains(v) {
                1.0 / self.distinct.max(1.0)
            } else {
                0.0
            };
        }

        let sub = Bucket {
            lower: Point::new(overlap.start_value().cloned().unwrap_or_else(|| self.lower.0.clone())),
            upper: Point::new(overlap.end_value().cloned().unwrap_or_else(|| self.upper.0.clone())),
            lower_closed: !matches!(overlap.start(), std::ops::Bound::Excluded(_)),
            upper_closed: !matches!(overlap.end(), std::ops::Bound::Excluded(_)),
            frequency: 0.0,
            distinct: 0.0,
        };
        match (sub.width(), self.width()) {
            (Some(part), Some(total)) if total > EPSILON => (part / total).clamp(0.0, 1.0),
            (Some(_), Some(_)) => 1.0,
            _ => DEFAULT_SELECTIVITY,
        }
    }

    /// Part of the bucket inside `range`, `None` when nothing is left.
    fn restrict(&self, range: &Range) -> Option<Bucket> {
        let fraction = self.overlap_fraction(range);
        if fraction <= 0.0 {
            return None;
        }
        let overlap = self.as_range().intersect(range)?;
        let distinct = if self.is_singleton() {
            1.0
        } else {
            (self.distinct * fraction).max(1.0)
        };
        Some(Bucket {
            lower: Point::new(overlap.start_value().cloned().unwrap_or_else(|| self.lower.0.clone())),
            upper: Point::new(overlap.end_value().cloned().unwrap_or_else(|| self.upper.0.clone())),
            lower_closed: !matches!(overlap.start(), std::ops::Bound::Excluded(_)),
            upper_closed: !matches!(overlap.end(), std::ops::Bound::Excluded(_)),
            frequency: self.frequency * fraction,
            distinct,
        })
    }

    /// Overlap of two buckets with the fraction of each one's rows that falls into it.
    fn intersect(&self, other: &Bucket) -> Option<(Bucket, f64, f64)> {
        let overlap_range = self.as_range().intersect(&other.as_range())?;
        let self_part = self.restrict(&overlap_range)?;
        let other_part = other.restrict(&overlap_range)?;
        let self_fraction = self_part.frequency / self.frequency.max(EPSILON);
        let other_fraction = other_part.frequency / other.frequency.max(EPSILON);
        Some((self_part, self_fraction, other_fraction))
    }

    fn scaled(&self, factor: f64) -> Bucket {
        let mut ret = self.clone();
        ret.frequency *= factor;
        ret
    }
}

impl Debug for Bucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{:?}, {:?}{} freq={:.4} ndv={:.1}",
            if self.lower_closed { "[" } else { "(" },
            self.lower,
            self.upper,
            if self.upper_closed { "]" } else { ")" },
            self.frequency,
            self.distinct
        )
    }
}

/// Value distribution of one column.
///
/// Frequencies are fractions of the relation's rows. Values outside every bucket are summarized
/// by `freq_remaining` and `distinct_remaining`. A histogram that is not well defined carries no
/// information and estimators fall back to default selectivities.
#[derive(Clone, PartialEq)]
pub struct Histogram {
    buckets: Vec<Bucket>,
    null_freq: f64,
    distinct_remaining: f64,
    freq_remaining: f64,
    well_defined: bool,
    col_stats_missing: bool,
}

impl Histogram {
    pub fn new(
        buckets: Vec<Bucket>,
        null_freq: f64,
        distinct_remaining: f64,
        freq_remaining: f64,
    ) -> Self {
        Self {
            buckets,
            null_freq,
            distinct_remaining,
            freq_remaining,
            well_defined: true,
            col_stats_missing: false,
        }
    }

    /// Histogram of a column without statistics.
    pub fn default_histogram() -> Self {
        Self {
            buckets: vec![],
            null_freq: 0.0,
            distinct_remaining: 0.0,
            freq_remaining: 0.0,
            well_defined: false,
            col_stats_missing: true,
        }
    }

    /// Histogram of a boolean column without statistics: at most true, false and null.
    pub fn default_bool_histogram() -> Self {
        Self {
            buckets: vec![],
            null_freq: 0.0,
            distinct_remaining: 3.0,
            freq_remaining: 1.0,
            well_defined: true,
            col_stats_missing: true,
        }
    }

    /// Histogram of a column holding one known value in every row.
    pub fn for_constant(value: Datum) -> Self {
        if value.is_null() {
            Self::null_only()
        } else {
            Self::new(vec![Bucket::singleton(value, 1.0)], 0.0, 0.0, 0.0)
        }
    }

    pub fn null_only() -> Self {
        Self::new(vec![], 1.0, 0.0, 0.0)
    }

    /// Histogram of explicit values, one singleton bucket per distinct value.
    pub fn from_values<'a, I: IntoIterator<Item = &'a Datum>>(values: I) -> Self {
        let mut values: Vec<&Datum> = values.into_iter().collect();
        let total = values.len() as f64;
        if total == 0.0 {
            return Self::new(vec![], 0.0, 0.0, 0.0);
        }
        let nulls = values.iter().filter(|v| v.is_null()).count() as f64;
        values.retain(|v| !v.is_null());
        values.sort_by(|l, r| compare_datums(l, r));

        let mut buckets: Vec<Bucket> = Vec::new();
        for v in values {
            match buckets.last_mut() {
                Some(last) if compare_datums(&last.lower.0, v) == Ordering::Equal => {
                    last.frequency += 1.0 / total;
                }
                _ => buckets.push(Bucket::singleton(v.clone(), 1.0 / total)),
            }
        }

        Self::new(buckets, nulls / total, 0.0, 0.0)
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn null_freq(&self) -> f64 {
        self.null_freq
    }

    pub fn distinct_remaining(&self) -> f64 {
        self.distinct_remaining
    }

    pub fn freq_remaining(&self) -> f64 {
        self.freq_remaining
    }

    pub fn is_well_defined(&self) -> bool {
        self.well_defined
    }

    pub fn is_col_stats_missing(&self) -> bool {
        self.col_stats_missing
    }

    /// Number of distinct values, null counting as one.
    pub fn ndv(&self) -> f64 {
        let nulls = if self.null_freq > EPSILON { 1.0 } else { 0.0 };
        self.buckets.iter().map(|b| b.distinct).sum::<f64>() + self.distinct_remaining + nulls
    }

    pub fn total_frequency(&self) -> f64 {
        self.buckets.iter().map(|b| b.frequency).sum::<f64>() + self.null_freq + self.freq_remaining
    }

    /// Rescales frequencies to sum to one, returning the total before scaling.
    pub fn normalize(&mut self) -> f64 {
        let total = self.total_frequency();
        if total > EPSILON {
            for b in &mut self.buckets {
                b.frequency /= total;
            }
            self.null_freq /= total;
            self.freq_remaining /= total;
        }
        total
    }

    fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Keeps rows whose value is in `ranges`, or null when `include_null` is set.
    ///
    /// Returns the histogram of the remaining rows and the selectivity of the filter.
    pub fn filter(&self, ranges: &[Range], include_null: bool) -> (Histogram, f64) {
        if !self.well_defined {
            return (self.clone(), DEFAULT_SELECTIVITY);
        }

        let mut buckets = Vec::new();
        for bucket in &self.buckets {
            for range in ranges {
                if let Some(part) = bucket.restrict(range) {
                    buckets.push(part);
                }
            }
        }

        let (freq_remaining, distinct_remaining) = if self.freq_remaining > EPSILON {
            let points = ranges.iter().filter(|r| r.as_point().is_some()).count();
            if !ranges.is_empty() && points == ranges.len() {
                let covered = (points as f64 / self.distinct_remaining.max(1.0)).min(1.0);
                (self.freq_remaining * covered, (points as f64).min(self.distinct_remaining))
            } else if ranges.iter().any(|r| r.is_unbounded()) {
                (self.freq_remaining, self.distinct_remaining)
            } else if ranges.is_empty() {
                (0.0, 0.0)
            } else {
                (
                    self.freq_remaining * DEFAULT_SELECTIVITY,
                    self.distinct_remaining * DEFAULT_SELECTIVITY,
                )
            }
        } else {
            (0.0, 0.0)
        };
        let null_freq = if include_null { self.null_freq } else { 0.0 };

        let mut ret = Histogram {
            buckets,
            null_freq,
            distinct_remaining,
            freq_remaining,
            well_defined: true,
            col_stats_missing: self.col_stats_missing,
        };
        let selectivity = ret.normalize();
        (ret, selectivity)
    }

    /// Equi-join of two columns.
    ///
    /// Returns the histogram of the join column and the join selectivity relative to the cross
    /// product, `None` when either side carries no bucket information.
    pub fn join_equality(&self, other: &Histogram) -> Option<(Histogram, f64)> {
        if !self.well_defined
            || !other.well_defined
            || (self.buckets.is_empty() && other.buckets.is_empty())
        {
            return None;
        }

        let mut buckets = Vec::new();
        let mut selectivity = 0.0;
        for l in &self.buckets {
            for r in &other.buckets {
                let (overlap, lf, rf) = match l.intersect(r) {
                    Some(o) => o,
                    None => continue,
                };
                let l_freq = l.frequency * lf;
                let r_freq = r.frequency * rf;
                let l_ndv = if l.is_singleton() { 1.0 } else { (l.distinct * lf).max(1.0) };
                let r_ndv = if r.is_singleton() { 1.0 } else { (r.distinct * rf).max(1.0) };

                let freq = l_freq * r_freq / l_ndv.max(r_ndv);
                selectivity += freq;
                buckets.push(Bucket {
                    frequency: freq,
                    distinct: l_ndv.min(r_ndv),
                    ..overlap
                });
            }
        }

        let (freq_remaining, distinct_remaining) =
            if self.freq_remaining > EPSILON && other.freq_remaining > EPSILON {
                let ndv = self.distinct_remaining.max(other.distinct_remaining).max(1.0);
                (
                    self.freq_remaining * other.freq_remaining / ndv,
                    self.distinct_remaining.min(other.distinct_remaining),
                )
            } else {
                (0.0, 0.0)
            };
        selectivity += freq_remaining;

        let ret = Histogram {
            buckets,
            null_freq: 0.0,
            distinct_remaining,
            freq_remaining,
            well_defined: true,
            col_stats_missing: self.col_stats_missing || other.col_stats_missing,
        };
        Some((ret.normalized(), selectivity))
    }

    /// Histogram of the rows of `self` with no equal value in `other`.
    pub fn anti_join(&self, other: &Histogram) -> Histogram {
        if !self.well_defined || !other.well_defined {
            return self.clone();
        }

        let buckets = self
            .buckets
            .iter()
            .filter_map(|l| {
                let matched: f64 = other
                    .buckets
                    .iter()
                    .filter_map(|r| l.intersect(r))
                    .map(|(overlap, lf, _)| overlap.distinct.min(l.distinct * lf))
                    .sum();
                let kept = (1.0 - matched / l.distinct.max(1.0)).clamp(0.0, 1.0);
                if kept <= EPSILON {
                    None
                } else {
                    Some(Bucket {
                        frequency: l.frequency * kept,
                        distinct: (l.distinct * kept).max(1.0),
                        ..l.clone()
                    })
                }
            })
            .collect();

        let ret = Histogram {
            buckets,
            null_freq: self.null_freq,
            distinct_remaining: self.distinct_remaining,
            freq_remaining: self.freq_remaining,
            well_defined: true,
            col_stats_missing: self.col_stats_missing,
        };
        ret.normalized()
    }

    /// Union of `self` over `rows` rows with `other` over `other_rows` rows, normalized to the
    /// combined row count.
    pub fn union_all(&self, rows: f64, other: &Histogram, other_rows: f64) -> Histogram {
        match (self.well_defined, other.well_defined) {
            (false, false) => return Histogram::default_histogram(),
            (true, false) => return self.clone(),
            (false, true) => return other.clone(),
            _ => {}
        }

        let total = rows + other_rows;
        if total <= EPSILON {
            return self.clone();
        }

        let mut weighted: Vec<Bucket> = self
            .buckets
            .iter()
            .map(|b| b.scaled(rows))
            .chain(other.buckets.iter().map(|b| b.scaled(other_rows)))
            .collect();
        weighted.sort_by(|l, r| l.lower.cmp(&r.lower));

        let mut merged: Vec<Bucket> = Vec::with_capacity(weighted.len());
        for b in weighted {
            match merged.last_mut() {
                Some(last) if last.as_range().intersect(&b.as_range()).is_some() => {
                    let overlap = last.as_range().intersect(&b.as_range());
                    let (last_part, b_part) = match &overlap {
                        Some(o) => (last.overlap_fraction(o), b.overlap_fraction(o)),
                        None => (0.0, 0.0),
                    };
                    let shared = (last.distinct * last_part).max(b.distinct * b_part);
                    last.distinct = shared
                        + last.distinct * (1.0 - last_part)
                        + b.distinct * (1.0 - b_part);
                    last.frequency += b.frequency;
                    if b.upper > last.upper
                        || (b.upper == last.upper && b.upper_closed && !last.upper_closed)
                    {
                        last.upper = b.upper.clone();
                        last.upper_closed = b.upper_closed;
                    }
                }
                _ => merged.push(b),
            }
        }

        let mut ret = Histogram {
            buckets: merged,
            null_freq: self.null_freq * rows + other.null_freq * other_rows,
            distinct_remaining: self.distinct_remaining.max(other.distinct_remaining),
            freq_remaining: self.freq_remaining * rows + other.freq_remaining * other_rows,
            well_defined: true,
            col_stats_missing: self.col_stats_missing || other.col_stats_missing,
        };
        ret.normalize();
        ret
    }

    /// Adds null rows making up `null_fraction` of the result, as the unmatched side of an
    /// outer join produces.
    pub fn with_null_padding(&self, null_fraction: f64) -> Histogram {
        if !self.well_defined {
            return self.clone();
        }
        let keep = (1.0 - null_fraction).clamp(0.0, 1.0);
        let mut ret = self.clone();
        for b in &mut ret.buckets {
            b.frequency *= keep;
        }
        ret.freq_remaining *= keep;
        ret.null_freq = self.null_freq * keep + null_fraction.clamp(0.0, 1.0);
        ret
    }

    /// Histogram after grouping on the column: one row per distinct value.
    pub fn grouped(&self) -> Histogram {
        if !self.well_defined {
            return self.clone();
        }
        let ndv = self.ndv();
        if ndv <= EPSILON {
            return self.clone();
        }

        let mut ret = self.clone();
        for b in &mut ret.buckets {
            b.frequency = b.distinct / ndv;
        }
        ret.freq_remaining = self.distinct_remaining / ndv;
        ret.null_freq = if self.null_freq > EPSILON { 1.0 / ndv } else { 0.0 };
        ret
    }
}

impl Debug for Histogram {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if !self.well_defined {
            return write!(f, "Histogram(undefined)");
        }
        f.debug_struct("Histogram")
            .field("buckets", &self.buckets)
            .field("null_freq", &self.null_freq)
            .field("distinct_remaining", &self.distinct_remaining)
            .field("freq_remaining", &self.freq_remaining)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use datafusion_common::ScalarValue;

    use crate::constraint::Range;
    use crate::stat::{Bucket, Histogram};

    fn int(v: i32) -> ScalarValue {
        ScalarValue::Int32(Some(v))
    }

    fn uniform_0_to_99() -> Histogram {
        Histogram::new(
            vec![
                Bucket::new(int(0), int(49), true, true, 0.5, 50.0),
                Bucket::new(int(50), int(99), true, true, 0.5, 50.0),
            ],
            0.0,
            0.0,
            0.0,
        )
    }

    fn assert_close(expected: f64, actual: f64) {
        assert!(
            (expected - actual).abs() < 1e-6,
            "expected {} got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_filter_range() {
        let hist = uniform_0_to_99();
        let (filtered, selectivity) = hist.filter(&[Range::less_than(int(25), false)], false);
        assert_close(0.25, selectivity);
        assert_eq!(1, filtered.buckets().len());
        assert_close(1.0, filtered.total_frequency());
    }

    #[test]
    fn test_filter_point_and_null() {
        let hist = Histogram::new(
            vec![Bucket::new(int(0), int(9), true, true, 0.8, 10.0)],
            0.2,
            0.0,
            0.0,
        );
        let (_, selectivity) = hist.filter(&[Range::point(int(3))], false);
        assert_close(0.08, selectivity);

        let (filtered, selectivity) = hist.filter(&[], true);
        assert_close(0.2, selectivity);
        assert_close(1.0, filtered.null_freq());
    }

    #[test]
    fn test_default_histograms() {
        let default = Histogram::default_histogram();
        assert!(!default.is_well_defined());
        let (_, selectivity) = default.filter(&[Range::point(int(1))], false);
        assert_close(0.4, selectivity);

        let bool_default = Histogram::default_bool_histogram();
        assert!(bool_default.is_well_defined());
        assert!(bool_default.is_col_stats_missing());
        assert_close(3.0, bool_default.ndv());
    }

    #[test]
    fn test_join_equality() {
        let left = Histogram::from_values(&[int(1), int(1), int(2)]);
        let right = Histogram::from_values(&[int(1)]);

        let (joined, selectivity) = left.join_equality(&right).unwrap();
        // Two of the three left rows match the single right row
        assert_close(2.0 / 3.0, selectivity);
        assert_eq!(1, joined.buckets().len());
    }

    #[test]
    fn test_anti_join() {
        let left = Histogram::from_values(&[int(1), int(1), int(2)]);
        let right = Histogram::from_values(&[int(1)]);

        let rest = left.anti_join(&right);
        assert_eq!(1, rest.buckets().len());
        assert_eq!(&int(2), rest.buckets()[0].lower().value());
    }

    #[test]
    fn test_union_all() {
        let left = Histogram::from_values(&[int(1), int(2)]);
        let right = Histogram::from_values(&[int(2), int(3), ScalarValue::Int32(None)]);

        let union = left.union_all(2.0, &right, 3.0);
        assert_close(1.0, union.total_frequency());
        assert_close(0.2, union.null_freq());
        assert_eq!(3, union.buckets().len());

        let undefined = Histogram::default_histogram();
        assert!(!undefined
            .union_all(1.0, &undefined, 1.0)
            .is_well_defined());
    }

    #[test]
    fn test_null_padding_and_grouping() {
        let hist = uniform_0_to_99();
        let padded = hist.with_null_padding(0.5);
        assert_close(0.5, padded.null_freq());
        assert_close(1.0, padded.total_frequency());

        let grouped = Histogram::from_values(&[int(1), int(1), int(1), int(2)]).grouped();
        assert_close(0.5, grouped.buckets()[0].frequency());
    }
}
