//! Helpers over [`ScalarValue`], the datum type used by constraints and histograms.

use std::cmp::Ordering;

use datafusion_common::ScalarValue;

pub type Datum = ScalarValue;

/// Maps a datum to a double so that the mapping preserves order within one type.
///
/// Returns `None` for nulls and for types without a useful numeric mapping.
pub fn datum_to_f64(datum: &Datum) -> Option<f64> {
    match datum {
        ScalarValue::Boolean(Some(v)) => Some(if *v { 1.0 } else { 0.0 }),
        ScalarValue::Int8(Some(v)) => Some(*v as f64),
        ScalarValue::Int16(Some(v)) => Some(*v as f64),
        ScalarValue::Int32(Some(v)) => Some(*v as f64),
        ScalarValue::Int64(Some(v)) => Some(*v as f64),
        ScalarValue::UInt8(Some(v)) => Some(*v as f64),
        ScalarValue::UInt16(Some(v)) => Some(*v as f64),
        ScalarValue::UInt32(Some(v)) => Some(*v as f64),
        ScalarValue::UInt64(Some(v)) => Some(*v as f64),
        ScalarValue::Float32(Some(v)) => Some(*v as f64),
        ScalarValue::Float64(Some(v)) => Some(*v),
        ScalarValue::Date32(Some(v)) => Some(*v as f64),
        ScalarValue::Date64(Some(v)) => Some(*v as f64),
        ScalarValue::Decimal128(Some(v), _, scale) => Some(*v as f64 / 10f64.powi(*scale as i32)),
        ScalarValue::TimestampSecond(Some(v), _)
        | ScalarValue::TimestampMillisecond(Some(v), _)
        | ScalarValue::TimestampMicrosecond(Some(v), _)
        | ScalarValue::TimestampNanosecond(Some(v), _) => Some(*v as f64),
        ScalarValue::Utf8(Some(v)) | ScalarValue::LargeUtf8(Some(v)) => Some(string_to_f64(v)),
        _ => None,
    }
}

/// Order preserving mapping of the first eight bytes of a string.
fn string_to_f64(s: &str) -> f64 {
    let mut buf = [0u8; 8];
    for (dst, src) in buf.iter_mut().zip(s.as_bytes()) {
        *dst = *src;
    }
    u64::from_be_bytes(buf) as f64
}

/// Total order over datums of comparable types. Nulls sort first.
pub fn compare_datums(left: &Datum, right: &Datum) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    left.partial_cmp(right)
        .or_else(|| match (datum_to_f64(left), datum_to_f64(right)) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => None,
        })
        .unwrap_or(Ordering::Equal)
}

/// Whether the type has integral values, so that a closed range `[a, b]` holds `b - a + 1`
/// distinct values.
pub fn is_integral(datum: &Datum) -> bool {
    matches!(
        datum,
        ScalarValue::Int8(_)
            | ScalarValue::Int16(_)
            | ScalarValue::Int32(_)
            | ScalarValue::Int64(_)
            | ScalarValue::UInt8(_)
            | ScalarValue::UInt16(_)
            | ScalarValue::UInt32(_)
            | ScalarValue::UInt64(_)
            | ScalarValue::Date32(_)
            | ScalarValue::Date64(_)
            | ScalarValue::Boolean(_)
    )
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use datafusion_common::ScalarValue;

    use crate::datum::{compare_datums, datum_to_f64};

    #[test]
    fn test_compare_datums() {
        assert_eq!(
            Ordering::Less,
            compare_datums(&ScalarValue::Int32(Some(1)), &ScalarValue::Int32(Some(2)))
        );
        assert_eq!(
            Ordering::Less,
            compare_datums(&ScalarValue::Int32(None), &ScalarValue::Int32(Some(2)))
        );
        // Mixed integer widths fall back to the numeric mapping
        assert_eq!(
            Ordering::Greater,
            compare_datums(&ScalarValue::Int64(Some(3)), &ScalarValue::Int32(Some(2)))
        );
    }

    #[test]
    fn test_string_mapping_preserves_order() {
        let a = datum_to_f64(&ScalarValue::Utf8(Some("abc".to_string()))).unwrap();
        let b = datum_to_f64(&ScalarValue::Utf8(Some("abd".to_string()))).unwrap();
        assert!(a < b);
    }
}
