//! Min/max envelope of the visible audio, one column per display cell.

use crate::timing::valmap;

/// Extremes of the samples that fall into one display column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnEnvelope {
    /// First sample of the column, relative to the enveloped slice
    pub start: usize,
    /// One past the last sample of the column
    pub end: usize,
    pub max: i32,
    pub min: i32,
}

impl ColumnEnvelope {
    /// Rows covered by the column on a display `height` rows tall, top row first.
    ///
    /// Full-scale positive maps to row 0, full-scale negative to `height`.
    pub fn rows(&self, height: i64) -> (i64, i64) {
        let top = valmap(self.max as i64, i32::MIN as i64, i32::MAX as i64, height, 0);
        let bottom = valmap(self.min as i64, i32::MIN as i64, i32::MAX as i64, height, 0);
        (top, bottom)
    }
}

/// Splits `samples` into `columns` near-equal partitions and takes each one's extremes.
///
/// A column with no samples has a zero envelope.
pub fn envelope(samples: &[i32], columns: usize) -> Vec<ColumnEnvelope> {
    let len = samples.len();
    (0..columns)
        .map(|x| {
            let start = x * len / columns;
            let end = (x + 1) * len / columns;
            let part = &samples[start..end];
            let (min, max) = part
                .iter()
                .fold(None, |acc: Option<(i32, i32)>, &s| match acc {
                    None => Some((s, s)),
                    Some((lo, hi)) => Some((lo.min(s), hi.max(s))),
                })
                .unwrap_or((0, 0));
            ColumnEnvelope {
                start,
                end,
                max,
                min,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_amplitude_gives_flat_columns() {
        let samples = vec![1234; 1000];
        let columns = envelope(&samples, 7);
        assert_eq!(columns.len(), 7);
        assert!(columns.iter().all(|c| c.max == 1234 && c.min == 1234));
    }

    #[test]
    fn test_partitions_cover_every_sample() {
        let samples: Vec<i32> = (0..103).collect();
        let columns = envelope(&samples, 10);
        assert_eq!(columns[0].start, 0);
        assert_eq!(columns[9].end, 103);
        for pair in columns.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(columns[0].min, 0);
        assert_eq!(columns[9].max, 102);
    }

    #[test]
    fn test_more_columns_than_samples() {
        let columns = envelope(&[5, -5], 4);
        assert_eq!(columns.len(), 4);
        let empty = columns.iter().filter(|c| c.start == c.end).count();
        assert_eq!(empty, 2);
        assert!(columns
            .iter()
            .filter(|c| c.start == c.end)
            .all(|c| c.max == 0 && c.min == 0));
    }

    #[test]
    fn test_rows_span_full_scale() {
        let full = ColumnEnvelope {
            start: 0,
            end: 1,
            max: i32::MAX,
            min: i32::MIN,
        };
        assert_eq!(full.rows(40), (0, 40));
        let silent = ColumnEnvelope::default();
        let (top, bottom) = silent.rows(40);
        assert_eq!(top, bottom);
        assert_eq!(top, 20);
    }
}
