//! Range queries over a stream's pts index.

use std::ops::Bound;

use fv_core::media::{Rational, Stream};
use fv_core::{Error, Result};
use fv_spec::{MediaSpec, SpecFlags, SpecValue};

use crate::kv::{KvConnection, ScoredMember};

/// What to fetch from a stream in [`MediaStore::retrieve_media`].
///
/// [`MediaStore::retrieve_media`]: super::MediaStore::retrieve_media
#[derive(Debug, Clone, PartialEq)]
pub struct MediaQuery {
    pub start: SpecValue,
    pub end: SpecValue,
    pub flags: SpecFlags,
    /// Matched entries to skip.
    pub offset: usize,
    /// Maximum number of entries to return.
    pub limit: Option<usize>,
    /// Skip payload fetches.
    pub metadata_only: bool,
}

impl MediaQuery {
    /// Exact pts range, both ends inclusive.
    pub fn pts(start: i64, end: i64) -> Self {
        Self::from_spec(&MediaSpec::new(start, end, SpecFlags::DEFAULT))
    }

    pub fn from_spec(spec: &MediaSpec) -> Self {
        Self {
            start: spec.start,
            end: spec.end,
            flags: spec.flags,
            offset: 0,
            limit: None,
            metadata_only: false,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn metadata_only(mut self) -> Self {
        self.metadata_only = true;
        self
    }

    /// The range this query resolves, without paging.
    pub fn spec(&self) -> MediaSpec {
        MediaSpec::new(self.start, self.end, self.flags)
    }

    fn snaps(&self) -> bool {
        self.flags.intersects(SpecFlags::FUZZY | SpecFlags::REALTIME)
    }
}

impl From<MediaSpec> for MediaQuery {
    fn from(spec: MediaSpec) -> Self {
        Self::from_spec(&spec)
    }
}

/// Convert seconds into a pts of `stream`.
pub(crate) fn seconds_to_pts(stream: &Stream, seconds: f64) -> Result<i64> {
    let ticks_per_second = stream
        .time_base
        .and_then(|tb| Rational::new(tb.den, tb.num).to_f64())
        .filter(|&rate| rate != 0.0)
        .ok_or_else(|| {
            Error::Validation(format!(
                "stream {} has no usable time base for a real-time range",
                stream.index
            ))
        })?;
    let ticks = (seconds * ticks_per_second).floor() as i64;
    Ok(ticks.saturating_add(stream.start_time.unwrap_or(0)))
}

pub(crate) fn paginate<T>(entries: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    entries
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// The entry a fuzzy start resolves to: the last one at or before `pts`, or
/// failing that the first one after it.
async fn snap(conn: &KvConnection, index: &str, pts: i64) -> Result<Option<ScoredMember>> {
    let target = pts as f64;
    match conn.zfloor(index, target).await? {
        Some(entry) => Ok(Some(entry)),
        None => conn.zceil(index, target).await,
    }
}

/// Index entries matched by `query`, in pts order and paginated.
///
/// `start` and `end` are already in pts for every non-index query; real-time
/// bounds have been converted by the caller.
pub(crate) async fn select(
    conn: &KvConnection,
    index: &str,
    query: &MediaQuery,
    start: i64,
    end: i64,
) -> Result<Vec<ScoredMember>> {
    if query.flags.contains(SpecFlags::INDEX) {
        let ranked = conn.zrange(index, start, end).await?;
        return Ok(paginate(ranked, query.offset, query.limit));
    }

    let (start, end) = if query.snaps() {
        let Some(anchor) = snap(conn, index, start).await? else {
            return Ok(Vec::new());
        };
        if query.spec().is_single() && !query.flags.contains(SpecFlags::DURATION) {
            return Ok(paginate(vec![anchor], query.offset, query.limit));
        }
        let anchored = anchor.score as i64;
        let end = if query.flags.contains(SpecFlags::DURATION) {
            end.saturating_add(anchored - start)
        } else {
            end
        };
        (anchored, end)
    } else {
        (start, end)
    };

    let (min, max) = if query.flags.contains(SpecFlags::DURATION) {
        (
            Bound::Included(start.min(end) as f64),
            Bound::Excluded(start.max(end) as f64),
        )
    } else {
        (Bound::Included(start as f64), Bound::Included(end as f64))
    };
    conn.zrange_by_score(index, min, max, query.offset, query.limit)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_from_spec_keeps_bounds() {
        let spec = fv_spec::parse("2nd-3rd").unwrap();
        let query = MediaQuery::from(spec).with_offset(1).with_limit(5);
        assert_eq!(query.start, SpecValue::Int(1));
        assert_eq!(query.end, SpecValue::Int(2));
        assert_eq!(query.flags, SpecFlags::INDEX);
        assert_eq!(query.offset, 1);
        assert_eq!(query.limit, Some(5));
        assert!(!query.metadata_only);
    }

    #[test]
    fn query_round_trips_its_range() {
        let spec = MediaSpec::new(3, 3, SpecFlags::INDEX);
        let query = MediaQuery::from_spec(&spec).with_limit(2);
        assert_eq!(query.spec(), spec);
        assert!(query.spec().is_single());
        assert!(!MediaQuery::pts(0, 40).spec().is_single());
    }

    #[test]
    fn seconds_use_the_time_base_and_start_time() {
        let stream = Stream {
            time_base: Some(Rational::new(1, 90_000)),
            start_time: Some(1_000),
            ..Stream::default()
        };
        assert_eq!(seconds_to_pts(&stream, 2.0).unwrap(), 181_000);
        assert_eq!(seconds_to_pts(&stream, -0.5).unwrap(), -44_000);

        let coarse = Stream {
            time_base: Some(Rational::new(1001, 30_000)),
            ..Stream::default()
        };
        // 1.5s is 44.955 ticks; the partial tick is dropped.
        assert_eq!(seconds_to_pts(&coarse, 1.5).unwrap(), 44);
    }

    #[test]
    fn realtime_needs_a_time_base() {
        let err = seconds_to_pts(&Stream::default(), 1.0).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        for tb in [Rational::new(0, 1000), Rational::new(1, 0)] {
            let stream = Stream {
                time_base: Some(tb),
                ..Stream::default()
            };
            let err = seconds_to_pts(&stream, 1.0).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{tb}");
        }
    }

    #[test]
    fn pagination() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(paginate(items.clone(), 2, Some(3)), [2, 3, 4]);
        assert_eq!(paginate(items.clone(), 8, None), [8, 9]);
        assert!(paginate(items, 20, None).is_empty());
    }
}
