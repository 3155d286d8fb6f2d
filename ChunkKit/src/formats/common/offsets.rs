//! Offset to arena-index resolution
//!
//! Packages link records by byte offset. Readers record where each record
//! was found and turn the stored offsets back into indices here.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::options::ReadOptions;

/// A record table as stored in a header: entry count and offset from the package base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Table {
    pub count: usize,
    pub offset: usize,
}

/// Map from the byte offset of a record to its index in the decoded arena.
#[derive(Debug, Clone)]
pub(crate) struct OffsetIndex {
    kind: &'static str,
    map: BTreeMap<usize, usize>,
}

impl OffsetIndex {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            map: BTreeMap::new(),
        }
    }

    /// Index a table of `count` fixed-size records starting at `base`.
    pub(crate) fn for_table(kind: &'static str, base: usize, record_size: usize, count: usize) -> Self {
        let mut index = Self::new(kind);
        for i in 0..count {
            index.insert(base + i * record_size, i);
        }
        index
    }

    pub(crate) fn insert(&mut self, offset: usize, index: usize) {
        self.map.insert(offset, index);
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// Resolve a stored offset.
    ///
    /// Strict reads fail on a miss. Lenient reads fall back to the record
    /// closest to the offset (lower one on a tie) and log a warning.
    pub(crate) fn resolve(&self, offset: usize, options: &ReadOptions) -> Result<usize> {
        if let Some(&index) = self.map.get(&offset) {
            return Ok(index);
        }

        let dangling = Error::DanglingReference {
            kind: self.kind,
            offset,
        };
        if options.is_strict() {
            return Err(dangling);
        }

        let below = self.map.range(..offset).next_back();
        let above = self.map.range(offset..).next();
        let closest = match (below, above) {
            (Some((&lo, &lo_index)), Some((&hi, &hi_index))) => {
                if offset - lo <= hi - offset {
                    lo_index
                } else {
                    hi_index
                }
            }
            (Some((_, &index)), None) | (None, Some((_, &index))) => index,
            (None, None) => return Err(dangling),
        };

        tracing::warn!(
            "Unresolved {} offset {:#x}; using closest record {}",
            self.kind,
            offset,
            closest
        );
        Ok(closest)
    }

    /// Resolve the first record of a run of `count` consecutive records.
    ///
    /// An empty run resolves to `0..0` without looking at the offset.
    pub(crate) fn resolve_run(
        &self,
        offset: usize,
        count: usize,
        options: &ReadOptions,
    ) -> Result<std::ops::Range<usize>> {
        if count == 0 {
            return Ok(0..0);
        }
        let start = self.resolve(offset, options)?;
        let end = start + count;
        if end <= self.len() {
            return Ok(start..end);
        }

        if options.is_strict() {
            return Err(Error::DanglingReference {
                kind: self.kind,
                offset,
            });
        }
        tracing::warn!(
            "{} run at {:#x} of {} records overruns the table ({} records); truncating",
            self.kind,
            offset,
            count,
            self.len()
        );
        Ok(start..self.len())
    }
}
