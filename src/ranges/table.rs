//! In-memory interval tables
//!
//! A [`RangeTable`] is an immutable, sorted, non-overlapping set of
//! `(low, high, country)` records for one address family. Reloads build a new
//! table off to the side and publish it through [`RangeTables`], so a lookup
//! always runs against exactly one generation.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;

use crate::geo::{AddressFamily, CountryCode, NormalizedAddress};

/// Contiguous block of address space mapped to one country.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeRecord {
    pub low: u128,
    pub high: u128,
    pub country: CountryCode,
}

impl RangeRecord {
    pub fn new(low: u128, high: u128, country: CountryCode) -> Self {
        Self { low, high, country }
    }

    pub fn contains(&self, value: u128) -> bool {
        self.low <= value && value <= self.high
    }
}

/// Sort records and make them pairwise disjoint.
///
/// Records are ordered by `(low, high)`. When two records overlap the earlier
/// one keeps the shared space: the later one is clipped to start after it, or
/// dropped when fully covered. Lookups on the result therefore match the
/// first record in sort order that contains the address.
pub fn disjoint(mut records: Vec<RangeRecord>) -> Vec<RangeRecord> {
    records.sort_by_key(|r| (r.low, r.high));

    let mut out: Vec<RangeRecord> = Vec::with_capacity(records.len());
    for mut record in records {
        if record.low > record.high {
            continue;
        }
        if let Some(prev) = out.last() {
            if record.high <= prev.high {
                continue;
            }
            if record.low <= prev.high {
                // prev.high < record.high, so this cannot overflow
                record.low = prev.high + 1;
            }
        }
        out.push(record);
    }
    out
}

/// Immutable lookup table for one address family.
#[derive(Debug, Clone)]
pub struct RangeTable {
    family: AddressFamily,
    version: i64,
    records: Vec<RangeRecord>,
}

impl RangeTable {
    pub fn empty(family: AddressFamily) -> Self {
        Self {
            family,
            version: 0,
            records: Vec::new(),
        }
    }

    /// Build a table from records in any order; see [`disjoint`] for how
    /// overlapping input is resolved.
    pub fn new(family: AddressFamily, version: i64, records: Vec<RangeRecord>) -> Self {
        Self {
            family,
            version,
            records: disjoint(records),
        }
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn records(&self) -> &[RangeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Country for a raw numeric address, unknown when no record contains it.
    pub fn lookup_value(&self, value: u128) -> CountryCode {
        let idx = self.records.partition_point(|r| r.low <= value);
        if idx == 0 {
            return CountryCode::UNKNOWN;
        }
        let record = &self.records[idx - 1];
        if value <= record.high {
            record.country
        } else {
            CountryCode::UNKNOWN
        }
    }

    /// Country for an address; unknown for the other family or a miss.
    pub fn lookup(&self, addr: &NormalizedAddress) -> CountryCode {
        if addr.family() != self.family {
            return CountryCode::UNKNOWN;
        }
        self.lookup_value(addr.value())
    }
}

/// Current generation of both family tables.
pub struct RangeTables {
    v4: ArcSwap<RangeTable>,
    v6: ArcSwap<RangeTable>,
}

impl RangeTables {
    pub fn new() -> Self {
        Self {
            v4: ArcSwap::from_pointee(RangeTable::empty(AddressFamily::V4)),
            v6: ArcSwap::from_pointee(RangeTable::empty(AddressFamily::V6)),
        }
    }

    fn slot(&self, family: AddressFamily) -> &ArcSwap<RangeTable> {
        match family {
            AddressFamily::V4 => &self.v4,
            AddressFamily::V6 => &self.v6,
        }
    }

    /// The table readers currently see for `family`.
    pub fn snapshot(&self, family: AddressFamily) -> Arc<RangeTable> {
        self.slot(family).load_full()
    }

    /// Publish a new generation; in-flight lookups finish on the old one.
    pub fn install(&self, table: RangeTable) {
        self.slot(table.family()).store(Arc::new(table));
    }

    pub fn lookup(&self, addr: &NormalizedAddress) -> CountryCode {
        self.slot(addr.family()).load().lookup(addr)
    }
}

impl Default for RangeTables {
    fn default() -> Self {
        Self::new()
    }
}
