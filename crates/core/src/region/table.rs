//! Registered-region table and backing-file management.
//!
//! Every registered region owns a raw backing file: one byte per byte of the
//! region, offset `base` mapping to file offset `0`, no header. The table is
//! queried on every instrumented store, so the address lookup is an `O(log N)`
//! range query over a map keyed by base address; a secondary name map serves
//! unregister-by-name without duplicating state.

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;

use crate::common::addr::LineSize;
use crate::common::error::ToolError;

/// A registered persistent-memory region and its backing file.
#[derive(Debug)]
pub struct RegisteredRegion {
    /// Region name; also the path of the backing file.
    pub name: String,
    /// Base guest address, cache-line aligned.
    pub base: u64,
    /// Size of the region in bytes.
    pub size: u64,
    /// Backing file, created and truncated to `size` on register.
    pub file: File,
}

impl RegisteredRegion {
    /// Whether `addr` falls inside this region.
    #[inline]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.base + self.size
    }
}

/// Table of registered regions.
///
/// The authoritative container is a `BTreeMap` keyed by base address (ranges
/// of distinct regions do not overlap); `by_name` maps names to bases so both
/// query shapes stay efficient.
#[derive(Debug, Default)]
pub struct RegionTable {
    by_base: BTreeMap<u64, RegisteredRegion>,
    by_name: HashMap<String, u64>,
}

impl RegionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered regions.
    pub fn len(&self) -> usize {
        self.by_base.len()
    }

    /// Whether no region is registered.
    pub fn is_empty(&self) -> bool {
        self.by_base.is_empty()
    }

    /// Registers a region and creates its backing file.
    ///
    /// The backing file is created (or truncated) at path `name` with `size`
    /// bytes, read-write for user and group. Double registration of the same
    /// name is the caller's mistake and is not de-duplicated.
    ///
    /// # Errors
    ///
    /// Rejects an empty name or a base address that is not line-aligned.
    ///
    /// # Panics
    ///
    /// Panics when the backing file cannot be created or sized; a region
    /// without a descriptor cannot be modeled at all.
    pub fn register(
        &mut self,
        name: &str,
        base: u64,
        size: u64,
        line: LineSize,
    ) -> Result<(), ToolError> {
        if name.is_empty() {
            return Err(ToolError::EmptyRegionName);
        }
        if line.trim(base) != base {
            return Err(ToolError::MisalignedRegion {
                addr: base,
                line: line.bytes(),
            });
        }

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o660)
            .open(name)
        {
            Ok(file) => file,
            Err(err) => panic!("could not open backing file '{name}': {err}"),
        };
        if let Err(err) = file.set_len(size) {
            panic!("could not truncate backing file '{name}' to {size} bytes: {err}");
        }

        let _prev = self.by_name.insert(name.to_owned(), base);
        let _prev = self.by_base.insert(
            base,
            RegisteredRegion {
                name: name.to_owned(),
                base,
                size,
                file,
            },
        );
        Ok(())
    }

    /// Removes the region registered under `name`; absent names are a no-op.
    pub fn unregister_by_name(&mut self, name: &str) {
        if let Some(base) = self.by_name.remove(name) {
            let _region = self.by_base.remove(&base);
        }
    }

    /// Removes the region containing `addr`; a miss is a no-op.
    pub fn unregister_by_addr(&mut self, addr: u64) {
        if let Some(base) = self.lookup(addr).map(|region| region.base) {
            if let Some(region) = self.by_base.remove(&base) {
                let _base = self.by_name.remove(&region.name);
            }
        }
    }

    /// Returns the region whose range contains `addr`, if any.
    pub fn lookup(&self, addr: u64) -> Option<&RegisteredRegion> {
        self.by_base
            .range(..=addr)
            .next_back()
            .map(|(_, region)| region)
            .filter(|region| region.contains(addr))
    }

    /// Iterates regions in base-address order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredRegion> {
        self.by_base.values()
    }
}
