//! crates/extents/src/nbd_query.rs
//!
//! [`NbdExtentQuery`]: the preferred [`crate::ExtentQuery`] implementation,
//! driving `NBD_CMD_BLOCK_STATUS` over a negotiated metadata context.

use std::io::{Read, Write};

use nbd_transport::{NbdTransport, StatusDescriptor};

use crate::context::BASE_ALLOCATION;
use crate::error::ExtentResult;
use crate::extent::{cover_disk, merge_adjacent, Extent};
use crate::query::ExtentQuery;

/// Bit 0 of a `base:allocation` descriptor: the region is a hole.
const BASE_FLAG_HOLE: u32 = 1 << 0;
/// Bit 0 of a `qemu:dirty-bitmap:*` descriptor: the region is dirty.
const DIRTY_FLAG_DIRTY: u32 = 1 << 0;

/// Queries allocated/dirty extents for one disk over an already-connected
/// [`NbdTransport`], using the metadata context named by `context` (either
/// [`BASE_ALLOCATION`] for a full/copy backup or a
/// [`crate::context::dirty_bitmap_context`] result for inc/diff).
pub struct NbdExtentQuery<'a, S> {
    transport: &'a mut NbdTransport<S>,
    context: String,
    disk_size: u64,
}

impl<'a, S> NbdExtentQuery<'a, S> {
    /// Builds a query over `transport`'s full negotiated export size.
    #[must_use]
    pub fn new(transport: &'a mut NbdTransport<S>, context: impl Into<String>) -> Self {
        let disk_size = transport.size();
        Self { transport, context: context.into(), disk_size }
    }

    fn translate(&self, descriptor: StatusDescriptor) -> bool {
        interpret_flags(&self.context, descriptor.flags)
    }
}

/// Translates one context's raw status flags into the `data` bool:
/// `data=true` iff allocated (`base:allocation`) or dirty
/// (`qemu:dirty-bitmap:*`).
fn interpret_flags(context: &str, flags: u32) -> bool {
    if context == BASE_ALLOCATION {
        flags & BASE_FLAG_HOLE == 0
    } else {
        flags & DIRTY_FLAG_DIRTY != 0
    }
}

impl<S: Read + Write> ExtentQuery for NbdExtentQuery<'_, S> {
    fn query_block_status(&mut self) -> ExtentResult<Option<Vec<Extent>>> {
        if self.disk_size == 0 {
            return Ok(Some(Vec::new()));
        }

        let chunk_size = self.transport.max_request_size();
        let mut extents = Vec::new();
        let mut offset = 0u64;

        while offset < self.disk_size {
            let remaining = self.disk_size - offset;
            let length = remaining.min(u64::from(chunk_size)) as u32;
            let descriptors = self.transport.block_status(&self.context, offset, length)?;

            let mut consumed = 0u64;
            for descriptor in descriptors {
                let data = self.translate(descriptor);
                let descriptor_len = u64::from(descriptor.length);
                extents.push(Extent { offset: offset + consumed, length: descriptor_len, data });
                consumed += descriptor_len;
            }
            if consumed == 0 {
                break;
            }
            offset += consumed;
        }

        let merged = merge_adjacent(extents);
        cover_disk(&merged, self.disk_size)?;
        logging::info_log!(Extent, 2, "nbd block-status query over {} returned {} merged extents", self.context, merged.len());
        Ok(Some(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_allocation_hole_bit_means_no_data() {
        assert!(!interpret_flags(BASE_ALLOCATION, 0b01));
        assert!(interpret_flags(BASE_ALLOCATION, 0b00));
        assert!(interpret_flags(BASE_ALLOCATION, 0b10));
    }

    #[test]
    fn dirty_bitmap_bit_zero_means_dirty() {
        let context = crate::context::dirty_bitmap_context("prefix.1");
        assert!(interpret_flags(&context, 1));
        assert!(!interpret_flags(&context, 0));
    }
}
