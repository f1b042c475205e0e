#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `extents` enumerates the allocated and/or dirty regions of a disk so the
//! backup engine can skip holes and, for incremental/differential backups,
//! skip everything outside the active dirty bitmap. Two strategies
//! implement the same [`ExtentQuery`] seam:
//!
//! - [`NbdExtentQuery`], which drives `NBD_CMD_BLOCK_STATUS` over a
//!   negotiated metadata context ([`BASE_ALLOCATION`] or a
//!   [`dirty_bitmap_context`]). This is the preferred path whenever the
//!   NBD server advertises the context.
//! - [`ToolExtentQuery`], a fallback that shells out to an image-inspection
//!   utility (`qemu-img map --output=json`) and parses its JSON records.
//!
//! # Design
//!
//! Both strategies produce a raw, possibly over-fragmented sequence of
//! [`Extent`] records, which [`merge_adjacent`] coalesces and
//! [`cover_disk`] validates against the disk's full virtual size before
//! either query returns. The backup engine never sees ungapped,
//! unvalidated extent data.
//!
//! # Invariants
//!
//! - A successful [`ExtentQuery::query_block_status`] result always covers
//!   `[0, disk_size)` with no gaps or overlaps, or the call returns
//!   [`ExtentError::Coverage`].
//! - No two adjacent extents in a returned sequence share the same `data`
//!   flag.
//!
//! # Errors
//!
//! See [`ExtentError`] for the full set of failure modes: transport
//! failure, tool invocation failure, malformed tool output, and coverage
//! validation failure.
//!
//! # Examples
//!
//! ```
//! use extents::{cover_disk, merge_adjacent, Extent};
//!
//! let extents = vec![
//!     Extent { offset: 0, length: 4096, data: true },
//!     Extent { offset: 4096, length: 4096, data: true },
//! ];
//! let merged = merge_adjacent(extents);
//! assert_eq!(merged, vec![Extent { offset: 0, length: 8192, data: true }]);
//! cover_disk(&merged, 8192).unwrap();
//! ```
//!
//! # See also
//!
//! - `backup` for how extent sequences drive Data/Zero frame emission.
//! - `nbd_transport` for the `block_status` call this crate's NBD strategy
//!   sits on top of.

mod context;
mod error;
mod extent;
mod nbd_query;
mod query;
mod tool_query;

pub use context::{dirty_bitmap_context, online_bitmap_name, BASE_ALLOCATION};
pub use error::{ExtentError, ExtentResult};
pub use extent::{cover_disk, merge_adjacent, Extent};
pub use nbd_query::NbdExtentQuery;
pub use query::ExtentQuery;
pub use tool_query::{parse_map_output, ToolExtentQuery};
