//! crates/extents/src/tool_query.rs
//!
//! [`ToolExtentQuery`]: the image-inspection-tool fallback used when the
//! NBD server does not support `NBD_CMD_BLOCK_STATUS` or the requested
//! metadata context.

use std::path::PathBuf;
use std::process::Command;

use serde::Deserialize;

use crate::error::{ExtentError, ExtentResult};
use crate::extent::{cover_disk, merge_adjacent, Extent};
use crate::query::ExtentQuery;

/// One record of `qemu-img map --output=json`'s output.
#[derive(Debug, Deserialize)]
struct MapRecord {
    start: u64,
    length: u64,
    #[serde(default)]
    zero: bool,
    #[serde(default)]
    data: bool,
}

/// Invokes an image-inspection tool (`qemu-img map --output=json` by
/// default) to enumerate a disk image's allocated regions. Used when the
/// NBD-based query is unavailable.
pub struct ToolExtentQuery {
    image_path: PathBuf,
    tool: PathBuf,
}

impl ToolExtentQuery {
    /// Builds a query invoking the default `qemu-img` binary on `$PATH`.
    #[must_use]
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self { image_path: image_path.into(), tool: PathBuf::from("qemu-img") }
    }

    /// Builds a query invoking an explicit tool binary path, useful for
    /// tests that stub the tool out.
    #[must_use]
    pub fn with_tool(image_path: impl Into<PathBuf>, tool: impl Into<PathBuf>) -> Self {
        Self { image_path: image_path.into(), tool: tool.into() }
    }

    fn run(&self) -> ExtentResult<String> {
        let output = Command::new(&self.tool)
            .arg("map")
            .arg("--output=json")
            .arg(&self.image_path)
            .output()?;
        if !output.status.success() {
            return Err(ExtentError::Tool(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn records_to_extents(records: Vec<MapRecord>) -> Vec<Extent> {
    records
        .into_iter()
        .map(|record| Extent { offset: record.start, length: record.length, data: record.data && !record.zero })
        .collect()
}

/// Parses `qemu-img map --output=json`-shaped text into merged, validated
/// extents covering `disk_size`. Exposed for tests that stub tool output
/// without spawning a process.
pub fn parse_map_output(json: &str, disk_size: u64) -> ExtentResult<Vec<Extent>> {
    let records: Vec<MapRecord> = serde_json::from_str(json)?;
    let merged = merge_adjacent(records_to_extents(records));
    cover_disk(&merged, disk_size)?;
    Ok(merged)
}

impl ExtentQuery for ToolExtentQuery {
    fn query_block_status(&mut self) -> ExtentResult<Option<Vec<Extent>>> {
        let stdout = self.run()?;
        let records: Vec<MapRecord> = serde_json::from_str(&stdout)?;
        let merged = merge_adjacent(records_to_extents(records));
        let disk_size = merged.last().map_or(0, Extent::end);
        cover_disk(&merged, disk_size)?;
        logging::info_log!(Extent, 2, "qemu-img map returned {} merged extents", merged.len());
        Ok(Some(merged))
    }
}
