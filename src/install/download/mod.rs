//! Release lookup, archive download and package extraction
//!
//! ## Module Organization
//!
//! - `platform` - Platform detection and `downloadType` selection
//! - `vendor` - Vendor API interaction for release discovery
//! - `core` - Streaming download with retries and progress tracking
//! - `extract` - Archive extraction into a staging directory (ZIP, tar.gz)
//! - `retry` - Transient/permanent classification of network failures

mod core;
mod extract;
mod platform;
mod retry;
mod vendor;

// Re-export public API
pub use core::Downloader;
pub use extract::{ArchiveExtractor, StagingTree, extract_archive};
pub use platform::Platform;
pub use vendor::{DownloadLink, ReleaseInfo, ReleaseResolver, select_release, version_from_url};
