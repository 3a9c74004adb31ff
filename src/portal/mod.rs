//! Browser automation against the card issuer's web portal.

mod browser;
mod max;

pub use browser::{find_chrome, DownloadWatcher};
pub use max::MaxPortal;
