//! Browser plumbing shared by portal flows.
//!
//! Launching Chrome, routing downloads into a directory, and the small
//! selector helpers CDP doesn't give us (wait-for-selector, find-by-text).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Element, Page};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Find Chrome/Chromium executable.
pub fn find_chrome() -> Option<String> {
    for name in ["google-chrome", "chromium"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }
    }

    // Fall back to known paths
    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // NixOS
        "/run/current-system/sw/bin/google-chrome",
        "/run/current-system/sw/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    candidates
        .iter()
        .find(|candidate| Path::new(candidate).exists())
        .map(|s| s.to_string())
}

/// Launch a browser with a persistent profile.
///
/// Headful by default: the portal's bot detection is much less aggressive
/// against a visible window, and the user can dismiss popups by hand.
pub async fn launch_browser(
    profile_dir: &Path,
    headless: bool,
) -> Result<(Browser, chromiumoxide::handler::Handler)> {
    let chrome_path = find_chrome()
        .context("Chrome/Chromium not found. Install Chrome or Chromium to fetch statements.")?;

    std::fs::create_dir_all(profile_dir)
        .with_context(|| format!("Failed to create profile dir: {}", profile_dir.display()))?;

    let mut builder = BrowserConfig::builder()
        .chrome_executable(chrome_path)
        .viewport(None)
        .user_data_dir(profile_dir)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--no-first-run")
        .arg("--no-default-browser-check");
    if !headless {
        builder = builder.with_head();
    }
    let config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

    let (browser, handler) = Browser::launch(config)
        .await
        .context("Failed to launch browser")?;

    Ok((browser, handler))
}

/// Route this page's downloads into `download_dir`.
pub async fn setup_download_handling(page: &Page, download_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(download_dir)?;

    let download_params = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::Allow)
        .download_path(download_dir.display().to_string())
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build download params: {e}"))?;

    page.execute(download_params).await?;
    Ok(())
}

/// Poll for a selector until it appears or the timeout passes.
pub async fn wait_for_selector(page: &Page, selector: &str, timeout: Duration) -> Result<Element> {
    let start = std::time::Instant::now();
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Ok(element);
        }
        if start.elapsed() > timeout {
            anyhow::bail!("Timed out waiting for selector: {selector}");
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Find elements matching a selector whose rendered text contains `text`,
/// in document order, paired with that text.
///
/// CDP's querySelector has no text matching, so this filters candidates by
/// their inner text. Ancestors of a matching node match too (their text
/// contains the child's); callers that want the clickable node should take
/// the match with the shortest text, which is the innermost one.
pub async fn find_by_text(
    page: &Page,
    selector: &str,
    text: &str,
) -> Result<Vec<(Element, String)>> {
    let mut matches = Vec::new();
    for element in page.find_elements(selector).await.unwrap_or_default() {
        if let Ok(Some(inner)) = element.inner_text().await {
            if inner.contains(text) {
                matches.push((element, inner.trim().to_string()));
            }
        }
    }
    Ok(matches)
}

/// Wait for a text match to appear and return the innermost matching element.
pub async fn wait_for_text(
    page: &Page,
    selector: &str,
    text: &str,
    timeout: Duration,
) -> Result<Element> {
    let start = std::time::Instant::now();
    loop {
        let matches = find_by_text(page, selector, text).await?;
        if let Some((element, _)) = matches.into_iter().min_by_key(|(_, t)| t.len()) {
            return Ok(element);
        }
        if start.elapsed() > timeout {
            anyhow::bail!("Timed out waiting for {selector:?} containing {text:?}");
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Watches a directory for one new, completed download.
///
/// Snapshot the directory before triggering the download, then wait: the
/// first file that wasn't there before and isn't a `.crdownload` temp file is
/// the download.
pub struct DownloadWatcher {
    dir: PathBuf,
    initial: std::collections::HashSet<PathBuf>,
}

impl DownloadWatcher {
    pub fn begin(dir: &Path) -> Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            initial: list_files(dir)?,
        })
    }

    pub async fn wait(&self, timeout: Duration) -> Result<PathBuf> {
        let start = std::time::Instant::now();
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            for file in list_files(&self.dir)? {
                if self.initial.contains(&file) {
                    continue;
                }
                let name = file.file_name().unwrap_or_default().to_string_lossy();
                if name.ends_with(".crdownload") {
                    continue;
                }
                return Ok(file);
            }

            if start.elapsed() > timeout {
                anyhow::bail!(
                    "Timed out waiting for a download in {}",
                    self.dir.display()
                );
            }
        }
    }
}

/// Wait until no partial downloads remain in the directory, or until `idle`
/// passes with partials still present.
pub async fn wait_for_settle(dir: &Path, idle: Duration) -> Result<()> {
    let start = std::time::Instant::now();
    loop {
        let has_partials = list_files(dir)?.iter().any(|f| {
            f.file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .ends_with(".crdownload")
        });
        if !has_partials {
            return Ok(());
        }
        if start.elapsed() > idle {
            anyhow::bail!("Partial downloads still present in {}", dir.display());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn list_files(dir: &Path) -> Result<std::collections::HashSet<PathBuf>> {
    Ok(std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read download dir: {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect())
}

/// Pick a destination that doesn't clobber an existing file: an `HHMMSS`
/// suffix is appended when the name is taken.
pub fn dedupe_path(dir: &Path, filename: &str, now: chrono::DateTime<chrono::Utc>) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    let ext = Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    let stamp = now.format("%H%M%S");
    dir.join(format!("{stem}_{stamp}.{ext}"))
}
