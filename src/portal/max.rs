//! Max (max.co.il) portal driver.
//!
//! A linear walk through the portal's UI: login form, the charges screen
//! with its month picker, then the statement-letters screen. Every selector
//! here is pinned to the portal's current markup and will drift when the
//! site changes; failures name the selector so drift is quick to spot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use secrecy::ExposeSecret;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::FetchConfig;
use crate::credentials::{PortalCredentials, SessionCache, SessionData, SESSION_MAX_AGE};
use crate::models::{BillingMonth, StatementFile};

use super::browser::{
    dedupe_path, launch_browser, setup_download_handling, wait_for_selector, wait_for_settle,
    wait_for_text, DownloadWatcher,
};

const PORTAL_URL: &str = "https://www.max.co.il/";
const SESSION_KEY: &str = "max";

// Login flow markers.
const PERSONAL_AREA_TEXT: &str = "כניסה לאיזור האישי";
const PRIVATE_CUSTOMERS_TEXT: &str = "לקוחות פרטיים";
const PASSWORD_TAB_SELECTOR: &str = "a#login-password-link";
const USERNAME_SELECTOR: &str = "input#user-name";
const PASSWORD_SELECTOR: &str = "input#password";
const LOGIN_SUBMIT_TEXT: &str = "לכניסה לאזור האישי";
const LOGGED_IN_MARKER: &str = "li.all-actions";

// Charges / statements navigation.
const ACTIONS_MENU_SELECTOR: &str = "li.all-actions > a";
const ACTIONS_MENU_TEXT: &str = "פעולות";
const CHARGES_SCREEN_TEXT: &str = "פירוט החיובים והעסקאות";
const LETTERS_SCREEN_TEXT: &str = "דפי הפירוט והמכתבים";
const MONTH_COMBO_SELECTOR: &str = "div.combo-text.dates";
const MONTH_ITEM_SELECTOR: &str = "li.month";
const SELECTED_MONTH_CLASS: &str = "selected-month";
const EXPORT_BUTTON_SELECTOR: &str = "div.print-excel span.download-excel";
const DOCUMENT_LINK_TEXT: &str = "להורדה";

const SELECTOR_TIMEOUT: Duration = Duration::from_secs(5);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(7);

/// A live, logged-in portal session.
pub struct MaxPortal {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
    download_dir: PathBuf,
    session_cache: SessionCache,
    options: FetchConfig,
}

impl MaxPortal {
    /// Launch a browser against the portal, replaying cached cookies when
    /// they are fresh enough to be worth trying.
    pub async fn launch(
        download_dir: &Path,
        profile_dir: &Path,
        session_cache: SessionCache,
        options: FetchConfig,
        clock: &dyn Clock,
    ) -> Result<Self> {
        let (browser, mut handler) = launch_browser(profile_dir, options.headless).await?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = browser.new_page("about:blank").await?;
        setup_download_handling(&page, download_dir).await?;

        info!(url = PORTAL_URL, "Opening portal");
        page.goto(PORTAL_URL).await?;

        let portal = Self {
            browser,
            handler_task,
            page,
            download_dir: download_dir.to_path_buf(),
            session_cache,
            options,
        };

        if let Some(session) = portal.session_cache.get(SESSION_KEY)? {
            if session.is_expired(clock.now(), SESSION_MAX_AGE) {
                debug!("Cached portal session is stale, ignoring");
            } else if !session.cookies.is_empty() {
                debug!(cookies = session.cookies.len(), "Replaying cached session");
                portal.apply_cookies(&session).await.ok();
                portal.page.goto(PORTAL_URL).await.ok();
            }
        }

        Ok(portal)
    }

    /// Walk the login menus and submit the password form.
    pub async fn login(&self, credentials: &PortalCredentials) -> Result<()> {
        let page = &self.page;

        wait_for_text(page, "span", PERSONAL_AREA_TEXT, SELECTOR_TIMEOUT)
            .await?
            .click()
            .await
            .context("Failed to open the personal-area menu")?;

        wait_for_text(page, "span", PRIVATE_CUSTOMERS_TEXT, SELECTOR_TIMEOUT)
            .await?
            .click()
            .await
            .context("Failed to pick the private-customers entry")?;

        wait_for_selector(page, PASSWORD_TAB_SELECTOR, SELECTOR_TIMEOUT)
            .await?
            .click()
            .await
            .context("Failed to switch to the password login tab")?;

        info!("Logging in");
        let username_input = wait_for_selector(page, USERNAME_SELECTOR, SELECTOR_TIMEOUT).await?;
        username_input.click().await?;
        username_input.type_str(&credentials.username).await?;

        let password_input = wait_for_selector(page, PASSWORD_SELECTOR, SELECTOR_TIMEOUT).await?;
        password_input.click().await?;
        password_input
            .type_str(credentials.password.expose_secret())
            .await?;
        debug!("Filled in login form");

        wait_for_text(page, "*", LOGIN_SUBMIT_TEXT, SELECTOR_TIMEOUT)
            .await?
            .click()
            .await
            .context("Failed to submit the login form")?;

        wait_for_selector(page, LOGGED_IN_MARKER, LOGIN_TIMEOUT)
            .await
            .context("Login did not complete (post-login marker never appeared)")?;
        info!("Logged in");

        // Unexpected marketing popups are left for the user to dismiss.

        Ok(())
    }

    /// Download the spreadsheet for every configured month offset, then the
    /// statement document for every non-future offset.
    pub async fn download_statements(&self, clock: &dyn Clock) -> Result<Vec<StatementFile>> {
        let mut files = Vec::new();

        self.download_spreadsheets(clock, &mut files).await?;
        self.download_documents(clock, &mut files).await?;

        if let Err(e) = wait_for_settle(&self.download_dir, self.options.download_idle).await {
            warn!(error = %e, "Leaving partial downloads behind");
        }
        Ok(files)
    }

    async fn download_spreadsheets(
        &self,
        clock: &dyn Clock,
        files: &mut Vec<StatementFile>,
    ) -> Result<()> {
        self.open_actions_screen(CHARGES_SCREEN_TEXT).await?;

        let combo = wait_for_selector(&self.page, MONTH_COMBO_SELECTOR, SELECTOR_TIMEOUT).await?;
        if let Ok(Some(current)) = combo.inner_text().await {
            info!(month = %current.trim(), "Charges screen open");
        }

        let selected_idx = self
            .selected_month_index()
            .await
            .context("Could not locate the selected month in the picker")?;

        // The portal serves a partial export when the current month is
        // requested first, so offsets run in ascending order and offset 0
        // lands last.
        let mut offsets = self.options.month_offsets.clone();
        offsets.sort();

        for offset in offsets {
            match self
                .download_spreadsheet_for_offset(clock, selected_idx, offset)
                .await
            {
                Ok(file) => files.push(file),
                Err(e) => {
                    warn!(offset, error = %e, "Spreadsheet download failed, continuing");
                }
            }
        }

        Ok(())
    }

    async fn download_spreadsheet_for_offset(
        &self,
        clock: &dyn Clock,
        selected_idx: usize,
        offset: i32,
    ) -> Result<StatementFile> {
        let label = self.pick_month(selected_idx, offset).await?;
        let month = BillingMonth::from_portal_label(&label)
            .with_context(|| format!("Unrecognized month label: {label:?}"))?;

        let mut filename = format!("transactions_{}.xlsx", month.label());
        if offset > 0 {
            filename = format!("transactions_{}_future.xlsx", month.label());
        }

        let export = wait_for_selector(&self.page, EXPORT_BUTTON_SELECTOR, SELECTOR_TIMEOUT)
            .await
            .context("Spreadsheet export button not found")?;

        info!(%month, file = %filename, "Starting spreadsheet download");
        let watcher = DownloadWatcher::begin(&self.download_dir)?;
        export.click().await?;

        let downloaded = watcher.wait(self.options.download_timeout).await?;
        let target = dedupe_path(&self.download_dir, &filename, clock.now());
        std::fs::rename(&downloaded, &target).with_context(|| {
            format!(
                "Failed to move download into place: {} -> {}",
                downloaded.display(),
                target.display()
            )
        })?;
        info!(path = %target.display(), "Spreadsheet downloaded");

        StatementFile::from_path(target).context("Downloaded file has an unexpected name")
    }

    async fn download_documents(
        &self,
        clock: &dyn Clock,
        files: &mut Vec<StatementFile>,
    ) -> Result<()> {
        self.open_actions_screen(LETTERS_SCREEN_TEXT).await?;

        let selected_idx = self
            .selected_month_index()
            .await
            .context("Could not locate the selected month on the letters screen")?;

        for &offset in &self.options.month_offsets {
            // Statement letters only exist for closed months.
            if offset > 0 {
                continue;
            }
            match self
                .download_document_for_offset(clock, selected_idx, offset)
                .await
            {
                Ok(file) => files.push(file),
                Err(e) => {
                    warn!(offset, error = %e, "Document download failed, continuing");
                }
            }
        }

        Ok(())
    }

    async fn download_document_for_offset(
        &self,
        clock: &dyn Clock,
        selected_idx: usize,
        offset: i32,
    ) -> Result<StatementFile> {
        let label = self.pick_month(selected_idx, offset).await?;
        let month = BillingMonth::from_portal_label(&label)
            .with_context(|| format!("Unrecognized month label: {label:?}"))?;

        // The download link only renders once the month's row is hovered.
        let row = wait_for_text(&self.page, "*", label.trim(), SELECTOR_TIMEOUT).await?;
        row.hover().await.context("Failed to hover the month row")?;
        debug!(%month, "Hovered month row");

        let link = wait_for_text(&self.page, "a", DOCUMENT_LINK_TEXT, SELECTOR_TIMEOUT)
            .await
            .context("Document download link not found")?;

        let filename = format!("{}.pdf", month.label());
        info!(%month, file = %filename, "Starting document download");

        let watcher = DownloadWatcher::begin(&self.download_dir)?;
        link.click().await?;

        let downloaded = watcher.wait(self.options.download_timeout).await?;
        let target = dedupe_path(&self.download_dir, &filename, clock.now());
        std::fs::rename(&downloaded, &target).with_context(|| {
            format!(
                "Failed to move download into place: {} -> {}",
                downloaded.display(),
                target.display()
            )
        })?;
        info!(path = %target.display(), "Document downloaded");

        StatementFile::from_path(target).context("Downloaded file has an unexpected name")
    }

    /// Open the actions menu and pick a screen by its menu text.
    ///
    /// The menu text appears twice in the DOM (desktop and mobile nav); the
    /// second occurrence is the visible one when both exist.
    async fn open_actions_screen(&self, screen_text: &str) -> Result<()> {
        wait_for_text(
            &self.page,
            ACTIONS_MENU_SELECTOR,
            ACTIONS_MENU_TEXT,
            SELECTOR_TIMEOUT,
        )
        .await?
        .click()
        .await
        .context("Failed to open the actions menu")?;
        debug!(menu = ACTIONS_MENU_TEXT, "Opened actions menu");

        let links = super::browser::find_by_text(&self.page, "a", screen_text).await?;
        let (link, _) = if links.len() >= 2 {
            &links[1]
        } else {
            links
                .first()
                .with_context(|| format!("Menu entry not found: {screen_text}"))?
        };
        link.click()
            .await
            .with_context(|| format!("Failed to open screen: {screen_text}"))?;
        debug!(screen = screen_text, "Opened screen");

        Ok(())
    }

    /// Find the index of the currently selected month in the picker, closing
    /// the picker again before returning.
    async fn selected_month_index(&self) -> Result<usize> {
        wait_for_selector(&self.page, MONTH_COMBO_SELECTOR, SELECTOR_TIMEOUT)
            .await?
            .click()
            .await
            .context("Failed to open the month picker")?;

        let items = self.page.find_elements(MONTH_ITEM_SELECTOR).await?;
        for (i, item) in items.iter().enumerate() {
            let class = item.attribute("class").await.ok().flatten().unwrap_or_default();
            if class.contains(SELECTED_MONTH_CLASS) {
                debug!(index = i, "Selected month located");
                // Click the selected month to close the picker.
                item.click().await?;
                return Ok(i);
            }
        }

        anyhow::bail!("No month item carries the {SELECTED_MONTH_CLASS:?} class")
    }

    /// Open the month picker and click the item `offset` away from the
    /// originally selected month. Returns the clicked item's label.
    async fn pick_month(&self, selected_idx: usize, offset: i32) -> Result<String> {
        wait_for_selector(&self.page, MONTH_COMBO_SELECTOR, SELECTOR_TIMEOUT)
            .await?
            .click()
            .await
            .context("Failed to open the month picker")?;

        let items = self.page.find_elements(MONTH_ITEM_SELECTOR).await?;
        let target_idx = selected_idx as i64 + offset as i64;
        if target_idx < 0 || target_idx as usize >= items.len() {
            anyhow::bail!(
                "Month offset {offset} is out of range ({} items, selected {selected_idx})",
                items.len()
            );
        }

        let target = &items[target_idx as usize];
        let label = target
            .inner_text()
            .await?
            .unwrap_or_default()
            .trim()
            .to_string();
        target.click().await?;
        info!(index = target_idx, label = %label, "Picked month");

        Ok(label)
    }

    async fn apply_cookies(&self, session: &SessionData) -> Result<()> {
        let mut cookies = Vec::new();
        for (name, value) in &session.cookies {
            let mut cookie = CookieParam::new(name.clone(), value.clone());
            cookie.url = Some(PORTAL_URL.to_string());
            cookies.push(cookie);
        }

        if !cookies.is_empty() {
            self.page.set_cookies(cookies).await?;
        }

        Ok(())
    }

    /// Capture the session cookies for the next run.
    pub async fn save_session(&self, clock: &dyn Clock) -> Result<()> {
        let cookies = self.page.get_cookies().await?;

        let mut cookie_map = HashMap::new();
        for cookie in cookies {
            cookie_map.insert(cookie.name.clone(), cookie.value.clone());
        }

        let session = SessionData {
            cookies: cookie_map,
            captured_at: Some(clock.now()),
        };
        self.session_cache.set(SESSION_KEY, &session)?;
        debug!(cookies = session.cookies.len(), "Session saved");

        Ok(())
    }

    /// Close the browser.
    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await.ok();
        self.handler_task.abort();
        Ok(())
    }
}
