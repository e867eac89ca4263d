//! Tab capture and reopen workflow
//!
//! Defines the BrowserHost trait contract that the embedding browser
//! implements, inverting the dependency so the archive never touches host
//! internals. `TabCapturer` turns live tabs into archive saves and restores
//! archived session state into tabs.

use tracing::{debug, warn};

use super::service::{ArchiveService, TabCapture};
use super::session::{normalize_line_endings, strip_fragment};
use crate::config::CaptureSizes;
use crate::error::{ArchiveError, Result};

/// Collaborators provided by the embedding browser
///
/// Failures are reported as `anyhow::Error` since their types belong to the host.
pub trait BrowserHost {
    /// Host handle for one tab
    type Tab;

    /// The tab the user is looking at, if any
    fn selected_tab(&self) -> Option<Self::Tab>;

    /// Every tab in the current window, in tab-strip order
    fn tabs(&self) -> Vec<Self::Tab>;

    /// Serialized navigation state of a tab
    fn session_state(&self, tab: &Self::Tab) -> anyhow::Result<String>;

    /// Replace a tab's navigation state (navigates the tab)
    fn set_session_state(&self, tab: &Self::Tab, state: &str) -> anyhow::Result<()>;

    /// Screenshot of the tab scaled to fit `width` x `height`, aspect preserved
    fn capture(&self, tab: &Self::Tab, width: u32, height: u32) -> anyhow::Result<Vec<u8>>;

    /// Favicon of `url` as a data URI
    fn resolve_favicon(&self, url: &str) -> anyhow::Result<Option<String>>;

    /// Open an empty tab, selecting it unless `in_background`
    fn open_blank_tab(&self, in_background: bool) -> anyhow::Result<Self::Tab>;

    /// User preference: new tabs open without taking focus
    fn load_in_background(&self) -> bool {
        true
    }
}

/// Where `TabCapturer::open` restores a tab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenDisposition {
    /// Replace the selected tab
    Current,
    /// New tab, focus per the host preference
    Tab,
    /// New tab, focus opposite to the host preference
    TabShifted,
    /// New tab that takes focus
    TabForeground,
    /// New tab that does not take focus
    TabBackground,
}

impl std::str::FromStr for OpenDisposition {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "current" => Ok(Self::Current),
            "tab" => Ok(Self::Tab),
            "tabshifted" => Ok(Self::TabShifted),
            "tabforeground" => Ok(Self::TabForeground),
            "tabbackground" => Ok(Self::TabBackground),
            other => Err(format!("unknown open disposition: {}", other)),
        }
    }
}

/// Saves live tabs into the archive and reopens archived ones
pub struct TabCapturer<'a, H: BrowserHost> {
    service: &'a ArchiveService,
    host: &'a H,
    sizes: CaptureSizes,
}

impl<'a, H: BrowserHost> TabCapturer<'a, H> {
    pub fn new(service: &'a ArchiveService, host: &'a H, sizes: CaptureSizes) -> Self {
        Self {
            service,
            host,
            sizes,
        }
    }

    /// Archive one tab; returns whether a record for its URL already existed
    ///
    /// The key is the current entry's URL without its `#fragment`. Favicon
    /// lookup is best-effort and never fails the save.
    pub fn save_tab(&self, tab: &H::Tab, description: Option<&str>) -> Result<bool> {
        let state = self.host.session_state(tab).map_err(ArchiveError::Host)?;
        let current = self
            .service
            .codec()
            .current_url(&state)
            .ok_or_else(|| ArchiveError::Session("tab has no current entry".to_string()))?;
        let url = strip_fragment(&current);

        let (full_w, full_h) = self.sizes.full;
        let (thumb_w, thumb_h) = self.sizes.thumb;
        let full = self
            .host
            .capture(tab, full_w, full_h)
            .map_err(ArchiveError::Host)?;
        let thumb = self
            .host
            .capture(tab, thumb_w, thumb_h)
            .map_err(ArchiveError::Host)?;

        let mut capture = TabCapture::new(url, state, full).with_thumbnail(thumb);
        if let Some(description) = description {
            capture = capture.with_description(description);
        }
        match self.host.resolve_favicon(url) {
            Ok(Some(favicon)) => capture = capture.with_favicon(favicon),
            Ok(None) => {}
            Err(e) => warn!("Favicon lookup failed for {}: {:#}", url, e),
        }

        self.service.save(&capture)
    }

    /// Archive the selected tab; `None` when no tab is selected
    pub fn save_selected(&self, description: Option<&str>) -> Result<Option<bool>> {
        match self.host.selected_tab() {
            Some(tab) => self.save_tab(&tab, description).map(Some),
            None => Ok(None),
        }
    }

    /// Archive every tab in the window; returns how many were saved
    ///
    /// Tabs without a navigable entry (blank tabs) are skipped.
    pub fn save_all(&self) -> Result<usize> {
        let mut saved = 0;
        for tab in self.host.tabs() {
            match self.save_tab(&tab, None) {
                Ok(_) => saved += 1,
                Err(ArchiveError::Session(reason)) => {
                    debug!("Skipping tab: {}", reason);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(saved)
    }

    /// Restore the archived session state of `url` into `tab`
    pub fn open_in_tab(&self, url: &str, tab: &H::Tab) -> Result<()> {
        let session = self.archived_session(url)?;
        self.host
            .set_session_state(tab, &session)
            .map_err(ArchiveError::Host)
    }

    /// Restore `url` into the selected tab or a new one
    pub fn open(&self, url: &str, disposition: OpenDisposition) -> Result<()> {
        // Fail before opening a tab for an unknown URL
        let session = self.archived_session(url)?;

        let background = self.host.load_in_background();
        let tab = match disposition {
            OpenDisposition::Current => self.host.selected_tab().ok_or_else(|| {
                ArchiveError::Host(anyhow::anyhow!("no selected tab to open {} in", url))
            })?,
            OpenDisposition::Tab => self.open_blank(background)?,
            OpenDisposition::TabShifted => self.open_blank(!background)?,
            OpenDisposition::TabForeground => self.open_blank(false)?,
            OpenDisposition::TabBackground => self.open_blank(true)?,
        };

        self.host
            .set_session_state(&tab, &session)
            .map_err(ArchiveError::Host)
    }

    fn open_blank(&self, in_background: bool) -> Result<H::Tab> {
        self.host
            .open_blank_tab(in_background)
            .map_err(ArchiveError::Host)
    }

    fn archived_session(&self, url: &str) -> Result<String> {
        match self.service.get_for_url(url)? {
            Some(record) if !record.is_deleted() => Ok(normalize_line_endings(&record.session)),
            _ => Err(ArchiveError::NotFound(url.to_string())),
        }
    }
}
