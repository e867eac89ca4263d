//! In-memory browser host

use std::sync::Mutex;

use tab_archive_lib::archive::BrowserHost;

/// Tabs are indices into `states`; screenshots are fake PNG bytes
pub struct MockBrowser {
    pub states: Mutex<Vec<String>>,
    pub selected: Option<usize>,
    pub favicons: Vec<(String, String)>,
    pub background_pref: bool,
}

impl MockBrowser {
    pub fn with_tabs(states: Vec<String>) -> Self {
        Self {
            states: Mutex::new(states),
            selected: Some(0),
            favicons: Vec::new(),
            background_pref: true,
        }
    }

    pub fn state(&self, tab: usize) -> String {
        self.states.lock().unwrap()[tab].clone()
    }

    pub fn tab_count(&self) -> usize {
        self.states.lock().unwrap().len()
    }
}

impl BrowserHost for MockBrowser {
    type Tab = usize;

    fn selected_tab(&self) -> Option<usize> {
        self.selected
    }

    fn tabs(&self) -> Vec<usize> {
        (0..self.tab_count()).collect()
    }

    fn session_state(&self, tab: &usize) -> anyhow::Result<String> {
        self.states
            .lock()
            .unwrap()
            .get(*tab)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no tab {}", tab))
    }

    fn set_session_state(&self, tab: &usize, state: &str) -> anyhow::Result<()> {
        let mut states = self.states.lock().unwrap();
        let slot = states
            .get_mut(*tab)
            .ok_or_else(|| anyhow::anyhow!("no tab {}", tab))?;
        *slot = state.to_string();
        Ok(())
    }

    fn capture(&self, tab: &usize, width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
        Ok(format!("\u{89}PNG tab{} {}x{}", tab, width, height).into_bytes())
    }

    fn resolve_favicon(&self, url: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .favicons
            .iter()
            .find(|(page, _)| page == url)
            .map(|(_, favicon)| favicon.clone()))
    }

    fn open_blank_tab(&self, _in_background: bool) -> anyhow::Result<usize> {
        let mut states = self.states.lock().unwrap();
        states.push(r#"{"entries":[]}"#.to_string());
        Ok(states.len() - 1)
    }

    fn load_in_background(&self) -> bool {
        self.background_pref
    }
}
