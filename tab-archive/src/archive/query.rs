//! Lazy record sequence returned by `get` / `get_recent`

use std::collections::VecDeque;

use super::models::ArchivedTab;
use super::service::ArchiveService;
use crate::error::Result;

/// Finite, forward-only sequence of resolved records
///
/// The URL list is fixed when the sequence is created; each record is
/// resolved only when reached. Records removed in the meantime are skipped.
/// To start over, ask the service for a new sequence.
pub struct ArchivedTabs<'a> {
    service: &'a ArchiveService,
    urls: VecDeque<String>,
}

impl<'a> ArchivedTabs<'a> {
    pub(crate) fn new(service: &'a ArchiveService, urls: Vec<String>) -> Self {
        Self {
            service,
            urls: urls.into(),
        }
    }

    /// URLs not yet visited
    pub fn remaining(&self) -> usize {
        self.urls.len()
    }
}

impl Iterator for ArchivedTabs<'_> {
    type Item = Result<ArchivedTab>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(url) = self.urls.pop_front() {
            match self.service.retrieve(&url) {
                Ok(Some(tab)) => return Some(Ok(tab)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.urls.len()))
    }
}
