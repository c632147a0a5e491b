//! Flattened, index-aware iteration over a paginated board source.
//!
//! The stream yields `(absolute_index, item)` pairs and hides two pieces of
//! pagination plumbing from the orchestrator: resuming at a saved offset,
//! and recovering when the remote invalidates the pagination cursor
//! mid-run. Recovery restarts from the first page and fast-forwards back
//! to the next unread index; the skipped-over pages are fetched without
//! the asset sub-query since their items will not be processed.

use super::{BoardSource, Item, Page};
use crate::error::{MigrateError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Absolute-indexed item stream over a [`BoardSource`].
pub struct ItemStream {
    source: Arc<dyn BoardSource>,
    /// Upper bound on items per fetched page, from the source config.
    /// Governs when a fast-forward page can drop the asset sub-query.
    page_size: usize,
    /// Cursor for the next page fetch. Meaningless once `exhausted`.
    cursor: Option<String>,
    /// Buffered items from the current page, in board order.
    buffer: std::vec::IntoIter<Item>,
    /// Absolute index of the next item to yield.
    next_index: usize,
    /// Indices below this are skipped without being yielded.
    skip_until: usize,
    /// Whether the first page has been fetched yet.
    started: bool,
    /// Set when a page comes back with no continuation cursor.
    exhausted: bool,
    /// Remaining expiry recoveries before giving up.
    recoveries_left: usize,
}

/// Cursor-expiry recoveries allowed per stream before the error propagates.
const MAX_RECOVERIES: usize = 3;

impl ItemStream {
    /// Stream starting at absolute index 0. `page_size` must match the
    /// limit the source puts on its pages.
    pub fn new(source: Arc<dyn BoardSource>, page_size: usize) -> Self {
        Self::starting_at(source, 0, page_size)
    }

    /// Stream that fast-forwards to `offset` before yielding anything.
    pub fn starting_at(source: Arc<dyn BoardSource>, offset: usize, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            cursor: None,
            buffer: Vec::new().into_iter(),
            next_index: 0,
            skip_until: offset,
            started: false,
            exhausted: false,
            recoveries_left: MAX_RECOVERIES,
        }
    }

    /// Next `(absolute_index, item)` pair, or `None` when the board is
    /// exhausted. Items below the starting offset are consumed silently.
    pub async fn next(&mut self) -> Result<Option<(usize, Item)>> {
        loop {
            if let Some(item) = self.buffer.next() {
                let index = self.next_index;
                self.next_index += 1;
                if index < self.skip_until {
                    continue;
                }
                return Ok(Some((index, item)));
            }

            if self.exhausted {
                return Ok(None);
            }

            self.fetch_next_page().await?;
        }
    }

    async fn fetch_next_page(&mut self) -> Result<()> {
        // Pages entirely below the offset are only walked for their cursor,
        // so the asset sub-query can be dropped from them.
        let include_assets = self.page_may_yield();

        let cursor = if self.started {
            self.cursor.as_deref()
        } else {
            None
        };

        match self.source.fetch_page(cursor, include_assets).await {
            Ok(page) => {
                self.started = true;
                self.install_page(page);
                Ok(())
            }
            Err(MigrateError::CursorExpired) if self.started => self.recover().await,
            Err(e) => Err(e),
        }
    }

    /// Whether the upcoming page could contain an index at or past the
    /// starting offset. Conservative: page length is unknown until fetched,
    /// so this prunes only when even a full page would fall entirely below
    /// the offset.
    fn page_may_yield(&self) -> bool {
        self.next_index >= self.skip_until
            || self.skip_until - self.next_index < self.page_size
    }

    fn install_page(&mut self, page: Page) {
        debug!(
            items = page.items.len(),
            has_cursor = page.cursor.is_some(),
            "Fetched board page"
        );
        self.exhausted = page.cursor.is_none();
        self.cursor = page.cursor;
        self.buffer = page.items.into_iter();
    }

    /// Restart pagination from the first page and fast-forward back to
    /// `next_index`. Every pass through here consumes one recovery.
    async fn recover(&mut self) -> Result<()> {
        if self.recoveries_left == 0 {
            warn!("Pagination cursor expired and recovery budget is spent");
            return Err(MigrateError::CursorExpired);
        }
        self.recoveries_left -= 1;

        let resume_at = self.next_index.max(self.skip_until);
        info!(
            resume_at,
            "Pagination cursor expired; restarting from the first page"
        );

        self.cursor = None;
        self.buffer = Vec::new().into_iter();
        self.next_index = 0;
        self.skip_until = resume_at;
        self.started = false;
        self.exhausted = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Asset;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted source: serves fixed pages keyed by cursor and records
    /// every fetch. Optionally fails the nth fetch with cursor expiry, and
    /// optionally honors `include_assets` the way the real API does.
    struct ScriptedSource {
        pages: Vec<Vec<&'static str>>,
        calls: Mutex<Vec<(Option<String>, bool)>>,
        expire_on_call: Option<usize>,
        honor_include_assets: bool,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Vec<&'static str>>) -> Self {
            Self {
                pages,
                calls: Mutex::new(Vec::new()),
                expire_on_call: None,
                honor_include_assets: false,
            }
        }

        fn expiring_on(mut self, call: usize) -> Self {
            self.expire_on_call = Some(call);
            self
        }

        fn honoring_include_assets(mut self) -> Self {
            self.honor_include_assets = true;
            self
        }

        fn page_index(&self, cursor: Option<&str>) -> usize {
            match cursor {
                None => 0,
                Some(c) => c.strip_prefix("c").unwrap().parse::<usize>().unwrap(),
            }
        }
    }

    #[async_trait]
    impl BoardSource for ScriptedSource {
        async fn fetch_page(&self, cursor: Option<&str>, include_assets: bool) -> Result<Page> {
            let call_number = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((cursor.map(String::from), include_assets));
                calls.len()
            };
            if self.expire_on_call == Some(call_number) {
                return Err(MigrateError::CursorExpired);
            }

            let with_assets = include_assets || !self.honor_include_assets;
            let index = self.page_index(cursor);
            let items = self.pages[index]
                .iter()
                .map(|name| Item {
                    id: format!("id-{}", name),
                    name: name.to_string(),
                    assets: if with_assets {
                        vec![Asset {
                            id: "a".into(),
                            name: format!("{}.png", name),
                            public_url: Some("https://u".into()),
                            file_extension: Some(".png".into()),
                            file_size: None,
                        }]
                    } else {
                        Vec::new()
                    },
                })
                .collect();
            let cursor = if index + 1 < self.pages.len() {
                Some(format!("c{}", index + 1))
            } else {
                None
            };
            Ok(Page { items, cursor })
        }
    }

    async fn collect(stream: &mut ItemStream) -> Vec<(usize, String)> {
        let mut out = Vec::new();
        while let Some((index, item)) = stream.next().await.unwrap() {
            out.push((index, item.name));
        }
        out
    }

    #[tokio::test]
    async fn test_yields_all_items_with_absolute_indices() {
        let source = Arc::new(ScriptedSource::new(vec![
            vec!["a", "b"],
            vec!["c"],
            vec!["d", "e"],
        ]));
        let mut stream = ItemStream::new(source, 25);
        let got = collect(&mut stream).await;
        assert_eq!(
            got,
            vec![
                (0, "a".into()),
                (1, "b".into()),
                (2, "c".into()),
                (3, "d".into()),
                (4, "e".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_board() {
        let source = Arc::new(ScriptedSource::new(vec![vec![]]));
        let mut stream = ItemStream::new(source, 25);
        assert!(collect(&mut stream).await.is_empty());
    }

    #[tokio::test]
    async fn test_starting_offset_skips_earlier_items() {
        let source = Arc::new(ScriptedSource::new(vec![vec!["a", "b"], vec!["c", "d"]]));
        let mut stream = ItemStream::starting_at(source, 3, 25);
        let got = collect(&mut stream).await;
        assert_eq!(got, vec![(3, "d".into())]);
    }

    #[tokio::test]
    async fn test_fast_forward_pages_skip_asset_query() {
        // Offset 60 with 25-item pages: the first two pages can be fetched
        // without assets, the third cannot be pruned.
        let pages: Vec<Vec<&'static str>> = vec![
            vec!["x"; 25],
            vec!["y"; 25],
            vec!["z"; 25],
        ];
        let source = Arc::new(ScriptedSource::new(pages));
        let mut stream = ItemStream::starting_at(source.clone(), 60, 25);
        let got = collect(&mut stream).await;
        assert_eq!(got.len(), 15);
        assert_eq!(got[0].0, 60);

        let calls = source.calls.lock().unwrap();
        assert_eq!(calls[0], (None, false));
        assert_eq!(calls[1], (Some("c1".into()), false));
        assert_eq!(calls[2], (Some("c2".into()), true));
    }

    #[tokio::test]
    async fn test_wide_page_straddling_offset_keeps_assets() {
        // A single 30-item page straddles a resume offset of 26. The page
        // cannot be pruned, so the yielded tail must carry its assets.
        let pages: Vec<Vec<&'static str>> = vec![vec!["w"; 30]];
        let source = Arc::new(ScriptedSource::new(pages).honoring_include_assets());
        let mut stream = ItemStream::starting_at(source.clone(), 26, 30);

        let mut yielded = Vec::new();
        while let Some((index, item)) = stream.next().await.unwrap() {
            assert_eq!(item.assets.len(), 1, "item {} lost its assets", index);
            yielded.push(index);
        }
        assert_eq!(yielded, vec![26, 27, 28, 29]);

        let calls = source.calls.lock().unwrap();
        assert_eq!(calls[0], (None, true));
    }

    #[tokio::test]
    async fn test_cursor_expiry_recovers_and_resumes() {
        let source = Arc::new(
            ScriptedSource::new(vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]])
                // Call 1 fetches page 0; call 2 (page 1) expires.
                .expiring_on(2),
        );
        let mut stream = ItemStream::new(source.clone(), 25);
        let got = collect(&mut stream).await;
        assert_eq!(
            got,
            vec![
                (0, "a".into()),
                (1, "b".into()),
                (2, "c".into()),
                (3, "d".into()),
                (4, "e".into()),
            ]
        );

        // Recovery restarted from the first page with no cursor.
        let calls = source.calls.lock().unwrap();
        assert_eq!(calls[2].0, None);
    }

    #[tokio::test]
    async fn test_expiry_on_first_page_propagates() {
        let source = Arc::new(ScriptedSource::new(vec![vec!["a"]]).expiring_on(1));
        let mut stream = ItemStream::new(source, 25);
        let result = stream.next().await;
        assert!(matches!(result, Err(MigrateError::CursorExpired)));
    }
}
