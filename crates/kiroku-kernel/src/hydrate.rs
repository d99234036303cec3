//! Bookmark hydration.
//!
//! Bookmarks that have a url but were never fetched get their title,
//! description, and images filled in by a [`BookmarkFetcher`]. Fetches run
//! concurrently (bounded) against one shared deadline; each result comes
//! back as an updater closure over an mpsc channel, and a single drain loop
//! applies the updaters to the state in arrival order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use kiroku_state::{DocumentState, StateError};
use kiroku_types::{BlockContent, BlockEvent, BlockUpdate, BookmarkState, BookmarkUpdate, ChangeContent};

use crate::config::HydrateConfig;

#[async_trait]
pub trait BookmarkFetcher: Send + Sync {
    /// Fetches metadata for `url`. The returned update should not set
    /// `state`; hydration marks the block done or failed itself.
    async fn fetch(&self, url: &str) -> Result<BookmarkUpdate, String>;
}

type Updater = Box<dyn FnOnce(&mut DocumentState) -> Result<(), StateError> + Send>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HydrateReport {
    pub fetched: usize,
    pub failed: usize,
}

/// Bookmarks in tree order that still need fetching.
fn pending_bookmarks(state: &DocumentState) -> Vec<(String, String)> {
    let mut pending = Vec::new();
    state.iterate(|block| {
        if let BlockContent::Bookmark(bookmark) = &block.content {
            if !bookmark.url.is_empty() && bookmark.state == BookmarkState::Empty {
                pending.push((block.id.clone(), bookmark.url.clone()));
            }
        }
        true
    });
    pending
}

fn bookmark_updater(block_id: String, update: BookmarkUpdate) -> Updater {
    Box::new(move |state: &mut DocumentState| {
        state.apply_change(&ChangeContent::BlockUpdate {
            events: vec![BlockEvent::new(block_id, BlockUpdate::Bookmark(update))],
        })
    })
}

/// Fetches every pending bookmark in `state` and applies the results to it.
/// The caller applies the state afterwards.
#[tracing::instrument(skip_all, name = "hydrate.bookmarks")]
pub async fn hydrate_bookmarks(
    state: &mut DocumentState,
    fetcher: Arc<dyn BookmarkFetcher>,
    config: &HydrateConfig,
) -> HydrateReport {
    let pending = pending_bookmarks(state);
    if pending.is_empty() {
        return HydrateReport::default();
    }
    debug!(bookmarks = pending.len(), "hydrating bookmarks");

    let deadline = Instant::now() + Duration::from_millis(config.timeout_ms);
    let concurrency = config.concurrency.max(1);
    let (tx, mut rx) = mpsc::unbounded_channel::<(bool, Updater)>();

    tokio::spawn(async move {
        futures::stream::iter(pending)
            .for_each_concurrent(concurrency, |(block_id, url)| {
                let fetcher = fetcher.clone();
                let tx = tx.clone();
                async move {
                    let fetched = tokio::time::timeout_at(deadline, fetcher.fetch(&url)).await;
                    let (ok, update) = match fetched {
                        Ok(Ok(update)) => (
                            true,
                            BookmarkUpdate {
                                state: Some(BookmarkState::Done),
                                ..update
                            },
                        ),
                        Ok(Err(reason)) => {
                            warn!(block = %block_id, url = %url, reason = %reason, "bookmark fetch failed");
                            (false, BookmarkUpdate { state: Some(BookmarkState::Error), ..Default::default() })
                        }
                        Err(_) => {
                            warn!(block = %block_id, url = %url, "bookmark fetch timed out");
                            (false, BookmarkUpdate { state: Some(BookmarkState::Error), ..Default::default() })
                        }
                    };
                    // The receiver only goes away if the caller was dropped.
                    let _ = tx.send((ok, bookmark_updater(block_id, update)));
                }
            })
            .await;
    });

    let mut report = HydrateReport::default();
    while let Some((ok, updater)) = rx.recv().await {
        if let Err(err) = updater(&mut *state) {
            warn!(error = %err, "bookmark update skipped");
            report.failed += 1;
            continue;
        }
        if ok {
            report.fetched += 1;
        } else {
            report.failed += 1;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiroku_types::{Block, BookmarkContent};

    struct FakeFetcher;

    #[async_trait]
    impl BookmarkFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<BookmarkUpdate, String> {
            match url {
                "https://slow.example" => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(BookmarkUpdate::default())
                }
                "https://broken.example" => Err("connection refused".into()),
                _ => Ok(BookmarkUpdate {
                    title: Some(format!("title of {url}")),
                    ..Default::default()
                }),
            }
        }
    }

    fn bookmark(id: &str, url: &str) -> Block {
        Block::new(
            id,
            BlockContent::Bookmark(BookmarkContent {
                url: url.into(),
                ..Default::default()
            }),
        )
    }

    fn bookmark_of(state: &DocumentState, id: &str) -> BookmarkContent {
        match &state.pick(id).unwrap().content {
            BlockContent::Bookmark(b) => b.clone(),
            other => panic!("not a bookmark: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_hydrate_fills_and_marks_blocks() {
        let mut state = DocumentState::with_blocks(
            "root",
            [
                Block::new("root", Default::default()).with_children(["ok", "bad", "slow", "empty"]),
                bookmark("ok", "https://ok.example"),
                bookmark("bad", "https://broken.example"),
                bookmark("slow", "https://slow.example"),
                bookmark("empty", ""),
            ],
        )
        .new_state();
        let config = HydrateConfig {
            concurrency: 2,
            timeout_ms: 200,
        };
        let report = hydrate_bookmarks(&mut state, Arc::new(FakeFetcher), &config).await;
        assert_eq!(report, HydrateReport { fetched: 1, failed: 2 });

        let ok = bookmark_of(&state, "ok");
        assert_eq!(ok.title, "title of https://ok.example");
        assert_eq!(ok.state, BookmarkState::Done);
        assert_eq!(bookmark_of(&state, "bad").state, BookmarkState::Error);
        assert_eq!(bookmark_of(&state, "slow").state, BookmarkState::Error);
        assert_eq!(bookmark_of(&state, "empty").state, BookmarkState::Empty);

        // Nothing is pending the second time round.
        let report = hydrate_bookmarks(&mut state, Arc::new(FakeFetcher), &config).await;
        assert_eq!(report, HydrateReport::default());
    }
}
