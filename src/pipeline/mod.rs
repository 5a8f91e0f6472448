//! Two-stage bounded pipeline: playlist fetchers feeding stream probers.
//!
//! The orchestrator is the sole submitter and drainer. URLs are submitted
//! in chunks of twice the fetcher pool; completed fetches are consumed in
//! completion order, and each playlist's filtered candidates go to the
//! prober pool as one wave that must drain before the playlist is recorded
//! complete. That keeps in-flight probe work bounded to roughly one
//! playlist beyond prober capacity and gives the checkpointer a clean
//! commit point per playlist.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checkpoint::{Checkpointer, WorkingAccumulator};
use crate::config::Config;
use crate::filters::ContentFilter;
use crate::ingestor::PlaylistFetcher;
use crate::models::{PlaylistRecord, StreamRef, StreamResult, WorkingStream};
use crate::organizer::StreamOrganizer;
use crate::probe::{ProbeBackend, StreamProber};
use crate::progress::ProgressStore;

pub mod stats;

pub use stats::{PipelineStats, StatsTracker};

pub struct Pipeline {
    reprocess_playlists: bool,
    chunk_size: usize,
    fetcher: Arc<PlaylistFetcher>,
    prober: Arc<StreamProber>,
    filter: Arc<ContentFilter>,
    store: ProgressStore,
    working: WorkingAccumulator,
    stats: StatsTracker,
    checkpointer: Checkpointer,
    fetch_slots: Arc<Semaphore>,
    probe_slots: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        client: reqwest::Client,
        backend: Arc<dyn ProbeBackend>,
        store: ProgressStore,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let working: WorkingAccumulator = Arc::new(Mutex::new(Vec::new()));
        let checkpointer = Checkpointer::new(
            store.clone(),
            Arc::clone(&working),
            StreamOrganizer::new()?,
            config.paths.clone(),
        );
        let prober = StreamProber::new(
            backend,
            store.clone(),
            config.timing.stream_timeout,
            config.timing.extended_timeout(),
        );

        Ok(Self {
            reprocess_playlists: config.reprocess.playlists,
            chunk_size: config.workers.chunk_size(),
            fetcher: Arc::new(PlaylistFetcher::new(
                client,
                config.timing.playlist_timeout,
            )),
            prober: Arc::new(prober),
            filter: Arc::new(ContentFilter::new(&config.filters)?),
            store,
            working,
            stats: StatsTracker::new(),
            checkpointer,
            fetch_slots: Arc::new(Semaphore::new(config.workers.playlist.max(1))),
            probe_slots: Arc::new(Semaphore::new(config.workers.stream.max(1))),
            cancel,
        })
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    /// Seed the accumulator with working streams memoized by earlier runs,
    /// so the re-materialized output always covers the full set.
    pub async fn seed_working_streams(&self, streams: Vec<WorkingStream>) {
        let mut working = self.working.lock().await;
        working.extend(streams);
    }

    /// Working streams accumulated so far, memoized seeds included.
    pub async fn working_stream_count(&self) -> usize {
        self.working.lock().await.len()
    }

    /// Process the URL list to completion or cancellation. Returns the
    /// final counters.
    pub async fn run(&self, urls: &[String]) -> PipelineStats {
        let pending = self.pending_urls(urls).await;
        let skipped = urls.len() - pending.len();
        if skipped > 0 {
            info!("Skipping {} already processed playlists", skipped);
        }
        info!("{} playlists to process", pending.len());
        self.stats
            .update(|s| s.total_playlists = pending.len())
            .await;

        for chunk in pending.chunks(self.chunk_size.max(1)) {
            if self.cancel.is_cancelled() {
                break;
            }
            self.run_chunk(chunk).await;
        }

        self.stats.snapshot().await
    }

    async fn pending_urls(&self, urls: &[String]) -> Vec<String> {
        if self.reprocess_playlists {
            return urls.to_vec();
        }
        let mut pending = Vec::new();
        for url in urls {
            if !self.store.has_playlist(url).await {
                pending.push(url.clone());
            }
        }
        pending
    }

    /// Submit one chunk of fetches and consume them in completion order.
    /// The next chunk is not submitted until every fetch here is consumed.
    async fn run_chunk(&self, chunk: &[String]) {
        let mut fetches: JoinSet<(String, Vec<StreamRef>, Duration)> = JoinSet::new();
        let mut submitted: HashMap<tokio::task::Id, String> = HashMap::new();

        for url in chunk {
            let fetcher = Arc::clone(&self.fetcher);
            let slots = Arc::clone(&self.fetch_slots);
            let task_url = url.clone();
            let handle = fetches.spawn(async move {
                let _permit = match slots.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (task_url, Vec::new(), Duration::ZERO),
                };
                let (streams, elapsed) = fetcher.fetch(&task_url).await;
                (task_url, streams, elapsed)
            });
            submitted.insert(handle.id(), url.clone());
        }

        while let Some(joined) = fetches.join_next_with_id().await {
            if self.cancel.is_cancelled() {
                fetches.abort_all();
                break;
            }
            match joined {
                Ok((id, (url, streams, elapsed))) => {
                    submitted.remove(&id);
                    self.handle_fetched(&url, streams, elapsed).await;
                }
                Err(join_error) => {
                    // The fetch task itself died. Record the playlist so it
                    // is not endlessly retried on resume.
                    if let Some(url) = submitted.remove(&join_error.id()) {
                        warn!("Fetch task failed for {}: {}", url, join_error);
                        self.store
                            .put_playlist(
                                url,
                                PlaylistRecord::errored(&join_error.to_string()),
                            )
                            .await;
                        self.stats.update(|s| s.invalid_playlists += 1).await;
                        self.finish_playlist().await;
                    }
                }
            }
        }
    }

    async fn handle_fetched(&self, url: &str, streams: Vec<StreamRef>, elapsed: Duration) {
        self.stats
            .update(|s| s.current_playlist = url.to_string())
            .await;

        let found = streams.len();
        let mut kept = Vec::new();
        let mut filtered_out = 0usize;
        for stream in streams {
            if self
                .filter
                .should_filter(&stream.info.channel_name, &stream.info.group_title)
            {
                filtered_out += 1;
            } else {
                kept.push(stream);
            }
        }

        self.stats
            .update(|s| {
                s.total_streams += found;
                s.filtered += filtered_out;
                if found > 0 {
                    s.valid_playlists += 1;
                } else {
                    s.invalid_playlists += 1;
                }
            })
            .await;

        if found == 0 {
            debug!(
                "Empty or timeout ({:.1}s): {}",
                elapsed.as_secs_f64(),
                url
            );
            self.store
                .put_playlist(url.to_string(), PlaylistRecord::invalid("empty_or_timeout"))
                .await;
            self.finish_playlist().await;
            return;
        }

        if kept.is_empty() {
            info!("All {} streams filtered out: {}", found, url);
            self.store
                .put_playlist(url.to_string(), PlaylistRecord::all_filtered(found))
                .await;
            self.finish_playlist().await;
            return;
        }

        info!(
            "Found {} streams (filtered {}/{}) in {:.1}s: {}",
            kept.len(),
            filtered_out,
            found,
            elapsed.as_secs_f64(),
            url
        );

        let checked = kept.len();
        let wave_working = self.drain_wave(kept).await;
        if self.cancel.is_cancelled() {
            // The wave was abandoned; leave the playlist unrecorded so a
            // rerun picks it up again.
            return;
        }

        self.store
            .put_playlist(
                url.to_string(),
                PlaylistRecord::completed(url, found, filtered_out, checked, wave_working),
            )
            .await;
        info!("Playlist complete - {} working: {}", wave_working, url);
        self.finish_playlist().await;
    }

    /// Submit one playlist's candidates to the prober pool and wait for the
    /// whole wave to drain. Returns how many came back working.
    async fn drain_wave(&self, streams: Vec<StreamRef>) -> usize {
        let mut wave: JoinSet<Option<StreamResult>> = JoinSet::new();

        for stream in streams {
            let prober = Arc::clone(&self.prober);
            let slots = Arc::clone(&self.probe_slots);
            let stats = self.stats.clone();
            let working = Arc::clone(&self.working);
            wave.spawn(async move {
                let _permit = match slots.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return None,
                };
                stats
                    .update(|s| s.current_stream = stream.info.channel_name.clone())
                    .await;

                let result = prober.probe(&stream).await;
                match &result {
                    StreamResult::Working(w) => {
                        working.lock().await.push(w.clone());
                        stats
                            .update(|s| {
                                s.checked += 1;
                                s.working += 1;
                            })
                            .await;
                    }
                    StreamResult::Failed(_) => {
                        stats
                            .update(|s| {
                                s.checked += 1;
                                s.failed += 1;
                            })
                            .await;
                    }
                }
                Some(result)
            });
        }

        let mut wave_working = 0usize;
        while let Some(joined) = wave.join_next().await {
            if self.cancel.is_cancelled() {
                wave.abort_all();
                break;
            }
            match joined {
                Ok(Some(result)) if result.is_working() => wave_working += 1,
                Ok(_) => {}
                // A dead probe task is simply not memoized; the stream will
                // be probed again on the next run.
                Err(e) => debug!("Probe task failed: {}", e),
            }
        }
        wave_working
    }

    async fn finish_playlist(&self) {
        self.stats.update(|s| s.processed_playlists += 1).await;
        self.checkpointer.flush().await;
    }
}
