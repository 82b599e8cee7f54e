//! Tile acquisition.
//!
//! The [`ImageLoader`] limits how many fetches run at once and queues the
//! rest. Transport lives behind [`TileFetcher`]; a fetcher may finish on any
//! thread by handing its result to the [`Completer`], which forwards it over
//! a channel. Results are only applied when the loader is polled, once per
//! frame, so a completion never lands in the middle of a layer update.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::core::config::LoaderOptions;
use crate::prelude::{HashMap, HashSet};
use crate::tiles::tile::{TileId, TileImage};
use crate::{Result, ViewerError};

/// What to fetch, and on behalf of which tile
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub tile: TileId,
    pub url: String,
    pub cache_key: String,
    pub headers: Vec<(String, String)>,
    /// Frame time at which the owning layer asked for the tile
    pub issued_at: f64,
}

/// Outcome of a finished, failed, timed-out or aborted job
#[derive(Debug)]
pub struct LoadCompletion {
    pub job: u64,
    pub request: LoadRequest,
    pub result: Result<TileImage>,
}

/// Cancellation capability for a submitted job
#[derive(Debug, Clone)]
pub struct LoadHandle {
    job: u64,
    aborted: Arc<AtomicBool>,
}

impl LoadHandle {
    pub fn job(&self) -> u64 {
        self.job
    }

    /// Cancels the job. Its completion is reported as
    /// [`ViewerError::Aborted`] on the next poll and any late result from the
    /// fetcher is dropped.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// One-shot reply slot handed to a fetcher
#[derive(Debug, Clone)]
pub struct Completer {
    job: u64,
    sender: Sender<(u64, Result<TileImage>)>,
    aborted: Arc<AtomicBool>,
}

impl Completer {
    pub fn job(&self) -> u64 {
        self.job
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn complete(self, result: Result<TileImage>) {
        if self.is_aborted() {
            return;
        }
        // The loader may already be gone; nothing is waiting then.
        let _ = self.sender.send((self.job, result));
    }
}

/// Transport and decoding collaborator
pub trait TileFetcher: std::fmt::Debug {
    /// Starts fetching `request`. Must not block; the result goes through
    /// `completer`, now or later.
    fn fetch(&mut self, request: &LoadRequest, completer: Completer);
}

#[derive(Debug)]
struct Job {
    id: u64,
    request: LoadRequest,
    aborted: Arc<AtomicBool>,
    started_at: f64,
}

#[derive(Debug)]
pub struct ImageLoader {
    fetcher: Box<dyn TileFetcher>,
    /// 0 means unbounded
    job_limit: usize,
    timeout_ms: f64,
    queue: VecDeque<Job>,
    active: HashMap<u64, Job>,
    /// Completions produced outside of a fetcher, handed out on next poll
    finished: Vec<LoadCompletion>,
    sender: Sender<(u64, Result<TileImage>)>,
    receiver: Receiver<(u64, Result<TileImage>)>,
    next_job: u64,
}

impl ImageLoader {
    pub fn new(fetcher: Box<dyn TileFetcher>, job_limit: usize, timeout_ms: f64) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            fetcher,
            job_limit,
            timeout_ms,
            queue: VecDeque::new(),
            active: HashMap::default(),
            finished: Vec::new(),
            sender,
            receiver,
            next_job: 1,
        }
    }

    pub fn with_options(fetcher: Box<dyn TileFetcher>, options: &LoaderOptions) -> Self {
        Self::new(fetcher, options.image_loader_limit, options.timeout_ms)
    }

    pub fn job_limit(&self) -> usize {
        self.job_limit
    }

    pub fn jobs_in_progress(&self) -> usize {
        self.active.len()
    }

    pub fn jobs_queued(&self) -> usize {
        self.queue.len()
    }

    fn has_capacity(&self) -> bool {
        self.job_limit == 0 || self.active.len() < self.job_limit
    }

    /// Submits a job; it starts now if under the job limit, otherwise it
    /// waits in FIFO order.
    pub fn add_job(&mut self, request: LoadRequest, now: f64) -> LoadHandle {
        let id = self.next_job;
        self.next_job += 1;
        let aborted = Arc::new(AtomicBool::new(false));
        let handle = LoadHandle {
            job: id,
            aborted: aborted.clone(),
        };
        let job = Job {
            id,
            request,
            aborted,
            started_at: now,
        };
        if self.has_capacity() {
            self.start(job, now);
        } else {
            self.queue.push_back(job);
        }
        handle
    }

    fn start(&mut self, mut job: Job, now: f64) {
        job.started_at = now;
        let completer = Completer {
            job: job.id,
            sender: self.sender.clone(),
            aborted: job.aborted.clone(),
        };
        log::debug!("loading {}", job.request.url);
        self.fetcher.fetch(&job.request, completer);
        self.active.insert(job.id, job);
    }

    /// Collects everything that finished since the last poll, expires jobs
    /// past the timeout and starts queued jobs in freed slots.
    pub fn poll(&mut self, now: f64) -> Vec<LoadCompletion> {
        let mut done = std::mem::take(&mut self.finished);

        while let Ok((id, result)) = self.receiver.try_recv() {
            if let Some(job) = self.active.remove(&id) {
                done.push(LoadCompletion {
                    job: id,
                    request: job.request,
                    result,
                });
            }
        }

        let mut expired: Vec<u64> = self
            .active
            .values()
            .filter(|job| {
                job.aborted.load(Ordering::SeqCst)
                    || (self.timeout_ms > 0.0 && now - job.started_at >= self.timeout_ms)
            })
            .map(|job| job.id)
            .collect();
        expired.sort_unstable();
        for id in expired {
            let Some(job) = self.active.remove(&id) else {
                continue;
            };
            let result = if job.aborted.swap(true, Ordering::SeqCst) {
                Err(ViewerError::Aborted)
            } else {
                log::warn!("image load exceeded timeout: {}", job.request.url);
                Err(ViewerError::Timeout(self.timeout_ms))
            };
            done.push(LoadCompletion {
                job: id,
                request: job.request,
                result,
            });
        }

        while self.has_capacity() {
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            if job.aborted.load(Ordering::SeqCst) {
                done.push(LoadCompletion {
                    job: job.id,
                    request: job.request,
                    result: Err(ViewerError::Aborted),
                });
                continue;
            }
            self.start(job, now);
        }

        done
    }

    /// Aborts every job still waiting for a slot. Running jobs continue.
    pub fn clear(&mut self) {
        for job in self.queue.drain(..) {
            job.aborted.store(true, Ordering::SeqCst);
            self.finished.push(LoadCompletion {
                job: job.id,
                request: job.request,
                result: Err(ViewerError::Aborted),
            });
        }
    }
}

/// Holds every request until the caller resolves it. Clones share the same
/// pending list, so a clone kept outside the loader can drive it.
#[derive(Debug, Clone, Default)]
pub struct ManualFetcher {
    pending: Rc<RefCell<VecDeque<(LoadRequest, Completer)>>>,
}

impl ManualFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn pending_requests(&self) -> Vec<LoadRequest> {
        self.pending
            .borrow()
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    /// Resolves the oldest pending request.
    pub fn complete_next(&self, result: Result<TileImage>) -> Option<LoadRequest> {
        let (request, completer) = self.pending.borrow_mut().pop_front()?;
        completer.complete(result);
        Some(request)
    }

    /// Resolves the pending request for `url`, if any.
    pub fn complete_url(&self, url: &str, result: Result<TileImage>) -> bool {
        let mut pending = self.pending.borrow_mut();
        let Some(index) = pending.iter().position(|(request, _)| request.url == url) else {
            return false;
        };
        match pending.remove(index) {
            Some((_, completer)) => {
                completer.complete(result);
                true
            }
            None => false,
        }
    }

    /// Resolves every pending request with `produce`. Returns how many.
    pub fn complete_all<F>(&self, mut produce: F) -> usize
    where
        F: FnMut(&LoadRequest) -> Result<TileImage>,
    {
        let drained: Vec<_> = self.pending.borrow_mut().drain(..).collect();
        let count = drained.len();
        for (request, completer) in drained {
            completer.complete(produce(&request));
        }
        count
    }
}

impl TileFetcher for ManualFetcher {
    fn fetch(&mut self, request: &LoadRequest, completer: Completer) {
        self.pending
            .borrow_mut()
            .push_back((request.clone(), completer));
    }
}

/// Answers every request on the spot with a synthetic square payload.
#[derive(Debug, Clone)]
pub struct ImmediateFetcher {
    tile_size: u32,
    missing: HashSet<String>,
}

impl ImmediateFetcher {
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size,
            missing: HashSet::default(),
        }
    }

    /// URLs that fail as if the server had no such tile.
    pub fn with_missing(mut self, urls: impl IntoIterator<Item = String>) -> Self {
        self.missing.extend(urls);
        self
    }
}

impl TileFetcher for ImmediateFetcher {
    fn fetch(&mut self, request: &LoadRequest, completer: Completer) {
        if self.missing.contains(&request.url) {
            completer.complete(Err(ViewerError::Load(format!("not found: {}", request.url))));
            return;
        }
        completer.complete(Ok(TileImage::new(
            self.tile_size,
            self.tile_size,
            request.url.as_bytes().to_vec(),
        )));
    }
}
