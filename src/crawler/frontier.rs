//! Shared crawl frontier
//!
//! This module handles:
//! - The FIFO queue of pending crawl targets (breadth-first order)
//! - The visited set, updated atomically with every pop
//! - In-flight accounting so idle workers know when the crawl is over
//! - Waking idle workers when new targets arrive or work finishes

use crate::url::{link_key, ResourceKind};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A discovered link waiting to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    /// Normalized URL, fragment included
    pub url: Url,

    /// Link text, or a placeholder derived from the URL
    pub label: String,

    /// Distance from the seed (the seed is 0)
    pub depth: u32,

    /// Storage folder inherited from the first-level ancestor
    pub category: String,

    pub kind: ResourceKind,
}

impl CrawlTarget {
    pub fn seed(url: Url, category: impl Into<String>) -> Self {
        Self {
            url,
            label: String::new(),
            depth: 0,
            category: category.into(),
            kind: ResourceKind::Page,
        }
    }
}

/// Counters describing frontier activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierStats {
    /// Targets handed to a worker
    pub dispatched: usize,
    /// Targets dropped because their URL was already known
    pub duplicates: usize,
    /// Targets still queued
    pub pending: usize,
    /// Targets currently being processed
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct FrontierInner {
    queue: VecDeque<CrawlTarget>,
    /// Link keys queued or dispatched
    known: HashSet<Url>,
    /// Link keys dispatched to a worker
    visited: HashSet<Url>,
    in_flight: usize,
    duplicates: usize,
}

/// Queue, visited set and in-flight counter behind a single lock
#[derive(Debug, Default)]
pub struct Frontier {
    inner: Mutex<FrontierInner>,
    notify: Notify,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrontierInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a target to the back of the queue
    ///
    /// # Returns
    ///
    /// * `true` - The target was queued
    /// * `false` - Its URL is already queued or dispatched; counted as a duplicate
    pub fn push(&self, target: CrawlTarget) -> bool {
        {
            let mut inner = self.lock();
            if !inner.known.insert(link_key(&target.url)) {
                inner.duplicates += 1;
                return false;
            }
            inner.queue.push_back(target);
        }
        self.notify.notify_waiters();
        true
    }

    /// Pops the next target and marks it visited in the same critical section
    ///
    /// Returns `None` without waiting when the queue is empty.
    pub fn try_pop(&self) -> Option<CrawlTarget> {
        let mut inner = self.lock();
        Self::pop_locked(&mut inner)
    }

    fn pop_locked(inner: &mut FrontierInner) -> Option<CrawlTarget> {
        while let Some(target) = inner.queue.pop_front() {
            if inner.visited.insert(link_key(&target.url)) {
                inner.in_flight += 1;
                return Some(target);
            }
            inner.duplicates += 1;
        }
        None
    }

    /// Waits for the next target
    ///
    /// # Returns
    ///
    /// * `Some(CrawlTarget)` - A target this worker now owns; call
    ///   [`Frontier::complete`] when done with it, or hold a
    ///   [`Frontier::completion_guard`]
    /// * `None` - The queue is empty with nothing in flight, or the crawl
    ///   was cancelled
    pub async fn next(&self, cancel: &CancellationToken) -> Option<CrawlTarget> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if let Some(target) = Self::pop_locked(&mut inner) {
                    return Some(target);
                }
                if inner.in_flight == 0 {
                    drop(inner);
                    // Wake the other idle workers so they see the end too
                    self.notify.notify_waiters();
                    return None;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Marks a dispatched target as finished
    pub fn complete(&self) {
        {
            let mut inner = self.lock();
            inner.in_flight = inner.in_flight.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }

    /// Returns a guard that calls [`Frontier::complete`] when dropped
    ///
    /// The in-flight count is released even if the holder panics.
    pub fn completion_guard(&self) -> CompletionGuard<'_> {
        CompletionGuard { frontier: self }
    }

    /// Returns true if `url` (ignoring its fragment) has been dispatched
    pub fn is_visited(&self, url: &Url) -> bool {
        self.lock().visited.contains(&link_key(url))
    }

    pub fn stats(&self) -> FrontierStats {
        let inner = self.lock();
        FrontierStats {
            dispatched: inner.visited.len(),
            duplicates: inner.duplicates,
            pending: inner.queue.len(),
            in_flight: inner.in_flight,
        }
    }
}

/// Releases one in-flight target on drop
#[must_use = "the target is completed as soon as the guard is dropped"]
pub struct CompletionGuard<'a> {
    frontier: &'a Frontier,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.frontier.complete();
    }
}
