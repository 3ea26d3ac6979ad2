use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use tracing::debug;
use url::Url;

use crate::path_mapper;

/// Host identity used for the same-site check. The port only matters when it
/// is explicit and non-default; `Url` already folds default ports to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HostKey {
    host: String,
    port: Option<u16>,
}

impl HostKey {
    fn of(url: &Url) -> Option<Self> {
        url.host_str().map(|host| Self {
            host: host.to_string(),
            port: url.port(),
        })
    }
}

struct FrontierState {
    queue: VecDeque<Url>,
    seen: HashSet<String>,
    claimed: usize,
}

/// FIFO crawl frontier shared by the page workers.
///
/// A link's dedup key is recorded the moment the link joins the queue, so
/// the queue never holds duplicates and no key is dispatched twice. The
/// page cap is charged when a page is claimed, in the same locked step, so
/// concurrent workers cannot overshoot it.
pub struct Frontier {
    state: Mutex<FrontierState>,
    hosts: HashSet<HostKey>,
    max_pages: usize,
}

impl Frontier {
    /// Seed the frontier. The seeds define the set of hosts the crawl is
    /// allowed to stay on; seeds sharing a dedup key collapse to one entry.
    pub fn new(seeds: Vec<Url>, max_pages: usize) -> Self {
        let hosts = seeds.iter().filter_map(HostKey::of).collect();
        let mut queue = VecDeque::new();
        let mut seen = HashSet::new();
        for seed in seeds {
            if seen.insert(path_mapper::dedup_key(&seed)) {
                queue.push_back(seed);
            }
        }
        Self {
            state: Mutex::new(FrontierState {
                queue,
                seen,
                claimed: 0,
            }),
            hosts,
            max_pages,
        }
    }

    /// Offer a discovered link. Off-host links and links already queued or
    /// claimed are dropped; returns whether the link joined the queue.
    pub fn try_enqueue(&self, url: &Url) -> bool {
        match HostKey::of(url) {
            Some(key) if self.hosts.contains(&key) => {}
            _ => {
                debug!(url = %url, "off-host link dropped");
                return false;
            }
        }
        let mut state = self.state.lock().unwrap();
        if state.claimed >= self.max_pages {
            return false;
        }
        if !state.seen.insert(path_mapper::dedup_key(url)) {
            return false;
        }
        state.queue.push_back(url.clone());
        true
    }

    /// Claim the next page to process, or `None` when the queue is empty or
    /// the page cap is reached.
    pub fn next_pending(&self) -> Option<Url> {
        let mut state = self.state.lock().unwrap();
        if state.claimed >= self.max_pages {
            return None;
        }
        let url = state.queue.pop_front()?;
        state.claimed += 1;
        Some(url)
    }

    /// Pages claimed so far.
    pub fn claimed(&self) -> usize {
        self.state.lock().unwrap().claimed
    }
}
