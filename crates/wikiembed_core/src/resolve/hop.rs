use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Outcome of asking whether another interwiki hop may be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopDecision {
    Continue,
    /// Limit reached: emit the link with a warning marker.
    StopWithWarning,
    /// The target was already visited in this chain: emit the plain link.
    StopSilently,
}

/// Checked before the counter is incremented, so `count` never exceeds `max`.
pub fn decide(count: u32, max: u32) -> HopDecision {
    if count < max {
        HopDecision::Continue
    } else {
        HopDecision::StopWithWarning
    }
}

/// Tracks the wikis and titles one resolution chain has visited.
#[derive(Debug)]
pub struct HopGuard {
    max: u32,
    visited: BTreeSet<(String, String)>,
}

impl HopGuard {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            visited: BTreeSet::new(),
        }
    }

    /// Record the starting point of the chain.
    pub fn visit(&mut self, wiki_key: &str, title: &str) {
        self.visited.insert(visit_key(wiki_key, title));
    }

    pub fn check(&mut self, count: u32, wiki_key: &str, title: &str) -> HopDecision {
        if !self.visited.insert(visit_key(wiki_key, title)) {
            return HopDecision::StopSilently;
        }
        decide(count, self.max)
    }
}

/// Titles differ only in case after their first letter.
fn visit_key(wiki_key: &str, title: &str) -> (String, String) {
    let title = title.replace('_', " ");
    let mut chars = title.trim().chars();
    let folded = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    };
    (wiki_key.to_string(), folded)
}

/// Cooperative cancellation shared between a caller and a running resolution.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
