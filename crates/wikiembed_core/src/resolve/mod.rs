//! Turning a free-form page reference into a rendered excerpt.
//!
//! [`TitleResolver::resolve`] runs an explicit loop: every iteration parses
//! the current text into a [`ResolutionState`], performs one step, and gets
//! back either a finished [`RenderedOutput`], a new title on the same wiki,
//! or a hop to another wiki that the [`HopGuard`] must approve.

pub(crate) mod diff;
mod hop;
mod input;
pub(crate) mod overview;
mod page;
pub(crate) mod random;
pub(crate) mod search;
mod user;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::ScopedJoinHandle;

use serde_json::Value;

use crate::api::{ParseResponse, QueryPayload, QueryResponse, decode};
use crate::client::{FetchError, WikiApi};
use crate::excerpt::ExcerptBudget;
use crate::output::{Author, Reaction, RenderedOutput, spoiler_wrap};
use crate::services::Services;
use crate::text::BestEffort;
use crate::wiki::{SiteMeta, WikiReference};

pub use diff::DiffRequest;
pub use hop::{CancellationFlag, HopDecision, HopGuard, decide};
pub use input::{Alias, MAX_TITLE_LENGTH, alias, normalize};

/// siteinfo parts needed to rebuild a [`WikiReference`].
pub(crate) const SITEINFO_PROPS: &str = "general|namespaces|namespacealiases|specialpagealiases";

/// Same-wiki re-dispatches allowed in one chain (main page, command set,
/// contributions, search suggestion).
const MAX_REDISPATCH: u32 = 4;

/// Everything known about one reference while it is being resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionState {
    pub title: String,
    pub fragment: Option<String>,
    pub query: BTreeMap<String, String>,
    pub spoiler: bool,
    pub no_preview: bool,
    pub no_redirect: bool,
    /// Interwiki hops taken so far; never exceeds the resolver's limit.
    pub hops: u32,
    pub command_hint: Vec<String>,
    pub truncated: bool,
    /// The title came from a full-text search hit.
    pub suggested: bool,
    /// A missing page was already retried on a shared repository or help hub.
    pub probed: bool,
    pub commands_applied: bool,
    /// Link to emit if the next wiki cannot be reached.
    pub fallback: Option<String>,
}

impl ResolutionState {
    pub fn with_query(query: BTreeMap<String, String>) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    /// Link to the current title, wrapped when a spoiler was requested.
    pub(crate) fn link_on(&self, wiki: &WikiReference, title: &str) -> String {
        spoiler_wrap(
            &wiki.to_link(title, &self.query, self.fragment.as_deref()),
            self.spoiler,
        )
    }
}

/// Shared inputs of every step of one resolution.
pub struct Ctx<'a> {
    pub api: &'a dyn WikiApi,
    pub services: &'a Services,
    pub budget: ExcerptBudget,
    pub max_hops: u32,
    pub cancel: CancellationFlag,
}

impl Ctx<'_> {
    fn get(&self, wiki: &WikiReference, params: &[(&str, String)]) -> Result<Value, FetchError> {
        self.api.get_json(wiki, params)
    }

    pub fn query(
        &self,
        wiki: &WikiReference,
        params: &[(&str, String)],
    ) -> Result<QueryResponse, FetchError> {
        decode(self.get(wiki, params)?).map_err(|error| located(error, wiki))
    }

    pub fn parse(
        &self,
        wiki: &WikiReference,
        params: &[(&str, String)],
    ) -> Result<ParseResponse, FetchError> {
        decode(self.get(wiki, params)?).map_err(|error| located(error, wiki))
    }

    /// Publish the layout carried by a fresh siteinfo response, if any.
    pub fn refresh(&self, wiki: &WikiReference, payload: &QueryPayload) -> Arc<WikiReference> {
        match payload.site_info() {
            Some(info) => self.services.wikis.publish(wiki.with_site_info(&info)),
            None => self.services.wikis.current(wiki),
        }
    }
}

fn located(error: FetchError, wiki: &WikiReference) -> FetchError {
    match error {
        FetchError::Malformed { url, message } if url.is_empty() => FetchError::Malformed {
            url: wiki.api_url(),
            message,
        },
        other => other,
    }
}

/// Result of one resolution step.
#[derive(Debug)]
pub(crate) enum Step {
    Done(RenderedOutput),
    /// Resolve `text` on the same wiki.
    Redispatch { text: String, state: ResolutionState },
    /// Resolve `text` on another wiki; `link` is emitted if the hop is refused.
    Hop {
        wiki: WikiReference,
        text: String,
        state: ResolutionState,
        link: String,
    },
}

impl Step {
    pub(crate) fn hop(
        wiki: WikiReference,
        text: String,
        mut state: ResolutionState,
        query: BTreeMap<String, String>,
        fragment: Option<String>,
        link: String,
    ) -> Self {
        state.query = query;
        state.fragment = fragment;
        state.fallback = Some(link.clone());
        Self::Hop {
            wiki,
            text,
            state,
            link,
        }
    }
}

pub struct TitleResolver<'a> {
    ctx: Ctx<'a>,
}

impl<'a> TitleResolver<'a> {
    pub fn new(
        api: &'a dyn WikiApi,
        services: &'a Services,
        budget: ExcerptBudget,
        max_hops: u32,
        cancel: CancellationFlag,
    ) -> Self {
        Self {
            ctx: Ctx {
                api,
                services,
                budget,
                max_hops,
                cancel,
            },
        }
    }

    /// Resolve `text` against `wiki`. Never fails: every problem is folded
    /// into the returned output.
    pub fn resolve(&self, text: &str, wiki: &WikiReference, state: ResolutionState) -> RenderedOutput {
        let services = self.ctx.services;
        let mut wiki = services.wikis.current(wiki);
        let mut state = state;
        if let Some(target) = normalize(
            text,
            &mut state,
            &wiki,
            Some((&services.farms, &services.directory)),
        ) {
            wiki = services.wikis.current(&target);
        }

        let mut guard = HopGuard::new(self.ctx.max_hops);
        guard.visit(&wiki.key(), &state.title);
        let mut redispatches = 0;

        loop {
            if self.ctx.cancel.is_cancelled() {
                return RenderedOutput::Cancelled;
            }
            let truncated = state.truncated;
            match self.step(&wiki, state) {
                Step::Done(_) if self.ctx.cancel.is_cancelled() => {
                    return RenderedOutput::Cancelled;
                }
                Step::Done(output) => {
                    let unmarked = output
                        .as_message()
                        .is_some_and(|message| message.reaction.is_none());
                    return if truncated && unmarked {
                        output.marked(Reaction::Warning)
                    } else {
                        output
                    };
                }
                Step::Redispatch {
                    text,
                    state: mut next,
                } => {
                    redispatches += 1;
                    if redispatches > MAX_REDISPATCH {
                        tracing::warn!(wiki = %wiki.key(), title = %text, "too many re-dispatches");
                        return RenderedOutput::reaction(Reaction::Error);
                    }
                    normalize(&text, &mut next, &wiki, None);
                    state = next;
                }
                Step::Hop {
                    wiki: target,
                    text,
                    state: mut next,
                    link,
                } => {
                    if self.ctx.cancel.is_cancelled() {
                        return RenderedOutput::Cancelled;
                    }
                    let target = services.wikis.current(&target);
                    normalize(&text, &mut next, &target, None);
                    match guard.check(next.hops, &target.key(), &next.title) {
                        HopDecision::Continue => {
                            tracing::info!(
                                from = %wiki.key(),
                                to = %target.key(),
                                hops = next.hops + 1,
                                "following interwiki hop"
                            );
                            next.hops += 1;
                            wiki = target;
                            state = next;
                        }
                        HopDecision::StopWithWarning => {
                            tracing::info!(to = %target.key(), hops = next.hops, "hop limit reached");
                            return RenderedOutput::text(spoiler_wrap(&link, next.spoiler))
                                .marked(Reaction::Warning);
                        }
                        HopDecision::StopSilently => {
                            return RenderedOutput::text(spoiler_wrap(&link, next.spoiler));
                        }
                    }
                }
            }
        }
    }

    fn step(&self, wiki: &Arc<WikiReference>, state: ResolutionState) -> Step {
        let ctx = &self.ctx;
        match alias(&state, wiki) {
            Some(Alias::Page { title }) => Step::Done(RenderedOutput::text(state.link_on(wiki, &title))),
            Some(Alias::Random { namespace }) => Step::Done(random::render(ctx, wiki, namespace, &state)),
            Some(Alias::Overview) => Step::Done(overview::render(ctx, wiki, &state)),
            Some(Alias::Diff(request)) => Step::Done(diff::render(ctx, wiki, request, &state)),
            Some(Alias::Search { terms }) => page::generic(ctx, wiki, state, Some(terms)),
            None => page::generic(ctx, wiki, state, None),
        }
    }
}

/// Output for a failed round trip: the pending fallback link if there is one,
/// otherwise a marker for the failure kind.
pub(crate) fn fetch_failure(error: &FetchError, state: &ResolutionState) -> RenderedOutput {
    if let Some(link) = &state.fallback {
        tracing::info!("falling back to interwiki link: {error}");
        return RenderedOutput::text(spoiler_wrap(link, state.spoiler));
    }
    match error {
        FetchError::WikiNotFound { url } => {
            tracing::info!(url = %url, "wiki does not exist");
            RenderedOutput::reaction(Reaction::NoWiki)
        }
        FetchError::Malformed { url, message } => {
            tracing::warn!(url = %url, "malformed response: {message}");
            RenderedOutput::reaction(Reaction::Error)
        }
        other => {
            tracing::warn!("request failed: {other}");
            RenderedOutput::reaction(Reaction::Error)
        }
    }
}

pub(crate) fn site_author(wiki: &WikiReference, meta: &SiteMeta) -> Option<Author> {
    (!meta.sitename.is_empty()).then(|| Author {
        name: meta.sitename.clone(),
        url: Some(wiki.page_link(&meta.main_page)),
        icon_url: meta.logo.clone(),
    })
}

/// Join a secondary fetch; a panic or failure only drops that part.
pub(crate) fn joined<T>(
    handle: ScopedJoinHandle<'_, Result<Option<T>, FetchError>>,
    what: &str,
) -> Option<T> {
    handle
        .join()
        .ok()
        .and_then(|result| result.best_effort(what))
        .flatten()
}

/// Optional text trimmed to `limit`; `None` when disabled or empty.
pub(crate) fn bounded(text: Option<&str>, limit: usize) -> Option<String> {
    if limit == 0 {
        return None;
    }
    text.map(|text| crate::text::limit_length(text.trim(), limit))
        .filter(|text| !text.is_empty())
}
