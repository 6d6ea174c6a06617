//! Rendering for pages in the special namespace.
//!
//! A closed set of canonical names gets a dedicated renderer; everything else
//! is described by its system messages, plus a short result list for the
//! known listing pages.

mod listing;

use crate::api::PageItem;
use crate::client::FetchError;
use crate::excerpt::strip_html;
use crate::output::{Card, Field, RenderedOutput, spoiler_wrap};
use crate::resolve::{
    Ctx, DiffRequest, ResolutionState, bounded, diff, overview, random, search, site_author,
};
use crate::text::{BestEffort, escape_formatting};
use crate::wiki::{SiteMeta, WikiReference};

pub use listing::{ListingShape, format_recent_changes};

const LISTING_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialPage {
    Random,
    Overview,
    Diff,
    Search,
    RecentChanges,
    Listing(ListingShape),
    Generic,
}

impl SpecialPage {
    pub fn from_canonical(canonical: &str) -> Self {
        match canonical {
            "Randompage" | "Randomrootpage" => Self::Random,
            "Statistics" | "Version" => Self::Overview,
            "Diff" => Self::Diff,
            "Search" => Self::Search,
            "Recentchanges" => Self::RecentChanges,
            other => ListingShape::for_page(other).map_or(Self::Generic, Self::Listing),
        }
    }
}

/// Canonical name and subpage of a `Special:Name/subpage` title.
pub fn special_parts(wiki: &WikiReference, title: &str) -> (String, Option<String>) {
    let (_, name) = wiki.split_namespace(title);
    let (name, subpage) = match name.split_once('/') {
        Some((name, subpage)) => (name, Some(subpage.trim().to_string())),
        None => (name, None),
    };
    let canonical = wiki
        .special_canonical(name)
        .unwrap_or_else(|| name.trim().replace(' ', ""));
    (canonical, subpage.filter(|subpage| !subpage.is_empty()))
}

pub struct SpecialPageDispatcher<'c, 'a> {
    ctx: &'c Ctx<'a>,
}

impl<'c, 'a> SpecialPageDispatcher<'c, 'a> {
    pub fn new(ctx: &'c Ctx<'a>) -> Self {
        Self { ctx }
    }

    pub fn render(
        &self,
        page: &PageItem,
        canonical: &str,
        meta: &SiteMeta,
        wiki: &WikiReference,
        state: &ResolutionState,
    ) -> RenderedOutput {
        let (_, subpage) = special_parts(wiki, &page.title);
        match SpecialPage::from_canonical(canonical) {
            SpecialPage::Random => {
                let namespace = subpage.as_deref().and_then(|subpage| wiki.namespace_id(subpage));
                random::render(self.ctx, wiki, namespace, state)
            }
            SpecialPage::Overview => overview::render(self.ctx, wiki, state),
            SpecialPage::Diff => match subpage
                .as_deref()
                .and_then(|subpage| DiffRequest::from_args(&subpage.replace('/', " ")))
            {
                Some(request) => diff::render(self.ctx, wiki, request, state),
                None => self.generic(page, canonical, None, meta, wiki, state),
            },
            SpecialPage::Search => {
                let terms = state
                    .query
                    .get("search")
                    .cloned()
                    .or(subpage)
                    .unwrap_or_default();
                search::render(self.ctx, wiki, meta, &terms, state)
            }
            SpecialPage::RecentChanges => {
                self.generic(page, canonical, Some(SpecialPage::RecentChanges), meta, wiki, state)
            }
            listing @ SpecialPage::Listing(_) => {
                self.generic(page, canonical, Some(listing), meta, wiki, state)
            }
            SpecialPage::Generic => self.generic(page, canonical, None, meta, wiki, state),
        }
    }

    fn messages(&self, wiki: &WikiReference, key: &str, lang: &str) -> Result<(Option<String>, Option<String>), FetchError> {
        let summary_key = format!("{key}-summary");
        let response = self.ctx.query(
            wiki,
            &[
                ("action", "query".to_string()),
                ("meta", "allmessages".to_string()),
                ("ammessages", format!("{key}|{summary_key}")),
                ("amenableparser", "1".to_string()),
                ("amlang", lang.to_string()),
            ],
        )?;
        let payload = response.query;
        Ok((
            payload.message(key).map(strip_html),
            payload.message(&summary_key).map(strip_html),
        ))
    }

    fn listing(
        &self,
        wiki: &WikiReference,
        canonical: &str,
        kind: SpecialPage,
        lang: &str,
    ) -> Result<Option<String>, FetchError> {
        if self.ctx.cancel.is_cancelled() {
            return Ok(None);
        }
        let text = match kind {
            SpecialPage::RecentChanges => {
                let response = self.ctx.query(
                    wiki,
                    &[
                        ("action", "query".to_string()),
                        ("list", "recentchanges".to_string()),
                        ("rclimit", LISTING_LIMIT.to_string()),
                        ("rcprop", "title|timestamp|user|sizes".to_string()),
                        ("rctype", "edit|new".to_string()),
                    ],
                )?;
                format_recent_changes(&response.query.recentchanges, wiki, lang)
            }
            SpecialPage::Listing(shape) => {
                let response = self.ctx.query(
                    wiki,
                    &[
                        ("action", "query".to_string()),
                        ("list", "querypage".to_string()),
                        ("qppage", canonical.to_string()),
                        ("qplimit", LISTING_LIMIT.to_string()),
                    ],
                )?;
                let rows = response
                    .query
                    .querypage
                    .map(|querypage| querypage.results)
                    .unwrap_or_default();
                shape.format(&rows, wiki, lang)
            }
            _ => String::new(),
        };
        Ok(Some(text).filter(|text| !text.is_empty()))
    }

    fn generic(
        &self,
        page: &PageItem,
        canonical: &str,
        listing: Option<SpecialPage>,
        meta: &SiteMeta,
        wiki: &WikiReference,
        state: &ResolutionState,
    ) -> RenderedOutput {
        let link = wiki.to_link(&page.title, &state.query, state.fragment.as_deref());
        if state.no_preview || state.spoiler {
            return RenderedOutput::text(spoiler_wrap(&link, state.spoiler));
        }
        let lang = if meta.lang.is_empty() { wiki.lang.as_str() } else { meta.lang.as_str() };
        let (name, summary) = self
            .messages(wiki, &canonical.to_lowercase(), lang)
            .best_effort("special page messages")
            .unwrap_or_default();

        let mut card = Card::new(name.as_deref().unwrap_or(&page.title), link.clone());
        card.author = site_author(wiki, meta);
        card.description = bounded(
            summary.map(|summary| escape_formatting(&summary)).as_deref(),
            self.ctx.budget.desc_length,
        );
        if let Some(kind) = listing
            && let Some(text) = self
                .listing(wiki, canonical, kind, lang)
                .best_effort("special page listing")
                .flatten()
        {
            card.fields.push(Field::new("Results", text, false));
        }
        if self.ctx.cancel.is_cancelled() {
            return RenderedOutput::Cancelled;
        }
        RenderedOutput::card(link, card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbedConfig;
    use crate::excerpt::ExcerptBudget;
    use crate::resolve::{CancellationFlag, TitleResolver};
    use crate::services::Services;
    use crate::test_support::{FixtureApi, general, test_wiki};
    use serde_json::json;

    #[test]
    fn canonical_names_map_to_renderers() {
        assert_eq!(SpecialPage::from_canonical("Randompage"), SpecialPage::Random);
        assert_eq!(SpecialPage::from_canonical("Version"), SpecialPage::Overview);
        assert_eq!(
            SpecialPage::from_canonical("Longpages"),
            SpecialPage::Listing(ListingShape::TitleSize)
        );
        assert_eq!(SpecialPage::from_canonical("Preferences"), SpecialPage::Generic);
    }

    #[test]
    fn special_parts_split_subpages_and_resolve_aliases() {
        let wiki = test_wiki("wiki.example.org");
        assert_eq!(
            special_parts(&wiki, "Special:Contribs/Alice"),
            ("Contributions".to_string(), Some("Alice".to_string()))
        );
        assert_eq!(special_parts(&wiki, "Special:Long pages"), ("Longpages".to_string(), None));
    }

    fn resolve(api: &FixtureApi, text: &str) -> RenderedOutput {
        let services = Services::from_config(&EmbedConfig::default()).expect("services");
        TitleResolver::new(api, &services, ExcerptBudget::default(), 2, CancellationFlag::new()).resolve(
            text,
            &test_wiki("wiki.example.org"),
            ResolutionState::default(),
        )
    }

    #[test]
    fn listing_pages_show_messages_and_results() {
        let api = FixtureApi::new()
            .with_response(
                "wiki.example.org/w/",
                &[("titles", "Special:LongPages")],
                json!({"query": {
                    "general": general("https://wiki.example.org", "Example Wiki"),
                    "specialpagealiases": [{"realname": "Longpages", "aliases": ["LongPages"]}],
                    "pages": [{"ns": -1, "title": "Special:LongPages", "special": true}],
                }}),
            )
            .with_response(
                "wiki.example.org/w/",
                &[("ammessages", "longpages|longpages-summary")],
                json!({"query": {"allmessages": [
                    {"name": "longpages", "content": "Long pages"},
                    {"name": "longpages-summary", "content": "The <b>longest</b> pages."},
                ]}}),
            )
            .with_response(
                "wiki.example.org/w/",
                &[("list", "querypage"), ("qppage", "Longpages")],
                json!({"query": {"querypage": {"name": "Longpages", "results": [
                    {"ns": 0, "title": "Epic", "value": "99000"},
                ]}}}),
            );
        let output = resolve(&api, "Special:LongPages");
        let card = output.as_message().and_then(|message| message.card.as_ref()).expect("card");
        assert_eq!(card.title, "Long pages");
        assert_eq!(card.description.as_deref(), Some("The longest pages."));
        assert_eq!(card.fields[0].name, "Results");
        assert_eq!(
            card.fields[0].value,
            "\u{2022} [Epic](https://wiki.example.org/wiki/Epic) (99,000 bytes)"
        );
    }

    #[test]
    fn unknown_special_pages_survive_message_failures() {
        let api = FixtureApi::new().with_response(
            "wiki.example.org/w/",
            &[("titles", "Special:Preferences")],
            json!({"query": {"pages": [{"ns": -1, "title": "Special:Preferences", "special": true}]}}),
        );
        let output = resolve(&api, "Special:Preferences");
        let card = output.as_message().and_then(|message| message.card.as_ref()).expect("card");
        assert_eq!(card.title, "Special:Preferences");
        assert!(card.description.is_none());
        assert!(card.fields.is_empty());
    }

    #[test]
    fn cancelling_before_the_listing_fetch_gives_no_output() {
        let cancel = CancellationFlag::new();
        let api = FixtureApi::new()
            .with_response(
                "wiki.example.org/w/",
                &[("titles", "Special:LongPages")],
                json!({"query": {
                    "general": general("https://wiki.example.org", "Example Wiki"),
                    "specialpagealiases": [{"realname": "Longpages", "aliases": ["LongPages"]}],
                    "pages": [{"ns": -1, "title": "Special:LongPages", "special": true}],
                }}),
            )
            .with_response(
                "wiki.example.org/w/",
                &[("meta", "allmessages")],
                json!({"query": {"allmessages": [{"name": "longpages", "content": "Long pages"}]}}),
            )
            .with_cancel_after(2, &cancel);
        let services = Services::from_config(&EmbedConfig::default()).expect("services");
        let output = TitleResolver::new(&api, &services, ExcerptBudget::default(), 2, cancel).resolve(
            "Special:LongPages",
            &test_wiki("wiki.example.org"),
            ResolutionState::default(),
        );
        assert_eq!(output, RenderedOutput::Cancelled);
        assert!(api.calls().iter().all(|call| !call.params.contains_key("qppage")));
    }
}
