use crate::output::{Reaction, RenderedOutput, spoiler_wrap};
use crate::wiki::{SiteMeta, WikiReference};

use super::page::{self, Target};
use super::{Ctx, ResolutionState, fetch_failure};

/// Pick one page from `namespace`, or from the wiki's content namespaces,
/// and render it like any other page.
pub fn render(
    ctx: &Ctx<'_>,
    wiki: &WikiReference,
    namespace: Option<i32>,
    state: &ResolutionState,
) -> RenderedOutput {
    let namespaces = match namespace {
        Some(id) => id.to_string(),
        None => wiki
            .content_namespaces
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join("|"),
    };
    let response = match ctx.query(wiki, &page::page_params(Target::Random(&namespaces), false)) {
        Ok(response) => response,
        Err(error) => return fetch_failure(&error, state),
    };
    let payload = &response.query;
    let wiki = ctx.refresh(wiki, payload);
    let meta = SiteMeta::from_query(payload, &wiki).unwrap_or_default();

    let Some(picked) = payload.pages.first() else {
        let title = format!("{}:Random", wiki.namespace_name(crate::wiki::NS_SPECIAL));
        return RenderedOutput::text(spoiler_wrap(&wiki.page_link(&title), state.spoiler))
            .marked(Reaction::Shrug);
    };
    tracing::debug!(wiki = %wiki.key(), title = %picked.title, "random page");
    if state.no_preview || state.spoiler {
        return RenderedOutput::text(spoiler_wrap(&wiki.page_link(&picked.title), state.spoiler));
    }

    let clean = ResolutionState {
        title: picked.title.clone(),
        spoiler: state.spoiler,
        no_preview: state.no_preview,
        command_hint: state.command_hint.clone(),
        ..ResolutionState::default()
    };
    page::render_page(ctx, &wiki, &meta, picked, payload, &clean)
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
    fn spoilered_random_pages_are_linked_without_parsing() {
        let api = FixtureApi::new().with_response(
            "wiki.example.org/w/",
            &[("generator", "random")],
            json!({"query": {
                "general": general("https://wiki.example.org", "Example Wiki"),
                "pages": [{"pageid": 3, "ns": 0, "title": "Lucky"}],
            }}),
        );
        let services = Services::from_config(&EmbedConfig::default()).expect("services");
        let output = TitleResolver::new(&api, &services, ExcerptBudget::default(), 2, CancellationFlag::new())
            .resolve("||random||", &test_wiki("wiki.example.org"), ResolutionState::default());
        assert_eq!(output, RenderedOutput::text("||https://wiki.example.org/wiki/Lucky||"));
        assert_eq!(api.calls().len(), 1);
    }

    #[test]
    fn empty_random_results_shrug() {
        let api = FixtureApi::new().with_response(
            "wiki.example.org/w/",
            &[("generator", "random")],
            json!({"query": {"general": general("https://wiki.example.org", "Example Wiki")}}),
        );
        let services = Services::from_config(&EmbedConfig::default()).expect("services");
        let output = TitleResolver::new(&api, &services, ExcerptBudget::default(), 2, CancellationFlag::new())
            .resolve("random", &test_wiki("wiki.example.org"), ResolutionState::default());
        assert_eq!(output.as_message().and_then(|message| message.reaction), Some(Reaction::Shrug));
    }
}
