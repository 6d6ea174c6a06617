use std::collections::BTreeMap;

use crate::api::{QueryPayload, Revision};
use crate::client::FetchError;
use crate::output::{Card, Field, Reaction, RenderedOutput, spoiler_wrap};
use crate::text::{BestEffort, escape_formatting, format_timestamp, markdown_link};
use crate::wiki::{NS_USER, SiteMeta, WikiReference};

use super::{Ctx, ResolutionState, SITEINFO_PROPS, bounded, fetch_failure, site_author};

/// A revision and, optionally, the revision it is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffRequest {
    pub revision: u64,
    pub compare_to: Option<u64>,
}

impl DiffRequest {
    /// `"<revision> [<compare_to>]"`.
    pub fn from_args(args: &str) -> Option<Self> {
        let numbers = args
            .split_whitespace()
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        match numbers.as_slice() {
            [revision] => Some(Self {
                revision: *revision,
                compare_to: None,
            }),
            [revision, compare_to] => Some(Self {
                revision: *revision,
                compare_to: Some(*compare_to),
            }),
            _ => None,
        }
    }

    /// `diff=` / `oldid=` link parameters. A relative `diff` (`prev`, `cur`,
    /// `next` or empty) shows the change made by `oldid` itself.
    pub fn from_query(query: &BTreeMap<String, String>) -> Option<Self> {
        let diff = query.get("diff")?.trim();
        let oldid = query
            .get("oldid")
            .and_then(|oldid| oldid.trim().parse::<u64>().ok());
        if let Ok(revision) = diff.parse::<u64>() {
            return Some(Self {
                revision,
                compare_to: oldid.filter(|oldid| *oldid != revision),
            });
        }
        match diff {
            "" | "prev" | "cur" | "next" => oldid.map(|revision| Self {
                revision,
                compare_to: None,
            }),
            _ => None,
        }
    }
}

fn find_revision(payload: &QueryPayload, revid: u64) -> Option<(&str, &Revision)> {
    payload.pages.iter().find_map(|page| {
        page.revisions
            .iter()
            .find(|revision| revision.revid == revid)
            .map(|revision| (page.title.as_str(), revision))
    })
}

fn revision_size(ctx: &Ctx<'_>, wiki: &WikiReference, revid: u64) -> Result<Option<u64>, FetchError> {
    let response = ctx.query(
        wiki,
        &[
            ("action", "query".to_string()),
            ("prop", "revisions".to_string()),
            ("revids", revid.to_string()),
            ("rvprop", "ids|size".to_string()),
        ],
    )?;
    Ok(find_revision(&response.query, revid).map(|(_, revision)| revision.size))
}

/// Card describing one edit: editor, size change, tags and summary.
pub fn render(
    ctx: &Ctx<'_>,
    wiki: &WikiReference,
    request: DiffRequest,
    state: &ResolutionState,
) -> RenderedOutput {
    let mut revids = request.revision.to_string();
    if let Some(old) = request.compare_to {
        revids.push_str(&format!("|{old}"));
    }
    let response = match ctx.query(
        wiki,
        &[
            ("action", "query".to_string()),
            ("meta", "siteinfo".to_string()),
            ("siprop", SITEINFO_PROPS.to_string()),
            ("prop", "revisions".to_string()),
            ("revids", revids),
            ("rvprop", "ids|timestamp|flags|user|size|comment|tags".to_string()),
        ],
    ) {
        Ok(response) => response,
        Err(error) => return fetch_failure(&error, state),
    };
    let wiki = ctx.refresh(wiki, &response.query);
    let meta = SiteMeta::from_query(&response.query, &wiki).unwrap_or_default();

    let mut query = BTreeMap::from([("diff".to_string(), request.revision.to_string())]);
    if let Some(old) = request.compare_to {
        query.insert("oldid".to_string(), old.to_string());
    }
    let Some((title, revision)) = find_revision(&response.query, request.revision) else {
        let link = wiki.to_link("", &query, None);
        return RenderedOutput::text(spoiler_wrap(&link, state.spoiler)).marked(Reaction::Shrug);
    };
    let link = wiki.to_link(title, &query, None);
    if state.no_preview || state.spoiler {
        return RenderedOutput::text(spoiler_wrap(&link, state.spoiler));
    }

    let old_size = match request.compare_to {
        Some(old) => match find_revision(&response.query, old) {
            Some((_, old)) => Some(old.size),
            None => secondary_size(ctx, &wiki, old),
        },
        None if revision.parentid == 0 => Some(0),
        None => secondary_size(ctx, &wiki, revision.parentid),
    };
    if ctx.cancel.is_cancelled() {
        return RenderedOutput::Cancelled;
    }

    let mut card = Card::new(title, link.clone());
    card.author = site_author(&wiki, &meta);
    card.description = if revision.commenthidden {
        Some("*(summary removed)*".to_string())
    } else {
        bounded(
            revision.comment.as_deref().map(escape_formatting).as_deref(),
            ctx.budget.desc_length,
        )
    };

    let editor = match revision.user.as_deref() {
        Some(user) if !revision.userhidden => {
            let page = format!("{}:{user}", wiki.namespace_name(NS_USER));
            markdown_link(&escape_formatting(user), &wiki.page_link(&page))
        }
        _ => "*(username removed)*".to_string(),
    };
    card.fields.push(Field::new("Editor", editor, true));

    let size = match old_size {
        Some(old) => {
            let delta = revision.size as i64 - old as i64;
            format!("{} bytes ({delta:+})", revision.size)
        }
        None => format!("{} bytes", revision.size),
    };
    card.fields.push(Field::new("Size", size, true));
    if !revision.tags.is_empty() {
        card.fields
            .push(Field::new("Tags", escape_formatting(&revision.tags.join(", ")), true));
    }

    let mut footer = format_timestamp(&revision.timestamp);
    if revision.minor {
        footer.push_str(" \u{b7} minor edit");
    }
    card.footer = Some(footer).filter(|footer| !footer.is_empty());
    RenderedOutput::card(link, card)
}

fn secondary_size(ctx: &Ctx<'_>, wiki: &WikiReference, revid: u64) -> Option<u64> {
    if ctx.cancel.is_cancelled() {
        return None;
    }
    revision_size(ctx, wiki, revid)
        .best_effort("parent revision size")
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn from_args_accepts_one_or_two_revisions() {
        assert_eq!(
            DiffRequest::from_args("12"),
            Some(DiffRequest {
                revision: 12,
                compare_to: None,
            })
        );
        assert_eq!(
            DiffRequest::from_args(" 12  10 "),
            Some(DiffRequest {
                revision: 12,
                compare_to: Some(10),
            })
        );
        assert_eq!(DiffRequest::from_args(""), None);
        assert_eq!(DiffRequest::from_args("1 2 3"), None);
        assert_eq!(DiffRequest::from_args("12 abc"), None);
    }

    #[test]
    fn from_query_handles_relative_diffs() {
        assert_eq!(
            DiffRequest::from_query(&query(&[("diff", "prev"), ("oldid", "30")])),
            Some(DiffRequest {
                revision: 30,
                compare_to: None,
            })
        );
        assert_eq!(
            DiffRequest::from_query(&query(&[("diff", "31"), ("oldid", "31")])),
            Some(DiffRequest {
                revision: 31,
                compare_to: None,
            })
        );
        assert_eq!(DiffRequest::from_query(&query(&[("diff", "prev")])), None);
        assert_eq!(DiffRequest::from_query(&query(&[("oldid", "30")])), None);
    }
}
