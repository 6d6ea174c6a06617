use crate::api::{QueryPageRow, RecentChangeItem};
use crate::text::{escape_formatting, format_number, format_timestamp, markdown_link};
use crate::wiki::WikiReference;

/// How one `list=querypage` result row is turned into a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingShape {
    Titles,
    TitleCount,
    TitleSize,
    TitleTimestamp,
    Redirect,
    DoubleRedirect,
    MediaStatistics,
    GadgetUsage,
}

const LISTING_PAGES: &[(&str, ListingShape)] = &[
    ("Lonelypages", ListingShape::Titles),
    ("Deadendpages", ListingShape::Titles),
    ("Withoutinterwiki", ListingShape::Titles),
    ("Uncategorizedpages", ListingShape::Titles),
    ("Uncategorizedcategories", ListingShape::Titles),
    ("Uncategorizedimages", ListingShape::Titles),
    ("Uncategorizedtemplates", ListingShape::Titles),
    ("Unusedcategories", ListingShape::Titles),
    ("Unusedimages", ListingShape::TitleTimestamp),
    ("Unusedtemplates", ListingShape::Titles),
    ("Unwatchedpages", ListingShape::Titles),
    ("Ancientpages", ListingShape::TitleTimestamp),
    ("Longpages", ListingShape::TitleSize),
    ("Shortpages", ListingShape::TitleSize),
    ("Mostlinked", ListingShape::TitleCount),
    ("Mostlinkedcategories", ListingShape::TitleCount),
    ("Mostlinkedtemplates", ListingShape::TitleCount),
    ("Mostcategories", ListingShape::TitleCount),
    ("Mostimages", ListingShape::TitleCount),
    ("Mostinterwikis", ListingShape::TitleCount),
    ("Mostrevisions", ListingShape::TitleCount),
    ("Fewestrevisions", ListingShape::TitleCount),
    ("Wantedpages", ListingShape::TitleCount),
    ("Wantedcategories", ListingShape::TitleCount),
    ("Wantedfiles", ListingShape::TitleCount),
    ("Wantedtemplates", ListingShape::TitleCount),
    ("Listredirects", ListingShape::Redirect),
    ("BrokenRedirects", ListingShape::Redirect),
    ("DoubleRedirects", ListingShape::DoubleRedirect),
    ("MediaStatistics", ListingShape::MediaStatistics),
    ("GadgetUsage", ListingShape::GadgetUsage),
];

fn title_link(wiki: &WikiReference, title: &str) -> String {
    markdown_link(&escape_formatting(title), &wiki.page_link(title))
}

fn prefixed(wiki: &WikiReference, namespace: i32, title: &str) -> String {
    let title = title.replace('_', " ");
    match wiki.namespace_name(namespace) {
        "" => title,
        prefix => format!("{prefix}:{title}"),
    }
}

impl ListingShape {
    pub fn for_page(canonical: &str) -> Option<Self> {
        LISTING_PAGES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(canonical))
            .map(|(_, shape)| *shape)
    }

    fn line(self, row: &QueryPageRow, wiki: &WikiReference, lang: &str) -> String {
        let link = title_link(wiki, &row.title);
        let count = row.count().map(|count| format_number(count, lang));
        match self {
            Self::Titles => link,
            Self::TitleCount => match count {
                Some(count) => format!("{link} ({count})"),
                None => link,
            },
            Self::TitleSize => match count {
                Some(count) => format!("{link} ({count} bytes)"),
                None => link,
            },
            Self::TitleTimestamp => match row.timestamp.as_deref() {
                Some(timestamp) => format!("{link} ({})", format_timestamp(timestamp)),
                None => link,
            },
            Self::Redirect => match &row.database_result {
                Some(result) if !result.rd_title.is_empty() => format!(
                    "{link} \u{2192} {}",
                    title_link(wiki, &prefixed(wiki, result.rd_namespace, &result.rd_title))
                ),
                _ => link,
            },
            Self::DoubleRedirect => match &row.database_result {
                Some(result) if !result.b_title.is_empty() && !result.c_title.is_empty() => format!(
                    "{link} \u{2192} {} \u{2192} {}",
                    title_link(wiki, &prefixed(wiki, result.b_namespace, &result.b_title)),
                    title_link(wiki, &prefixed(wiki, result.c_namespace, &result.c_title)),
                ),
                _ => link,
            },
            // `<media type>;<mime type>`
            Self::MediaStatistics => {
                let (kind, mime) = row.title.split_once(';').unwrap_or(("", row.title.as_str()));
                let mut line = escape_formatting(mime.split(';').next().unwrap_or(mime));
                if !kind.is_empty() {
                    line.push_str(&format!(" ({})", escape_formatting(&kind.to_lowercase())));
                }
                if let Some(count) = count {
                    line.push_str(&format!(": {count} files"));
                }
                line
            }
            Self::GadgetUsage => {
                let name = escape_formatting(&row.title);
                match count {
                    Some(count) => format!("{name}: {count} users"),
                    None => name,
                }
            }
        }
    }

    /// One bulleted line per row.
    pub fn format(self, rows: &[QueryPageRow], wiki: &WikiReference, lang: &str) -> String {
        rows.iter()
            .map(|row| format!("\u{2022} {}", self.line(row, wiki, lang)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One bulleted line per recent change: page, editor, byte delta, time.
pub fn format_recent_changes(items: &[RecentChangeItem], wiki: &WikiReference, lang: &str) -> String {
    items
        .iter()
        .map(|item| {
            let mut line = format!("\u{2022} {}", title_link(wiki, &item.title));
            if let Some(user) = item.user.as_deref() {
                line.push_str(&format!(" by {}", escape_formatting(user)));
            }
            let delta = item.newlen as i64 - item.oldlen as i64;
            let magnitude = format_number(delta.unsigned_abs(), lang);
            let sign = if delta < 0 { '-' } else { '+' };
            line.push_str(&format!(" ({sign}{magnitude})"));
            if item.kind == "new" {
                line.push_str(" new");
            }
            if !item.timestamp.is_empty() {
                line.push_str(&format!(" {}", format_timestamp(&item.timestamp)));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
