use std::collections::BTreeMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::FetchError;

/// Decode a raw API payload into one of the typed responses below.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, FetchError> {
    serde_json::from_value(value).map_err(|error| FetchError::Malformed {
        url: String::new(),
        message: error.to_string(),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct QueryResponse {
    pub query: QueryPayload,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct QueryPayload {
    pub general: Option<GeneralInfo>,
    pub namespaces: BTreeMap<String, NamespaceInfo>,
    pub namespacealiases: Vec<NamespaceAlias>,
    pub specialpagealiases: Vec<SpecialPageAlias>,
    pub allmessages: Vec<MessageItem>,
    pub statistics: Option<Statistics>,
    pub rightsinfo: Option<RightsInfo>,
    pub pages: Vec<PageItem>,
    pub redirects: Vec<RedirectItem>,
    pub interwiki: Vec<InterwikiItem>,
    pub search: Vec<SearchItem>,
    pub searchinfo: Option<SearchInfo>,
    pub users: Vec<UserItem>,
    pub blocks: Vec<BlockItem>,
    pub usercontribs: Vec<ContributionItem>,
    pub recentchanges: Vec<RecentChangeItem>,
    pub querypage: Option<QueryPagePayload>,
}

impl QueryPayload {
    pub fn message(&self, name: &str) -> Option<&str> {
        self.allmessages
            .iter()
            .find(|message| message.name == name && !message.missing)
            .and_then(|message| message.content.as_deref())
            .map(str::trim)
            .filter(|content| !content.is_empty() && *content != "-")
    }

    pub fn site_info(&self) -> Option<SiteInfo<'_>> {
        self.general.as_ref().map(|general| SiteInfo {
            general,
            namespaces: &self.namespaces,
            aliases: &self.namespacealiases,
            special_aliases: &self.specialpagealiases,
        })
    }
}

/// Borrowed view over the siteinfo parts used to refresh a wiki reference.
#[derive(Debug, Clone, Copy)]
pub struct SiteInfo<'a> {
    pub general: &'a GeneralInfo,
    pub namespaces: &'a BTreeMap<String, NamespaceInfo>,
    pub aliases: &'a [NamespaceAlias],
    pub special_aliases: &'a [SpecialPageAlias],
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct GeneralInfo {
    pub mainpage: String,
    pub sitename: String,
    pub logo: Option<String>,
    pub generator: String,
    pub lang: String,
    pub server: String,
    pub scriptpath: String,
    pub articlepath: String,
    pub wikiid: String,
    pub centralidlookupprovider: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NamespaceInfo {
    pub id: i32,
    pub name: String,
    pub canonical: Option<String>,
    pub content: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NamespaceAlias {
    pub id: i32,
    pub alias: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SpecialPageAlias {
    pub realname: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MessageItem {
    pub name: String,
    pub content: Option<String>,
    pub missing: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Statistics {
    pub pages: u64,
    pub articles: u64,
    pub edits: u64,
    pub images: u64,
    pub users: u64,
    pub activeusers: u64,
    pub admins: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RightsInfo {
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PageItem {
    pub pageid: Option<u64>,
    pub ns: i32,
    pub title: String,
    pub missing: bool,
    pub known: bool,
    pub invalid: bool,
    pub redirect: bool,
    pub contentmodel: String,
    pub pageprops: PageProps,
    pub original: Option<ImageSource>,
    pub pageimage: Option<String>,
    pub extract: Option<String>,
    pub categoryinfo: Option<CategoryInfo>,
    pub revisions: Vec<Revision>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PageProps {
    pub displaytitle: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "wikibase-shortdesc")]
    pub shortdesc: Option<String>,
    pub page_image_free: Option<String>,
    pub disambiguation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ImageSource {
    pub source: String,
    pub width: u64,
    pub height: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CategoryInfo {
    pub size: u64,
    pub pages: u64,
    pub files: u64,
    pub subcats: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Revision {
    pub revid: u64,
    pub parentid: u64,
    pub minor: bool,
    pub user: Option<String>,
    pub userhidden: bool,
    pub timestamp: String,
    pub size: u64,
    pub comment: Option<String>,
    pub commenthidden: bool,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RedirectItem {
    pub from: String,
    pub to: String,
    pub tofragment: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct InterwikiItem {
    pub title: String,
    pub iw: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SearchItem {
    pub ns: i32,
    pub title: String,
    pub size: u64,
    pub wordcount: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SearchInfo {
    pub totalhits: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UserItem {
    pub userid: Option<u64>,
    pub name: String,
    pub missing: bool,
    pub invalid: bool,
    pub editcount: Option<u64>,
    pub registration: Option<String>,
    pub groups: Vec<String>,
    pub gender: Option<String>,
    pub blockid: Option<u64>,
    pub blockedby: Option<String>,
    pub blockreason: Option<String>,
    pub blockexpiry: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BlockItem {
    pub id: u64,
    pub user: String,
    pub by: String,
    pub timestamp: String,
    pub expiry: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ContributionItem {
    pub revid: u64,
    pub title: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RecentChangeItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub user: Option<String>,
    pub timestamp: String,
    pub oldlen: u64,
    pub newlen: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct QueryPagePayload {
    pub name: String,
    pub results: Vec<QueryPageRow>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct QueryPageRow {
    pub ns: i32,
    pub title: String,
    pub value: Value,
    pub timestamp: Option<String>,
    #[serde(rename = "databaseResult")]
    pub database_result: Option<DatabaseResult>,
}

impl QueryPageRow {
    /// `value` arrives as a string or a number depending on the page.
    pub fn count(&self) -> Option<u64> {
        match &self.value {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseResult {
    pub b_namespace: i32,
    pub b_title: String,
    pub c_namespace: i32,
    pub c_title: String,
    pub rd_namespace: i32,
    pub rd_title: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ParseResponse {
    pub parse: ParsePayload,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ParsePayload {
    pub title: String,
    pub displaytitle: Option<String>,
    pub text: String,
    pub images: Vec<String>,
}
