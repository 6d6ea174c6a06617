use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::client::{FetchError, WikiApi, check_api_error};
use crate::resolve::CancellationFlag;
use crate::wiki::WikiReference;

struct Route {
    wiki: String,
    params: Vec<(String, String)>,
    response: Result<Value, FetchError>,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub wiki: String,
    pub params: BTreeMap<String, String>,
}

/// Canned API responses keyed by wiki and a subset of request parameters.
///
/// A request is answered by the matching route with the most parameters;
/// requests without a route fail as transport errors.
pub struct FixtureApi {
    routes: Vec<Route>,
    calls: Mutex<Vec<Call>>,
    cancel_after: Option<(usize, CancellationFlag)>,
}

impl FixtureApi {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            calls: Mutex::new(Vec::new()),
            cancel_after: None,
        }
    }

    /// Raise `flag` once `count` requests have been answered.
    pub fn with_cancel_after(mut self, count: usize, flag: &CancellationFlag) -> Self {
        self.cancel_after = Some((count, flag.clone()));
        self
    }

    fn route(mut self, wiki_key: &str, params: &[(&str, &str)], response: Result<Value, FetchError>) -> Self {
        self.routes.push(Route {
            wiki: wiki_key.to_string(),
            params: params
                .iter()
                .filter(|(_, value)| !value.is_empty())
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            response,
        });
        self
    }

    pub fn with_response(self, wiki_key: &str, params: &[(&str, &str)], response: Value) -> Self {
        self.route(wiki_key, params, Ok(response))
    }

    pub fn with_error(self, wiki_key: &str, params: &[(&str, &str)], error: FetchError) -> Self {
        self.route(wiki_key, params, Err(error))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl WikiApi for FixtureApi {
    fn get_json(&self, wiki: &WikiReference, params: &[(&str, String)]) -> Result<Value, FetchError> {
        let request: BTreeMap<String, String> = params
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        let key = wiki.key();
        let made = {
            let mut calls = self.calls.lock();
            calls.push(Call {
                wiki: key.clone(),
                params: request.clone(),
            });
            calls.len()
        };
        if let Some((count, flag)) = &self.cancel_after
            && made >= *count
        {
            flag.cancel();
        }

        let route = self
            .routes
            .iter()
            .filter(|route| route.wiki == key)
            .filter(|route| {
                route
                    .params
                    .iter()
                    .all(|(name, value)| request.get(name) == Some(value))
            })
            .max_by_key(|route| route.params.len());
        match route {
            Some(route) => check_api_error(route.response.clone()?),
            None => Err(FetchError::Transport {
                url: wiki.api_url(),
                message: format!("no fixture for {request:?}"),
            }),
        }
    }
}

/// siteinfo `general` block for a wiki laid out as `/w/` + `/wiki/$1`.
pub fn general(server: &str, sitename: &str) -> Value {
    json!({
        "mainpage": "Main Page",
        "sitename": sitename,
        "generator": "MediaWiki 1.41.0",
        "lang": "en",
        "server": server,
        "scriptpath": "/w",
        "articlepath": "/wiki/$1",
    })
}

pub fn test_wiki(host: &str) -> WikiReference {
    WikiReference::from_base_url(&format!("https://{host}/w/")).expect("test wiki")
}
