//! Request canonicalization: the exact string a request signature covers.
//!
//! ```text
//! <method or X-HTTP-Method-Override>
//! \n<x-ips-header>:<v1>,<v2>      one line per protocol header, names sorted
//! \n<raw url path>
//! \n<query name>:<value>          one line per parameter, names sorted
//! \n<body as UTF-8>               only when the body is non-empty
//! ```
//!
//! Client and server must agree on every byte. The output is never sent on
//! the wire, only signed.

use std::borrow::Cow;
use std::collections::BTreeMap;

use reqwest::Url;

use crate::transport::ApiRequest;

/// Header used to carry PATCH over POST.
pub const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";

/// Headers with this (lowercase) prefix are covered by the signature.
pub const PROTOCOL_HEADER_PREFIX: &str = "x-ips-";

/// How query parameters enter the signing string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueryCanonicalization {
    /// `\nname:value` per parameter, names sorted, repeated values joined by `,`.
    #[default]
    Sorted,
    /// Query string left out entirely (older deployments).
    Omitted,
}

/// Build the signing string for `request`.
pub fn canonicalize(request: &ApiRequest, query: QueryCanonicalization) -> String {
    let mut out = String::with_capacity(64 + request.url.path().len() + request.body.len());

    out.push_str(&effective_method(request));

    let mut names: Vec<&str> = request
        .headers
        .keys()
        .map(|n| n.as_str())
        .filter(|n| n.to_ascii_lowercase().starts_with(PROTOCOL_HEADER_PREFIX))
        .collect();
    names.sort_by_key(|n| n.to_ascii_lowercase());
    names.dedup();

    for name in names {
        let values: Vec<Cow<'_, str>> = request
            .headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
            .collect();
        if values.is_empty() {
            continue;
        }
        out.push('\n');
        out.push_str(&name.to_ascii_lowercase());
        out.push(':');
        out.push_str(&values.join(","));
    }

    out.push('\n');
    out.push_str(request.url.path());

    if query == QueryCanonicalization::Sorted {
        for (name, values) in sorted_query(&request.url) {
            out.push('\n');
            out.push_str(&name);
            out.push(':');
            out.push_str(&values.join(","));
        }
    }

    if !request.body.is_empty() {
        out.push('\n');
        out.push_str(&String::from_utf8_lossy(&request.body));
    }

    out
}

/// Method override header if present, else the literal method.
pub fn effective_method(request: &ApiRequest) -> Cow<'_, str> {
    match request.headers.get(METHOD_OVERRIDE_HEADER) {
        Some(v) => String::from_utf8_lossy(v.as_bytes()),
        None => Cow::Borrowed(request.method.as_str()),
    }
}

/// Decoded query parameters grouped by name; values keep their order.
fn sorted_query(url: &Url) -> BTreeMap<String, Vec<String>> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params.entry(name.into_owned()).or_default().push(value.into_owned());
    }
    params
}
