//! Turning raw inbound requests into matchable descriptors.

use crate::stubs::StubbedRequest;
use std::collections::BTreeMap;

/// Decode one query component: `+`, `%20` and `%2B` become spaces, other
/// escapes are percent-decoded. Undecodable input is kept as it is.
fn decode_component(raw: &str) -> String {
    let spaced = raw
        .replace('+', " ")
        .replace("%20", " ")
        .replace("%2B", " ")
        .replace("%2b", " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Parse a raw query string into a name → value map.
///
/// Empty pairs are skipped and a name without `=` gets an empty value.
/// Values are decoded but not yet normalized; see
/// [`normalize_query_value`](crate::stubs::normalize_query_value).
pub fn parse_query_string(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(name), decode_component(value))
        })
        .collect()
}

/// Build the asserting request for one inbound HTTP request.
///
/// Header names are lower-cased and repeated headers are joined with `,`.
/// An empty body counts as no body.
pub fn to_stubbed_request<'a, H>(
    method: &str,
    path: &str,
    query: Option<&str>,
    headers: H,
    body: Option<String>,
) -> StubbedRequest
where
    H: IntoIterator<Item = (&'a str, &'a str)>,
{
    let url = urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string());

    let mut joined: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        joined
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    let mut builder = StubbedRequest::builder().with_url(url).with_method(method);
    for (name, value) in joined {
        builder = builder.with_header(name, value);
    }
    for (name, value) in query.map(parse_query_string).unwrap_or_default() {
        builder = builder.with_query_param(name, value);
    }
    if let Some(body) = body.filter(|b| !b.is_empty()) {
        builder = builder.with_post(body);
    }
    builder.build_incoming()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_string() {
        let query = parse_query_string("a=1&b=hello+world&&c&d=x%20y");
        assert_eq!(query.get("a").map(String::as_str), Some("1"));
        assert_eq!(query.get("b").map(String::as_str), Some("hello world"));
        assert_eq!(query.get("c").map(String::as_str), Some(""));
        assert_eq!(query.get("d").map(String::as_str), Some("x y"));
        assert_eq!(query.len(), 4);
    }

    #[test]
    fn test_quoted_arrays_normalize_to_same_value() {
        let values: Vec<String> = [
            "attributes=%5B%22id%22,%22uuid%22%5D",
            "attributes=['id','uuid']",
            "attributes=[id,%20uuid]",
            "attributes=%5B%27id%27%2C%27uuid%27%5D",
        ]
        .iter()
        .map(|q| {
            to_stubbed_request("GET", "/", Some(q), Vec::new(), None)
                .query()
                .get("attributes")
                .cloned()
                .unwrap()
        })
        .collect();

        assert!(values.iter().all(|v| v == "[id,uuid]"), "{values:?}");
    }

    #[test]
    fn test_descriptor_fields() {
        let headers = vec![
            ("Content-Type", "application/json"),
            ("X-Multi", "a"),
            ("x-multi", "b"),
        ];
        let request = to_stubbed_request(
            "post",
            "/items/hello%20there",
            Some("page=2"),
            headers,
            Some(r#"{"id": 1}"#.to_string()),
        );

        assert_eq!(request.url(), Some("/items/hello there"));
        assert_eq!(request.methods(), ["POST"]);
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("x-multi"), Some("a,b"));
        assert_eq!(request.query().get("page").map(String::as_str), Some("2"));
        assert_eq!(request.post_body(), Some(r#"{"id": 1}"#));
    }

    #[test]
    fn test_empty_body_is_absent() {
        let request = to_stubbed_request("GET", "/", None, Vec::new(), Some(String::new()));
        assert_eq!(request.post_body(), None);
    }
}
