/// In-memory HTTP model the interpreter operates on. There is no network
/// I/O anywhere in the crate: the fetch phase synthesizes the backend
/// response from the declared backend.

/// Case-insensitive multi-value header map. Insertion order is preserved
/// so `add` followed by collection behaves like the edge runtime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replaces every existing value under `name` with a single one.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.entries.push((name.to_string(), value.into()));
    }

    /// Appends a value, keeping existing ones (multi-value header).
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.entries.push((name.to_string(), value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub proto: String,
    pub headers: HeaderMap,
}

impl Request {
    pub fn new(method: impl Into<String>, url: &str) -> Self {
        let method = method.into();
        let mut headers = HeaderMap::new();
        // Absolute URLs split into a Host header and a path, the way a
        // client request line arrives at the edge.
        let (host, path) = split_url(url);
        if let Some(host) = host {
            headers.set("Host", host);
        }
        Self {
            method,
            url: path,
            proto: "HTTP/1.1".to_string(),
            headers,
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }
}

fn split_url(url: &str) -> (Option<String>, String) {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    match rest {
        Some(rest) => match rest.find('/') {
            Some(index) => (
                Some(rest[..index].to_string()),
                rest[index..].to_string(),
            ),
            None => (Some(rest.to_string()), "/".to_string()),
        },
        None => (None, url.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: i64,
    pub response: String,
    pub proto: String,
    pub headers: HeaderMap,
    pub body: String,
}

impl Response {
    pub fn new(status: i64) -> Self {
        Self {
            status,
            response: reason_phrase(status).to_string(),
            proto: "HTTP/1.1".to_string(),
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200)
    }
}

fn reason_phrase(status: i64) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.set("Host", "example.com");
        assert_eq!(headers.get("host"), Some("example.com"));
        assert_eq!(headers.get("HOST"), Some("example.com"));
    }

    #[test]
    fn append_keeps_multiple_values() {
        let mut headers = HeaderMap::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");
        assert_eq!(headers.get_all("set-cookie"), vec!["a=1", "b=2"]);
        headers.set("Set-Cookie", "c=3");
        assert_eq!(headers.get_all("Set-Cookie"), vec!["c=3"]);
    }

    #[test]
    fn request_splits_absolute_url() {
        let request = Request::get("http://localhost/path?q=1");
        assert_eq!(request.headers.get("Host"), Some("localhost"));
        assert_eq!(request.url, "/path?q=1");
        let bare = Request::get("http://localhost");
        assert_eq!(bare.url, "/");
    }
}
