use crate::error::Error;
use cookie::Cookie;
use http::{HeaderMap, HeaderValue, header, request::Parts, uri::Authority};
use std::{
    collections::{BTreeMap, HashMap},
    hash::BuildHasher,
};
use url::Url;

static JSON_CONTENT_TYPE: &str = "application/json";

/// How the request reached the server
///
/// Servers terminating TLS should insert this into the request extensions.
/// Without it the scheme of the request URI is consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Plain,
    Tls,
}

impl Transport {
    #[must_use]
    pub fn of(parts: &Parts) -> Self {
        if let Some(transport) = parts.extensions.get::<Self>() {
            return *transport;
        }

        if parts.uri.scheme() == Some(&http::uri::Scheme::HTTPS) {
            Self::Tls
        } else {
            Self::Plain
        }
    }

    fn scheme(self) -> &'static str {
        match self {
            Self::Plain => "http",
            Self::Tls => "https",
        }
    }
}

/// Request body that was parsed by an earlier layer
pub trait ParsedBody {
    fn field(&self, name: &str) -> Option<&str>;
}

impl<S> ParsedBody for HashMap<String, String, S>
where
    S: BuildHasher,
{
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl ParsedBody for BTreeMap<String, String> {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// Flat form body, either URL-encoded or a JSON object
///
/// Fields that occur more than once are ambiguous and read as absent.
/// Insert this into the request extensions to make the body visible to [`CsrfService`](crate::CsrfService).
#[derive(Clone, Debug, Default)]
pub struct FormBody {
    fields: HashMap<String, Option<String>>,
}

impl FormBody {
    pub fn from_bytes(content_type: Option<&HeaderValue>, body: &[u8]) -> Result<Self, Error> {
        let is_json = content_type
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(JSON_CONTENT_TYPE));

        let mut form = Self::default();
        if body.is_empty() {
            return Ok(form);
        }

        if is_json {
            let object: serde_json::Map<String, serde_json::Value> =
                serde_json::from_slice(body).map_err(Error::body)?;

            for (key, value) in object {
                if let serde_json::Value::String(value) = value {
                    form.insert(key, value);
                }
            }
        } else {
            let pairs: Vec<(String, String)> =
                serde_urlencoded::from_bytes(body).map_err(Error::body)?;

            for (key, value) in pairs {
                form.insert(key, value);
            }
        }

        Ok(form)
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.fields
            .entry(key)
            .and_modify(|slot| *slot = None)
            .or_insert(Some(value));
    }
}

impl ParsedBody for FormBody {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name)?.as_deref()
    }
}

impl<K, V> FromIterator<(K, V)> for FormBody
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut form = Self::default();
        for (key, value) in iter {
            form.insert(key.into(), value.into());
        }
        form
    }
}

/// Host the request was sent to, including the port if there is one
pub(crate) fn host(parts: &Parts) -> Option<&str> {
    if let Some(authority) = parts.uri.authority() {
        return Some(authority.as_str());
    }

    parts.headers.get(header::HOST)?.to_str().ok()
}

pub(crate) fn host_without_port(parts: &Parts) -> Option<String> {
    let authority: Authority = host(parts)?.parse().ok()?;
    Some(authority.host().to_owned())
}

pub(crate) fn url(parts: &Parts) -> Option<Url> {
    let scheme = Transport::of(parts).scheme();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or("/", |path_and_query| path_and_query.as_str());

    Url::parse(&format!("{scheme}://{}{path_and_query}", host(parts)?)).ok()
}

pub(crate) fn referrer(headers: &HeaderMap) -> Option<&HeaderValue> {
    headers
        .get(header::REFERER)
        .or_else(|| headers.get("referrer"))
}

/// First cookie with this name across all `Cookie` headers
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(header::COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };

        for cookie in Cookie::split_parse_encoded(value) {
            let cookie = match cookie {
                Ok(cookie) => cookie,
                Err(error) => {
                    debug!(?error, "failed to decode cookie");
                    continue;
                }
            };

            if cookie.name() == name {
                return Some(cookie.value_trimmed().to_owned());
            }
        }
    }

    None
}
