use crate::{
    BODY_FIELD, COOKIE_NAME, HEADER_NAME, Result,
    config::Configuration,
    error::{Error, TokenError},
    request::{self, ParsedBody, Transport},
    token::{self, Nonce, Token},
};
use cookie::{Cookie, SameSite, time::Duration};
use http::{HeaderMap, HeaderValue, header, request::Parts};
use std::fmt;
use triomphe::Arc;
use url::Url;

/// Token of the current browser session
///
/// Its hex form is what has to be echoed back in the `x-csrf-token` header or the `_csrf` body field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionToken(Token);

impl SessionToken {
    #[inline]
    #[must_use]
    pub fn token(&self) -> &Token {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

fn append_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) {
    match HeaderValue::try_from(cookie.encoded().to_string()) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(error) => error!(?error, "failed to encode cookie header"),
    }
}

fn reset_cookie() -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

/// Double-submit cookie validator
///
/// Cheap to clone, the configuration is shared.
#[derive(Clone, Debug)]
pub struct Validator {
    config: Arc<Configuration>,
}

impl Validator {
    #[must_use]
    pub fn new(config: Configuration) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Validator with the default configuration
    pub fn with_secret<K>(secret: K) -> Result<Self>
    where
        K: AsRef<[u8]>,
    {
        Configuration::new(secret).map(Self::new)
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Validate a request
    ///
    /// Cookies are written into `response_headers` as `Set-Cookie` headers.
    /// On success that's the freshly issued cookie (if the browser had none).
    /// On failure the cookie is reset instead so the browser discards its token.
    ///
    /// `body` is the parsed request body, if a body parser ran before this.
    #[instrument(skip_all, fields(method = %parts.method, path = parts.uri.path()))]
    pub fn validate<B>(
        &self,
        parts: &Parts,
        body: Option<&B>,
        response_headers: &mut HeaderMap,
    ) -> Result<SessionToken>
    where
        B: ParsedBody + ?Sized,
    {
        let result = self
            .resolve(parts)
            .and_then(|(session_token, issued)| {
                self.check(parts, body, &session_token)?;
                Ok((session_token, issued))
            });

        match result {
            Ok((session_token, issued)) => {
                if let Some(cookie) = issued {
                    append_cookie(response_headers, &cookie);
                }

                Ok(SessionToken(session_token))
            }
            Err(error) => {
                debug!(?error, "rejected request");
                append_cookie(response_headers, &reset_cookie());
                Err(error)
            }
        }
    }

    /// Recover the session token from the cookie or issue a new one
    fn resolve(&self, parts: &Parts) -> Result<(Token, Option<Cookie<'static>>)> {
        let secret = &self.config.secret;

        match request::cookie_value(&parts.headers, COOKIE_NAME) {
            Some(value) if !value.is_empty() => {
                let nonce = Nonce::from_hex(value)?;
                Ok((token::derive_from_nonce(&nonce, secret), None))
            }
            _ => {
                let token = token::generate(secret);
                Ok((token, Some(self.issue_cookie(parts, &token.nonce()))))
            }
        }
    }

    fn issue_cookie(&self, parts: &Parts, nonce: &Nonce) -> Cookie<'static> {
        let max_age = i64::try_from(self.config.max_age).unwrap_or(i64::MAX);
        let mut cookie = Cookie::build((COOKIE_NAME, nonce.to_hex()))
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Strict)
            .max_age(Duration::seconds(max_age))
            .path("/")
            .build();

        if let Some(domain) = request::host_without_port(parts) {
            cookie.set_domain(domain);
        }

        cookie
    }

    fn check<B>(&self, parts: &Parts, body: Option<&B>, session_token: &Token) -> Result<()>
    where
        B: ParsedBody + ?Sized,
    {
        if !self.config.is_checked(&parts.method) {
            return Ok(());
        }

        if self.config.is_excluded(parts.uri.path()) {
            debug!("path is excluded from verification");
            return Ok(());
        }

        if Transport::of(parts) == Transport::Tls {
            check_origin(parts)?;
        }

        let candidate = extract_candidate(&parts.headers, body)?;
        let candidate = Token::from_hex(candidate)?;
        token::verify(candidate.as_bytes(), &self.config.secret)?;

        if candidate == *session_token {
            Ok(())
        } else {
            Err(Error::TokenMismatch)
        }
    }
}

fn check_origin(parts: &Parts) -> Result<()> {
    let referrer = request::referrer(&parts.headers).ok_or(Error::ReferrerMissing)?;
    let referrer = referrer
        .to_str()
        .ok()
        .and_then(|referrer| Url::parse(referrer).ok())
        .ok_or(Error::ReferrerMismatch)?;
    let request_url = request::url(parts).ok_or(Error::ReferrerMismatch)?;

    // Scheme and host only, the port is not part of the comparison
    if referrer.scheme() == request_url.scheme() && referrer.host() == request_url.host() {
        Ok(())
    } else {
        Err(Error::ReferrerMismatch)
    }
}

/// Header first, body second
fn extract_candidate<'a, B>(headers: &'a HeaderMap, body: Option<&'a B>) -> Result<&'a str>
where
    B: ParsedBody + ?Sized,
{
    if let Some(value) = headers.get(HEADER_NAME) {
        let value = value
            .to_str()
            .map_err(|_| Error::InvalidToken(TokenError::Encoding))?;

        if !value.is_empty() {
            return Ok(value);
        }
    }

    let Some(body) = body else {
        return Err(Error::BodyNotParsed);
    };

    body.field(BODY_FIELD)
        .filter(|value| !value.is_empty())
        .ok_or(Error::MissingToken)
}

#[cfg(feature = "axum")]
mod axum_impl {
    use super::SessionToken;
    use axum_core::{
        extract::FromRequestParts,
        response::{IntoResponse, Response},
    };
    use http::{StatusCode, request::Parts};

    /// The CSRF layer wasn't applied to this route
    #[derive(Debug)]
    pub struct MissingSessionToken;

    impl IntoResponse for MissingSessionToken {
        fn into_response(self) -> Response {
            error!("CSRF layer is missing from the service stack");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }

    impl<S> FromRequestParts<S> for SessionToken
    where
        S: Sync,
    {
        type Rejection = MissingSessionToken;

        async fn from_request_parts(
            parts: &mut Parts,
            _state: &S,
        ) -> Result<Self, Self::Rejection> {
            parts
                .extensions
                .get::<Self>()
                .cloned()
                .ok_or(MissingSessionToken)
        }
    }

    #[cfg(test)]
    mod test {
        use super::MissingSessionToken;
        use crate::{FormBody, SessionToken, Validator};
        use axum_core::extract::FromRequestParts;
        use http::{HeaderMap, Request};

        const SECRET: &str = "0123456789abcdef0123456789abcdef";

        #[futures_test::test]
        async fn extracts_session_token() {
            let validator = Validator::with_secret(SECRET).unwrap();
            let (mut parts, ()) = Request::new(()).into_parts();
            let session_token = validator
                .validate::<FormBody>(&parts, None, &mut HeaderMap::new())
                .unwrap();
            parts.extensions.insert(session_token.clone());

            let extracted = SessionToken::from_request_parts(&mut parts, &())
                .await
                .unwrap();
            assert_eq!(extracted, session_token);
        }

        #[futures_test::test]
        async fn missing_layer_rejects() {
            let (mut parts, ()) = Request::new(()).into_parts();
            let result = SessionToken::from_request_parts(&mut parts, &()).await;
            assert!(matches!(result, Err(MissingSessionToken)));
        }
    }
}

#[cfg(feature = "axum")]
pub use self::axum_impl::MissingSessionToken;
