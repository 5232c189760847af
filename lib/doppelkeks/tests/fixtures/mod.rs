#![allow(dead_code)]

use cookie::Cookie;
use doppelkeks::{Nonce, ParsedBody, Result, Secret, SessionToken, Validator, token};
use http::{HeaderMap, Request, header};

pub const SECRET: &str = "doppelkeks-test-secret-of-32-bytes";
pub const OTHER_SECRET: &str = "an-entirely-different-secret-value!";
pub const HOST: &str = "example.com";

pub fn validator() -> Validator {
    Validator::with_secret(SECRET).unwrap()
}

pub fn run<B>(
    validator: &Validator,
    request: Request<()>,
    body: Option<&B>,
) -> (Result<SessionToken>, HeaderMap)
where
    B: ParsedBody + ?Sized,
{
    let (parts, ()) = request.into_parts();
    let mut headers = HeaderMap::new();
    let result = validator.validate(&parts, body, &mut headers);
    (result, headers)
}

pub fn set_cookies(headers: &HeaderMap) -> Vec<Cookie<'static>> {
    headers
        .get_all(header::SET_COOKIE)
        .into_iter()
        .map(|value| Cookie::parse(value.to_str().unwrap().to_owned()).unwrap())
        .collect()
}

/// Perform the first request of a session and return the cookie nonce alongside the session token
pub fn issue(validator: &Validator) -> (String, SessionToken) {
    let request = Request::get("/")
        .header(header::HOST, HOST)
        .body(())
        .unwrap();
    let (result, headers) = run::<doppelkeks::FormBody>(validator, request, None);

    let cookies = set_cookies(&headers);
    assert_eq!(cookies.len(), 1);

    (cookies[0].value().to_owned(), result.unwrap())
}

/// Token the way a client would compute it from the cookie nonce
pub fn derive_hex(nonce_hex: &str, secret: &str) -> String {
    let nonce = Nonce::from_hex(nonce_hex).unwrap();
    let secret = Secret::new(secret).unwrap();
    token::derive_from_nonce(&nonce, &secret).to_hex()
}

pub fn cookie_header(nonce_hex: &str) -> String {
    format!("csrf-token={nonce_hex}")
}
