use crate::{request::FormBody, validator::Validator};
use http::{HeaderMap, Request, Response, header};
use pin_project_lite::pin_project;
use std::{
    future::Future,
    pin::Pin,
    task::{self, Poll, ready},
};
use tower_layer::Layer;
use tower_service::Service;

fn append_cookies(response_headers: &mut HeaderMap, cookies: &HeaderMap) {
    for value in cookies.get_all(header::SET_COOKIE) {
        response_headers.append(header::SET_COOKIE, value.clone());
    }
}

pin_project! {
    #[project = ResponseFutureProj]
    pub enum ResponseFuture<F, ResBody> {
        Inner {
            #[pin]
            future: F,
            cookies: HeaderMap,
        },
        Rejected {
            response: Option<Response<ResBody>>,
        },
    }
}

impl<F, ResBody, E> Future for ResponseFuture<F, ResBody>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = Result<Response<ResBody>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ResponseFutureProj::Inner { future, cookies } => {
                let mut response = ready!(future.poll(cx))?;
                append_cookies(response.headers_mut(), cookies);

                Poll::Ready(Ok(response))
            }
            ResponseFutureProj::Rejected { response } => {
                Poll::Ready(Ok(response.take().expect("polled after completion")))
            }
        }
    }
}

/// Runs the [`Validator`] in front of the inner service
///
/// Requests that fail validation never reach the inner service. They are answered with an empty body
/// and the status of the error (mostly `403 Forbidden`).
///
/// Successful requests carry the [`SessionToken`](crate::SessionToken) in their extensions.
/// A [`FormBody`] in the request extensions is used as the parsed request body.
#[derive(Clone)]
pub struct CsrfService<S> {
    inner: S,
    validator: Validator,
}

impl<S> CsrfService<S> {
    pub fn new(inner: S, validator: Validator) -> Self {
        Self { inner, validator }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CsrfService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Default,
{
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, ResBody>;
    type Response = S::Response;

    #[inline]
    fn poll_ready(&mut self, cx: &mut task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let (mut parts, body) = req.into_parts();
        let mut cookies = HeaderMap::new();

        let form = parts.extensions.get::<FormBody>();
        match self.validator.validate(&parts, form, &mut cookies) {
            Ok(session_token) => {
                parts.extensions.insert(session_token);

                ResponseFuture::Inner {
                    future: self.inner.call(Request::from_parts(parts, body)),
                    cookies,
                }
            }
            Err(error) => {
                let mut response = Response::new(ResBody::default());
                *response.status_mut() = error.status_code();
                append_cookies(response.headers_mut(), &cookies);

                ResponseFuture::Rejected {
                    response: Some(response),
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct CsrfLayer {
    validator: Validator,
}

impl CsrfLayer {
    #[must_use]
    pub fn new(validator: Validator) -> Self {
        Self { validator }
    }
}

impl<S> Layer<S> for CsrfLayer {
    type Service = CsrfService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfService::new(inner, self.validator.clone())
    }
}
