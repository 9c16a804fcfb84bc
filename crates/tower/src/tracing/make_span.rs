// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{borrow::Cow, net::SocketAddr};

use axum::extract::{ConnectInfo, MatchedPath};
use http::{
    Method, Request, Response, Version,
    header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, USER_AGENT},
};
use http_body::Body;
use opentelemetry::{Key, KeyValue};

use crate::RequestId;

const HTTP_METHOD: Key = Key::from_static_str("http.method");
const HTTP_TARGET: Key = Key::from_static_str("http.target");
const HTTP_ROUTE: Key = Key::from_static_str("http.route");
const HTTP_HOST: Key = Key::from_static_str("http.host");
const HTTP_SCHEME: Key = Key::from_static_str("http.scheme");
const HTTP_FLAVOR: Key = Key::from_static_str("http.flavor");
const HTTP_CLIENT_IP: Key = Key::from_static_str("http.client_ip");
const HTTP_USER_AGENT: Key = Key::from_static_str("http.user_agent");
const HTTP_REQUEST_CONTENT_LENGTH: Key = Key::from_static_str("http.request_content_length");
const HTTP_REQUEST_ID: Key = Key::from_static_str("http.request_id");
const HTTP_RESPONSE_CONTENT_LENGTH: Key = Key::from_static_str("http.response_content_length");
const HTTP_RESPONSE_CONTENT_TYPE: Key = Key::from_static_str("http.response_content_type");

#[inline]
pub(crate) fn http_method<B>(request: &Request<B>) -> &'static str {
    match request.method() {
        &Method::OPTIONS => "OPTIONS",
        &Method::GET => "GET",
        &Method::POST => "POST",
        &Method::PUT => "PUT",
        &Method::DELETE => "DELETE",
        &Method::HEAD => "HEAD",
        &Method::TRACE => "TRACE",
        &Method::CONNECT => "CONNECT",
        &Method::PATCH => "PATCH",
        _other => "_OTHER",
    }
}

#[inline]
fn http_flavor<B>(request: &Request<B>) -> &'static str {
    match request.version() {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_11 => "1.1",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _other => "_OTHER",
    }
}

fn http_route<B>(request: &Request<B>) -> Option<&str> {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
}

fn http_scheme<B>(request: &Request<B>) -> &str {
    request.uri().scheme_str().unwrap_or("http")
}

fn http_host<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host())
}

pub(crate) fn http_user_agent<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
}

/// The length of the request body, from the `Content-Length` header, or from
/// the body itself if it knows its exact size
pub(crate) fn request_content_length<B: Body>(request: &Request<B>) -> Option<u64> {
    request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .or_else(|| request.body().size_hint().exact())
}

pub(crate) fn response_content_length<B: Body>(response: &Response<B>) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .or_else(|| response.body().size_hint().exact())
}

/// Resolve the IP of the client which sent the request.
///
/// This is the first entry of the `X-Forwarded-For` header, then the
/// `X-Real-IP` header, then the address of the peer if the server was set up
/// to record it.
pub(crate) fn client_ip<B>(request: &Request<B>) -> Option<String> {
    let headers = request.headers();

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(ip) = forwarded.or_else(real_ip) {
        return Some(ip.to_owned());
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// The name of the span for this request.
///
/// This is the route pattern the request matched, which keeps the number of
/// distinct span names bounded.
pub(crate) fn span_name<B>(request: &Request<B>) -> Cow<'static, str> {
    match http_route(request) {
        Some(route) => Cow::Owned(route.to_owned()),
        None => Cow::Owned(format!("HTTP {} route not found", http_method(request))),
    }
}

/// The attributes set on the span when it starts
pub(crate) fn request_attributes<B: Body>(
    request: &Request<B>,
    request_id: &RequestId,
) -> Vec<KeyValue> {
    let mut attributes = vec![
        KeyValue::new(HTTP_METHOD, http_method(request)),
        KeyValue::new(
            HTTP_TARGET,
            request
                .uri()
                .path_and_query()
                .map_or_else(|| request.uri().path().to_owned(), ToString::to_string),
        ),
        KeyValue::new(HTTP_SCHEME, http_scheme(request).to_owned()),
        KeyValue::new(HTTP_FLAVOR, http_flavor(request)),
        KeyValue::new(HTTP_REQUEST_ID, request_id.to_string()),
    ];

    if let Some(route) = http_route(request) {
        attributes.push(KeyValue::new(HTTP_ROUTE, route.to_owned()));
    }

    if let Some(host) = http_host(request) {
        attributes.push(KeyValue::new(HTTP_HOST, host.to_owned()));
    }

    if let Some(ip) = client_ip(request) {
        attributes.push(KeyValue::new(HTTP_CLIENT_IP, ip));
    }

    if let Some(user_agent) = http_user_agent(request) {
        attributes.push(KeyValue::new(HTTP_USER_AGENT, user_agent.to_owned()));
    }

    if let Some(length) = request_content_length(request) {
        attributes.push(KeyValue::new(
            HTTP_REQUEST_CONTENT_LENGTH,
            i64::try_from(length).unwrap_or(i64::MAX),
        ));
    }

    attributes
}

/// The attributes set on the span once the response is known
pub(crate) fn response_attributes<B: Body>(response: &Response<B>) -> Vec<KeyValue> {
    let mut attributes = Vec::with_capacity(2);

    if let Some(length) = response_content_length(response) {
        attributes.push(KeyValue::new(
            HTTP_RESPONSE_CONTENT_LENGTH,
            i64::try_from(length).unwrap_or(i64::MAX),
        ));
    }

    if let Some(content_type) = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    {
        attributes.push(KeyValue::new(
            HTTP_RESPONSE_CONTENT_TYPE,
            content_type.to_owned(),
        ));
    }

    attributes
}
