use mhttp::http::request::{Method, Request, RequestBuilder};
use mhttp::http::response::StatusCode;
use mhttp::http::websocket::{
    self, UpgradeError, UpgradeResponse, WEBSOCKET_VERSION, rejection_response, validate_handshake,
};

fn upgrade_request() -> RequestBuilder {
    RequestBuilder::new()
        .method(Method::GET)
        .path("/chat")
        .header("Host", "server.example.com")
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
        .header("Sec-WebSocket-Version", "13")
}

fn decide(req: &Request) -> UpgradeResponse {
    websocket::accept(req, |_ws| async {})
}

#[test]
fn test_accept_key_matches_rfc_example() {
    let req = upgrade_request().build().unwrap();

    match decide(&req) {
        UpgradeResponse::Accept(accept) => {
            assert_eq!(accept.accept_key(), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
            assert_eq!(accept.handshake.version, WEBSOCKET_VERSION);
        }
        other => panic!("expected accept, got {other:?}"),
    }
}

#[test]
fn test_accept_response_headers() {
    let req = upgrade_request().build().unwrap();
    let UpgradeResponse::Accept(accept) = decide(&req) else {
        panic!("expected accept");
    };
    let response = accept.response();

    assert_eq!(response.status, StatusCode::SwitchingProtocols);
    assert_eq!(response.header("Upgrade"), Some("websocket"));
    assert_eq!(response.header("Connection"), Some("Upgrade"));
    assert_eq!(
        response.header("Sec-WebSocket-Accept"),
        Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
    );
    assert!(response.body.is_empty());
}

#[test]
fn test_connection_header_token_list() {
    let req = upgrade_request()
        .header("Connection", "keep-alive, Upgrade")
        .header("Upgrade", "WebSocket")
        .build()
        .unwrap();

    assert!(validate_handshake(&req).is_ok());
}

#[test]
fn test_extensions_are_recorded() {
    let req = upgrade_request()
        .header("Sec-WebSocket-Extensions", "permessage-deflate")
        .build()
        .unwrap();

    let handshake = validate_handshake(&req).unwrap();
    assert_eq!(handshake.extensions.as_deref(), Some("permessage-deflate"));
}

#[test]
fn test_missing_headers_reject_with_bad_request() {
    let cases = [
        ("Upgrade", UpgradeError::MissingUpgrade),
        ("Connection", UpgradeError::MissingConnectionUpgrade),
        ("Sec-WebSocket-Key", UpgradeError::MissingKey),
        ("Sec-WebSocket-Version", UpgradeError::MissingVersion),
    ];

    for (name, expected) in cases {
        let mut req = upgrade_request().build().unwrap();
        let mut headers = mhttp::http::request::Headers::new();
        for (k, v) in req.headers.iter().filter(|(k, _)| !k.eq_ignore_ascii_case(name)) {
            headers.insert(k, v);
        }
        req.headers = headers;

        assert_eq!(validate_handshake(&req), Err(expected.clone()), "without {name}");
        assert_eq!(expected.status(), StatusCode::BadRequest);
        assert_eq!(decide(&req).status(), StatusCode::BadRequest);
    }
}

#[test]
fn test_unsupported_version_requires_upgrade() {
    let req = upgrade_request()
        .header("Sec-WebSocket-Version", "8")
        .build()
        .unwrap();

    assert_eq!(
        validate_handshake(&req),
        Err(UpgradeError::UnsupportedVersion("8".to_string()))
    );
    assert_eq!(decide(&req).status(), StatusCode::UpgradeRequired);

    let response = rejection_response(StatusCode::UpgradeRequired);
    assert_eq!(response.header("Sec-WebSocket-Version"), Some("13"));
}

#[test]
fn test_non_get_is_rejected() {
    let req = upgrade_request().method(Method::POST).build().unwrap();

    assert_eq!(
        validate_handshake(&req),
        Err(UpgradeError::NotGet(Method::POST))
    );
}

#[test]
fn test_explicit_reject() {
    let decision = websocket::reject(StatusCode::Forbidden);

    assert_eq!(decision.status(), StatusCode::Forbidden);
    assert!(rejection_response(StatusCode::Forbidden)
        .header("Sec-WebSocket-Version")
        .is_none());
}
