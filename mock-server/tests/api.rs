use axum::http::{self, Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use mock_server::{app, wire::Document, DECLINED_AMOUNT_IN_CENTS, FIRST_INVOICE_NUMBER, RATE_LIMIT};
use pretty_assertions::assert_eq;
use tower::{Service, ServiceExt};

const AUTH: &str = "Basic a2V5";

async fn body_bytes(response: Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).unwrap()
}

fn request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, AUTH)
        .header(http::header::CONTENT_TYPE, "application/xml; charset=utf-8")
        .body(body.to_string())
        .unwrap()
}

fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

async fn call(app: &mut axum::routing::RouterIntoService<String>, request: Request<String>) -> Response {
    ServiceExt::ready(app).await.unwrap().call(request).await.unwrap()
}

fn account_xml(code: &str) -> String {
    format!("<account><account_code>{code}</account_code><email>{code}@example.com</email></account>")
}

// --- auth and headers ---

#[tokio::test]
async fn missing_credentials_return_401() {
    let resp = app()
        .oneshot(Request::builder().uri("/v2/accounts").body(String::new()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let document = Document::parse(&body_text(resp).await).unwrap();
    assert_eq!(document.root, "error");
    assert_eq!(document.text("symbol"), Some("unauthorized"));
}

#[tokio::test]
async fn every_response_carries_rate_limit_headers() {
    let resp = app().oneshot(request("GET", "/v2/accounts", "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "x-ratelimit-limit"), Some(RATE_LIMIT.to_string().as_str()));
    assert_eq!(header(&resp, "x-ratelimit-remaining"), Some("1999"));
    assert!(header(&resp, "x-ratelimit-reset").is_some());
    assert_eq!(header(&resp, "x-records"), Some("0"));
}

#[tokio::test]
async fn rate_limited_route_reports_zero_remaining() {
    let resp = app().oneshot(request("GET", "/v2/rate_limited", "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&resp, "x-ratelimit-remaining"), Some("0"));
}

#[tokio::test]
async fn server_error_route_returns_html() {
    let resp = app().oneshot(request("GET", "/v2/server_error", "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(resp).await.starts_with("<html>"));
}

// --- accounts ---

#[tokio::test]
async fn get_account_not_found_uses_single_error_shape() {
    let resp = app().oneshot(request("GET", "/v2/accounts/nope", "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let document = Document::parse(&body_text(resp).await).unwrap();
    assert_eq!(document.root, "error");
    assert_eq!(document.text("symbol"), Some("not_found"));
    assert_eq!(
        document.text("description"),
        Some("Couldn't find Account with account_code = nope")
    );
}

#[tokio::test]
async fn create_account_without_code_is_422() {
    let resp = app()
        .oneshot(request("POST", "/v2/accounts", "<account><email>bad</email></account>"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_text(resp).await;
    assert!(body.contains(r#"<error field="account.account_code" symbol="blank">can&apos;t be blank</error>"#));
    assert!(body.contains(r#"symbol="invalid_email""#));
}

#[tokio::test]
async fn malformed_body_is_400() {
    let resp = app()
        .oneshot(request("POST", "/v2/accounts", "<account><email>"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn account_lifecycle() {
    let mut app = app().into_service();

    let resp = call(&mut app, request("POST", "/v2/accounts", &account_xml("a1"))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = Document::parse(&body_text(resp).await).unwrap();
    assert_eq!(created.text("account_code"), Some("a1"));
    assert_eq!(created.text("state"), Some("active"));
    assert_eq!(created.get("tax_exempt"), Some(None));

    let resp = call(&mut app, request("POST", "/v2/accounts", &account_xml("a1"))).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(resp).await.contains(r#"symbol="taken""#));

    // partial update: only tax_exempt and first_name
    let update = "<account><first_name>Ada</first_name><tax_exempt>false</tax_exempt></account>";
    let resp = call(&mut app, request("PUT", "/v2/accounts/a1", update)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated = Document::parse(&body_text(resp).await).unwrap();
    assert_eq!(updated.text("first_name"), Some("Ada"));
    assert_eq!(updated.text("email"), Some("a1@example.com"));
    assert_eq!(updated.text("tax_exempt"), Some("false"));

    // nil clears
    let resp = call(
        &mut app,
        request("PUT", "/v2/accounts/a1", r#"<account><tax_exempt nil="nil"/></account>"#),
    )
    .await;
    let updated = Document::parse(&body_text(resp).await).unwrap();
    assert_eq!(updated.get("tax_exempt"), Some(None));

    let resp = call(&mut app, request("DELETE", "/v2/accounts/a1", "")).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    let resp = call(&mut app, request("GET", "/v2/accounts/a1", "")).await;
    let closed = Document::parse(&body_text(resp).await).unwrap();
    assert_eq!(closed.text("state"), Some("closed"));
    assert!(closed.text("closed_at").is_some());

    let resp = call(&mut app, request("PUT", "/v2/accounts/a1/reopen", "")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let reopened = Document::parse(&body_text(resp).await).unwrap();
    assert_eq!(reopened.text("state"), Some("active"));
    assert_eq!(reopened.get("closed_at"), Some(None));
}

#[tokio::test]
async fn list_paginates_with_link_cursors() {
    let mut app = app().into_service();
    for code in ["a1", "a2", "a3"] {
        let resp = call(&mut app, request("POST", "/v2/accounts", &account_xml(code))).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = call(&mut app, request("GET", "/v2/accounts?per_page=2", "")).await;
    assert_eq!(header(&resp, "x-records"), Some("3"));
    let link = header(&resp, "link").unwrap().to_string();
    assert!(link.contains(r#"/v2/accounts?per_page=2&cursor=2>; rel="next""#));
    assert!(!link.contains(r#"rel="prev""#));
    let body = body_text(resp).await;
    assert!(body.contains("<account_code>a1</account_code>"));
    assert!(body.contains("<account_code>a2</account_code>"));
    assert!(!body.contains("<account_code>a3</account_code>"));

    let resp = call(&mut app, request("GET", "/v2/accounts?per_page=2&cursor=2", "")).await;
    let link = header(&resp, "link").unwrap().to_string();
    assert!(!link.contains(r#"rel="next""#));
    assert!(link.contains(r#"cursor=0>; rel="prev""#));
    assert!(body_text(resp).await.contains("<account_code>a3</account_code>"));

    let resp = call(&mut app, request("GET", "/v2/accounts?cursor=zzz", "")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn head_on_list_returns_count_without_body() {
    let mut app = app().into_service();
    call(&mut app, request("POST", "/v2/accounts", &account_xml("a1"))).await;

    let resp = call(&mut app, request("HEAD", "/v2/accounts", "")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "x-records"), Some("1"));
    assert!(body_bytes(resp).await.is_empty());
}

// --- transactions and invoices ---

fn charge(code: &str, amount: i64) -> String {
    format!(
        "<transaction><amount_in_cents>{amount}</amount_in_cents><currency>USD</currency>\
         <account><account_code>{code}</account_code></account></transaction>"
    )
}

#[tokio::test]
async fn declined_charge_returns_transaction_error() {
    let mut app = app().into_service();
    call(&mut app, request("POST", "/v2/accounts", &account_xml("a1"))).await;

    let resp = call(&mut app, request("POST", "/v2/transactions", &charge("a1", DECLINED_AMOUNT_IN_CENTS))).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let document = Document::parse(&body_text(resp).await).unwrap();
    assert_eq!(document.root, "errors");
    assert_eq!(document.text("transaction_error.error_code"), Some("declined"));
    assert_eq!(document.text("transaction.status"), Some("declined"));
}

#[tokio::test]
async fn charge_for_unknown_account_is_422() {
    let resp = app()
        .oneshot(request("POST", "/v2/transactions", &charge("ghost", 100)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn successful_charge_issues_invoice_pdf() {
    let mut app = app().into_service();
    call(&mut app, request("POST", "/v2/accounts", &account_xml("a1"))).await;

    let resp = call(&mut app, request("POST", "/v2/transactions", &charge("a1", 1500))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_text(resp).await;
    assert!(body.contains(&format!("/v2/invoices/{FIRST_INVOICE_NUMBER}")));

    let mut pdf = request("GET", &format!("/v2/invoices/{FIRST_INVOICE_NUMBER}"), "");
    pdf.headers_mut()
        .insert(http::header::ACCEPT, http::HeaderValue::from_static("application/pdf"));
    let resp = call(&mut app, pdf).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "content-type"), Some("application/pdf"));
    let bytes = body_bytes(resp).await;
    assert_eq!(bytes.to_vec(), mock_server::invoice_pdf(&FIRST_INVOICE_NUMBER.to_string()));

    let resp = call(&mut app, request("GET", "/v2/invoices/999", "")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
