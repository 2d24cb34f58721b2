//! In-memory stand-in for the Recurly v2 XML API.
//!
//! Serves just enough of the wire protocol to drive the client end to end:
//! accounts with cursor pagination, validation errors in both XML shapes, a
//! declining payment gateway, invoice PDFs, and fixed routes that always
//! answer 429 or 500.

pub mod wire;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
    Router,
};
use chrono::{SecondsFormat, Utc};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::wire::{Body, Document};

pub const RATE_LIMIT: u32 = 2000;
/// Fixed epoch second reported in `X-RateLimit-Reset`.
pub const RATE_LIMIT_RESET: i64 = 1_893_456_000;
pub const DEFAULT_PER_PAGE: usize = 50;
pub const MAX_PER_PAGE: usize = 200;
/// Charges of exactly this amount are declined by the gateway.
pub const DECLINED_AMOUNT_IN_CENTS: i64 = 2;
pub const FIRST_INVOICE_NUMBER: i64 = 1001;

const XML: &str = "application/xml; charset=utf-8";
const PDF: &str = "application/pdf";

#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub account_code: String,
    pub state: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
    pub tax_exempt: Option<bool>,
    pub created_at: String,
    pub closed_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub uuid: String,
    pub account_code: String,
    pub amount_in_cents: i64,
    pub currency: String,
    pub status: String,
    pub invoice_number: Option<i64>,
    pub created_at: String,
}

#[derive(Default)]
struct Store {
    accounts: Vec<Account>,
    transactions: Vec<Transaction>,
    invoices_issued: i64,
}

impl Store {
    fn account(&self, code: &str) -> Option<&Account> {
        self.accounts.iter().find(|account| account.account_code == code)
    }

    fn account_mut(&mut self, code: &str) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|account| account.account_code == code)
    }
}

#[derive(Clone, Default)]
pub struct AppState {
    store: Arc<RwLock<Store>>,
    requests: Arc<AtomicU32>,
}

pub fn app() -> Router {
    let state = AppState::default();
    Router::new()
        .route("/v2/accounts", get(list_accounts).post(create_account))
        .route(
            "/v2/accounts/{code}",
            get(get_account).put(update_account).delete(close_account),
        )
        .route("/v2/accounts/{code}/reopen", put(reopen_account))
        .route("/v2/accounts/{code}/transactions", get(account_transactions))
        .route("/v2/transactions", get(list_transactions).post(create_transaction))
        .route("/v2/transactions/{uuid}", get(get_transaction))
        .route("/v2/invoices/{number}", get(get_invoice))
        .route("/v2/rate_limited", get(rate_limited))
        .route("/v2/server_error", get(server_error))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Rejects requests without Basic credentials and stamps rate-limit headers.
async fn authenticate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .is_some_and(|credential| !credential.trim().is_empty());

    let used = state.requests.fetch_add(1, Ordering::Relaxed) + 1;
    let mut response = if authorized {
        next.run(request).await
    } else {
        single_error(StatusCode::UNAUTHORIZED, "unauthorized", "HTTP Basic: Access denied.")
    };

    let headers = response.headers_mut();
    headers
        .entry("x-ratelimit-limit")
        .or_insert_with(|| HeaderValue::from(RATE_LIMIT));
    headers
        .entry("x-ratelimit-remaining")
        .or_insert_with(|| HeaderValue::from(RATE_LIMIT.saturating_sub(used)));
    headers
        .entry("x-ratelimit-reset")
        .or_insert_with(|| HeaderValue::from(RATE_LIMIT_RESET));
    response
}

/// Scheme and host for absolute hrefs; empty when the client sent no Host.
fn origin(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .map(|host| format!("http://{host}"))
        .unwrap_or_default()
}

fn xml(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, XML)], body).into_response()
}

/// `<error>` with `<symbol>` and `<description>` children, as sent for 401/404.
fn single_error(status: StatusCode, symbol: &str, description: &str) -> Response {
    let body = Body::new()
        .open("error", &[])
        .text("symbol", Some(symbol))
        .element("description", &[("lang", "en-US")], description)
        .close("error")
        .finish();
    xml(status, body)
}

fn not_found(kind: &str, key: &str, value: &str) -> Response {
    single_error(
        StatusCode::NOT_FOUND,
        "not_found",
        &format!("Couldn't find {kind} with {key} = {value}"),
    )
}

/// `<errors>` list of (field, symbol, message).
fn validation_errors(errors: &[(&str, &str, &str)]) -> Response {
    let mut body = Body::new();
    body.open("errors", &[]);
    for (field, symbol, message) in errors {
        body.element("error", &[("field", *field), ("symbol", *symbol)], message);
    }
    body.close("errors");
    xml(StatusCode::UNPROCESSABLE_ENTITY, body.finish())
}

fn parse_body(body: &str, root: &str) -> Result<Document, Response> {
    match Document::parse(body) {
        Ok(document) if document.root == root => Ok(document),
        Ok(document) => Err(single_error(
            StatusCode::BAD_REQUEST,
            "invalid_xml",
            &format!("expected <{root}>, got <{}>", document.root),
        )),
        Err(reason) => Err(single_error(StatusCode::BAD_REQUEST, "invalid_xml", &reason)),
    }
}

fn write_account(body: &mut Body, origin: &str, account: &Account) {
    let href = format!("{origin}/v2/accounts/{}", account.account_code);
    body.open("account", &[("href", href.as_str())])
        .link("transactions", &format!("{href}/transactions"))
        .text("account_code", Some(account.account_code.as_str()))
        .text("state", Some(account.state.as_str()))
        .text("email", Some(account.email.as_str()))
        .text("first_name", Some(account.first_name.as_str()))
        .text("last_name", Some(account.last_name.as_str()))
        .text("company_name", Some(account.company_name.as_str()))
        .typed("tax_exempt", "boolean", account.tax_exempt.map(|v| v.to_string()))
        .typed("has_past_due_invoice", "boolean", Some("false".to_string()))
        .typed("created_at", "datetime", Some(account.created_at.clone()))
        .typed("closed_at", "datetime", account.closed_at.clone())
        .close("account");
}

fn write_transaction(body: &mut Body, origin: &str, transaction: &Transaction) {
    let href = format!("{origin}/v2/transactions/{}", transaction.uuid);
    body.open("transaction", &[("href", href.as_str()), ("type", "credit_card")])
        .link("account", &format!("{origin}/v2/accounts/{}", transaction.account_code));
    if let Some(number) = transaction.invoice_number {
        body.link("invoice", &format!("{origin}/v2/invoices/{number}"));
    }
    body.text("uuid", Some(transaction.uuid.as_str()))
        .text("action", Some("purchase"))
        .typed("amount_in_cents", "integer", Some(transaction.amount_in_cents.to_string()))
        .text("currency", Some(transaction.currency.as_str()))
        .text("status", Some(transaction.status.as_str()))
        .text("payment_method", Some("credit_card"))
        .typed("test", "boolean", Some("true".to_string()))
        .typed("voidable", "boolean", Some((transaction.status == "success").to_string()))
        .typed("refundable", "boolean", Some((transaction.status == "success").to_string()))
        .typed("created_at", "datetime", Some(transaction.created_at.clone()))
        .close("transaction");
}

fn account_response(status: StatusCode, origin: &str, account: &Account) -> Response {
    let mut body = Body::new();
    write_account(&mut body, origin, account);
    xml(status, body.finish())
}

fn transaction_response(status: StatusCode, origin: &str, transaction: &Transaction) -> Response {
    let mut body = Body::new();
    write_transaction(&mut body, origin, transaction);
    xml(status, body.finish())
}

/// Offset-based cursor pagination with `Link` and `X-Records` headers.
fn page<T>(
    path: &str,
    origin: &str,
    params: &HashMap<String, String>,
    items: &[T],
    wrapper: &str,
    write: impl Fn(&mut Body, &T),
) -> Response {
    let per_page = match params.get("per_page").map(|v| v.parse::<usize>()) {
        None => DEFAULT_PER_PAGE,
        Some(Ok(n)) if (1..=MAX_PER_PAGE).contains(&n) => n,
        Some(_) => {
            return single_error(StatusCode::BAD_REQUEST, "invalid_per_page", "per_page must be 1-200")
        }
    };
    let offset = match params.get("cursor").map(|v| v.parse::<usize>()) {
        None => 0,
        Some(Ok(n)) => n.min(items.len()),
        Some(Err(_)) => return single_error(StatusCode::BAD_REQUEST, "invalid_cursor", "unknown cursor"),
    };
    let end = (offset + per_page).min(items.len());

    let mut body = Body::new();
    body.open(wrapper, &[("type", "array")]);
    for item in &items[offset..end] {
        write(&mut body, item);
    }
    body.close(wrapper);

    let mut base = format!("{origin}{path}?per_page={per_page}");
    if let Some(state) = params.get("state") {
        base.push_str(&format!("&state={state}"));
    }
    let mut links = vec![format!(r#"<{base}>; rel="start""#)];
    if offset > 0 {
        let prev = offset.saturating_sub(per_page);
        links.push(format!(r#"<{base}&cursor={prev}>; rel="prev""#));
    }
    if end < items.len() {
        links.push(format!(r#"<{base}&cursor={end}>; rel="next""#));
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, XML.to_string()),
            (header::LINK, links.join(", ")),
            (header::HeaderName::from_static("x-records"), items.len().to_string()),
        ],
        body.finish(),
    )
        .into_response()
}

async fn list_accounts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let store = state.store.read().await;
    let accounts: Vec<&Account> = store
        .accounts
        .iter()
        .filter(|account| params.get("state").map_or(true, |state| &account.state == state))
        .collect();
    let origin = origin(&headers);
    page("/v2/accounts", &origin, &params, &accounts, "accounts", |body, account| {
        write_account(body, &origin, account)
    })
}

async fn create_account(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let document = match parse_body(&body, "account") {
        Ok(document) => document,
        Err(response) => return response,
    };
    let code = document.text("account_code").unwrap_or_default().trim().to_string();
    let email = document.text("email").unwrap_or_default().to_string();

    let mut store = state.store.write().await;
    let mut errors = Vec::new();
    if code.is_empty() {
        errors.push(("account.account_code", "blank", "can't be blank"));
    } else if store.account(&code).is_some() {
        errors.push(("account.account_code", "taken", "has already been taken"));
    }
    if !email.is_empty() && !email.contains('@') {
        errors.push(("account.email", "invalid_email", "is not a valid email address"));
    }
    if !errors.is_empty() {
        return validation_errors(&errors);
    }

    let account = Account {
        account_code: code,
        state: "active".to_string(),
        email,
        first_name: document.text("first_name").unwrap_or_default().to_string(),
        last_name: document.text("last_name").unwrap_or_default().to_string(),
        company_name: document.text("company_name").unwrap_or_default().to_string(),
        tax_exempt: document.text("tax_exempt").map(|v| v == "true"),
        created_at: now(),
        closed_at: None,
    };
    info!(account_code = %account.account_code, "account created");
    store.accounts.push(account.clone());
    account_response(StatusCode::CREATED, &origin(&headers), &account)
}

async fn get_account(State(state): State<AppState>, headers: HeaderMap, Path(code): Path<String>) -> Response {
    let store = state.store.read().await;
    match store.account(&code) {
        Some(account) => account_response(StatusCode::OK, &origin(&headers), account),
        None => not_found("Account", "account_code", &code),
    }
}

/// Fields absent from the body are left alone; a nil `tax_exempt` clears it.
async fn update_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    body: String,
) -> Response {
    let document = match parse_body(&body, "account") {
        Ok(document) => document,
        Err(response) => return response,
    };
    let mut store = state.store.write().await;
    let Some(account) = store.account_mut(&code) else {
        return not_found("Account", "account_code", &code);
    };
    if let Some(email) = document.text("email") {
        if !email.contains('@') {
            return validation_errors(&[("account.email", "invalid_email", "is not a valid email address")]);
        }
        account.email = email.to_string();
    }
    for (field, slot) in [
        ("first_name", &mut account.first_name),
        ("last_name", &mut account.last_name),
        ("company_name", &mut account.company_name),
    ] {
        if let Some(value) = document.get(field) {
            *slot = value.unwrap_or_default().to_string();
        }
    }
    if let Some(tax_exempt) = document.get("tax_exempt") {
        account.tax_exempt = tax_exempt.map(|v| v == "true");
    }
    info!(account_code = %code, "account updated");
    account_response(StatusCode::OK, &origin(&headers), account)
}

async fn close_account(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    let mut store = state.store.write().await;
    let Some(account) = store.account_mut(&code) else {
        return not_found("Account", "account_code", &code);
    };
    account.state = "closed".to_string();
    account.closed_at = Some(now());
    info!(account_code = %code, "account closed");
    StatusCode::NO_CONTENT.into_response()
}

async fn reopen_account(State(state): State<AppState>, headers: HeaderMap, Path(code): Path<String>) -> Response {
    let mut store = state.store.write().await;
    let Some(account) = store.account_mut(&code) else {
        return not_found("Account", "account_code", &code);
    };
    account.state = "active".to_string();
    account.closed_at = None;
    account_response(StatusCode::OK, &origin(&headers), account)
}

async fn account_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let store = state.store.read().await;
    if store.account(&code).is_none() {
        return not_found("Account", "account_code", &code);
    }
    let transactions: Vec<&Transaction> = store
        .transactions
        .iter()
        .filter(|transaction| transaction.account_code == code)
        .collect();
    let origin = origin(&headers);
    let path = format!("/v2/accounts/{code}/transactions");
    page(&path, &origin, &params, &transactions, "transactions", |body, transaction| {
        write_transaction(body, &origin, transaction)
    })
}

async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let store = state.store.read().await;
    let transactions: Vec<&Transaction> = store.transactions.iter().collect();
    let origin = origin(&headers);
    page("/v2/transactions", &origin, &params, &transactions, "transactions", |body, transaction| {
        write_transaction(body, &origin, transaction)
    })
}

/// Charges an account. `DECLINED_AMOUNT_IN_CENTS` produces a gateway decline.
async fn create_transaction(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let document = match parse_body(&body, "transaction") {
        Ok(document) => document,
        Err(response) => return response,
    };
    let Some(amount_in_cents) = document.text("amount_in_cents").and_then(|v| v.trim().parse::<i64>().ok()) else {
        return validation_errors(&[("transaction.amount_in_cents", "not_a_number", "is not a number")]);
    };
    let account_code = document.text("account.account_code").unwrap_or_default().to_string();

    let mut store = state.store.write().await;
    if store.account(&account_code).is_none() {
        return validation_errors(&[("transaction.account.account_code", "not_found", "can't be found")]);
    }

    let mut transaction = Transaction {
        uuid: Uuid::new_v4().simple().to_string(),
        account_code,
        amount_in_cents,
        currency: document.text("currency").unwrap_or("USD").to_string(),
        status: "success".to_string(),
        invoice_number: None,
        created_at: now(),
    };
    let origin = origin(&headers);

    if amount_in_cents == DECLINED_AMOUNT_IN_CENTS {
        transaction.status = "declined".to_string();
        info!(uuid = %transaction.uuid, "transaction declined");
        store.transactions.push(transaction.clone());

        let mut body = Body::new();
        body.open("errors", &[])
            .open("transaction_error", &[])
            .text("error_code", Some("declined"))
            .text("error_category", Some("soft"))
            .text("merchant_message", Some("The customer's bank has declined their card."))
            .text("customer_message", Some("Your transaction was declined. Please use a different card."))
            .text("gateway_error_code", Some("05"))
            .close("transaction_error")
            .element(
                "error",
                &[("field", "transaction.account.base"), ("symbol", "declined")],
                "Your transaction was declined. Please use a different card.",
            );
        write_transaction(&mut body, &origin, &transaction);
        body.close("errors");
        return xml(StatusCode::UNPROCESSABLE_ENTITY, body.finish());
    }

    transaction.invoice_number = Some(FIRST_INVOICE_NUMBER + store.invoices_issued);
    store.invoices_issued += 1;
    info!(uuid = %transaction.uuid, amount_in_cents, "transaction succeeded");
    store.transactions.push(transaction.clone());
    transaction_response(StatusCode::CREATED, &origin, &transaction)
}

async fn get_transaction(State(state): State<AppState>, headers: HeaderMap, Path(uuid): Path<String>) -> Response {
    let store = state.store.read().await;
    match store.transactions.iter().find(|transaction| transaction.uuid == uuid) {
        Some(transaction) => transaction_response(StatusCode::OK, &origin(&headers), transaction),
        None => not_found("Transaction", "uuid", &uuid),
    }
}

/// XML by default; a PDF document when the client asks for `application/pdf`.
async fn get_invoice(State(state): State<AppState>, headers: HeaderMap, Path(number): Path<String>) -> Response {
    let store = state.store.read().await;
    let Some(transaction) = number
        .parse::<i64>()
        .ok()
        .and_then(|n| store.transactions.iter().find(|t| t.invoice_number == Some(n)))
    else {
        return not_found("Invoice", "invoice_number", &number);
    };

    let wants_pdf = headers
        .get(header::ACCEPT)
        .and_then(|accept| accept.to_str().ok())
        .is_some_and(|accept| accept.contains(PDF));
    if wants_pdf {
        return (StatusCode::OK, [(header::CONTENT_TYPE, PDF)], invoice_pdf(&number)).into_response();
    }

    let origin = origin(&headers);
    let href = format!("{origin}/v2/invoices/{number}");
    let body = Body::new()
        .open("invoice", &[("href", href.as_str())])
        .link("account", &format!("{origin}/v2/accounts/{}", transaction.account_code))
        .typed("invoice_number", "integer", Some(number.clone()))
        .text("state", Some("collected"))
        .typed("total_in_cents", "integer", Some(transaction.amount_in_cents.to_string()))
        .text("currency", Some(transaction.currency.as_str()))
        .close("invoice")
        .finish();
    xml(StatusCode::OK, body)
}

/// A tiny document with non-UTF-8 bytes, so clients must not treat it as text.
pub fn invoice_pdf(number: &str) -> Vec<u8> {
    let mut document = format!("%PDF-1.4\n% invoice {number}\n").into_bytes();
    document.extend_from_slice(&[0x25, 0xe2, 0xe3, 0xcf, 0xd3, 0x0a, 0x00, 0xff]);
    document.extend_from_slice(b"%%EOF\n");
    document
}

async fn rate_limited() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("x-ratelimit-limit", RATE_LIMIT.to_string()),
            ("x-ratelimit-remaining", "0".to_string()),
            ("x-ratelimit-reset", RATE_LIMIT_RESET.to_string()),
        ],
        "Rate limit exceeded",
    )
        .into_response()
}

async fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/html")],
        "<html><body><h1>We're sorry, but something went wrong.</h1>",
    )
        .into_response()
}
