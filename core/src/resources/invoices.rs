//! Invoices: binary PDF download.

use tracing::debug;

use crate::client::Client;
use crate::context::Context;
use crate::error::Result;
use crate::http::HttpMethod;
use crate::request::Query;
use crate::transport::Transport;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Download the rendered invoice. The bytes are returned untouched.
pub fn pdf<T: Transport>(client: &Client<T>, ctx: &Context, invoice_number: i64) -> Result<Vec<u8>> {
    let mut request = client.builder().build(
        HttpMethod::Get,
        &format!("invoices/{invoice_number}"),
        &Query::new(),
        None,
    )?;
    request.set_header("Accept", PDF_MEDIA_TYPE);
    let body = client.send(ctx, &request)?.into_body();
    debug!(invoice_number, bytes = body.len(), "downloaded invoice pdf");
    Ok(body)
}
