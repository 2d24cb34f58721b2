//! Transactions: `/v2/transactions`.
//!
//! `Transaction` and `TransactionError` also appear inside 4xx bodies of any
//! call that charges a card, where `classify` decodes them into
//! `Error::TransactionFailed`.

use std::fmt;

use crate::client::Client;
use crate::context::Context;
use crate::error::Result;
use crate::null::{NullBool, NullInt, NullTime};
use crate::pager::Pager;
use crate::pagination::ListOptions;
use crate::request::resource_path;
use crate::transport::Transport;
use crate::xml::{Element, FromXml, ToXml, XmlWriter};

const PATH: &str = "transactions";

/// A recorded payment, refund or verification.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transaction {
    pub uuid: String,
    pub action: String,
    pub amount_in_cents: NullInt,
    pub tax_in_cents: NullInt,
    pub currency: String,
    pub status: String,
    pub payment_method: String,
    pub reference: String,
    pub source: String,
    /// From the `href` of the nested `<account>` element.
    pub account_code: Option<String>,
    /// From the `href` of the nested `<invoice>` element.
    pub invoice_number: Option<i64>,
    pub test: NullBool,
    pub voidable: NullBool,
    pub refundable: NullBool,
    pub created_at: NullTime,
}

impl FromXml for Transaction {
    fn from_xml(element: &Element) -> Result<Self> {
        Ok(Transaction {
            uuid: element.child_text("uuid"),
            action: element.child_text("action"),
            amount_in_cents: element.nullable("amount_in_cents")?,
            tax_in_cents: element.nullable("tax_in_cents")?,
            currency: element.child_text("currency"),
            status: element.child_text("status"),
            payment_method: element.child_text("payment_method"),
            reference: element.child_text("reference"),
            source: element.child_text("source"),
            account_code: element.href_segment("account"),
            invoice_number: element.href_id("invoice")?,
            test: element.nullable("test")?,
            voidable: element.nullable("voidable")?,
            refundable: element.nullable("refundable")?,
            created_at: element.nullable("created_at")?,
        })
    }
}

/// Gateway diagnostics for a failed transaction.
///
/// `customer_message` is safe to show to the paying customer verbatim;
/// `merchant_message` is not.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionError {
    pub error_code: String,
    pub error_category: String,
    pub merchant_message: String,
    pub customer_message: String,
    pub gateway_error_code: String,
}

impl FromXml for TransactionError {
    fn from_xml(element: &Element) -> Result<Self> {
        Ok(TransactionError {
            error_code: element.child_text("error_code"),
            error_category: element.child_text("error_category"),
            merchant_message: element.child_text("merchant_message"),
            customer_message: element.child_text("customer_message"),
            gateway_error_code: element.child_text("gateway_error_code"),
        })
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = if self.customer_message.is_empty() {
            &self.merchant_message
        } else {
            &self.customer_message
        };
        match (self.error_code.is_empty(), message.is_empty()) {
            (false, false) => write!(f, "{} ({})", message, self.error_code),
            (false, true) => f.write_str(&self.error_code),
            (true, _) => f.write_str(message),
        }
    }
}

/// A one-off charge against an existing account's billing info.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewTransaction {
    pub account_code: String,
    pub amount_in_cents: i64,
    pub currency: String,
    pub description: String,
}

impl ToXml for NewTransaction {
    fn to_xml(&self, writer: &mut XmlWriter) -> Result<()> {
        writer.start("transaction")?;
        writer.element("amount_in_cents", &self.amount_in_cents.to_string())?;
        writer.string("currency", &self.currency)?;
        writer.string("description", &self.description)?;
        writer.start("account")?;
        writer.string("account_code", &self.account_code)?;
        writer.end("account")?;
        writer.end("transaction")
    }
}

pub fn list<'c, T: Transport>(client: &'c Client<T>, options: &ListOptions) -> Pager<'c, T> {
    client.pager(PATH, options)
}

/// Transactions of one account, newest first unless `options` says otherwise.
pub fn list_for_account<'c, T: Transport>(
    client: &'c Client<T>,
    account_code: &str,
    options: &ListOptions,
) -> Result<Pager<'c, T>> {
    let account = resource_path("accounts", account_code)?;
    Ok(client.pager(&format!("{account}/transactions"), options))
}

pub fn get<T: Transport>(client: &Client<T>, ctx: &Context, uuid: &str) -> Result<Option<Transaction>> {
    client.find(ctx, &resource_path(PATH, uuid)?)
}

/// Charge the account. A decline comes back as `Error::TransactionFailed`.
pub fn create<T: Transport>(client: &Client<T>, ctx: &Context, transaction: &NewTransaction) -> Result<Transaction> {
    client.post(ctx, PATH, transaction)
}
