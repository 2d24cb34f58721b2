//! Accounts: `/v2/accounts`.

use crate::client::Client;
use crate::context::Context;
use crate::error::Result;
use crate::null::{NullBool, NullTime};
use crate::pager::Pager;
use crate::pagination::ListOptions;
use crate::request::resource_path;
use crate::transport::Transport;
use crate::xml::{Element, FromXml, ToXml, XmlWriter};

const PATH: &str = "accounts";

/// A customer account.
///
/// Read-only fields (`state`, timestamps, `has_past_due_invoice`) are decoded
/// but never sent back.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Account {
    pub account_code: String,
    pub state: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
    pub vat_number: String,
    pub accept_language: String,
    pub tax_exempt: NullBool,
    pub has_past_due_invoice: NullBool,
    pub created_at: NullTime,
    pub closed_at: NullTime,
}

impl Account {
    pub fn new(account_code: impl Into<String>) -> Self {
        Self {
            account_code: account_code.into(),
            ..Self::default()
        }
    }
}

impl ToXml for Account {
    fn to_xml(&self, writer: &mut XmlWriter) -> Result<()> {
        writer.start("account")?;
        writer.string("account_code", &self.account_code)?;
        writer.string("username", &self.username)?;
        writer.string("email", &self.email)?;
        writer.string("first_name", &self.first_name)?;
        writer.string("last_name", &self.last_name)?;
        writer.string("company_name", &self.company_name)?;
        writer.string("vat_number", &self.vat_number)?;
        writer.string("accept_language", &self.accept_language)?;
        writer.nullable("tax_exempt", &self.tax_exempt)?;
        writer.end("account")
    }
}

impl FromXml for Account {
    fn from_xml(element: &Element) -> Result<Self> {
        Ok(Account {
            account_code: element.child_text("account_code"),
            state: element.child_text("state"),
            username: element.child_text("username"),
            email: element.child_text("email"),
            first_name: element.child_text("first_name"),
            last_name: element.child_text("last_name"),
            company_name: element.child_text("company_name"),
            vat_number: element.child_text("vat_number"),
            accept_language: element.child_text("accept_language"),
            tax_exempt: element.nullable("tax_exempt")?,
            has_past_due_invoice: element.nullable("has_past_due_invoice")?,
            created_at: element.nullable("created_at")?,
            closed_at: element.nullable("closed_at")?,
        })
    }
}

fn account_path(code: &str) -> Result<String> {
    resource_path(PATH, code)
}

/// Page through accounts. Use `ListOptions::state` to filter by `active`,
/// `closed`, `past_due` and so on.
pub fn list<'c, T: Transport>(client: &'c Client<T>, options: &ListOptions) -> Pager<'c, T> {
    client.pager(PATH, options)
}

/// Look up an account; `Ok(None)` when it does not exist.
pub fn get<T: Transport>(client: &Client<T>, ctx: &Context, code: &str) -> Result<Option<Account>> {
    client.find(ctx, &account_path(code)?)
}

pub fn create<T: Transport>(client: &Client<T>, ctx: &Context, account: &Account) -> Result<Account> {
    client.post(ctx, PATH, account)
}

/// Partial update: empty strings and null fields in `account` are left
/// untouched on the server.
pub fn update<T: Transport>(
    client: &Client<T>,
    ctx: &Context,
    code: &str,
    account: &Account,
) -> Result<Account> {
    client.put(ctx, &account_path(code)?, Some(account))
}

/// Close the account. The server keeps it and marks it `closed`.
pub fn close<T: Transport>(client: &Client<T>, ctx: &Context, code: &str) -> Result<()> {
    client.delete(ctx, &account_path(code)?)
}

pub fn reopen<T: Transport>(client: &Client<T>, ctx: &Context, code: &str) -> Result<Account> {
    client.put(ctx, &format!("{}/reopen", account_path(code)?), None)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::ClientConfig;
    use crate::error::Error;
    use crate::http::{HttpMethod, HttpResponse};
    use crate::transport::testing::ScriptedTransport;
    use crate::xml;

    const ACCOUNT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <account href="https://acme.recurly.com/v2/accounts/a1">
          <adjustments href="https://acme.recurly.com/v2/accounts/a1/adjustments"/>
          <account_code>a1</account_code>
          <state>active</state>
          <username nil="nil"></username>
          <email>verena@example.com</email>
          <first_name>Verena</first_name>
          <last_name>Example</last_name>
          <company_name></company_name>
          <tax_exempt type="boolean">false</tax_exempt>
          <has_past_due_invoice type="boolean">true</has_past_due_invoice>
          <created_at type="datetime">2016-08-03T15:44:05Z</created_at>
          <closed_at nil="nil"></closed_at>
        </account>"#;

    fn client(responses: Vec<crate::error::Result<HttpResponse>>) -> Client<ScriptedTransport> {
        Client::with_transport(&ClientConfig::new("acme", "key"), ScriptedTransport::new(responses)).unwrap()
    }

    #[test]
    fn decodes_account() {
        let root = Element::parse(ACCOUNT_XML.as_bytes()).unwrap().unwrap();
        let account = Account::from_xml(&root).unwrap();
        assert_eq!(account.account_code, "a1");
        assert_eq!(account.username, "");
        assert_eq!(account.tax_exempt, NullBool::new(false));
        assert_eq!(account.has_past_due_invoice, NullBool::new(true));
        assert_eq!(
            account.created_at.get().copied(),
            Utc.with_ymd_and_hms(2016, 8, 3, 15, 44, 5).single()
        );
        assert!(!account.closed_at.is_valid());
    }

    #[test]
    fn encodes_only_writable_set_fields() {
        let account = Account {
            email: "new@example.com".to_string(),
            tax_exempt: NullBool::new(false),
            state: "closed".to_string(),
            ..Account::default()
        };
        assert_eq!(
            xml::to_document(&account).unwrap(),
            r#"<?xml version="1.0" encoding="UTF-8"?><account><email>new@example.com</email><tax_exempt>false</tax_exempt></account>"#
        );
    }

    #[test]
    fn update_puts_to_account_path() {
        let client = client(vec![Ok(HttpResponse::new(200).with_body(ACCOUNT_XML))]);
        let changes = Account {
            first_name: "Verena".to_string(),
            ..Account::default()
        };
        let updated = update(&client, &Context::background(), "a1", &changes).unwrap();
        assert_eq!(updated.first_name, "Verena");

        let request = &client.transport().requests()[0];
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.url, "https://acme.recurly.com/v2/accounts/a1");
        assert!(request.body.as_deref().unwrap().contains("<first_name>Verena</first_name>"));
    }

    #[test]
    fn unusable_codes_never_reach_the_server() {
        let client = client(Vec::new());
        let ctx = Context::background();
        assert!(matches!(get(&client, &ctx, ""), Err(Error::InvalidIdentifier(_))));
        assert!(matches!(close(&client, &ctx, "a1/reopen"), Err(Error::InvalidIdentifier(_))));
        assert!(matches!(
            update(&client, &ctx, " ", &Account::default()),
            Err(Error::InvalidIdentifier(_))
        ));
        assert!(client.transport().requests().is_empty());
    }

    #[test]
    fn reopen_sends_no_body() {
        let client = client(vec![Ok(HttpResponse::new(200).with_body(ACCOUNT_XML))]);
        reopen(&client, &Context::background(), "a1").unwrap();

        let request = &client.transport().requests()[0];
        assert_eq!(request.url, "https://acme.recurly.com/v2/accounts/a1/reopen");
        assert_eq!(request.body, None);
        assert_eq!(request.header("Content-Type"), None);
    }

    #[test]
    fn get_missing_account_is_none() {
        let body = "<error><symbol>not_found</symbol><description>Couldn't find Account</description></error>";
        let client = client(vec![Ok(HttpResponse::new(404).with_body(body))]);
        assert_eq!(get(&client, &Context::background(), "nope").unwrap(), None);
    }

    #[test]
    fn create_surfaces_validation_errors() {
        let body = r#"<errors><error field="account.account_code" symbol="taken">has already been taken</error></errors>"#;
        let client = client(vec![Ok(HttpResponse::new(422).with_body(body))]);
        let err = create(&client, &Context::background(), &Account::new("a1")).unwrap_err();
        assert!(matches!(err, Error::Validation { status: 422, .. }));
        assert_eq!(err.validation_errors()[0].symbol, "taken");
    }

    #[test]
    fn list_decodes_pages() {
        let page = format!("<accounts>{}</accounts>", ACCOUNT_XML.replace(r#"<?xml version="1.0" encoding="UTF-8"?>"#, ""));
        let client = client(vec![Ok(HttpResponse::new(200).with_body(page))]);
        let mut pager = list(&client, &ListOptions::default());
        let accounts: Vec<Account> = pager.fetch(&Context::background()).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].email, "verena@example.com");
        assert!(!pager.has_next());
    }
}
