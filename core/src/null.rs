//! Tri-state values for fields where "absent" and "zero" mean different things.
//!
//! # Design
//! The remote API treats an omitted element as "leave unchanged" and an
//! element carrying `false` or `0` as an explicit assignment. `Option<bool>`
//! would express the same states, but `Nullable<T>` keeps the wire rules in
//! one place:
//!
//! - `valid == false` encodes to no element at all, and decodes from an
//!   absent element or one carrying `nil="nil"`.
//! - `valid == true` encodes the type's literal, including zero values.
//! - A malformed literal in a present element is a decode error, never a
//!   silent `null`.
//!
//! Values are immutable once built; `new`, `null` and `Default` are the only
//! producers.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::xml::Element;

/// A scalar type with a fixed literal format on the wire.
pub trait NullValue: Sized {
    /// Render the value as element text.
    fn to_literal(&self) -> String;

    /// Parse element text. The error is a human-readable reason.
    fn parse_literal(text: &str) -> std::result::Result<Self, String>;

    /// Canonical form stored by `Nullable::new`.
    fn normalize(self) -> Self {
        self
    }
}

impl NullValue for bool {
    fn to_literal(&self) -> String {
        String::from(if *self { "true" } else { "false" })
    }

    fn parse_literal(text: &str) -> std::result::Result<Self, String> {
        match text {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(format!("invalid boolean literal {other:?}")),
        }
    }
}

impl NullValue for i64 {
    fn to_literal(&self) -> String {
        self.to_string()
    }

    fn parse_literal(text: &str) -> std::result::Result<Self, String> {
        text.parse()
            .map_err(|e| format!("invalid integer literal {text:?}: {e}"))
    }
}

impl NullValue for f64 {
    /// `Display` for `f64` already yields the shortest decimal that
    /// round-trips, without exponent notation.
    fn to_literal(&self) -> String {
        self.to_string()
    }

    fn parse_literal(text: &str) -> std::result::Result<Self, String> {
        text.parse()
            .map_err(|e| format!("invalid float literal {text:?}: {e}"))
    }
}

impl NullValue for DateTime<Utc> {
    fn to_literal(&self) -> String {
        self.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn parse_literal(text: &str) -> std::result::Result<Self, String> {
        DateTime::parse_from_rfc3339(text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| format!("invalid timestamp literal {text:?}: {e}"))
    }

    // The wire format carries whole seconds only.
    fn normalize(self) -> Self {
        self.trunc_subsecs(0)
    }
}

/// A value that is either explicitly set or has no opinion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Nullable<T> {
    value: T,
    valid: bool,
}

pub type NullBool = Nullable<bool>;
pub type NullInt = Nullable<i64>;
pub type NullFloat = Nullable<f64>;
pub type NullTime = Nullable<DateTime<Utc>>;

impl<T: NullValue + Default> Nullable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: value.normalize(),
            valid: true,
        }
    }

    pub fn null() -> Self {
        Self::default()
    }

    /// Decode an optional child element following the nil rules.
    pub fn from_element(element: Option<&Element>) -> Result<Self> {
        let Some(element) = element else {
            return Ok(Self::null());
        };
        if element.is_nil() {
            return Ok(Self::null());
        }
        T::parse_literal(element.text.trim())
            .map(Self::new)
            .map_err(|reason| Error::Decode(format!("<{}>: {reason}", element.name)))
    }
}

impl<T> Nullable<T> {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn get(&self) -> Option<&T> {
        self.valid.then_some(&self.value)
    }
}

impl<T: Copy> Nullable<T> {
    /// The stored value, or the type's zero value when null.
    pub fn value(&self) -> T {
        self.value
    }
}

impl<T: NullValue> Nullable<T> {
    /// Element text for a valid value; `None` means "omit the element".
    pub fn literal(&self) -> Option<String> {
        self.valid.then(|| self.value.to_literal())
    }
}

impl<T: NullValue + Default> From<T> for Nullable<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: NullValue + Default> From<Option<T>> for Nullable<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::null, Self::new)
    }
}

impl<T: Serialize> Serialize for Nullable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.valid {
            serializer.serialize_some(&self.value)
        } else {
            serializer.serialize_none()
        }
    }
}

impl<'de, T> Deserialize<'de> for Nullable<T>
where
    T: Deserialize<'de> + NullValue + Default,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::xml::XmlWriter;

    fn element(xml: &str) -> Element {
        Element::parse(xml.as_bytes()).unwrap().unwrap()
    }

    fn encode<T: NullValue>(name: &str, value: &Nullable<T>) -> String {
        let mut writer = XmlWriter::new();
        writer.nullable(name, value).unwrap();
        String::from_utf8(writer.into_bytes()).unwrap()
    }

    fn roundtrip<T: NullValue + Default + PartialEq + std::fmt::Debug + Copy>(value: T) {
        let made = Nullable::new(value);
        let xml = format!("<root>{}</root>", encode("field", &made));
        let root = element(&xml);
        let back = Nullable::<T>::from_element(root.child("field")).unwrap();
        assert_eq!(back, made);
    }

    #[test]
    fn default_is_null() {
        let value = NullBool::default();
        assert!(!value.is_valid());
        assert_eq!(value.get(), None);
        assert_eq!(value, NullBool::null());
    }

    #[test]
    fn explicit_false_is_valid() {
        let value = NullBool::new(false);
        assert!(value.is_valid());
        assert_eq!(value.get(), Some(&false));
        assert_ne!(value, NullBool::null());
    }

    #[test]
    fn equality_compares_value_and_validity() {
        assert_eq!(NullInt::new(0), NullInt::new(0));
        assert_ne!(NullInt::new(0), NullInt::new(1));
        assert_ne!(NullInt::new(0), NullInt::null());
    }

    #[test]
    fn roundtrips_through_xml() {
        roundtrip(true);
        roundtrip(false);
        roundtrip(0_i64);
        roundtrip(-42_i64);
        roundtrip(i64::MAX);
        roundtrip(0.0_f64);
        roundtrip(19.99_f64);
        roundtrip(Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap());
    }

    #[test]
    fn null_encodes_to_nothing() {
        assert_eq!(encode("tax_exempt", &NullBool::null()), "");
        assert_eq!(encode("amount", &NullFloat::null()), "");
    }

    #[test]
    fn encoding_is_idempotent() {
        let value = NullFloat::new(1.5);
        assert_eq!(encode("rate", &value), encode("rate", &value));
        assert_eq!(encode("rate", &value), "<rate>1.5</rate>");
    }

    #[test]
    fn literal_formats() {
        assert_eq!(encode("b", &NullBool::new(false)), "<b>false</b>");
        assert_eq!(encode("i", &NullInt::new(0)), "<i>0</i>");
        assert_eq!(encode("f", &NullFloat::new(100.0)), "<f>100</f>");
        assert_eq!(encode("f", &NullFloat::new(0.1)), "<f>0.1</f>");
        let t = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
        assert_eq!(encode("t", &NullTime::new(t)), "<t>2006-01-02T15:04:05Z</t>");
    }

    #[test]
    fn timestamps_are_truncated_to_seconds() {
        let t = Utc.with_ymd_and_hms(2020, 5, 1, 8, 0, 0).unwrap() + chrono::Duration::milliseconds(250);
        assert_eq!(NullTime::new(t).value(), Utc.with_ymd_and_hms(2020, 5, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn timestamp_offsets_normalize_to_utc() {
        let root = element("<root><at>2017-03-01T10:00:00-05:00</at></root>");
        let at = NullTime::from_element(root.child("at")).unwrap();
        assert_eq!(at.value(), Utc.with_ymd_and_hms(2017, 3, 1, 15, 0, 0).unwrap());
    }

    #[test]
    fn absent_and_nil_decode_to_null() {
        let root = element(r#"<root><closed_at nil="nil"></closed_at><flag nil="nil"/></root>"#);
        assert_eq!(NullTime::from_element(root.child("closed_at")).unwrap(), NullTime::null());
        assert_eq!(NullBool::from_element(root.child("flag")).unwrap(), NullBool::null());
        assert_eq!(NullInt::from_element(root.child("missing")).unwrap(), NullInt::null());
    }

    #[test]
    fn typed_element_decodes() {
        let root = element(r#"<root><tax_exempt type="boolean">false</tax_exempt></root>"#);
        assert_eq!(NullBool::from_element(root.child("tax_exempt")).unwrap(), NullBool::new(false));
    }

    #[test]
    fn malformed_literal_is_an_error() {
        let root = element("<root><flag>yes</flag><n>12x</n><at>yesterday</at></root>");
        assert!(matches!(NullBool::from_element(root.child("flag")), Err(Error::Decode(_))));
        assert!(matches!(NullInt::from_element(root.child("n")), Err(Error::Decode(_))));
        assert!(matches!(NullTime::from_element(root.child("at")), Err(Error::Decode(_))));
    }

    #[test]
    fn empty_element_without_nil_is_an_error() {
        let root = element("<root><flag></flag></root>");
        assert!(NullBool::from_element(root.child("flag")).is_err());
    }

    #[test]
    fn serde_maps_to_option() {
        let json = serde_json::to_string(&(NullBool::new(false), NullInt::null())).unwrap();
        assert_eq!(json, "[false,null]");
        let back: (NullBool, NullInt) = serde_json::from_str(&json).unwrap();
        assert_eq!(back, (NullBool::new(false), NullInt::null()));
    }
}
