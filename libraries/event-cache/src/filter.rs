//! Turns the filter object the UI edits into a server query plus whatever the
//! server cannot filter on.
//!
//! The server understands `city`, `type`, `status`, `start_date`, `end_date`
//! and `max_members`. Price, capacity limits and the name search are applied
//! in memory by [`ResidualPredicate`].

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::record::{EventRecord, EventStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentChoice {
    Paid,
    Free,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LimitChoice {
    #[serde(rename = "limit", alias = "limited")]
    Limited,
    #[serde(rename = "no_limit", alias = "unlimited")]
    Unlimited,
}

/// The filter as edited in the UI. Empty values mean "not set".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFilter {
    #[serde(deserialize_with = "one_or_many")]
    pub city: Vec<String>,
    #[serde(rename = "type", deserialize_with = "one_or_many")]
    pub event_type: Vec<String>,
    #[serde(deserialize_with = "string_or_null")]
    pub status: String,
    #[serde(alias = "start_date", deserialize_with = "string_or_null")]
    pub date_from: String,
    #[serde(alias = "end_date", deserialize_with = "string_or_null")]
    pub date_to: String,
    #[serde(deserialize_with = "string_or_null")]
    pub name: String,
    #[serde(alias = "max_members", deserialize_with = "lenient_threshold")]
    pub capacity_threshold: Option<u32>,
    #[serde(alias = "price", deserialize_with = "one_or_many")]
    pub payment: Vec<PaymentChoice>,
    #[serde(alias = "limit", deserialize_with = "one_or_many")]
    pub capacity_limit: Vec<LimitChoice>,
}

/// Query parameters in the order they were added. Multi-valued fields appear
/// once per value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerQuery(Vec<(String, String)>);

impl ServerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.0.push((key.to_string(), value.into()));
    }

    /// Replace every occurrence of `key` with a single `key=value`.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.retain(|(k, _)| k != key);
        self.push(key, value);
        self
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.pairs().filter(move |(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs())
            .finish()
    }
}

impl fmt::Display for ServerQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// The part of a filter evaluated in memory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResidualPredicate {
    pub payment: Option<PaymentChoice>,
    pub capacity: Option<LimitChoice>,
    /// Lowercased, trimmed name search.
    pub name: Option<String>,
}

impl ResidualPredicate {
    pub fn is_neutral(&self) -> bool {
        self.payment.is_none() && self.capacity.is_none() && self.name.is_none()
    }

    pub fn matches(&self, record: &EventRecord) -> bool {
        let payment_ok = match self.payment {
            None => true,
            Some(PaymentChoice::Paid) => record.is_paid(),
            Some(PaymentChoice::Free) => !record.is_paid(),
        };
        let capacity_ok = match self.capacity {
            None => true,
            Some(LimitChoice::Limited) => record.is_limited(),
            Some(LimitChoice::Unlimited) => !record.is_limited(),
        };
        let name_ok = self
            .name
            .as_deref()
            .is_none_or(|needle| name_contains(record, needle));

        payment_ok && capacity_ok && name_ok
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CompiledFilter {
    pub server_query: ServerQuery,
    pub residual: ResidualPredicate,
}

pub fn compile(filter: &EventFilter) -> CompiledFilter {
    let mut query = ServerQuery::new();

    for city in filter.city.iter().filter_map(|c| non_empty(c)) {
        query.push("city", city);
    }
    for event_type in filter.event_type.iter().filter_map(|t| non_empty(t)) {
        query.push("type", event_type);
    }
    if let Some(status) = non_empty(&filter.status) {
        match status.parse::<EventStatus>() {
            Ok(status) => query.push("status", status.as_str()),
            Err(e) => log::warn!("Dropping status filter: {e}"),
        }
    }
    if let Some(date) = normalize_date(&filter.date_from) {
        query.push("start_date", date);
    }
    if let Some(date) = normalize_date(&filter.date_to) {
        query.push("end_date", date);
    }
    if let Some(threshold) = filter.capacity_threshold.filter(|t| *t > 0) {
        query.push("max_members", threshold.to_string());
    }

    let residual = ResidualPredicate {
        payment: exclusive_choice(&filter.payment),
        capacity: exclusive_choice(&filter.capacity_limit),
        name: non_empty(&filter.name).map(str::to_lowercase),
    };

    CompiledFilter {
        server_query: query,
        residual,
    }
}

/// Accepts `YYYY-MM-DD` or `DD.MM.YYYY` and returns `YYYY-MM-DD`. Anything
/// else, including impossible calendar dates, is `None`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let date = if has_shape(raw, "dddd-dd-dd") {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    } else if has_shape(raw, "dd.dd.dddd") {
        NaiveDate::parse_from_str(raw, "%d.%m.%Y").ok()
    } else {
        None
    };
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Case-insensitive substring test on the display name. `needle` must already
/// be lowercase.
pub(crate) fn name_contains(record: &EventRecord, needle: &str) -> bool {
    record.name.to_lowercase().contains(needle)
}

fn has_shape(raw: &str, shape: &str) -> bool {
    raw.len() == shape.len()
        && raw.chars().zip(shape.chars()).all(|(c, s)| match s {
            'd' => c.is_ascii_digit(),
            other => c == other,
        })
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Exactly one distinct choice constrains; none or both mean "show all".
fn exclusive_choice<T: Copy + Eq>(choices: &[T]) -> Option<T> {
    let first = *choices.first()?;
    choices.iter().all(|c| *c == first).then_some(first)
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
        Blank(String),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        Some(OneOrMany::Many(values)) => values,
        Some(OneOrMany::One(value)) => vec![value],
        // An empty string from a cleared select, or a value we don't know.
        Some(OneOrMany::Blank(_)) | None => Vec::new(),
    })
}

fn string_or_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_threshold<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Threshold {
        Number(u32),
        Text(String),
    }

    Ok(match Option::<Threshold>::deserialize(deserializer)? {
        Some(Threshold::Number(n)) => Some(n),
        Some(Threshold::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(value: serde_json::Value) -> EventFilter {
        serde_json::from_value(value).unwrap()
    }

    fn paid(name: &str) -> EventRecord {
        let mut record = EventRecord::new(name, name);
        record.payment = Some("100".to_string());
        record
    }

    fn limited(name: &str, capacity: u32) -> EventRecord {
        let mut record = EventRecord::new(name, name);
        record.capacity = Some(capacity);
        record
    }

    #[test]
    fn test_compile_is_deterministic() {
        let f = filter(json!({
            "city": ["Moscow", "Kazan"],
            "type": "Hackathon",
            "start_date": "01.02.2025",
            "price": ["paid"],
            "name": "Rust",
        }));
        assert_eq!(compile(&f), compile(&f));
        assert_eq!(compile(&f).server_query.encode(), compile(&f).server_query.encode());
    }

    #[test]
    fn test_multi_valued_fields_repeat_the_key() {
        let compiled = compile(&filter(json!({"city": ["Moscow", "Kazan"]})));
        let query = &compiled.server_query;

        assert_eq!(query.values("city").collect::<Vec<_>>(), vec!["Moscow", "Kazan"]);
        assert_eq!(query.encode(), "city=Moscow&city=Kazan");
        assert!(!query.encode().contains("%2C"));
        assert!(!query.encode().contains(','));
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let compiled = compile(&filter(json!({"status": "", "city": [], "type": ["", "  "]})));
        assert!(compiled.server_query.is_empty());
        assert!(compiled.residual.is_neutral());

        let compiled = compile(&filter(json!({
            "status": null,
            "city": "",
            "start_date": "",
            "max_members": "",
            "price": null,
            "limit": "",
        })));
        assert!(compiled.server_query.is_empty());
        assert!(compiled.residual.is_neutral());
    }

    #[test]
    fn test_server_field_order_is_stable() {
        let compiled = compile(&filter(json!({
            "max_members": 30,
            "end_date": "2025-03-01",
            "status": "active",
            "type": ["Meetup"],
            "city": ["Kazan"],
            "start_date": "2025-02-01",
        })));
        let keys: Vec<_> = compiled.server_query.pairs().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec!["city", "type", "status", "start_date", "end_date", "max_members"]
        );
    }

    #[test]
    fn test_status_uses_wire_value() {
        let compiled = compile(&filter(json!({"status": "upcoming"})));
        assert_eq!(compiled.server_query.encode(), "status=coming+soon");

        let compiled = compile(&filter(json!({"status": "someday"})));
        assert!(compiled.server_query.is_empty());
    }

    #[test]
    fn test_dates_are_normalised() {
        assert_eq!(normalize_date("2025-01-31"), Some("2025-01-31".to_string()));
        assert_eq!(normalize_date("31.01.2025"), Some("2025-01-31".to_string()));
        assert_eq!(normalize_date("31/01/2025"), None);
        assert_eq!(normalize_date("2025-1-31"), None);
        assert_eq!(normalize_date("31.02.2025"), None);
        assert_eq!(normalize_date(""), None);

        let compiled = compile(&filter(json!({"date_from": "05.03.2025", "date_to": "garbage"})));
        assert_eq!(compiled.server_query.encode(), "start_date=2025-03-05");
    }

    #[test]
    fn test_client_only_fields_never_reach_the_server() {
        let compiled = compile(&filter(json!({
            "price": ["paid"],
            "limit": ["limit"],
            "name": "Rust",
        })));
        assert!(compiled.server_query.is_empty());
        assert_eq!(compiled.residual.payment, Some(PaymentChoice::Paid));
        assert_eq!(compiled.residual.capacity, Some(LimitChoice::Limited));
        assert_eq!(compiled.residual.name.as_deref(), Some("rust"));
    }

    #[test]
    fn test_both_choices_impose_no_constraint() {
        let compiled = compile(&filter(json!({
            "price": ["paid", "free"],
            "limit": ["no_limit", "limit"],
        })));
        assert!(compiled.residual.is_neutral());

        let records = [
            paid("a"),
            EventRecord::new("b", "b"),
            limited("c", 10),
            limited("d", 0),
        ];
        assert!(records.iter().all(|r| compiled.residual.matches(r)));
    }

    #[test]
    fn test_single_choice_filters() {
        let free_only = compile(&filter(json!({"price": "free"}))).residual;
        assert!(!free_only.matches(&paid("a")));
        assert!(free_only.matches(&EventRecord::new("b", "b")));

        let unlimited_only = compile(&filter(json!({"limit": ["no_limit"]}))).residual;
        assert!(!unlimited_only.matches(&limited("c", 10)));
        assert!(unlimited_only.matches(&limited("d", 0)));
        assert!(unlimited_only.matches(&EventRecord::new("e", "e")));

        let repeated = compile(&filter(json!({"limit": ["limit", "limit"]}))).residual;
        assert_eq!(repeated.capacity, Some(LimitChoice::Limited));
    }

    #[test]
    fn test_name_search_is_case_insensitive() {
        let residual = compile(&filter(json!({"name": "  RuSt "}))).residual;
        assert!(residual.matches(&EventRecord::new("1", "Intro to rust")));
        assert!(!residual.matches(&EventRecord::new("2", "Go meetup")));
    }

    #[test]
    fn test_threshold_zero_is_unset() {
        let compiled = compile(&filter(json!({"max_members": 0})));
        assert!(compiled.server_query.is_empty());

        let compiled = compile(&filter(json!({"capacity_threshold": "25"})));
        assert_eq!(compiled.server_query.encode(), "max_members=25");
    }
}
