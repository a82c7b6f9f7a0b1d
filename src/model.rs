use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One professor as written by the collector, stored by the loader and served
/// by the search page.
///
/// Deserialization is lenient so hand-edited files still load: a value of an
/// unexpected JSON type is kept as its JSON text, and an `id` that is not a
/// whole number becomes 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfessorRecord {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub university: String,
    /// Comma-joined majors, first-seen order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub major: String,
    /// Rendered as text by the portal and may be missing; see `db::fetch_matching`
    /// for how it is ranked.
    #[serde(default, deserialize_with = "optional_text")]
    pub h_index: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub profile_url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(default, deserialize_with = "field_list")]
    pub research_fields: Vec<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub scraped_at: Option<String>,
}

impl ProfessorRecord {
    /// Numeric rank of the h-index: the leading integer of the text, or 0
    /// when the value is missing, empty or not a number. Out-of-range values
    /// saturate. Matches the store's `CAST(h_index AS INTEGER)`.
    pub fn h_index_value(&self) -> i64 {
        let Some(text) = self.h_index.as_deref() else {
            return 0;
        };
        let text = text.trim_start();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let mut value: i64 = 0;
        for d in digits.bytes().take_while(u8::is_ascii_digit) {
            let digit = i64::from(d - b'0');
            let next = if negative {
                value.checked_mul(10).and_then(|v| v.checked_sub(digit))
            } else {
                value.checked_mul(10).and_then(|v| v.checked_add(digit))
            };
            match next {
                Some(v) => value = v,
                None if negative => return i64::MIN,
                None => return i64::MAX,
            }
        }
        value
    }
}

/// Raw fields read off one professor card, before merging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardObservation {
    pub name: String,
    pub university: String,
    /// Major printed on the card itself; empty when the card has none and the
    /// enclosing group's title should be used.
    pub major_label: String,
    pub h_index: String,
    pub profile_url: String,
    pub email: String,
    pub research_fields: Vec<String>,
}

/// JSON text of a value, with strings taken as-is and null as `None`.
fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_text(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_text(Value::deserialize(deserializer)?))
}

/// Non-negative integers, numeric strings and whole floats; anything else is 0.
fn lenient_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let whole = |f: f64| (f.fract() == 0.0 && (0.0..=u64::MAX as f64).contains(&f)).then_some(f as u64);
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| s.parse::<f64>().ok().and_then(whole))
        }
        _ => None,
    }
    .unwrap_or(0))
}

/// Accepts a JSON array, or the older comma-separated string form.
fn field_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(dedup_in_order(
            s.split(',').map(str::trim).filter(|f| !f.is_empty()).map(String::from),
        )),
        Value::Array(items) => Ok(dedup_in_order(items.into_iter().filter_map(value_text))),
        other => Ok(value_text(other).into_iter().collect()),
    }
}

/// Drop repeats, keeping the first occurrence of each item.
pub fn dedup_in_order<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
