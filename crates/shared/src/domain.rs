use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RecordError;

/// Field map of a record as it travels to and from the store.
pub type Fields = Map<String, Value>;

/// Store-assigned identifier. Collections key either by integer or by text (uuid, slug).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    /// Loose comparison against a stored value: `7` and `"7"` name the same row.
    pub fn matches(&self, value: &Value) -> bool {
        value_text(value).is_some_and(|text| text == self.to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl FromStr for RecordId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(n) => Self::Int(n),
            Err(_) => Self::Text(s.to_string()),
        })
    }
}

/// Scalar rendering used for filter comparison and query strings.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// One row of a collection. Only `id` is interpreted; every other field is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Fields", into = "Fields")]
pub struct Record {
    id: RecordId,
    fields: Fields,
}

impl Record {
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }
}

impl TryFrom<Fields> for Record {
    type Error = RecordError;

    fn try_from(fields: Fields) -> Result<Self, Self::Error> {
        let raw = fields.get("id").ok_or(RecordError::MissingId)?;
        let id = RecordId::from_value(raw).ok_or(RecordError::InvalidId)?;
        Ok(Self { id, fields })
    }
}

impl TryFrom<Value> for Record {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Self::try_from(fields),
            _ => Err(RecordError::MissingId),
        }
    }
}

impl From<Record> for Fields {
    fn from(record: Record) -> Self {
        record.fields
    }
}

/// Collections the club backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Teams,
    Players,
    News,
    Matches,
    ShopCategories,
    ShopItems,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Self::Teams,
        Self::Players,
        Self::News,
        Self::Matches,
        Self::ShopCategories,
        Self::ShopItems,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teams => "teams",
            Self::Players => "players",
            Self::News => "news",
            Self::Matches => "matches",
            Self::ShopCategories => "shop_categories",
            Self::ShopItems => "shop_items",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|collection| collection.as_str() == s)
            .ok_or_else(|| format!("unknown collection '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Finished => "finished",
            Self::Postponed => "postponed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    /// Age group or division, e.g. "U19" or "Senior".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coach: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub founded_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jersey_number: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Free-form stats and attributes (height, preferred foot, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Fields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_team_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_team_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MatchStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_team: Option<Team>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_team: Option<Team>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: RecordId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gallery: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopCategory {
    pub id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Variant data such as sizes and colours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Fields>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gallery: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ShopCategory>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn record_requires_an_id() {
        let err = Record::try_from(json!({ "name": "Falcons" })).expect_err("no id");
        assert_eq!(err, RecordError::MissingId);

        let err = Record::try_from(json!({ "id": [1], "name": "Falcons" })).expect_err("bad id");
        assert_eq!(err, RecordError::InvalidId);
    }

    #[test]
    fn record_round_trips_through_serde_with_id_in_fields() {
        let record: Record =
            serde_json::from_value(json!({ "id": "a1", "name": "Falcons" })).expect("record");
        assert_eq!(record.id(), &RecordId::from("a1"));
        assert_eq!(
            serde_json::to_value(&record).expect("json"),
            json!({ "id": "a1", "name": "Falcons" })
        );
    }

    #[test]
    fn record_id_matches_loosely_and_parses_numbers() {
        assert!(RecordId::Int(7).matches(&json!("7")));
        assert!(RecordId::from("7").matches(&json!(7)));
        assert!(!RecordId::Int(7).matches(&Value::Null));
        assert_eq!("42".parse::<RecordId>().expect("id"), RecordId::Int(42));
        assert_eq!(
            "ab-12".parse::<RecordId>().expect("id"),
            RecordId::from("ab-12")
        );
    }

    #[test]
    fn typed_player_decodes_joined_team() {
        let record = Record::try_from(json!({
            "id": 3,
            "name": "Lina Ortiz",
            "team_id": 1,
            "position": "goalkeeper",
            "attributes": { "height_cm": 178 },
            "team": { "id": 1, "name": "Falcons U19" }
        }))
        .expect("record");

        let player: Player = record.decode().expect("player");
        assert_eq!(player.team_id, Some(RecordId::Int(1)));
        assert_eq!(player.team.expect("team").name, "Falcons U19");
    }

    #[test]
    fn collection_names_round_trip() {
        for collection in Collection::ALL {
            assert_eq!(
                collection.as_str().parse::<Collection>().expect("parse"),
                collection
            );
        }
        assert!("fixtures".parse::<Collection>().is_err());
    }
}
