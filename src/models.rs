use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Upper bound on `env_name`, matching the VARCHAR(70) column it came from.
pub const ENV_NAME_MAX_LEN: usize = 70;

/// Format used for `create_ts` / `last_update_ts` in API responses.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Free-form settings document (usually `description` and `default_scenario`).
pub type EnvSettings = Map<String, Value>;

/// User scopes allowed to see an environment.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, ToSchema)]
pub struct UserVisibility {
    #[serde(default)]
    pub visible_only: Vec<i64>,
    #[serde(default)]
    pub hidden: Vec<i64>,
}

/// Request body accepted by create and update.
///
/// `id` and the timestamps are dump-only: sending them is rejected as an unknown field.
#[derive(Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentInput {
    pub env_name: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub env_settings: EnvSettings,
    #[serde(default)]
    pub available_for_users_id: UserVisibility,
}

/// An environment as returned to clients and published on the update topic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct Environment {
    pub id: i64,
    pub env_name: String,
    #[schema(value_type = Object)]
    pub env_settings: EnvSettings,
    pub available_for_users_id: UserVisibility,
    #[serde(with = "timestamp")]
    #[schema(value_type = String, example = "2024-01-01 00:00:00")]
    pub create_ts: NaiveDateTime,
    #[serde(with = "timestamp")]
    #[schema(value_type = String, example = "2024-01-01 00:00:00")]
    pub last_update_ts: NaiveDateTime,
}

/// Stored shape: the nested documents are kept as serialized text.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnvironmentRow {
    pub id: i64,
    pub env_name: String,
    pub env_settings: String,
    pub available_for_users_id: String,
    pub create_ts: NaiveDateTime,
    pub last_update_ts: NaiveDateTime,
}

/// Entry of `GET /client/all`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct ClientEnvironment {
    pub name: String,
    pub id: i64,
}

/// Body of the create/delete organization requests.
#[derive(Deserialize, Debug, Clone, ToSchema)]
pub struct OrganizationRequest {
    pub email: String,
}

/// `{"msg": "..."}` status body.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct StatusMessage {
    pub msg: String,
}

impl StatusMessage {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

/// Lookup responses wrap the record in `msg`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct EnvironmentMessage {
    pub msg: Environment,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: usize,
}

mod timestamp {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}
