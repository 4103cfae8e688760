//! Identity snapshot and the profile normalization boundary.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Last-known profile of the signed-in user.
///
/// Persisted as camelCase JSON next to the token; PascalCase snapshots are
/// read too. Keys this type does not model are carried in `extra` so a
/// refresh never drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(
        default,
        alias = "Id",
        deserialize_with = "lenient_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<i64>,
    #[serde(default, alias = "Name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, alias = "Email", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, alias = "Avatar", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(
        default,
        alias = "RoleId",
        deserialize_with = "lenient_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub role_id: Option<i64>,
    #[serde(default, alias = "RoleName", skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identity {
    /// Parse a persisted snapshot.
    pub fn from_snapshot(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::CorruptIdentity(e.to_string()))
    }

    /// Serialize for persistence.
    pub fn to_snapshot(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Numeric user id usable in `/user/{id}`, if one can be derived.
    ///
    /// Falls back to a `userId` or `UserId` key kept in `extra`. Zero and
    /// negative ids are not usable.
    pub fn user_id(&self) -> Option<i64> {
        self.id
            .or_else(|| {
                ["userId", "UserId"]
                    .iter()
                    .find_map(|key| self.extra.get(*key).and_then(int_from_value))
            })
            .filter(|id| *id > 0)
    }

    /// Overwrite every field the server returned; keep the rest.
    pub fn merge(&mut self, profile: ProfilePayload) {
        let ProfilePayload {
            id,
            name,
            email,
            avatar,
            role_id,
            role_name,
        } = profile;

        if id.is_some() {
            self.id = id;
        }
        if name.is_some() {
            self.name = name;
        }
        if email.is_some() {
            self.email = email;
        }
        if avatar.is_some() {
            self.avatar = avatar;
        }
        if role_id.is_some() {
            self.role_id = role_id;
        }
        if role_name.is_some() {
            self.role_name = role_name;
        }
    }
}

/// Profile object returned by `GET /user/{id}`.
///
/// The API answers with either PascalCase or camelCase keys; both map onto
/// the same fields here and nowhere else.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePayload {
    #[serde(
        default,
        alias = "Id",
        alias = "userId",
        alias = "UserId",
        deserialize_with = "lenient_int"
    )]
    pub id: Option<i64>,
    #[serde(default, alias = "Name", alias = "fullName", alias = "FullName")]
    pub name: Option<String>,
    #[serde(default, alias = "Email")]
    pub email: Option<String>,
    #[serde(default, alias = "Avatar")]
    pub avatar: Option<String>,
    #[serde(default, alias = "RoleId", deserialize_with = "lenient_int")]
    pub role_id: Option<i64>,
    #[serde(default, alias = "RoleName")]
    pub role_name: Option<String>,
}

/// Accept integers, numeric strings and null.
fn lenient_int<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(int_from_value))
}

fn int_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
