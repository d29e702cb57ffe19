//! Request validation and the stored-text codec for the nested JSON documents.

use chrono::NaiveDateTime;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{EnvironmentError, Result};
use crate::models::{
    Environment, EnvironmentInput, EnvironmentRow, OrganizationRequest, ENV_NAME_MAX_LEN,
};

/// Decode and validate a create/update body.
pub fn parse_environment(body: &[u8]) -> Result<EnvironmentInput> {
    let mut input: EnvironmentInput = serde_json::from_slice(body)
        .map_err(|e| EnvironmentError::validation(format!("Invalid environment payload: {e}")))?;
    if input.env_name.trim().is_empty() {
        return Err(EnvironmentError::validation("env_name: Missing data for required field."));
    }
    if input.env_name.chars().count() > ENV_NAME_MAX_LEN {
        return Err(EnvironmentError::validation(format!(
            "env_name: Longer than maximum length {ENV_NAME_MAX_LEN}."
        )));
    }
    Ok(input)
}

/// Decode a create/delete organization body.
pub fn parse_organization(body: &[u8]) -> Result<OrganizationRequest> {
    let req: OrganizationRequest = serde_json::from_slice(body)
        .map_err(|e| EnvironmentError::validation(format!("Invalid organization payload: {e}")))?;
    if req.email.trim().is_empty() {
        return Err(EnvironmentError::validation("email: Missing data for required field."));
    }
    if req.email.chars().count() > ENV_NAME_MAX_LEN {
        return Err(EnvironmentError::validation(format!(
            "email: Longer than maximum length {ENV_NAME_MAX_LEN}."
        )));
    }
    Ok(req)
}

pub fn encode_document<T: Serialize>(doc: &T) -> Result<String> {
    Ok(serde_json::to_string(doc)?)
}

pub fn decode_document<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}

/// Build the stored row for `input`.
pub fn to_row(
    id: i64,
    input: &EnvironmentInput,
    create_ts: NaiveDateTime,
    last_update_ts: NaiveDateTime,
) -> Result<EnvironmentRow> {
    Ok(EnvironmentRow {
        id,
        env_name: input.env_name.clone(),
        env_settings: encode_document(&input.env_settings)?,
        available_for_users_id: encode_document(&input.available_for_users_id)?,
        create_ts,
        last_update_ts,
    })
}

pub fn from_row(row: EnvironmentRow) -> Result<Environment> {
    Ok(Environment {
        id: row.id,
        env_settings: decode_document(&row.env_settings)?,
        available_for_users_id: decode_document(&row.available_for_users_id)?,
        env_name: row.env_name,
        create_ts: row.create_ts,
        last_update_ts: row.last_update_ts,
    })
}
