//! Free-organization provisioning across the scenarios and users services.
//!
//! The steps run strictly in order: environment insert, default scenario,
//! user invite. A failure in a later step is reported to the caller but earlier
//! steps are left in place; nothing is retried or rolled back.

use reqwest::{header, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{EnvironmentError, Result};
use crate::models::{EnvSettings, EnvironmentInput, UserVisibility};
use crate::storage::Storage;

#[derive(Clone)]
pub struct OrganizationService {
    storage: Storage,
    http: reqwest::Client,
    scenarios_url: String,
    invite_url: String,
}

impl OrganizationService {
    pub fn new(
        storage: Storage,
        scenarios_host: &str,
        users_host: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            storage,
            http,
            scenarios_url: scenarios_host.to_string(),
            invite_url: format!("{}/invite", users_host.trim_end_matches('/')),
        })
    }

    /// Create the environment, default scenario and user for `email`.
    pub async fn create(&self, email: &str) -> Result<String> {
        let span = tracing::info_span!("create_organization", request_id = %Uuid::new_v4(), email);
        async {
            tracing::info!("start adding new free env");
            if self.storage.get_by_name(email)?.is_some() {
                return Err(EnvironmentError::validation(format!(
                    "Free account for user - {email} was already registered"
                )));
            }
            let env = self.storage.add(&free_environment(email))?;

            tracing::info!(env_id = env.id, "start adding default scenario for new free user");
            self.post(
                &self.scenarios_url,
                &default_scenario(email, env.id),
                "Can`t create new default scenario for new free user",
            )
            .await?;
            tracing::info!("new default scenario for free user has been created");

            tracing::info!(env_id = env.id, "start adding new free user");
            self.post(
                &self.invite_url,
                &invite_user(email, env.id),
                "Can`t create new free user",
            )
            .await?;
            tracing::info!("new free user has been created");

            Ok::<_, EnvironmentError>(format!("New free Org has been created - {email}"))
        }
        .instrument(span)
        .await
    }

    /// Delete the environment named `email`. Scenario and user are left alone.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, email: &str) -> Result<String> {
        let env = self.storage.get_by_name(email)?.ok_or_else(|| {
            EnvironmentError::not_found(format!("Free organization for {email} is not found"))
        })?;
        self.storage.delete(env.id)?;
        tracing::info!(env_id = env.id, "environment was deleted");
        Ok(format!("Existing free Org has been delete - {email}"))
    }

    async fn post(&self, url: &str, payload: &Value, failure: &str) -> Result<()> {
        let res = self
            .http
            .post(url)
            .header(header::ACCEPT, "application/json")
            .json(payload)
            .send()
            .await?;

        let status = res.status();
        if status == StatusCode::OK {
            return Ok(());
        }
        let body = res.text().await.unwrap_or_default();
        tracing::warn!(url, status = status.as_u16(), %body, "{failure}");
        Err(EnvironmentError::Downstream {
            message: failure.to_string(),
            status: status.as_u16(),
            payload: format!("{payload}\nurl: {url}"),
        })
    }
}

fn username(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

pub fn free_environment(email: &str) -> EnvironmentInput {
    let mut env_settings = EnvSettings::new();
    env_settings.insert(
        "description".into(),
        json!(format!("Separate env for free account - {email}")),
    );
    env_settings.insert("default_scenario".into(), json!(1));
    EnvironmentInput {
        env_name: email.to_string(),
        env_settings,
        available_for_users_id: UserVisibility::default(),
    }
}

pub fn default_scenario(email: &str, environment_id: i64) -> Value {
    json!({
        "username": username(email),
        "scenario_name": format!("Default scenario for - {email}"),
        "environment_id": environment_id,
        "description": "Automatically created default scenario for specific Env",
        "external_url": "http://some_url",
        "requested_by": "Default scenario",
        "tags": [],
        "scenario_type": 1,
        "scenario_actions": [
            {
                "execute_after_seconds": 0,
                "type": "ui",
                "body": {
                    "recipients": ["Duty OPS"],
                    "description": "asd",
                    "affected_func": "User can't login to the site",
                    "should_check": ["Check connection to the sile", "Notify OPS on duty"],
                    "players_expirience": "asd",
                    "not_handled_effects": "Lost user",
                    "notification_period": {},
                    "action_name": "The fist action after the alert triggered",
                    "players_experience": "Bad user experience"
                }
            }
        ]
    })
}

pub fn invite_user(email: &str, environment_id: i64) -> Value {
    json!({
        "email": email,
        "username": username(email),
        "role": "user",
        "active_environment_ids": {
            "visible_only": [environment_id],
            "hidden": []
        }
    })
}
