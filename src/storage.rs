//! Sled-backed record mapper for environments.
//!
//! Two trees make up the `environments` table:
//! - `environments`: big-endian id -> JSON-encoded [`EnvironmentRow`]
//! - `environment_names`: env_name -> id, the unique index on `env_name`
//!
//! Every mutation touches both trees inside one sled transaction, so the name
//! check and the write commit (or roll back) together.

use chrono::{NaiveDateTime, Timelike, Utc};
use sled::transaction::{
    abort, ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use sled::{Db, Transactional};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{EnvironmentError, Result};
use crate::models::{ClientEnvironment, Environment, EnvironmentInput, EnvironmentRow};
use crate::schema;

type TxResult<T> = ConflictableTransactionResult<T, EnvironmentError>;

#[derive(Clone)] // sled handles are reference counted, cloning shares the same store
pub struct Storage {
    db: Db,
    environments: sled::Tree,
    names: sled::Tree,
}

impl Storage {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory store, removed when the last handle is dropped.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        let environments = db.open_tree("environments")?;
        let names = db.open_tree("environment_names")?;
        Ok(Self { db, environments, names })
    }

    /// Insert a new environment. Fails if `env_name` is already taken.
    #[tracing::instrument(skip(self, input), fields(env_name = %input.env_name))]
    pub fn add(&self, input: &EnvironmentInput) -> Result<Environment> {
        let id = self.next_id()?;
        let key = id.to_be_bytes();
        let now = now();
        let row = schema::to_row(id, input, now, now)?;
        let bytes = serde_json::to_vec(&row)?;

        (&self.environments, &self.names)
            .transaction(|(envs, names)| -> TxResult<()> {
                if names.get(row.env_name.as_bytes())?.is_some() {
                    return abort(EnvironmentError::validation(format!(
                        "Environment with name: {} already exist",
                        row.env_name
                    )));
                }
                names.insert(row.env_name.as_bytes(), &key[..])?;
                envs.insert(&key[..], bytes.as_slice())?;
                Ok(())
            })
            .map_err(from_transaction)?;

        tracing::info!(id, "environment added");
        schema::from_row(row)
    }

    /// Replace name, settings and visibility of environment `id`.
    #[tracing::instrument(skip(self, input), fields(env_name = %input.env_name))]
    pub fn update(&self, id: i64, input: &EnvironmentInput) -> Result<Environment> {
        let key = id.to_be_bytes();
        let now = now();

        let row = (&self.environments, &self.names)
            .transaction(|(envs, names)| -> TxResult<EnvironmentRow> {
                let Some(existing) = envs.get(&key[..])? else {
                    return abort(EnvironmentError::not_found(format!(
                        "Environment with id: {id} is not exist"
                    )));
                };
                let current: EnvironmentRow =
                    serde_json::from_slice(&existing).map_err(abort_with)?;

                if let Some(owner) = names.get(input.env_name.as_bytes())? {
                    if owner[..] != key[..] {
                        return abort(EnvironmentError::validation(
                            "Environment with the same name is already exist",
                        ));
                    }
                }
                if current.env_name != input.env_name {
                    names.remove(current.env_name.as_bytes())?;
                    names.insert(input.env_name.as_bytes(), &key[..])?;
                }

                let row = schema::to_row(id, input, current.create_ts, now)
                    .map_err(ConflictableTransactionError::Abort)?;
                let bytes = serde_json::to_vec(&row).map_err(abort_with)?;
                envs.insert(&key[..], bytes)?;
                Ok(row)
            })
            .map_err(from_transaction)?;

        tracing::info!(id, "environment updated");
        schema::from_row(row)
    }

    /// Remove environment `id` and its name index entry.
    #[tracing::instrument(skip(self))]
    pub fn delete(&self, id: i64) -> Result<Environment> {
        let key = id.to_be_bytes();

        let row = (&self.environments, &self.names)
            .transaction(|(envs, names)| -> TxResult<EnvironmentRow> {
                let Some(existing) = envs.remove(&key[..])? else {
                    return abort(EnvironmentError::not_found(format!(
                        "Object with specified environment_id: {id} is not found"
                    )));
                };
                let row: EnvironmentRow = serde_json::from_slice(&existing).map_err(abort_with)?;
                if let Some(owner) = names.get(row.env_name.as_bytes())? {
                    if owner[..] == key[..] {
                        names.remove(row.env_name.as_bytes())?;
                    }
                }
                Ok(row)
            })
            .map_err(from_transaction)?;

        tracing::info!(id, "environment deleted");
        schema::from_row(row)
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<Environment>> {
        match self.environments.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode_row(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<Environment>> {
        let Some(key) = self.names.get(name.as_bytes())? else {
            return Ok(None);
        };
        match self.environments.get(key)? {
            Some(bytes) => Ok(Some(decode_row(&bytes)?)),
            None => Ok(None),
        }
    }

    /// id -> name for every stored environment (internal callers).
    pub fn list_all(&self) -> Result<BTreeMap<i64, String>> {
        self.rows()
            .map(|row| row.map(|r| (r.id, r.env_name)))
            .collect()
    }

    /// `{name, id}` for every stored environment, ordered by id.
    pub fn list_for_client(&self) -> Result<Vec<ClientEnvironment>> {
        self.rows()
            .map(|row| row.map(|r| ClientEnvironment { name: r.env_name, id: r.id }))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn rows(&self) -> impl Iterator<Item = Result<EnvironmentRow>> + '_ {
        self.environments.iter().map(|item| {
            let (_, value) = item?;
            Ok(serde_json::from_slice(&value)?)
        })
    }

    fn next_id(&self) -> Result<i64> {
        // generate_id starts at 0; ids handed to clients start at 1
        Ok(self.db.generate_id()? as i64 + 1)
    }
}

fn decode_row(bytes: &[u8]) -> Result<Environment> {
    let row: EnvironmentRow = serde_json::from_slice(bytes)?;
    schema::from_row(row)
}

fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

fn abort_with(err: serde_json::Error) -> ConflictableTransactionError<EnvironmentError> {
    ConflictableTransactionError::Abort(err.into())
}

fn from_transaction(err: TransactionError<EnvironmentError>) -> EnvironmentError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => EnvironmentError::Storage(e),
    }
}
