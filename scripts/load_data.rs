//! Seed script for the environments store
//!
//! Adds a handful of sample environments directly to the Sled store, skipping
//! names that already exist. No events are published.
//! Run: cargo run --bin load_data -- [data dir]   (defaults to DATA_DIR or harp_environment_data)

use harp_environment::models::{EnvSettings, EnvironmentInput, UserVisibility};
use harp_environment::storage::Storage;
use harp_environment::EnvironmentError;
use serde_json::json;

const SAMPLES: [(&str, &str); 4] = [
    ("Nova Street", "Production traffic for the Nova Street stores"),
    ("staging", "Pre-release checks"),
    ("qa", "Manual QA sandbox"),
    ("load-test", "Synthetic load runs"),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("DATA_DIR").ok())
        .unwrap_or_else(|| "harp_environment_data".to_string());
    let storage = Storage::open(&path)?;

    let mut added = 0;
    for (i, (name, description)) in SAMPLES.iter().enumerate() {
        let mut env_settings = EnvSettings::new();
        env_settings.insert("description".into(), json!(description));
        env_settings.insert("default_scenario".into(), json!(i + 1));
        let input = EnvironmentInput {
            env_name: name.to_string(),
            env_settings,
            available_for_users_id: UserVisibility::default(),
        };

        match storage.add(&input) {
            Ok(env) => {
                added += 1;
                println!("added {} (id {})", env.env_name, env.id);
            }
            Err(EnvironmentError::Validation(msg)) => println!("skipped: {msg}"),
            Err(e) => return Err(e.into()),
        }
    }
    storage.flush()?;

    println!("Loaded {added} environments into {path}; store now holds {}", storage.len());
    Ok(())
}
