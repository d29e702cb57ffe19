use clap::{Parser, Subcommand};
use harp_environment::auth::TokenVerifier;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::fs;

const TOKEN_FILE: &str = ".harp_token";

#[derive(Parser)]
#[command(name = "environment-cli")]
#[command(about = "CLI for the Harp environments service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint a development token with the service secret and save it
    Token {
        #[arg(short, long, env = "JWT_SECRET")]
        secret: String,
        #[arg(short = 'u', long, default_value = "environment-cli")]
        subject: String,
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
    Create {
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value = "{}")]
        settings: String,
        #[arg(short, long, value_delimiter = ',')]
        visible: Vec<i64>,
        #[arg(long, value_delimiter = ',')]
        hidden: Vec<i64>,
    },
    Update {
        #[arg(short, long)]
        id: i64,
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value = "{}")]
        settings: String,
        #[arg(short, long, value_delimiter = ',')]
        visible: Vec<i64>,
        #[arg(long, value_delimiter = ',')]
        hidden: Vec<i64>,
    },
    /// Fetch by numeric id or by name
    Get {
        key: String,
    },
    Delete {
        #[arg(short, long)]
        id: i64,
    },
    List {
        /// Use the authenticated client listing
        #[arg(long)]
        client: bool,
    },
    CreateOrg {
        #[arg(short, long)]
        email: String,
    },
    DeleteOrg {
        #[arg(short, long)]
        email: String,
    },
    Logout,
}

fn with_token(req: RequestBuilder) -> RequestBuilder {
    let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
    req.header("Authorization", format!("Bearer {}", token.trim()))
}

fn environment_body(name: String, settings: &str, visible: Vec<i64>, hidden: Vec<i64>) -> Result<Value, serde_json::Error> {
    let settings: Value = serde_json::from_str(settings)?;
    Ok(json!({
        "env_name": name,
        "env_settings": settings,
        "available_for_users_id": { "visible_only": visible, "hidden": hidden }
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let base = format!("{}/api/v1/environments", cli.url.trim_end_matches('/'));

    let res = match cli.command {
        Commands::Token { secret, subject, ttl } => {
            let token = TokenVerifier::new(secret).issue(&subject, ttl)?;
            fs::write(TOKEN_FILE, token)?;
            println!("Token saved to {TOKEN_FILE}");
            return Ok(());
        }
        Commands::Logout => {
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Token removed");
            return Ok(());
        }
        Commands::Create { name, settings, visible, hidden } => {
            let body = environment_body(name, &settings, visible, hidden)?;
            with_token(client.put(&base)).json(&body).send().await?
        }
        Commands::Update { id, name, settings, visible, hidden } => {
            let body = environment_body(name, &settings, visible, hidden)?;
            with_token(client.post(format!("{base}/{id}"))).json(&body).send().await?
        }
        Commands::Get { key } => client.get(format!("{base}/{key}")).send().await?,
        Commands::Delete { id } => with_token(client.delete(format!("{base}/{id}"))).send().await?,
        Commands::List { client: true } => with_token(client.get(format!("{base}/client/all"))).send().await?,
        Commands::List { client: false } => client.get(format!("{base}/all")).send().await?,
        Commands::CreateOrg { email } => {
            client
                .put(format!("{base}/create-organization"))
                .json(&json!({ "email": email }))
                .send()
                .await?
        }
        Commands::DeleteOrg { email } => {
            client
                .delete(format!("{base}/create-organization"))
                .json(&json!({ "email": email }))
                .send()
                .await?
        }
    };

    println!("Status: {}", res.status());
    println!("Response: {}", res.text().await?);
    Ok(())
}
