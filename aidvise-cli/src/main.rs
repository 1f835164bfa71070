//! aidvise-cli: terminal client for the Aidvise HTTP API
//!
//! # Subcommands
//! - `analyze <symptoms...> [--json]`         : ask for general guidance
//! - `status`                                 : show server health
//! - `logs list|add|edit|delete [--token ..]` : manage the caller's health logs

use std::time::Duration;

use aidvise_core::models::{split_symptoms, HealthLog, HealthLogInput};
use anyhow::{anyhow, bail, Context};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "aidvise-cli",
    version,
    about = "Aidvise symptom guidance and health-log journal"
)]
struct Cli {
    /// Aidvise HTTP server URL (overrides AIDVISE_HTTP_URL env var)
    #[arg(long, env = "AIDVISE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Describe symptoms and receive general guidance
    Analyze {
        /// Free-text symptom description (words are joined with spaces)
        #[arg(required = true, num_args = 1..)]
        symptoms: Vec<String>,

        /// Print the raw JSON response body
        #[arg(long)]
        json: bool,
    },

    /// Show Aidvise server status
    Status,

    /// Manage your health logs
    Logs {
        /// Supabase access token of the signed-in user
        #[arg(long, env = "AIDVISE_ACCESS_TOKEN", hide_env_values = true)]
        token: String,

        #[command(subcommand)]
        action: LogsCommand,
    },
}

#[derive(Debug, Subcommand)]
enum LogsCommand {
    /// List logs, most recent first
    List {
        /// Print the raw JSON array
        #[arg(long)]
        json: bool,
    },

    /// Record a new daily log
    Add(LogFields),

    /// Replace the fields of an existing log
    Edit {
        id: i64,

        #[command(flatten)]
        fields: LogFields,
    },

    /// Delete a log
    Delete { id: i64 },
}

#[derive(Debug, Args)]
struct LogFields {
    /// Log date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long, default_value = "")]
    symptoms: String,

    #[arg(long, default_value = "")]
    mood: String,

    /// Hours slept (0-24)
    #[arg(long)]
    sleep: f64,

    /// Pain level (0-10)
    #[arg(long)]
    pain: f64,
}

impl LogFields {
    /// Build and range-check the payload before anything is sent.
    fn into_input(self, today: NaiveDate) -> anyhow::Result<HealthLogInput> {
        let input = HealthLogInput {
            date: self.date.unwrap_or(today),
            symptoms: self.symptoms.trim().to_string(),
            mood: self.mood.trim().to_string(),
            sleep_hours: self.sleep,
            pain_level: self.pain,
        };
        input.validate()?;
        Ok(input)
    }
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Pull the `error` field out of an API error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Turn a non-2xx response into an error carrying the server's message.
fn check(resp: Response) -> anyhow::Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(anyhow!("server returned {}: {}", status, error_message(&body)))
}

// ============================================================================
// Output formatting
// ============================================================================

fn format_analysis(symptoms: &str, result: &str) -> String {
    let mut out = String::from("Symptoms:\n");
    for item in split_symptoms(symptoms) {
        out.push_str(&format!("  - {}\n", item));
    }
    out.push_str(&format!("\nGuidance:\n{}\n", result));
    out
}

fn format_log(log: &HealthLog) -> String {
    let symptoms = log.symptoms.as_deref().filter(|s| !s.is_empty()).unwrap_or("-");
    let mood = log.mood.as_deref().filter(|s| !s.is_empty()).unwrap_or("-");
    format!(
        "#{:<5} {}  mood: {} ({})  sleep: {}h ({})  pain: {}/10 ({})\n       {}",
        log.id,
        log.date,
        mood,
        log.mood_tone().label(),
        log.sleep_hours,
        log.sleep_band().label(),
        log.pain_level,
        log.pain_band().label(),
        symptoms,
    )
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout: Duration) -> anyhow::Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

fn send(request: RequestBuilder, url: &str) -> anyhow::Result<Response> {
    request
        .send()
        .with_context(|| format!("connection failed to {}", url))
}

fn do_analyze(server: &str, symptoms: &str, json_output: bool) -> anyhow::Result<()> {
    // Covers the server's 30 s inference timeout plus the log write.
    let client = client(Duration::from_secs(45))?;
    let url = format!("{}/symptom-analysis", server);

    let resp = send(client.post(&url).json(&json!({ "symptoms": symptoms })), &url)?;
    let status = resp.status();
    let body = resp.text()?;

    if json_output {
        println!("{}", body);
        if !status.is_success() {
            std::process::exit(1);
        }
        return Ok(());
    }

    if status == reqwest::StatusCode::BAD_REQUEST {
        bail!("{} (describe at least a few characters)", error_message(&body));
    }
    if !status.is_success() {
        bail!("server returned {}: {}", status, error_message(&body));
    }

    let analysis: AnalysisResponse =
        serde_json::from_str(&body).context("failed to parse analysis response")?;
    print!("{}", format_analysis(symptoms, &analysis.result));
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = client(Duration::from_secs(10))?;
    let url = format!("{}/health", server);

    let resp = send(client.get(&url), &url)?;
    if !resp.status().is_success() {
        bail!("server unhealthy (HTTP {})", resp.status());
    }

    let body: Value = resp.json().unwrap_or_default();
    println!("Aidvise server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
    println!("Store:          {}", body["store"].as_str().unwrap_or("?"));
    println!("Model:          {}", body["inference_model"].as_str().unwrap_or("?"));
    println!(
        "Journal:        {}",
        if body["journal"].as_bool().unwrap_or(false) { "enabled" } else { "disabled" }
    );
    if let Some(pg) = body["postgresql"].as_str() {
        println!("PostgreSQL:     {}", pg);
    }
    Ok(())
}

fn do_logs(server: &str, token: &str, action: LogsCommand) -> anyhow::Result<()> {
    let client = client(Duration::from_secs(15))?;
    let base = format!("{}/health-logs", server);
    let today = Local::now().date_naive();

    match action {
        LogsCommand::List { json: json_output } => {
            let resp = check(send(client.get(&base).bearer_auth(token), &base)?)?;
            let logs: Vec<HealthLog> = resp.json().context("failed to parse health logs")?;

            if json_output {
                println!("{}", serde_json::to_string_pretty(&logs)?);
            } else if logs.is_empty() {
                eprintln!("No health logs yet.");
            } else {
                for log in &logs {
                    println!("{}", format_log(log));
                }
            }
        }
        LogsCommand::Add(fields) => {
            let input = fields.into_input(today)?;
            let resp = check(send(client.post(&base).bearer_auth(token).json(&input), &base)?)?;
            let log: HealthLog = resp.json().context("failed to parse created log")?;
            println!("Created:\n{}", format_log(&log));
        }
        LogsCommand::Edit { id, fields } => {
            let input = fields.into_input(today)?;
            let url = format!("{}/{}", base, id);
            let resp = check(send(client.put(&url).bearer_auth(token).json(&input), &url)?)?;
            let log: HealthLog = resp.json().context("failed to parse updated log")?;
            println!("Updated:\n{}", format_log(&log));
        }
        LogsCommand::Delete { id } => {
            let url = format!("{}/{}", base, id);
            check(send(client.delete(&url).bearer_auth(token), &url)?)?;
            println!("Deleted log #{}", id);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Analyze { symptoms, json } => do_analyze(&server, &symptoms.join(" "), json),
        Commands::Status => do_status(&server),
        Commands::Logs { token, action } => do_logs(&server, &token, action),
    };

    if let Err(e) = result {
        eprintln!("aidvise-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
