//! Phonebook Client - one-shot command line access to a phonebook server
//!
//! Usage:
//!   phonebook-client [--host H] [--port P] [--timeout SECS] [--json] list [--field surname --text etr]
//!   phonebook-client add --name Ivan --surname Petrov --patronymic Sergeevich --number +1000
//!   phonebook-client delete --name Ivan --surname Petrov --patronymic Sergeevich --number +1000
//!
//! Exit codes: 0 success, 1 the server reported failure, 2 connection failure.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use phonebook::protocol::DEFAULT_PORT;
use phonebook::{ClientConfig, Contact, ContactClient, ContactField, Filter, Request, Response};

#[derive(Parser, Debug)]
#[command(name = "phonebook-client", version, about = "Query and edit a phonebook server")]
struct Cli {
    /// Server host
    #[arg(long, default_value = "127.0.0.1", global = true)]
    host: String,

    /// Server port
    #[arg(long, default_value_t = DEFAULT_PORT, global = true)]
    port: u16,

    /// Print responses as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Connect and read/write timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List contacts, optionally filtered by a substring of one field
    List {
        /// name, surname, patronymic, number or note
        #[arg(long, requires = "text")]
        field: Option<String>,

        /// Substring to look for (case-sensitive)
        #[arg(long, requires = "field")]
        text: Option<String>,
    },
    /// Add a contact
    Add(ContactArgs),
    /// Delete a contact (all fields must match exactly)
    Delete(ContactArgs),
}

#[derive(Args, Debug)]
struct ContactArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    surname: String,
    #[arg(long)]
    patronymic: String,
    #[arg(long)]
    number: String,
    #[arg(long)]
    note: Option<String>,
}

impl From<ContactArgs> for Contact {
    fn from(args: ContactArgs) -> Self {
        Contact {
            name: args.name,
            surname: args.surname,
            patronymic: args.patronymic,
            number: args.number,
            note: args.note,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let timeout = cli.timeout.map(Duration::from_secs);
    let config = ClientConfig {
        host: cli.host.clone(),
        port: cli.port,
        connect_timeout: timeout,
        io_timeout: timeout,
    };

    let mut client = match ContactClient::connect(config) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Cannot connect to {}:{}", cli.host, cli.port);
            return ExitCode::from(2);
        }
    };

    let request = match cli.command {
        Cmd::List { field, text } => {
            if let Some(ref f) = field {
                if let Err(e) = f.parse::<ContactField>() {
                    eprintln!("{}", e);
                    return ExitCode::from(1);
                }
            }
            let filter = (field.is_some() || text.is_some()).then(|| Filter { field, text });
            Request::Update { filter }
        }
        Cmd::Add(args) => Request::Add { contact: args.into() },
        Cmd::Delete(args) => Request::Delete { contact: args.into() },
    };

    let response = match client.send(&request) {
        Ok(response) => response,
        Err(e) => {
            let config = client.config();
            error!(error = %e, "Request to {}:{} failed, connection dropped", config.host, config.port);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = print_response(&response, cli.json) {
        error!(error = %e, "Failed to print response");
        return ExitCode::from(2);
    }

    if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn print_response(response: &Response, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    match (&response.contacts, response.success) {
        (Some(contacts), true) => {
            for contact in contacts {
                println!("{}", contact);
            }
            println!("{} contact(s)", contacts.len());
        }
        (_, true) => println!("{}: ok", response.command),
        (_, false) => {
            let reason = response.reason.map_or("UNKNOWN", |r| r.as_str());
            println!("{}: failed ({})", response.command, reason);
        }
    }
    Ok(())
}
