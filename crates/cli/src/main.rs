use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use midc_agents::RateAgent;
use midc_core::{ChatInput, RateType};
use midc_dataset::RateTable;
use midc_observability::{init_tracing, AppMetrics};
use midc_storage::Store;

#[derive(Debug, Parser)]
#[command(name = "midc-rates")]
#[command(about = "MIDC land-rate lookup")]
struct Cli {
    #[arg(long, default_value = "data")]
    data_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive rate-lookup chat
    Chat,
    /// Map free text to a (district, taluka, location) triple
    Resolve { text: String },
    /// Read one rate cell for a fully specified triple
    Rate {
        #[arg(long)]
        district: String,
        #[arg(long)]
        taluka: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        rate_type: String,
    },
    /// Walk the dataset the way the dropdown form does
    Browse {
        #[command(subcommand)]
        command: BrowseCommand,
    },
}

#[derive(Debug, Subcommand)]
enum BrowseCommand {
    Districts,
    Talukas {
        district: String,
    },
    Locations {
        district: String,
        taluka: String,
    },
    RateTypes,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("midc_cli");
    let cli = Cli::parse();

    let agent = build_agent(&cli.data_path).await?;

    match cli.command {
        Command::Chat => run_chat(agent).await?,
        Command::Resolve { text } => match agent.resolve(&text) {
            Some(place) => println!("{}", serde_json::to_string_pretty(&place)?),
            None => println!("no match for {text:?}"),
        },
        Command::Rate {
            district,
            taluka,
            location,
            rate_type,
        } => {
            let rate_type = RateType::parse(&rate_type).context("invalid --rate-type value")?;
            match agent.rate(&district, &taluka, &location, rate_type) {
                Some(value) => println!(
                    "{} in {}, {}, {}: {}",
                    rate_type.label(),
                    location,
                    taluka,
                    district,
                    value
                ),
                None => println!(
                    "no {} found for {}, {}, {}",
                    rate_type.label(),
                    location,
                    taluka,
                    district
                ),
            }
        }
        Command::Browse { command } => match command {
            BrowseCommand::Districts => print_list(&agent.districts()),
            BrowseCommand::Talukas { district } => print_list(&agent.talukas(&district)),
            BrowseCommand::Locations { district, taluka } => {
                print_list(&agent.locations(&district, &taluka))
            }
            BrowseCommand::RateTypes => {
                for rate_type in RateType::ALL {
                    println!("{}", rate_type.label());
                }
            }
        },
    }

    Ok(())
}

async fn run_chat(agent: RateAgent<Store>) -> Result<()> {
    let mut session_id: Option<String> = None;

    println!("MIDC rates chat. type 'new' to start over, 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }
        if message.is_empty() {
            continue;
        }

        if message.eq_ignore_ascii_case("new") {
            if let Some(id) = session_id.as_deref() {
                let reply = agent.reset(id).await?;
                println!("\n{}\n", reply.reply_text);
            }
            continue;
        }

        let reply = agent
            .handle_chat(ChatInput {
                session_id: session_id.clone(),
                text: message.to_string(),
            })
            .await?;

        session_id = Some(reply.session_id.clone());
        println!("\n{}\n", reply.reply_text);
    }

    Ok(())
}

fn print_list(items: &[String]) {
    for (position, item) in items.iter().enumerate() {
        println!("{}. {}", position + 1, item);
    }
}

async fn build_agent(data_path: &PathBuf) -> Result<RateAgent<Store>> {
    let metrics = AppMetrics::shared();

    let table = Arc::new(RateTable::load(data_path).with_context(|| {
        format!("failed loading rate dataset from {}", data_path.display())
    })?);

    let store = if let Ok(database_url) = env::var("MIDC_DATABASE_URL") {
        Store::sqlite(&database_url).await?
    } else {
        Store::memory()
    };

    Ok(RateAgent::new(table, Arc::new(store), metrics))
}
