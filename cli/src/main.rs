//! ORAKEL CLI - feeder tools

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{build_vote, delegate_tx, generate_salt, prevote_tx, vote_tx, ApiClient};
use orakel_core::ExchangeRate;
use orakel_oracle::SignedMsg;

#[derive(Parser)]
#[command(name = "orakel")]
#[command(about = "ORAKEL - exchange rate feeder CLI")]
#[command(version)]
struct Cli {
    /// Node URL
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a vote hash offline
    Hash {
        #[arg(short, long)]
        rate: ExchangeRate,

        #[arg(short, long)]
        denom: String,

        /// Validator the vote is for
        #[arg(short, long)]
        validator: String,

        /// Feeder submitting the vote (defaults to the validator)
        #[arg(short, long)]
        feeder: Option<String>,

        /// Salt (random if omitted)
        #[arg(short, long)]
        salt: Option<String>,
    },

    /// Commit to an exchange rate for the current period
    Prevote {
        #[arg(short, long)]
        rate: ExchangeRate,

        #[arg(short, long)]
        denom: String,

        #[arg(short, long)]
        validator: String,

        #[arg(short, long)]
        feeder: Option<String>,

        #[arg(short, long)]
        salt: Option<String>,
    },

    /// Reveal a rate committed in the previous period
    Vote {
        #[arg(short, long)]
        rate: ExchangeRate,

        #[arg(short, long)]
        denom: String,

        #[arg(short, long)]
        validator: String,

        #[arg(short, long)]
        feeder: Option<String>,

        /// Salt used for the prevote
        #[arg(short, long)]
        salt: String,
    },

    /// Delegate vote submission to another account
    SetFeeder {
        #[arg(short, long)]
        validator: String,

        #[arg(short, long)]
        delegate: String,
    },

    /// Published rate of one denom
    Rate { denom: String },

    /// All published rates
    Rates,

    /// Miss count of a validator
    Misses {
        validator: String,

        /// Slash window (defaults to the current one)
        #[arg(short, long)]
        window: Option<u64>,
    },

    /// Current feeder of a validator
    Feeder { validator: String },

    /// Get transaction status
    Tx {
        /// Transaction ID
        tx_id: String,
    },

    /// Node status
    Status,
}

async fn submit(api_client: &ApiClient, tx: SignedMsg) {
    let name = tx.msg.name();
    match api_client.submit(&tx).await {
        Ok(resp) => {
            println!("{} {} submitted", "✓".green(), name);
            println!("TX ID:  {}", resp.tx_id);
            println!("Status: {}", resp.status);
        }
        Err(e) => fail(e),
    }
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", "Error:".red(), e);
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let api_client = ApiClient::new(&cli.node)?;

    match cli.command {
        Commands::Hash {
            rate,
            denom,
            validator,
            feeder,
            salt,
        } => {
            let salt = salt.unwrap_or_else(generate_salt);
            let vote = build_vote(rate, &salt, &denom, feeder.as_deref(), &validator);
            println!("Hash: {}", vote.generate_hash().to_hex());
            println!("Salt: {}", salt);
        }

        Commands::Prevote {
            rate,
            denom,
            validator,
            feeder,
            salt,
        } => {
            let salt = salt.unwrap_or_else(generate_salt);
            let vote = build_vote(rate, &salt, &denom, feeder.as_deref(), &validator);
            submit(&api_client, prevote_tx(&vote)).await;
            println!(
                "{} reveal next period with --salt {}",
                "Keep this salt:".yellow(),
                salt
            );
        }

        Commands::Vote {
            rate,
            denom,
            validator,
            feeder,
            salt,
        } => {
            let vote = build_vote(rate, &salt, &denom, feeder.as_deref(), &validator);
            submit(&api_client, vote_tx(vote)).await;
        }

        Commands::SetFeeder {
            validator,
            delegate,
        } => {
            submit(&api_client, delegate_tx(&validator, &delegate)).await;
        }

        Commands::Rate { denom } => match api_client.get_rate(&denom).await {
            Ok(info) => {
                println!("Denom: {}", info.denom);
                println!("Rate:  {}", info.exchange_rate);
                match info.period {
                    Some(p) => println!("Set in period {}", p),
                    None => println!("Set at genesis"),
                }
            }
            Err(e) => fail(e),
        },

        Commands::Rates => match api_client.get_rates().await {
            Ok(rates) if rates.is_empty() => println!("No rates published."),
            Ok(rates) => {
                println!("{:<12} {:<28} {}", "Denom", "Rate", "Period");
                println!("{:-<12} {:-<28} {:-<8}", "", "", "");
                for (denom, entry) in rates {
                    let period = entry
                        .period
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "genesis".to_string());
                    println!("{:<12} {:<28} {}", denom, entry.exchange_rate.to_string(), period);
                }
            }
            Err(e) => fail(e),
        },

        Commands::Misses { validator, window } => {
            match api_client.get_misses(&validator, window).await {
                Ok(info) => {
                    println!("Validator: {}", info.validator);
                    println!("Window:    {}", info.window);
                    println!("Misses:    {}", info.misses);
                }
                Err(e) => fail(e),
            }
        }

        Commands::Feeder { validator } => match api_client.get_feeder(&validator).await {
            Ok(info) => println!("{} is fed by {}", info.validator, info.feeder),
            Err(e) => fail(e),
        },

        Commands::Tx { tx_id } => match api_client.get_transaction(&tx_id).await {
            Ok(resp) => {
                println!("TX ID:  {}", resp.tx_id);
                println!("Status: {}", resp.status);
                if let Some(receipt) = resp.receipt {
                    println!("Receipt: {}", serde_json::to_string_pretty(&receipt)?);
                }
            }
            Err(e) => fail(e),
        },

        Commands::Status => match api_client.status().await {
            Ok(status) => {
                println!("{}", "ORAKEL Node Status".bold());
                println!("==================");
                println!("Name:          {}", status.name);
                println!("Chain ID:      {}", status.chain_id);
                println!("Height:        {}", status.height);
                println!("Period:        {}", status.period);
                println!(
                    "Last Tally:    {}",
                    status
                        .last_tallied_period
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
                println!("State Version: {}", status.state_version);
                println!("State Root:    {}", truncate(&status.state_root, 16));
                println!("Mempool Size:  {}", status.mempool_size);
                println!(
                    "Validators:    {} (power {})",
                    status.validator_count, status.total_power
                );
            }
            Err(e) => fail(e),
        },
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len])
    }
}
