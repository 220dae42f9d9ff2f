use clap::{Parser, Subcommand};
use tracing::debug;

use rustboard::{
    Connection, Error, Leaderboard, LeaderboardOptions, Score, ScoreType, SortPolicy,
};

const URL: &str = "redis://127.0.0.1:6379/";

#[derive(Parser, Debug)]
struct Args {
    /// The store URL to connect to
    #[arg(long, default_value = URL)]
    url: String,

    /// The leaderboard key
    #[arg(short, long)]
    key: String,

    /// Rank entries lowest score first
    #[arg(long)]
    low_to_high: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the first n entries
    Top {
        #[arg(default_value_t = 10)]
        n: u64,
    },
    /// Look up one member's score and rank
    Find { id: String },
    /// Write a member's score
    Update { id: String, score: f64 },
    /// Count the members
    Count,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let args = Args::parse();

    let mut options = LeaderboardOptions::default();
    if args.low_to_high {
        options.sort_policy = SortPolicy::LowToHigh;
    }

    let conn = Connection::open(&args.url)?;
    let board = Leaderboard::new(conn, args.key, ScoreType::Float64, options);

    match args.command {
        Command::Top { n } => {
            for entry in board.top(n).await? {
                println!("{:>4}. {:<24} {}", entry.rank, entry.id, entry.score.as_f64());
            }
        }
        Command::Find { id } => match board.find(&id).await? {
            Some(entry) => println!("#{} {} {}", entry.rank, entry.id, entry.score.as_f64()),
            None => println!("(not found)"),
        },
        Command::Update { id, score } => {
            board.update_one(&id, Score::Float64(score)).await?;
        }
        Command::Count => println!("{}", board.count().await?),
    }

    Ok(())
}
