// ========================================================================================
//
//                      THE BATCH ORCHESTRATOR: SGCCA-SIGTEST
//
// ========================================================================================
//
// Entry point of the command-line tool. It parses arguments, initializes logging, and
// hands each subcommand to the stage functions in `cli/main.rs`:
//
// 1.  `aggregate`: permutation files -> persisted null tables, per experiment.
// 2.  `stats`: null tables + observed statistics -> summaries, histograms, and the
//     stacked experiment x component tables.
// 3.  `fdr`: Benjamini-Hochberg correction of stacked p-value tables.
// 4.  `run`: all of the above, in order.
//
// Any error, including a single failed experiment, ends the process with status 1.

use clap::{CommandFactory, Parser, Subcommand};
use std::process;

#[path = "../cli/main.rs"]
mod cli;

#[derive(Parser)]
#[command(
    name = "sgcca-sigtest",
    version,
    about = "Permutation significance testing for SGCCA results",
    long_about = "Aggregates permutation null distributions of SGCCA criteria and \
                 correlations, computes empirical p-values and z-statistics, and applies \
                 Benjamini-Hochberg FDR correction across experiments."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble and persist the null distribution of every experiment
    #[command(about = "Aggregate permutation results (outputs: null_{crit,corr}_total.csv)")]
    Aggregate(cli::BatchArgs),

    /// Compute empirical statistics from persisted null tables
    #[command(about = "Compute p-values, null moments and z-statistics")]
    Stats(cli::BatchArgs),

    /// Correct stacked p-value tables for multiple comparisons
    #[command(about = "Apply Benjamini-Hochberg FDR correction (outputs: *_fdr_corrected.csv)")]
    Fdr(cli::FdrArgs),

    /// Run aggregation, statistics and correction in order
    #[command(about = "Run the full significance-testing batch")]
    Run(cli::BatchArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Aggregate(args)) => cli::aggregate(args),
        Some(Commands::Stats(args)) => cli::stats(args),
        Some(Commands::Fdr(args)) => cli::fdr(args),
        Some(Commands::Run(args)) => cli::run(args),
        None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("Error: {e}");
                process::exit(1);
            }
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
