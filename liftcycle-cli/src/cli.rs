//liftcycle-cli/src/cli.rs
use chrono::{Duration, Local, NaiveDate};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Plan weekly workout cycles and log sessions", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    #[arg(long, global = true)]
    pub export_csv: bool,
}

// Custom parser for date strings and shorthands
pub fn parse_date_shorthand(s: &str) -> Result<NaiveDate, String> {
    let today = Local::now().date_naive();
    match s.to_lowercase().as_str() {
        "today" => Ok(today),
        "yesterday" => Ok(today - Duration::days(1)),
        "tomorrow" => Ok(today + Duration::days(1)),
        _ => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(s, "%d.%m.%Y"))
            .or_else(|_| NaiveDate::parse_from_str(s, "%Y/%m/%d"))
            .map_err(|_| {
                format!(
                    "Invalid date format: '{s}'. Use 'today', 'yesterday', 'tomorrow', YYYY-MM-DD, DD.MM.YYYY, or YYYY/MM/DD."
                )
            }),
    }
}

/// Parses `YYYY-MM` into the first day of that month.
pub fn parse_month(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
        .map_err(|_| format!("Invalid month: '{s}'. Use YYYY-MM."))
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendCli {
    Remote,
    Local,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in and remember the user on this device
    SignIn {
        username: String,
        /// Ignored by the local backend
        #[arg(short, long, default_value = "")]
        password: String,
    },
    /// Create an account (or a local profile) and sign in
    SignUp {
        username: String,
        #[arg(short, long, default_value = "")]
        password: String,
    },
    /// Forget the signed-in user
    SignOut,
    /// Show the signed-in user
    Whoami,
    /// Manage workout plans
    Plan {
        #[command(subcommand)]
        action: PlanCommands,
    },
    /// Show the session for a day, creating it on first access
    Today {
        #[arg(short, long, value_parser = parse_date_shorthand, default_value = "today")]
        date: NaiveDate,
        /// Also list exercises removed from the session
        #[arg(long)]
        all: bool,
    },
    /// Toggle an exercise completed
    Done {
        /// Session exercise ID
        id: i64,
        #[arg(short, long, value_parser = parse_date_shorthand, default_value = "today")]
        date: NaiveDate,
    },
    /// Toggle an exercise skipped
    Skip {
        id: i64,
        #[arg(short, long, value_parser = parse_date_shorthand, default_value = "today")]
        date: NaiveDate,
    },
    /// Remove an exercise from the session
    Remove {
        id: i64,
        #[arg(short, long, value_parser = parse_date_shorthand, default_value = "today")]
        date: NaiveDate,
    },
    /// Change an exercise's position in the session
    Move {
        id: i64,
        order: i64,
        #[arg(short, long, value_parser = parse_date_shorthand, default_value = "today")]
        date: NaiveDate,
    },
    /// Record the working weight of an exercise (omit the value to clear it)
    Weight {
        id: i64,
        value: Option<f64>,
        #[arg(short, long, value_parser = parse_date_shorthand, default_value = "today")]
        date: NaiveDate,
    },
    /// Add an exercise to the session
    Add {
        /// Name of the exercise
        #[arg(short, long, required_unless_present = "base")]
        name: Option<String>,
        /// Comma-separated list of target muscles (e.g., "chest,triceps")
        #[arg(short, long, default_value = "")]
        muscles: String,
        #[arg(long)]
        optional: bool,
        /// Copy name and muscles from this catalog exercise
        #[arg(long, conflicts_with_all = &["name", "muscles"])]
        base: Option<i64>,
        #[arg(short, long, value_parser = parse_date_shorthand, default_value = "today")]
        date: NaiveDate,
    },
    /// Mark the session completed
    Finish {
        #[arg(short, long, value_parser = parse_date_shorthand, default_value = "today")]
        date: NaiveDate,
    },
    /// Preview the next plan days
    Upcoming,
    /// List sessions of a month
    Calendar {
        /// Month as YYYY-MM (defaults to the current month)
        #[arg(long, value_parser = parse_month)]
        month: Option<NaiveDate>,
    },
    /// Shared exercise catalog
    Catalog {
        #[command(subcommand)]
        action: Option<CatalogCommands>,
    },
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
    GenerateCompletion {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum PlanCommands {
    /// Show the active plan
    Show,
    /// Create a plan from a TOML draft, replacing the active one
    Create { file: PathBuf },
    /// Save a TOML draft as the next version of the active plan
    Edit { file: PathBuf },
    /// Retire the active plan and its cycle
    Retire,
    /// List every plan version
    History,
    /// Print a TOML draft to start from
    Template {
        /// Prefill from the active plan
        #[arg(long)]
        from_active: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommands {
    /// List catalog exercises
    List,
    /// Add a catalog exercise
    Add {
        name: String,
        #[arg(short, long, default_value = "")]
        muscles: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the configuration and its path
    Show,
    SetBackend {
        #[arg(value_enum)]
        backend: BackendCli,
    },
    SetApiUrl { url: String },
    SetTimeout { seconds: u64 },
}

// Function to parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(parse_date_shorthand("2024-03-09"), Ok(expected));
        assert_eq!(parse_date_shorthand("09.03.2024"), Ok(expected));
        assert_eq!(parse_date_shorthand("2024/03/09"), Ok(expected));
        assert!(parse_date_shorthand("March 9").is_err());
    }

    #[test]
    fn parses_month() {
        assert_eq!(
            parse_month("2024-02"),
            Ok(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
        );
        assert!(parse_month("2024-13").is_err());
    }

    #[test]
    fn add_requires_name_or_base() {
        assert!(Cli::try_parse_from(["lc", "add"]).is_err());
        assert!(Cli::try_parse_from(["lc", "add", "--base", "3"]).is_ok());
        assert!(Cli::try_parse_from(["lc", "add", "--base", "3", "--name", "x"]).is_err());
    }
}
