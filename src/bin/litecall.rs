use clap::Parser;
use litecall::config::{self, Config};
use litecall::core::db::library_version;
use litecall::{logging, Connection, LitecallError, ResultSet, TransactionBehavior};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, Level};

/// Runs SQL against a database and prints the result rows.
///
/// SQL is read from stdin when not given as an argument. DB may be omitted
/// when the configuration file names one.
#[derive(Parser, Debug)]
#[command(name = "litecall", disable_version_flag = true)]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print rows as a JSON array of objects
    #[arg(long)]
    json: bool,
    /// Run the SQL inside a transaction (deferred, immediate, exclusive)
    #[arg(long, value_name = "BEHAVIOR")]
    transaction: Option<TransactionBehavior>,
    /// Print the crate and engine versions
    #[arg(long)]
    version: bool,
    /// Database file
    #[arg(value_name = "DB")]
    db_path: Option<String>,
    /// Statement text
    sql: Option<String>,
}

impl Args {
    /// With a configured database a single positional argument is the SQL.
    fn resolve(mut self, config: &Config) -> Self {
        if self.sql.is_none() && config.database_path().is_some() {
            self.sql = self.db_path.take();
        }
        self
    }
}

fn render_text(rows: &ResultSet) -> String {
    let mut out = String::new();
    for row in rows {
        let line = row
            .iter()
            .map(|(column, value)| format!("{column}={}", value.unwrap_or("NULL")))
            .collect::<Vec<_>>()
            .join("\t");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn run(args: Args) -> litecall::Result<String> {
    let config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    if let Some(level) = config.log_level() {
        logging::init(logging::parse_level(level)?);
    }
    let args = args.resolve(&config);

    if args.version {
        return Ok(format!(
            "litecall {} (engine {})\n",
            env!("CARGO_PKG_VERSION"),
            library_version()?
        ));
    }

    let conn = match &args.db_path {
        Some(path) => {
            let mut conn = Connection::with_filename(path.as_str());
            conn.set_default_behavior(config.transaction_behavior());
            conn.set_drop_behavior(config.drop_behavior());
            conn.open_current()?;
            conn
        }
        None => Connection::from_config(&config)?,
    };
    if !conn.is_open() {
        return Err(LitecallError::InvalidArgument(
            "no database given on the command line or in the configuration".to_string(),
        ));
    }

    let sql = match args.sql {
        Some(sql) => sql,
        None => {
            let mut sql = String::new();
            std::io::stdin().read_to_string(&mut sql)?;
            sql
        }
    };
    debug!(path = conn.filename(), "running statement");

    let rows = match args.transaction {
        Some(behavior) => conn.with_transaction(behavior, |tx| tx.connection().query(&sql))?,
        None => conn.query(&sql)?,
    };

    if args.json {
        let mut out = serde_json::to_string_pretty(&rows)?;
        out.push('\n');
        Ok(out)
    } else {
        Ok(render_text(&rows))
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if args.config.is_none() {
        logging::init(Level::WARN);
    }

    match run(args) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
