use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use table_reconcile::domain::entities::value::DATE_FORMAT;
use table_reconcile::{
    ChangeKind, ChangeSet, DateFilter, DateRange, EditSession, LoadRequest, NewTable,
    ReconcileError, RepoError, SaveOutcome, SessionError, Settings, Snapshot, SqliteStore,
    TableStore, Value, WriteStrategy,
};

const EXIT_ERROR: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_NOT_FOUND: u8 = 3;
const EXIT_CONFLICT: u8 = 4;

#[derive(Parser)]
#[command(name = "tabrec")]
#[command(about = "Edit stored tables and write back only what changed")]
#[command(version)]
struct Cli {
    #[arg(long, global = true, env = "TABREC_DB", help = "SQLite database path")]
    db: Option<PathBuf>,
    #[arg(long, global = true, help = "Settings file (defaults to the platform config dir)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create the database schema")]
    Init,
    #[command(about = "List stored tables")]
    Tables,
    #[command(about = "Create a table from literal rows")]
    Create {
        table: String,
        #[arg(long, value_delimiter = ',', required = true, help = "Column names, comma-separated")]
        columns: Vec<String>,
        #[arg(long, value_delimiter = ',', help = "Key columns, comma-separated")]
        key: Vec<String>,
        #[arg(long = "row", help = "One row of comma-separated cell literals; repeatable")]
        rows: Vec<String>,
    },
    #[command(about = "Print a table")]
    Show {
        table: String,
        #[command(flatten)]
        dates: DateArgs,
    },
    #[command(about = "Edit matching rows and save the difference")]
    Edit {
        table: String,
        #[arg(long = "where", value_name = "COLUMN=VALUE", help = "Rows to edit")]
        selector: String,
        #[arg(long = "set", value_name = "COLUMN=VALUE", required = true, help = "New cell value; repeatable")]
        assignments: Vec<String>,
        #[command(flatten)]
        dates: DateArgs,
        #[arg(long, help = "Print the change-set without saving")]
        dry_run: bool,
        #[arg(long, help = "Replace the whole table instead of a keyed update")]
        overwrite: bool,
    },
    #[command(about = "Delete a table")]
    Drop { table: String },
}

#[derive(Args)]
struct DateArgs {
    #[arg(long, help = "Restrict rows by this date column (default: the first date-like column)")]
    date_column: Option<String>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    from: Option<String>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    to: Option<String>,
    #[arg(long, value_name = "DAYS", conflicts_with = "from")]
    last_days: Option<u32>,
    #[arg(long, value_name = "ROWS", help = "Load at most this many rows, after the date filter")]
    limit: Option<usize>,
}

impl DateArgs {
    fn range(&self) -> Result<Option<DateRange>> {
        let end = match &self.to {
            Some(raw) => parse_date(raw)?,
            None => chrono::Local::now().date_naive(),
        };
        match (&self.from, self.last_days) {
            (Some(raw), _) => Ok(Some(DateRange::new(parse_date(raw)?, end)?)),
            (None, Some(days)) => Ok(Some(DateRange::last_days(end, days)?)),
            (None, None) if self.date_column.is_some() || self.to.is_some() => {
                Err(UsageError("a date filter needs --from or --last-days".into()).into())
            }
            (None, None) => Ok(None),
        }
    }

    /// Without `--date-column` the first date-like column of `table` is used.
    fn request(&self, store: &dyn TableStore, table: &str) -> Result<LoadRequest> {
        let filter = match (self.range()?, &self.date_column) {
            (None, _) => None,
            (Some(range), Some(column)) => Some(DateFilter::new(column.clone(), range)),
            (Some(range), None) => {
                let snapshot = store.load(table, None)?;
                Some(DateFilter::detect(&snapshot, range)?)
            }
        };
        Ok(LoadRequest {
            filter,
            limit: self.limit,
        })
    }
}

/// Bad command-line input that clap itself cannot catch.
#[derive(Debug)]
struct UsageError(String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UsageError {}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| UsageError(format!("not a date (expected YYYY-MM-DD): {raw}")).into())
}

fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| UsageError(format!("expected COLUMN=VALUE, got '{raw}'")))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(UsageError(format!("missing column name in '{raw}'")).into());
    }
    Ok((column.to_string(), Value::parse_literal(value)))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code_for_error(&err))
        }
    }
}

fn exit_code_for_error(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        let repo = cause.downcast_ref::<RepoError>().or_else(|| {
            match cause.downcast_ref::<SessionError>() {
                Some(SessionError::Repo(inner)) => Some(inner),
                _ => None,
            }
        });
        if let Some(repo) = repo {
            return match repo {
                RepoError::TableNotFound(_) => EXIT_NOT_FOUND,
                RepoError::ConcurrentModification { .. } => EXIT_CONFLICT,
                RepoError::TableExists(_)
                | RepoError::MissingKeyColumns(_)
                | RepoError::InvalidInput(_) => EXIT_USAGE,
                RepoError::Storage(_) => EXIT_ERROR,
            };
        }
        if cause.is::<UsageError>() || cause.is::<ReconcileError>() {
            return EXIT_USAGE;
        }
        if let Some(session) = cause.downcast_ref::<SessionError>() {
            if session.is_invalid_input() {
                return EXIT_USAGE;
            }
        }
    }
    EXIT_ERROR
}

fn open_store(cli: &Cli, settings: &Settings) -> Result<Arc<dyn TableStore>> {
    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => settings.db_path()?,
    };
    log::debug!("using database {}", db_path.display());
    let store = SqliteStore::new(db_path);
    store.init()?;
    Ok(Arc::new(store))
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    let store = open_store(&cli, &settings)?;

    match cli.command {
        Commands::Init => {
            println!("database ready");
        }
        Commands::Tables => {
            let tables = store.list_tables()?;
            if tables.is_empty() {
                println!("no tables");
            }
            for meta in tables {
                println!(
                    "{}\t{} rows\tkey [{}]\tcreated {}",
                    meta.name,
                    meta.row_count,
                    meta.key_columns.join(", "),
                    meta.created_at
                );
            }
        }
        Commands::Create {
            table,
            columns,
            key,
            rows,
        } => {
            let rows = rows
                .iter()
                .map(|raw| raw.split(',').map(Value::parse_literal).collect())
                .collect();
            let snapshot = Snapshot::new(columns, rows)?;
            let id = store.create_table(
                NewTable {
                    name: table.clone(),
                    key_columns: key,
                },
                &snapshot,
            )?;
            println!("created '{table}' (#{}) with {} rows", id.0, snapshot.len());
        }
        Commands::Show { table, dates } => {
            let request = dates.request(store.as_ref(), &table)?;
            let mut snapshot = store.load(&table, request.filter.as_ref())?;
            if let Some(limit) = request.limit {
                snapshot.truncate(limit);
            }
            print_grid(&snapshot);
        }
        Commands::Edit {
            table,
            selector,
            assignments,
            dates,
            dry_run,
            overwrite,
        } => {
            let (where_column, where_value) = parse_assignment(&selector)?;
            let assignments = assignments
                .iter()
                .map(|raw| parse_assignment(raw))
                .collect::<Result<Vec<_>>>()?;

            let request = dates.request(store.as_ref(), &table)?;
            let mut session = EditSession::load(Arc::clone(&store), &table, request)?
                .with_options(settings.reconcile);

            let matched = session.find_rows(&where_column, &where_value)?;
            if matched.is_empty() {
                println!("no rows where {where_column}={where_value}");
                return Ok(());
            }
            for &row in &matched {
                for (column, value) in &assignments {
                    session.set_cell(row, column, value.clone())?;
                }
            }

            let changes = session.pending_changes()?;
            print_changes(&changes);
            if dry_run {
                println!("dry run: nothing saved");
                return Ok(());
            }

            let strategy = if overwrite {
                WriteStrategy::Overwrite
            } else {
                settings.save.strategy
            };
            match session
                .save(strategy)
                .with_context(|| format!("failed to save '{table}'"))?
            {
                SaveOutcome::NoChanges => println!("no changes to save"),
                SaveOutcome::Saved { strategy, rows } => {
                    println!("saved '{table}' ({}, {rows} rows)", strategy.as_str())
                }
            }
        }
        Commands::Drop { table } => {
            store.drop_table(&table)?;
            println!("dropped '{table}'");
        }
    }
    Ok(())
}

fn print_grid(snapshot: &Snapshot) {
    let cells: Vec<Vec<String>> = snapshot
        .rows()
        .iter()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect();
    let widths: Vec<usize> = snapshot
        .columns()
        .iter()
        .enumerate()
        .map(|(col_idx, name)| {
            cells
                .iter()
                .map(|row| row[col_idx].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(value, width)| format!("{value:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
    };
    println!("{}", line(snapshot.columns()));
    println!(
        "{}",
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("-+-")
    );
    for row in &cells {
        println!("{}", line(row.as_slice()));
    }
    println!("({} rows)", snapshot.len());
}

fn print_changes(changes: &ChangeSet) {
    if changes.is_empty() {
        println!("no differences");
        return;
    }
    for record in changes {
        match record.kind {
            ChangeKind::Modified => {
                println!("~ [{}]", record.key_label());
                for column in &record.changed {
                    let before = record.previous.get(column).cloned().unwrap_or(Value::Null);
                    let after = record.values.get(column).cloned().unwrap_or(Value::Null);
                    println!("    {column}: '{before}' -> '{after}'");
                }
            }
            ChangeKind::Inserted | ChangeKind::Deleted => {
                let sign = if record.kind == ChangeKind::Inserted { '+' } else { '-' };
                let source = if record.kind == ChangeKind::Inserted {
                    &record.values
                } else {
                    &record.previous
                };
                let cells = source
                    .iter()
                    .map(|(column, value)| format!("{column}='{value}'"))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("{sign} [{}] {cells}", record.key_label());
            }
        }
    }
    println!(
        "{} modified, {} inserted, {} deleted",
        changes.count(ChangeKind::Modified),
        changes.count(ChangeKind::Inserted),
        changes.count(ChangeKind::Deleted)
    );
}
