// SheetJoin CLI - load tables, search them and join them by key

mod exit_codes;
mod render;
mod server;
mod store;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use sheetjoin_config::Settings;
use sheetjoin_engine::{
    search, MatchEngine, MatchError, MatchOutcome, MatchRequest, MultiMatchRequest,
    PendingSelection, Record, SelectionMap, Table,
};
use sheetjoin_io::export::{self, ExportBuilder};

use exit_codes::{
    match_error_exit_code, EXIT_ERROR, EXIT_INVALID_COLUMN, EXIT_IO, EXIT_NEEDS_SELECTION,
    EXIT_NOT_FOUND, EXIT_SUCCESS, EXIT_USAGE,
};
use server::TableServer;
use store::Store;

#[derive(Parser)]
#[command(name = "sjoin")]
#[command(about = "Search and key-join tables loaded from spreadsheets and CSV files")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Directory holding the table snapshot (overrides storage.dataDir)
    #[arg(long, global = true, env = "SHEETJOIN_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `sheetjoin_engine=debug` (overrides log.level and RUST_LOG)
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import spreadsheet or delimited-text files as tables
    #[command(after_help = "\
Examples:
  sjoin load customers.xlsx orders.csv
  sjoin load export.csv --name orders

Each file becomes one table named after the file (without extension).
Loading a name that already exists replaces that table.")]
    Load {
        /// Files to import (.xlsx, .xlsm, .xls, .xlsb, .ods, .csv, .tsv, .txt)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Table name (only with a single file)
        #[arg(long)]
        name: Option<String>,
    },

    /// List loaded tables
    Tables {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print one page of a table
    #[command(after_help = "\
Examples:
  sjoin show orders
  sjoin show orders --page 3 --page-size 20
  sjoin show orders --json")]
    Show {
        /// Table name
        table: String,

        /// Page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Rows per page (defaults to view.pageSize, capped at view.maxPageSize)
        #[arg(long)]
        page_size: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find rows containing a term (case-insensitive substring)
    #[command(after_help = "\
Examples:
  sjoin search customers acme
  sjoin search customers eu --column region --json")]
    Search {
        /// Table name
        table: String,

        /// Text to look for
        term: String,

        /// Only look in this column
        #[arg(long)]
        column: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Pull columns from a target table into a source table by key
    #[command(after_help = "\
Examples:
  sjoin match orders customer_id customers --columns name,region
  sjoin match orders customer_id customers --columns region --select C2=1
  sjoin match orders customer_id customers --columns region --first -o joined.xlsx

The target is keyed on its first column. Keys compare trimmed and
case-insensitively. When one key maps to several distinct values the
command lists them and exits with code 6; pick one per key with
--select KEY=INDEX, or take option 0 everywhere with --first.")]
    Match {
        /// Source table (every row is kept)
        source: String,

        /// Source column holding the join key
        column: String,

        /// Target table
        target: String,

        /// Target columns to bring over (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,

        /// Resolve a multi-value key: KEY=INDEX (repeatable)
        #[arg(long = "select", value_name = "KEY=INDEX")]
        select: Vec<String>,

        /// Use the first option for every multi-value key
        #[arg(long, conflicts_with = "select")]
        first: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Chain several targets onto a source table, keeping every match
    #[command(after_help = "\
Examples:
  sjoin multi-match --plan enrich.toml
  sjoin multi-match orders customer_id --plan enrich.toml -o enriched.csv

Plan file (TOML):
  source_table = \"orders\"          # optional when given on the command line
  source_column = \"customer_id\"

  [[targets]]
  target_table = \"customers\"
  target_match_column = \"id\"
  target_columns = [\"name\", \"region\"]

  [[targets]]
  source_column = \"region(customers)\"
  target_table = \"reps\"
  target_match_column = \"region\"
  target_columns = [\"rep\"]

Targets apply in order; each may use columns added by earlier ones.")]
    MultiMatch {
        /// Source table (overrides the plan's source_table)
        source: Option<String>,

        /// Source join column (overrides the plan's source_column)
        column: Option<String>,

        /// Match plan (TOML)
        #[arg(long)]
        plan: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Remove a table
    Delete {
        /// Table name
        table: String,
    },

    /// Write a table to .csv, .tsv, .xlsx or .json
    #[command(after_help = "\
Examples:
  sjoin export joined -o joined.xlsx
  sjoin export joined -o subset.csv --columns id,name")]
    Export {
        /// Table name
        table: String,

        /// Destination file; the extension picks the format
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// Columns to write, in this order (comma-separated)
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
    },

    /// Serve the table registry over TCP (JSON lines)
    ///
    /// `load_file` and `export` requests take paths relative to
    /// server.fileRoot (default: the data directory); absolute paths and
    /// `..` are refused. Stops on Ctrl-C or SIGTERM after saving the
    /// snapshot.
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Where a match result goes.
#[derive(clap::Args)]
struct OutputArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Write the result to a file instead of stdout (.csv, .tsv, .xlsx, .json)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Register the result as a new table
    #[arg(long, value_name = "NAME")]
    save_as: Option<String>,
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  sheetjoin-engine ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  sheetjoin-engine ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // The log level comes from settings, so a bad settings file is only
    // reported once the logger is up.
    let (mut settings, settings_error) = match Settings::try_load() {
        Ok(settings) => (settings, None),
        Err(e) => (Settings::default(), Some(e)),
    };
    if let Some(dir) = cli.data_dir {
        settings.data_dir = Some(dir);
    }
    init_logging(cli.log_level.as_deref(), &settings);
    if let Some(e) = settings_error {
        log::warn!("{}; using default settings", e);
    }

    let store = Store::open(&settings.snapshot_path());

    let result = match cli.command {
        Commands::Load { files, name } => cmd_load(&store, files, name),
        Commands::Tables { json } => cmd_tables(&store, json),
        Commands::Show { table, page, page_size, json } => {
            cmd_show(&store, &settings, &table, page, page_size, json)
        }
        Commands::Search { table, term, column, json } => {
            cmd_search(&store, &table, &term, column.as_deref(), json)
        }
        Commands::Match { source, column, target, columns, select, first, output } => {
            parse_selections(&select).and_then(|selections| {
                let request = MatchRequest {
                    source_table: source,
                    source_column: column,
                    target_table: target,
                    target_columns: columns,
                    selections,
                };
                cmd_match(&store, request, first, output)
            })
        }
        Commands::MultiMatch { source, column, plan, output } => {
            cmd_multi_match(&store, source, column, &plan, output)
        }
        Commands::Delete { table } => cmd_delete(&store, &table),
        Commands::Export { table, output, columns } => {
            cmd_export(&store, &table, &output, columns.as_deref())
        }
        Commands::Serve { bind } => cmd_serve(store, settings, bind),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(filter: Option<&str>, settings: &Settings) {
    let mut builder = match filter {
        Some(filter) => {
            let mut builder = env_logger::Builder::new();
            builder.parse_filters(filter);
            builder
        }
        None => env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(settings.log_level.as_str()),
        ),
    };
    builder.init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    /// Engine failure with its kind-specific exit code.
    pub fn engine(err: MatchError) -> Self {
        let code = match_error_exit_code(&err);
        let hint = match code {
            EXIT_NOT_FOUND => Some("run `sjoin tables` to list loaded tables".to_string()),
            EXIT_INVALID_COLUMN => Some("run `sjoin show <table>` to see its columns".to_string()),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<MatchError> for CliError {
    fn from(err: MatchError) -> Self {
        Self::engine(err)
    }
}

// ============================================================================
// load / tables / show / search
// ============================================================================

fn cmd_load(store: &Store, files: Vec<PathBuf>, name: Option<String>) -> Result<(), CliError> {
    if name.is_some() && files.len() > 1 {
        return Err(CliError::usage("--name can only be used with a single file"));
    }

    // Import everything first so a bad file leaves the registry untouched
    let mut tables = Vec::with_capacity(files.len());
    for file in &files {
        let table = sheetjoin_io::import_table(file, name.as_deref())
            .map_err(|e| CliError::io(format!("{}: {}", file.display(), e)))?;
        tables.push(table);
    }

    for table in tables {
        let (table_name, rows, cols) = (table.name().to_string(), table.row_count(), table.columns().len());
        let replaced = store.registry().put(table).is_some();
        println!(
            "loaded '{}' ({} rows, {} columns){}",
            table_name,
            rows,
            cols,
            if replaced { ", replaced existing table" } else { "" }
        );
    }
    store.persist();
    Ok(())
}

fn cmd_tables(store: &Store, json: bool) -> Result<(), CliError> {
    let tables = store.registry().list();

    if json {
        return print_json(&tables);
    }
    if tables.is_empty() {
        eprintln!("No tables loaded.");
        return Ok(());
    }

    let columns = ["NAME", "ROWS", "COLUMNS"].map(String::from);
    let rows: Vec<Vec<String>> = tables
        .iter()
        .map(|t| vec![t.name.clone(), t.row_count.to_string(), t.columns.join(", ")])
        .collect();
    print!("{}", render::format_rows(&columns, &rows));
    Ok(())
}

#[derive(Serialize)]
struct PageOutput<'a> {
    name: &'a str,
    columns: &'a [String],
    data: Vec<Record>,
    page: usize,
    page_size: usize,
    pages: usize,
    total: usize,
}

fn cmd_show(
    store: &Store,
    settings: &Settings,
    name: &str,
    page: usize,
    page_size: Option<usize>,
    json: bool,
) -> Result<(), CliError> {
    if page == 0 {
        return Err(CliError::usage("--page starts at 1"));
    }
    let table = store.registry().get(name)?;
    let page_size = settings.clamp_page_size(page_size);
    let output = PageOutput {
        name: table.name(),
        columns: table.columns(),
        data: table.page(page, page_size),
        page,
        page_size,
        pages: table.row_count().div_ceil(page_size),
        total: table.row_count(),
    };

    if json {
        return print_json(&output);
    }
    print!("{}", render::format_records(output.columns, &output.data));
    eprintln!("page {}/{} ({} rows)", output.page, output.pages.max(1), output.total);
    Ok(())
}

fn cmd_search(store: &Store, name: &str, term: &str, column: Option<&str>, json: bool) -> Result<(), CliError> {
    let table = store.registry().get(name)?;
    let hits = search(&table, term, column)?;

    if json {
        return print_json(&hits);
    }
    print!("{}", render::format_records(table.columns(), &hits));
    eprintln!("{} matching row(s)", hits.len());
    Ok(())
}

// ============================================================================
// match / multi-match
// ============================================================================

/// Parse repeated `KEY=INDEX` flags. The last `=` separates the index, so
/// keys may themselves contain `=`.
fn parse_selections(args: &[String]) -> Result<Option<SelectionMap>, CliError> {
    if args.is_empty() {
        return Ok(None);
    }
    let mut selections = SelectionMap::new();
    for arg in args {
        let (key, index) = arg
            .rsplit_once('=')
            .ok_or_else(|| CliError::usage(format!("invalid --select '{}': expected KEY=INDEX", arg)))?;
        let index: usize = index.trim().parse().map_err(|_| {
            CliError::usage(format!("invalid --select '{}': '{}' is not an option index", arg, index))
        })?;
        selections.insert(key.to_string(), index);
    }
    Ok(Some(selections))
}

fn cmd_match(store: &Store, mut request: MatchRequest, first: bool, output: OutputArgs) -> Result<(), CliError> {
    let engine = MatchEngine::new(store.registry());

    let table = match engine.run(&request)? {
        MatchOutcome::Success(table) => table,
        MatchOutcome::NeedsSelection(pending) if first => {
            log::info!("{} multi-value key(s) resolved to their first option", pending.conflicts.len());
            request.selections = Some(pending.first_options());
            engine
                .run(&request)?
                .into_table()
                .ok_or_else(|| CliError::engine(MatchError::join_failure("selections did not resolve every conflict")))?
        }
        MatchOutcome::NeedsSelection(pending) => return Err(report_conflicts(&pending, output.json)),
    };

    emit_result(store, table, &output)
}

fn report_conflicts(pending: &PendingSelection, json: bool) -> CliError {
    if json {
        if let Err(e) = print_json(pending) {
            return e;
        }
    } else {
        println!(
            "{} key(s) in '{}' map to more than one value:",
            pending.conflicts.len(),
            pending.target_table
        );
        for conflict in &pending.conflicts {
            println!();
            println!("  {} = {}", pending.key_column, conflict.key);
            for (i, option) in conflict.options.iter().enumerate() {
                let values: Vec<String> = option
                    .iter()
                    .map(|(column, cell)| format!("{}={}", column, cell.display()))
                    .collect();
                println!("    [{}] {}", i, values.join(", "));
            }
        }
    }

    CliError {
        code: EXIT_NEEDS_SELECTION,
        message: format!("{} key(s) need a selection", pending.conflicts.len()),
        hint: None,
    }
    .with_hint("choose with --select KEY=INDEX (repeatable), or use --first to take option 0")
}

fn cmd_multi_match(
    store: &Store,
    source: Option<String>,
    column: Option<String>,
    plan_path: &Path,
    output: OutputArgs,
) -> Result<(), CliError> {
    let contents = std::fs::read_to_string(plan_path)
        .map_err(|e| CliError::io(format!("cannot read plan {}: {}", plan_path.display(), e)))?;
    let mut plan = MultiMatchRequest::parse_toml(&contents)?;
    if let Some(source) = source {
        plan.source_table = source;
    }
    if let Some(column) = column {
        plan.source_column = column;
    }
    plan.validate()?;

    let table = MatchEngine::new(store.registry()).run_multi(&plan)?;
    emit_result(store, table, &output)
}

/// Print, write and/or register a match result.
fn emit_result(store: &Store, table: Table, output: &OutputArgs) -> Result<(), CliError> {
    if let Some(path) = &output.output {
        let sheet = ExportBuilder::from_table(&table, None);
        let format = export::write(&sheet, path).map_err(CliError::io)?;
        eprintln!("wrote {} rows to {} ({})", sheet.rows.len(), path.display(), format);
    } else if output.json {
        print_json(&table.records())?;
    } else {
        print!("{}", render::format_records(table.columns(), &table.records()));
        eprintln!("{} row(s)", table.row_count());
    }

    if let Some(name) = &output.save_as {
        if name.trim().is_empty() {
            return Err(CliError::usage("--save-as needs a table name"));
        }
        store.registry().put(table.renamed(name.clone()));
        store.persist();
        eprintln!("saved as '{}'", name);
    }
    Ok(())
}

// ============================================================================
// delete / export / serve
// ============================================================================

fn cmd_delete(store: &Store, name: &str) -> Result<(), CliError> {
    store.registry().delete(name)?;
    store.persist();
    eprintln!("deleted '{}'", name);
    Ok(())
}

fn cmd_export(store: &Store, name: &str, path: &Path, columns: Option<&[String]>) -> Result<(), CliError> {
    let table = store.registry().get(name)?;
    let sheet = ExportBuilder::from_table(&table, columns);
    let format = export::write(&sheet, path).map_err(CliError::io)?;
    eprintln!("wrote {} rows to {} ({})", sheet.rows.len(), path.display(), format);
    Ok(())
}

fn cmd_serve(store: Store, settings: Settings, bind: Option<String>) -> Result<(), CliError> {
    let bind = bind.unwrap_or_else(|| settings.bind.clone());

    let mut server = TableServer::new();
    // First signal asks for a clean stop; a second one exits immediately.
    for &signal in signal_hook::consts::TERM_SIGNALS {
        signal_hook::flag::register_conditional_shutdown(signal, 1, server.shutdown_flag())
            .and_then(|_| signal_hook::flag::register(signal, server.shutdown_flag()))
            .map_err(|e| CliError::io(format!("cannot install signal handler: {}", e)))?;
    }

    let store = Arc::new(store);
    let addr = server
        .start(&bind, Arc::clone(&store), Arc::new(settings))
        .map_err(|e| CliError::io(format!("cannot listen on {}: {}", bind, e)))?;
    eprintln!("serving tables on {}", addr);

    server.wait();
    log::info!("Shutdown requested; saving snapshot");
    drop(server);
    match Arc::try_unwrap(store) {
        Ok(store) => store.close(),
        Err(_) => log::warn!("Table server still holds the registry; snapshot may be stale"),
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError { code: EXIT_ERROR, message: e.to_string(), hint: None })?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selections_parse_last_equals() {
        let parsed = parse_selections(&["a=b=2".to_string(), " C1 =0".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(parsed.get("a=b"), Some(&2));
        assert_eq!(parsed.get(" C1 "), Some(&0));
        assert_eq!(parse_selections(&[]).unwrap(), None);
    }

    #[test]
    fn bad_selection_is_a_usage_error() {
        assert_eq!(parse_selections(&["nokey".to_string()]).unwrap_err().code, EXIT_USAGE);
        assert_eq!(parse_selections(&["k=x".to_string()]).unwrap_err().code, EXIT_USAGE);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
