#![cfg(not(tarpaulin_include))]

use batchsheet::batch::Batch;
use batchsheet::downloader::{self, ExportFormat, ExportScope};
use batchsheet::gateway::{self, Notification, NotificationSink, StoreGateway};
use batchsheet::grid::{Grid, GridOptions, RowData};
use batchsheet::loader;
use batchsheet::saving::BatchStore;
use batchsheet::view::{SortDirection, SortSpec};
use batchsheet::wizard::ImportWizard;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::error::Error;
use std::fs;
use std::path::PathBuf;

/// Work with CSV batches from the terminal
#[derive(Debug, Parser)]
#[command(name = "batchsheet", version)]
struct Cli {
    /// Directory holding the per-user batch databases
    #[arg(long, env = "BATCHSHEET_DATA_DIR", default_value = "database", global = true)]
    data_dir: PathBuf,

    /// Owner of the batches
    #[arg(long, short, default_value = "local", global = true)]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import a CSV file as a new batch
    Import {
        file: PathBuf,
        /// Batch name, defaults to the file stem
        #[arg(long)]
        name: Option<String>,
    },
    /// List batches, newest first
    List,
    /// Print one page of a batch
    Show {
        batch: u64,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Change one cell and save it
    Edit {
        batch: u64,
        /// Row number on the shown page, starting at 1
        row: usize,
        column: String,
        value: String,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Move a column from one position to another (1-based)
    MoveColumn { batch: u64, from: usize, to: usize },
    /// Append a row; every column needs a value
    AddRow {
        batch: u64,
        /// Cells as COLUMN=VALUE
        fields: Vec<String>,
    },
    /// Export rows passing the filters
    Export {
        batch: u64,
        #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
        format: FormatArg,
        /// Export only these row numbers of the shown page
        #[arg(long = "select", value_name = "ROW")]
        selected: Vec<usize>,
        /// Output file, defaults to the batch name
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Delete a batch and its rows
    Delete { batch: u64 },
}

#[derive(Debug, Args)]
struct ViewArgs {
    /// Text to look for in any column
    #[arg(long)]
    search: Option<String>,
    /// Column filters as COLUMN=TEXT
    #[arg(long = "filter", value_name = "COLUMN=TEXT")]
    filters: Vec<String>,
    #[arg(long)]
    sort: Option<String>,
    #[arg(long, requires = "sort")]
    desc: bool,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = batchsheet::grid::DEFAULT_PAGE_SIZE)]
    page_size: usize,
    /// Columns to hide
    #[arg(long = "hide", value_name = "COLUMN")]
    hidden: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Xlsx,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Xlsx => ExportFormat::Xlsx,
        }
    }
}

/// Prints gateway outcomes as they arrive
struct PrintSink;

impl NotificationSink for PrintSink {
    fn notify(&self, notification: Notification) {
        if notification.is_error() {
            eprintln!("{}: {}", notification.title, notification.description);
        } else {
            println!("{}: {}", notification.title, notification.description);
        }
    }
}

fn split_pair(pair: &str) -> Result<(&str, &str), Box<dyn Error>> {
    pair.split_once('=')
        .ok_or_else(|| format!("expected COLUMN=VALUE, got {:?}", pair).into())
}

fn open_grid(store: &BatchStore, user: &str, id: u64) -> Result<(Batch, Grid), Box<dyn Error>> {
    let batch = store.get_batch(user, id)?;
    let rows: Vec<RowData> = store
        .batch_rows(user, id)?
        .iter()
        .map(|row| row.to_grid_row())
        .collect();
    let grid = Grid::new(batch.columns(), rows, GridOptions::default());
    Ok((batch, grid))
}

fn apply_view(grid: &mut Grid, view: &ViewArgs) -> Result<(), Box<dyn Error>> {
    for column in &view.hidden {
        grid.set_column_visible(column, false);
    }
    if let Some(search) = &view.search {
        grid.set_global_filter(search);
    }
    for filter in &view.filters {
        let (column, text) = split_pair(filter)?;
        if !grid.set_column_filter(column, text) {
            return Err(format!("unknown column: {}", column).into());
        }
    }
    if let Some(column) = &view.sort {
        let direction = if view.desc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        grid.set_sort(Some(SortSpec {
            column: column.clone(),
            direction,
        }));
    }
    grid.set_page_size(view.page_size);
    if view.page > 1 && !grid.set_page_index(view.page - 1) {
        return Err(format!("page {} is out of range", view.page).into());
    }
    Ok(())
}

fn print_page(grid: &Grid) {
    let columns = grid.visible_columns();
    let rows = grid.page_rows();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &rows {
        for (i, column) in columns.iter().enumerate() {
            let len = row.fields.get(column).map_or(0, |v| v.chars().count());
            widths[i] = widths[i].max(len);
        }
    }

    print!("{:>4} ", "#");
    for (column, width) in columns.iter().zip(&widths) {
        print!(" {:<width$}", column, width = *width);
    }
    println!();

    for row in &rows {
        print!("{:>4} ", row.display_index + 1);
        for (column, width) in columns.iter().zip(&widths) {
            let value = row.fields.get(column).map_or("", String::as_str);
            print!(" {:<width$}", value, width = *width);
        }
        println!();
    }

    if grid.filtered_count() == 0 {
        if grid.view_state().has_filters() {
            println!("No results.");
        } else {
            println!("No rows.");
        }
    } else {
        println!(
            "Page {} of {} ({} of {} rows)",
            grid.page_index() + 1,
            grid.page_count(),
            grid.filtered_count(),
            grid.row_count()
        );
    }
}

fn import(store: &BatchStore, user: &str, file: PathBuf, name: Option<String>) -> Result<(), Box<dyn Error>> {
    let parsed = loader::from_csv(&file)?;
    let name = name.unwrap_or_else(|| {
        file.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string()
    });

    let mut wizard = ImportWizard::new();
    wizard.set_batch_name(&name)?;
    wizard.attach_file(parsed)?;
    wizard.continue_to_review()?;
    if let Some(preview) = wizard.preview_grid() {
        print_page(preview);
    }

    let id = wizard.submit(|draft| store.upload_batch(user, draft))?;
    println!("Imported batch {} as \"{}\"", id, name);
    Ok(())
}

fn list(store: &BatchStore, user: &str) -> Result<(), Box<dyn Error>> {
    let batches = store.list_batches(user)?;
    if batches.is_empty() {
        println!("No batches uploaded yet.");
        return Ok(());
    }
    for batch in batches {
        println!(
            "{:>4}  {:<24} {:<24} {:>6} rows  {}",
            batch.id,
            batch.file_name,
            batch.original_name,
            batch.row_count,
            batch.uploaded_at.format("%d %B %Y")
        );
    }
    Ok(())
}

fn edit(
    store: &BatchStore,
    user: &str,
    id: u64,
    row: usize,
    column: &str,
    value: &str,
    view: &ViewArgs,
) -> Result<(), Box<dyn Error>> {
    let (_, mut grid) = open_grid(store, user, id)?;
    apply_view(&mut grid, view)?;

    let display_row = row.checked_sub(1).ok_or("row numbers start at 1")?;
    grid.activate_cell(display_row, column)?;
    grid.input(value)?;
    grid.blur();
    grid.save()?;

    let gateway = StoreGateway::new(store.clone(), user, id);
    let failures = gateway::dispatch(grid.take_events(), &gateway, &PrintSink);
    if failures > 0 {
        return Err("changes were not saved".into());
    }
    Ok(())
}

fn move_column(store: &BatchStore, user: &str, id: u64, from: usize, to: usize) -> Result<(), Box<dyn Error>> {
    let (_, mut grid) = open_grid(store, user, id)?;
    let from = from.checked_sub(1).ok_or("column positions start at 1")?;
    let to = to.checked_sub(1).ok_or("column positions start at 1")?;
    let order = grid
        .move_column(from, to)
        .ok_or("column position out of range")?;

    let gateway = StoreGateway::new(store.clone(), user, id);
    gateway::dispatch(grid.take_events(), &gateway, &PrintSink);
    println!("{}", order.join(", "));
    Ok(())
}

fn add_row(store: &BatchStore, user: &str, id: u64, fields: &[String]) -> Result<(), Box<dyn Error>> {
    let mut row = RowData::new();
    for field in fields {
        let (column, value) = split_pair(field)?;
        row.insert(column.to_string(), value.to_string());
    }
    let created = store.create_row(user, id, row)?;
    println!("Added row {} to batch {}", created.row_index, id);
    Ok(())
}

fn export(
    store: &BatchStore,
    user: &str,
    id: u64,
    format: ExportFormat,
    selected: &[usize],
    output: Option<PathBuf>,
    view: &ViewArgs,
) -> Result<(), Box<dyn Error>> {
    let (batch, mut grid) = open_grid(store, user, id)?;
    apply_view(&mut grid, view)?;

    let scope = if selected.is_empty() {
        ExportScope::All
    } else {
        for &row in selected {
            let display_row = row.checked_sub(1).ok_or("row numbers start at 1")?;
            grid.toggle_row_selected(display_row)?;
        }
        ExportScope::Selected
    };

    let bytes = downloader::export_grid(&grid, scope, format)?;
    let path = output
        .unwrap_or_else(|| PathBuf::from(downloader::export_file_name(&batch.file_name, format)));
    fs::write(&path, bytes)?;
    println!("Exported to {}", path.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let store = BatchStore::open(&cli.data_dir)?;
    let user = cli.user.as_str();

    match cli.command {
        Command::Import { file, name } => import(&store, user, file, name),
        Command::List => list(&store, user),
        Command::Show { batch, view } => {
            let (batch, mut grid) = open_grid(&store, user, batch)?;
            apply_view(&mut grid, &view)?;
            println!("{} ({})", batch.file_name, batch.original_name);
            print_page(&grid);
            Ok(())
        }
        Command::Edit {
            batch,
            row,
            column,
            value,
            view,
        } => edit(&store, user, batch, row, &column, &value, &view),
        Command::MoveColumn { batch, from, to } => move_column(&store, user, batch, from, to),
        Command::AddRow { batch, fields } => add_row(&store, user, batch, &fields),
        Command::Export {
            batch,
            format,
            selected,
            output,
            view,
        } => export(&store, user, batch, format.into(), &selected, output, &view),
        Command::Delete { batch } => {
            store.delete_batch(user, batch)?;
            println!("Deleted batch {}", batch);
            Ok(())
        }
    }
}
