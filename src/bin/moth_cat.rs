use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use moth_catalog::app::{App, ProgressSink};
use moth_catalog::assets::FolderCache;
use moth_catalog::config::{ConfigLoader, ResolvedConfig};
use moth_catalog::domain::{Gender, Stage};
use moth_catalog::drive::{DriveClient, DriveHttpClient};
use moth_catalog::error::CatalogError;
use moth_catalog::output::{HumanOutput, JsonOutput, OutputMode};
use moth_catalog::photo::PhotoSource;
use moth_catalog::store::Store;

#[derive(Parser)]
#[command(name = "moth-cat")]
#[command(about = "Moth observation catalog with life-stage photo sets on remote storage")]
#[command(version, author)]
struct Cli {
    /// Print one JSON document per command instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    /// Overrides the data directory from the config file.
    #[arg(long, global = true)]
    data_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Replace the taxon index from a TaiCOL checklist CSV")]
    Import(ImportArgs),
    #[command(about = "Search the taxon index")]
    Search(SearchArgs),
    #[command(about = "Show recent imports")]
    History,
    #[command(subcommand)]
    #[command(about = "Create, inspect and edit catalog entries")]
    Entry(EntryCommand),
    #[command(subcommand)]
    #[command(about = "Manage photo sets of an entry")]
    Set(SetCommand),
    #[command(subcommand)]
    #[command(about = "Upload and edit photos")]
    Photo(PhotoCommand),
    #[command(about = "Export the catalog as a CSV checklist")]
    Export(ExportArgs),
    #[command(about = "Show catalog statistics")]
    Stats,
    #[command(about = "Show adult photos per entry")]
    Gallery,
    #[command(subcommand)]
    #[command(about = "Show or change settings")]
    Settings(SettingsCommand),
    #[command(about = "Delete all stored catalog data")]
    Reset,
}

#[derive(Args)]
struct ImportArgs {
    file: Utf8PathBuf,
}

#[derive(Args)]
struct SearchArgs {
    query: String,
}

#[derive(Subcommand)]
enum EntryCommand {
    #[command(about = "Create the entry for a taxon, or open the existing one")]
    Create { taxon_id: String },
    Show { taxon_id: String },
    List {
        #[arg(long, default_value = "")]
        filter: String,
    },
    Notes { taxon_id: String, notes: String },
    Delete { taxon_id: String },
}

#[derive(Subcommand)]
enum SetCommand {
    Add {
        taxon_id: String,
        #[arg(value_enum)]
        stage: Stage,
    },
    Delete(SetRef),
    #[command(about = "Set the iNaturalist observation link of a set")]
    Link {
        #[command(flatten)]
        set: SetRef,
        link: String,
    },
}

#[derive(Args)]
struct SetRef {
    taxon_id: String,
    #[arg(value_enum)]
    stage: Stage,
    set_id: String,
}

#[derive(Subcommand)]
enum PhotoCommand {
    #[command(about = "Upload files into a set's stage folder")]
    Attach {
        #[command(flatten)]
        set: SetRef,
        #[arg(required = true)]
        files: Vec<Utf8PathBuf>,
    },
    Remove {
        #[command(flatten)]
        set: SetRef,
        photo_id: String,
    },
    #[command(about = "Tag an adult photo as male, female or uncertain")]
    Gender {
        #[command(flatten)]
        set: SetRef,
        photo_id: String,
        #[arg(value_enum)]
        gender: Gender,
    },
}

#[derive(Args)]
struct ExportArgs {
    #[arg(long)]
    output: Option<Utf8PathBuf>,
}

#[derive(Subcommand)]
enum SettingsCommand {
    Show,
    SetRoot { folder_id: String },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CatalogError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::TaxonNotFound(_)
        | CatalogError::EntryNotFound(_)
        | CatalogError::PhotoSetNotFound(_)
        | CatalogError::PhotoNotFound(_)
        | CatalogError::NoValidRows(_)
        | CatalogError::MissingRootFolder
        | CatalogError::ConfigRead(_)
        | CatalogError::ConfigParse(_) => 2,
        CatalogError::DriveHttp(_) | CatalogError::DriveStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let data_dir = cli.data_dir.clone().or_else(|| config.data_dir.clone());
    let store = Store::new(data_dir.as_deref())?;

    match cli.command {
        Commands::Photo(PhotoCommand::Attach { set, files }) => {
            let drive = DriveHttpClient::new(&config.drive)?;
            let app = build_app(store, drive, &config)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .into_diagnostic()?;
            let sink = sink_for(output_mode);
            let report = runtime.block_on(app.attach_photos(
                &set.taxon_id,
                set.stage,
                &set.set_id,
                &files,
                sink,
            ))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&report).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_attach(&report),
            }
            Ok(())
        }
        command => {
            let app = build_app(store, NopDrive, &config)?;
            run_offline(command, &app, output_mode)
        }
    }
}

fn build_app<D: DriveClient>(
    store: Store,
    drive: D,
    config: &ResolvedConfig,
) -> Result<App<D>, CatalogError> {
    let cache = if config.persist_folder_cache {
        FolderCache::from_snapshot(store.load_folder_cache()?)
    } else {
        FolderCache::new()
    };
    Ok(App::new(store, drive, Arc::new(cache)).persist_folder_cache(config.persist_folder_cache))
}

fn sink_for(output_mode: OutputMode) -> &'static dyn ProgressSink {
    match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &HumanOutput,
    }
}

fn run_offline<D: DriveClient>(
    command: Commands,
    app: &App<D>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let json = output_mode == OutputMode::Json;
    let sink = sink_for(output_mode);
    match command {
        Commands::Import(args) => {
            let result = app.import_reference(&args.file, sink)?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                HumanOutput::print_import(&result);
            }
        }
        Commands::Search(args) => {
            let result = app.search(&args.query)?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                HumanOutput::print_search(&result);
            }
        }
        Commands::History => {
            let history = app.history()?;
            if json {
                JsonOutput::print(&history).into_diagnostic()?;
            } else {
                HumanOutput::print_history(&history);
            }
        }
        Commands::Entry(command) => run_entry(command, app, json)?,
        Commands::Set(command) => run_set(command, app, json)?,
        Commands::Photo(command) => run_photo(command, app, json)?,
        Commands::Export(args) => match args.output {
            Some(path) => {
                let result = app.export_to(&path)?;
                if json {
                    JsonOutput::print(&result).into_diagnostic()?;
                } else {
                    println!("Exported {} entries to {path}", result.rows);
                }
            }
            None => {
                let (bytes, _) = app.export_bytes()?;
                std::io::stdout().write_all(&bytes).into_diagnostic()?;
            }
        },
        Commands::Stats => {
            let stats = app.stats()?;
            if json {
                JsonOutput::print(&stats).into_diagnostic()?;
            } else {
                HumanOutput::print_stats(&stats);
            }
        }
        Commands::Gallery => {
            let gallery = app.gallery()?;
            if json {
                JsonOutput::print(&gallery).into_diagnostic()?;
            } else {
                HumanOutput::print_gallery(&gallery);
            }
        }
        Commands::Settings(command) => {
            let settings = match command {
                SettingsCommand::Show => app.settings()?,
                SettingsCommand::SetRoot { folder_id } => app.set_root_folder(&folder_id)?,
            };
            if json {
                JsonOutput::print(&settings).into_diagnostic()?;
            } else {
                HumanOutput::print_settings(&settings);
            }
        }
        Commands::Reset => {
            let result = app.reset(sink)?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                println!("Catalog data cleared from {}", app.store().root());
            }
        }
    }
    Ok(())
}

fn run_entry<D: DriveClient>(command: EntryCommand, app: &App<D>, json: bool) -> miette::Result<()> {
    match command {
        EntryCommand::Create { taxon_id } => {
            let result = app.create_entry(&taxon_id)?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                HumanOutput::print_entry_result(&result);
            }
        }
        EntryCommand::Show { taxon_id } => {
            let entry = app.show_entry(&taxon_id)?;
            if json {
                JsonOutput::print(&entry).into_diagnostic()?;
            } else {
                HumanOutput::print_entry(&entry);
            }
        }
        EntryCommand::List { filter } => {
            let result = app.list_entries(&filter)?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                HumanOutput::print_list(&result);
            }
        }
        EntryCommand::Notes { taxon_id, notes } => {
            let entry = app.update_notes(&taxon_id, &notes)?;
            if json {
                JsonOutput::print(&entry).into_diagnostic()?;
            } else {
                HumanOutput::print_entry(&entry);
            }
        }
        EntryCommand::Delete { taxon_id } => {
            let removal = app.delete_entry(&taxon_id)?;
            if json {
                JsonOutput::print(&removal).into_diagnostic()?;
            } else {
                HumanOutput::print_removal(&format!("entry {taxon_id}"), &removal);
            }
        }
    }
    Ok(())
}

fn run_set<D: DriveClient>(command: SetCommand, app: &App<D>, json: bool) -> miette::Result<()> {
    match command {
        SetCommand::Add { taxon_id, stage } => {
            let result = app.add_photo_set(&taxon_id, stage)?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                HumanOutput::print_new_set(result.stage, &result.set_id);
            }
        }
        SetCommand::Delete(set) => {
            let removal = app.delete_photo_set(&set.taxon_id, set.stage, &set.set_id)?;
            if json {
                JsonOutput::print(&removal).into_diagnostic()?;
            } else {
                HumanOutput::print_removal(&format!("set {}", set.set_id), &removal);
            }
        }
        SetCommand::Link { set, link } => {
            let entry = app.set_inat_link(&set.taxon_id, set.stage, &set.set_id, &link)?;
            if json {
                JsonOutput::print(&entry).into_diagnostic()?;
            } else {
                HumanOutput::print_entry(&entry);
            }
        }
    }
    Ok(())
}

fn run_photo<D: DriveClient>(command: PhotoCommand, app: &App<D>, json: bool) -> miette::Result<()> {
    match command {
        PhotoCommand::Attach { .. } => Err(miette::Report::msg(
            "photo upload requires the remote storage client",
        )),
        PhotoCommand::Remove { set, photo_id } => {
            let removal = app.remove_photo(&set.taxon_id, set.stage, &set.set_id, &photo_id)?;
            if json {
                JsonOutput::print(&removal).into_diagnostic()?;
            } else {
                HumanOutput::print_removal(&format!("photo {photo_id}"), &removal);
            }
            Ok(())
        }
        PhotoCommand::Gender {
            set,
            photo_id,
            gender,
        } => {
            let entry =
                app.set_gender(&set.taxon_id, set.stage, &set.set_id, &photo_id, gender)?;
            if json {
                JsonOutput::print(&entry).into_diagnostic()?;
            } else {
                HumanOutput::print_entry(&entry);
            }
            Ok(())
        }
    }
}

/// Stand-in for commands that never touch remote storage.
struct NopDrive;

#[async_trait]
impl DriveClient for NopDrive {
    async fn find_or_create_folder(
        &self,
        _parent_id: &str,
        _name: &str,
    ) -> Result<String, CatalogError> {
        Err(CatalogError::DriveHttp(
            "drive client not configured".to_string(),
        ))
    }

    async fn upload_file(
        &self,
        _photo: &PhotoSource,
        _folder_id: &str,
    ) -> Result<String, CatalogError> {
        Err(CatalogError::DriveHttp(
            "drive client not configured".to_string(),
        ))
    }
}
