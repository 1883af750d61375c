pub mod catalog;
pub mod report;
pub mod timer;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, level_filters::LevelFilter};

use catalog::{
    process_client_command, process_project_command, process_setting_command,
    process_tag_command, ClientCommand, ProjectCommand, SettingCommand, TagCommand,
};
use report::{process_dashboard_command, process_report_command, ReportCommand};
use timer::{
    process_add_command, process_edit_command, process_start_command, process_status_command,
    process_stop_command, AddCommand, EditCommand, StartCommand,
};

use crate::{
    config::AppConfig,
    export::{export_to_file, import_from_file},
    report::ReportEngine,
    settings::Settings,
    storage::{local::LocalStore, Store},
    timer::TimerMachine,
    utils::{
        clock::DefaultClock,
        dir::ensure_dir,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Timeflow", version, long_about = None)]
#[command(about = "Track time against projects and turn it into reports")]
pub(crate) struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, global = true, help = "Print logs to stdout")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Log level (error, warn, info, debug, trace). Overrides RUST_LOG"
    )]
    log_filter: Option<LevelFilter>,
    #[arg(
        long,
        global = true,
        env = "TIMEFLOW_DIR",
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "TIMEFLOW_DB_NAME",
        help = "Name of the store file inside the application directory [default: timeflow.json]"
    )]
    db_name: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Start a timer. Fails if one is already running")]
    Start {
        #[command(flatten)]
        command: StartCommand,
    },
    #[command(about = "Stop the running timer")]
    Stop {},
    #[command(about = "Show the running timer")]
    Status {
        #[arg(short, long, help = "Keep updating the elapsed time until ctrl-c")]
        watch: bool,
    },
    #[command(about = "Change the running entry")]
    Edit {
        #[command(flatten)]
        command: EditCommand,
    },
    #[command(about = "Add a finished entry with explicit start and end")]
    Add {
        #[command(flatten)]
        command: AddCommand,
    },
    #[command(about = "Manage clients")]
    Client {
        #[command(subcommand)]
        command: ClientCommand,
    },
    #[command(about = "Manage projects")]
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    #[command(about = "Manage tags")]
    Tag {
        #[command(subcommand)]
        command: TagCommand,
    },
    #[command(about = "Read and change settings")]
    Setting {
        #[command(subcommand)]
        command: SettingCommand,
    },
    #[command(about = "Summary, detailed and weekly reports over a date range")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(about = "Totals for today, this week and this month")]
    Dashboard {
        #[arg(long, default_value_t = 5, help = "Number of recent entries to show")]
        recent: usize,
        #[arg(long, help = "Print the dashboard as JSON")]
        json: bool,
    },
    #[command(about = "Write all data into a JSON file")]
    Export { file: PathBuf },
    #[command(about = "Replace all data with the content of a JSON export")]
    Import {
        file: PathBuf,
        #[arg(long, help = "Confirm that existing data gets deleted")]
        yes: bool,
    },
}

/// Everything a command needs, built once per invocation.
pub(crate) struct AppContext {
    pub store: Arc<LocalStore>,
}

impl AppContext {
    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn timer(&self) -> TimerMachine {
        TimerMachine::new(self.store(), Arc::new(DefaultClock))
    }

    pub fn reports(&self) -> ReportEngine {
        ReportEngine::new(self.store())
    }

    pub fn settings(&self) -> Settings {
        Settings::new(self.store())
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::resolve(args.dir, args.db_name)?;
    let logging_level = args
        .log_filter
        .or(args.log.then_some(LevelFilter::TRACE));
    enable_logging(
        CLI_PREFIX,
        &ensure_dir(config.log_dir())?,
        logging_level,
        args.log,
    )?;
    info!("Using store {:?}", config.store_path());

    let context = AppContext {
        store: Arc::new(LocalStore::open(config.store_path()).await?),
    };

    match args.commands {
        Commands::Start { command } => process_start_command(&context, command).await,
        Commands::Stop {} => process_stop_command(&context).await,
        Commands::Status { watch } => process_status_command(&context, watch).await,
        Commands::Edit { command } => process_edit_command(&context, command).await,
        Commands::Add { command } => process_add_command(&context, command).await,
        Commands::Client { command } => process_client_command(&context, command).await,
        Commands::Project { command } => process_project_command(&context, command).await,
        Commands::Tag { command } => process_tag_command(&context, command).await,
        Commands::Setting { command } => process_setting_command(&context, command).await,
        Commands::Report { command } => process_report_command(&context, command).await,
        Commands::Dashboard { recent, json } => {
            process_dashboard_command(&context, recent, json).await
        }
        Commands::Export { file } => {
            let counts = export_to_file(context.store.as_ref(), &file).await?;
            println!("Exported {} entries to {}", counts.time_entries, file.display());
            Ok(())
        }
        Commands::Import { file, yes } => {
            if !yes {
                anyhow::bail!("Import deletes all existing data, pass --yes to confirm");
            }
            let counts = import_from_file(context.store.as_ref(), &file).await?;
            println!(
                "Imported {} clients, {} projects, {} tags, {} entries, {} settings",
                counts.clients, counts.projects, counts.tags, counts.time_entries, counts.settings
            );
            Ok(())
        }
    }
}
