use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tunnelrun::commands::chunked::ChunkedArgs;
use tunnelrun::commands::common::CommandContext;
use tunnelrun::commands::run::RunArgs;
use tunnelrun::commands::{checkpoint, chunked, files, health, maintenance, run};
use tunnelrun::config::BridgeConfig;
use tunnelrun::logging;
use tunnelrun::validation::clap_task_id_validator;

#[derive(Parser)]
#[command(name = "tunnelrun")]
#[command(about = "Run code on a remote notebook runtime through its tunnel URL", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/tunnelrun/config.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the remote runtime is reachable
    Health,

    /// Inspect remote memory, GPU and packages and suggest a tier and batch size
    Probe,

    /// Execute code once (quick tier unless --long or --timeout-secs)
    Run {
        /// Code to execute
        code: Option<String>,

        /// Read the code from a file instead
        #[arg(short, long, conflicts_with = "code")]
        file: Option<PathBuf>,

        /// Use the long tier
        #[arg(short, long)]
        long: bool,

        /// Tier to run on: quick or long
        #[arg(long, conflicts_with = "long")]
        tier: Option<String>,

        /// Override the tier timeout (implies the long tier)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout_secs: Option<u64>,

        /// Store the result of a successful run under this name (implies the long tier)
        #[arg(long, value_parser = clap_task_id_validator)]
        checkpoint: Option<String>,
    },

    /// Run or resume a workload split into checkpointed batches
    ///
    /// The template is either wrapped in `for <loop-var> in range(start, end):`
    /// or, when it uses {start}, {end} or {batch_index}, filled in directly.
    Chunked {
        /// Task id to create or resume (derived from the workload if omitted)
        #[arg(long, value_parser = clap_task_id_validator)]
        task_id: Option<String>,

        /// Per-batch code template
        #[arg(long, required_unless_present = "template_file", conflicts_with = "template_file")]
        template: Option<String>,

        /// Read the template from a file
        #[arg(long)]
        template_file: Option<PathBuf>,

        /// Total number of items
        #[arg(long)]
        total: u64,

        /// Items per batch
        #[arg(long)]
        batch_size: u64,

        /// Code run once before the first batch
        #[arg(long)]
        setup: Option<String>,

        /// Loop variable for wrapped templates (default: i)
        #[arg(long)]
        loop_var: Option<String>,
    },

    /// List files in a remote directory (default: /content)
    Files {
        path: Option<String>,
    },

    /// Download a remote file into the save directory
    Download {
        /// Full remote path, e.g. /content/model.pkl
        remote_path: String,

        /// Local file name (default: the remote basename)
        #[arg(long)]
        name: Option<String>,
    },

    /// Free remote memory (all remote variables are lost)
    Cleanup,

    /// List variables defined in the remote runtime
    Variables,

    /// Inspect or discard chunked-task checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
}

#[derive(Subcommand)]
enum CheckpointCommands {
    /// Show a task's record or a named run result
    Show {
        #[arg(value_parser = clap_task_id_validator)]
        task_id: String,
    },

    /// List all records
    List,

    /// Discard a task's record
    Clear {
        #[arg(value_parser = clap_task_id_validator)]
        task_id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = BridgeConfig::load(cli.config.as_deref())?;
    let ctx = CommandContext {
        config,
        json: cli.json,
    };

    match cli.command {
        Commands::Health => health::check(&ctx),
        Commands::Probe => health::probe(&ctx),
        Commands::Run {
            code,
            file,
            long,
            tier,
            timeout_secs,
            checkpoint,
        } => run::execute(
            &ctx,
            RunArgs {
                code,
                file,
                long,
                tier,
                timeout_secs,
                checkpoint,
            },
        ),
        Commands::Chunked {
            task_id,
            template,
            template_file,
            total,
            batch_size,
            setup,
            loop_var,
        } => chunked::execute(
            &ctx,
            ChunkedArgs {
                task_id,
                template,
                template_file,
                total,
                batch_size,
                setup,
                loop_var,
            },
        ),
        Commands::Files { path } => files::list(&ctx, path),
        Commands::Download { remote_path, name } => files::download(&ctx, remote_path, name),
        Commands::Cleanup => maintenance::cleanup(&ctx),
        Commands::Variables => maintenance::variables(&ctx),
        Commands::Checkpoint { command } => match command {
            CheckpointCommands::Show { task_id } => checkpoint::show(&ctx, task_id),
            CheckpointCommands::List => checkpoint::list(&ctx),
            CheckpointCommands::Clear { task_id } => checkpoint::clear(&ctx, task_id),
        },
    }
}
