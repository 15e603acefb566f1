use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{command_dump, command_show};

mod commands;

#[derive(Parser)]
#[command(version, about, arg_required_else_help(true))]
struct Cli {
    #[command(subcommand)]
    commands: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print class/member counts for dex files or APKs
    Show {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the full visitor event stream of one input
    Dump {
        path: PathBuf,

        #[arg(long)]
        skip_debug: bool,

        #[arg(long)]
        skip_code: bool,

        #[arg(long)]
        skip_annotation: bool,

        #[arg(long)]
        skip_field_constant: bool,

        #[arg(long)]
        ignore_read_exception: bool,

        #[arg(long)]
        keep_all_methods: bool,

        #[arg(long)]
        keep_clinit: bool,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match &cli.commands {
        Some(Commands::Show { paths }) => command_show(paths),
        Some(Commands::Dump {
            path,
            skip_debug,
            skip_code,
            skip_annotation,
            skip_field_constant,
            ignore_read_exception,
            keep_all_methods,
            keep_clinit,
        }) => {
            let mut config = dexpipe::Config::empty();
            config.set(dexpipe::Config::SKIP_DEBUG, *skip_debug);
            config.set(dexpipe::Config::SKIP_CODE, *skip_code);
            config.set(dexpipe::Config::SKIP_ANNOTATION, *skip_annotation);
            config.set(dexpipe::Config::SKIP_FIELD_CONSTANT, *skip_field_constant);
            config.set(dexpipe::Config::IGNORE_READ_EXCEPTION, *ignore_read_exception);
            config.set(dexpipe::Config::KEEP_ALL_METHODS, *keep_all_methods);
            config.set(dexpipe::Config::KEEP_CLINIT, *keep_clinit);

            command_dump(path, config)
        }
        None => Ok(()),
    };

    if let Err(err) = result {
        eprintln!("{:#}", err);
    }
}
