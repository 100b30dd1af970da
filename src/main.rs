mod accounts;
mod cli;
mod dates;
mod db;
mod error;
mod fmt;
mod groups;
mod history;
mod ledger;
mod models;
mod picker;
mod reorder;
mod settings;
mod templates;
mod tsv;

use std::sync::Once;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::{
    AccountCommands, Cli, Commands, GroupCommands, Session, TemplateCommands, TransactionCommands,
};
use settings::load_settings;

const LOG_ENV: &str = "HEARTH_LOG";

static TRACING_INIT: Once = Once::new();

/// Log to stderr; `HEARTH_LOG` takes the usual filter directives.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    });
}

fn account(s: &mut Session, command: AccountCommands) -> error::Result<()> {
    match command {
        AccountCommands::List => cli::accounts::list(s),
        AccountCommands::Add { args } => cli::accounts::add(s, &args),
        AccountCommands::Edit => cli::accounts::edit(s),
        AccountCommands::Remove => cli::accounts::remove(s),
        AccountCommands::Reorder => cli::accounts::reorder(s),
        AccountCommands::Import { file } => cli::accounts::import(s, &file),
        AccountCommands::Export { file } => cli::accounts::export(s, file),
    }
}

fn transaction(s: &mut Session, command: TransactionCommands) -> error::Result<()> {
    match command {
        TransactionCommands::List { all, month } => cli::transactions::list(s, all, month.as_deref()),
        TransactionCommands::Add { args } => cli::transactions::add(s, &args),
        TransactionCommands::Edit => cli::transactions::edit(s),
        TransactionCommands::Remove => cli::transactions::remove(s),
        TransactionCommands::Undo => cli::transactions::undo(s),
        TransactionCommands::History { all, month } => cli::transactions::history(s, all, month.as_deref()),
        TransactionCommands::Search => cli::transactions::search(s),
        TransactionCommands::Import { file } => cli::transactions::import(s, &file),
        TransactionCommands::Export { file } => cli::transactions::export(s, file),
    }
}

fn template(s: &mut Session, command: TemplateCommands) -> error::Result<()> {
    match command {
        TemplateCommands::List => cli::templates::list(s),
        TemplateCommands::Add => cli::templates::add(s),
        TemplateCommands::Edit => cli::templates::edit(s),
        TemplateCommands::Remove => cli::templates::remove(s),
        TemplateCommands::Use => cli::templates::use_template(s),
        TemplateCommands::Import { file } => cli::templates::import(s, &file),
        TemplateCommands::Export { file } => cli::templates::export(s, file),
    }
}

fn group(s: &mut Session, command: GroupCommands) -> error::Result<()> {
    match command {
        GroupCommands::List => cli::groups::list(s),
        GroupCommands::Add => cli::groups::add(s),
        GroupCommands::Edit => cli::groups::edit(s),
        GroupCommands::Remove => cli::groups::remove(s),
    }
}

fn open() -> error::Result<Session<'static>> {
    Session::open(&load_settings())
}

fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init { data_dir } => cli::init::run(data_dir)?,
        Commands::Account { command } => account(&mut open()?, command)?,
        Commands::Transaction { command } => transaction(&mut open()?, command)?,
        Commands::Template { command } => template(&mut open()?, command)?,
        Commands::Group { command } => group(&mut open()?, command)?,
    }
    Ok(())
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        eprintln!("{} {e}", "Error:".red().bold());
        std::process::exit(1);
    }
}
