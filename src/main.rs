//! Main entry point for datadiff CLI

use clap::Parser;
use datadiff::cli::{split_columns, Cli};
use datadiff::config::{self, ConnectConfig, Driver};
use datadiff::diff::{diff_tables, DiffOptions};
use datadiff::output;
use datadiff::progress::DiffProgress;
use datadiff::table::connect_to_table;
use datadiff::Result;

fn main() {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    // Parse command line arguments
    let cli = Cli::parse();

    // Set up verbose logging if requested
    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    // Single catch-all: any failure prints its message to stdout and exits 1
    if let Err(e) = run(cli) {
        println!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    config::load_env_file()?;

    let driver = Driver::parse(&cli.driver)?;
    let (mut source_config, mut target_config) = connection_configs(&cli, driver);
    source_config.resolve_secrets()?;
    target_config.resolve_secrets()?;

    let primary_keys = split_columns(&cli.primary_keys);
    let extra_columns = split_columns(&cli.extra_columns);

    let source = connect_to_table(
        &source_config,
        &cli.table,
        primary_keys.clone(),
        &cli.update_column,
        extra_columns.clone(),
    )?;
    let target = connect_to_table(
        &target_config,
        &cli.table,
        primary_keys,
        &cli.update_column,
        extra_columns,
    )?;

    let options = DiffOptions {
        threaded: cli.threads > 1,
        max_threadpool_size: cli.threads,
        bisection_factor: cli.bisection_factor,
        bisection_threshold: cli.bisection_threshold,
        limit: cli.limit,
    };

    let progress = DiffProgress::new();
    let callback = |done: u64, total: u64| progress.update(done, total);
    let result = diff_tables(&source, &target, &options, Some(&callback))?;
    progress.finish("Diff complete");

    if cli.json {
        output::print_json(&result)?;
    } else {
        output::print_result_list(&result);
        output::print_summary(&result.stats);
    }

    Ok(())
}

/// Build the two connection records from the flag surface
fn connection_configs(cli: &Cli, driver: Driver) -> (ConnectConfig, ConnectConfig) {
    let source = ConnectConfig {
        driver,
        user: cli.source_user.clone(),
        password: cli.source_password.clone(),
        account: cli.source_account.clone(),
        role: cli.role.clone(),
        warehouse: cli.warehouse.clone(),
        database: cli.database.clone(),
        schema: cli.schema.clone(),
    };
    let target = ConnectConfig {
        driver,
        user: cli.target_user.clone(),
        password: cli.target_password.clone(),
        account: cli.target_account.clone(),
        role: cli.role.clone(),
        warehouse: cli.warehouse.clone(),
        database: cli.database.clone(),
        schema: cli.schema.clone(),
    };
    (source, target)
}
