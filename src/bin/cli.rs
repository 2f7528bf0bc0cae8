#![cfg(not(tarpaulin_include))]

use credit_desk::config::AppConfig;
use credit_desk::downloader::to_csv;
use credit_desk::history::{search, summarize};
use credit_desk::loader::import_csv;
use credit_desk::login::{Directory, Role};
use credit_desk::record::format_currency;
use credit_desk::store::{RecordStore, WorkbookStore, load_checked};
use std::env;
use std::fs;

const USAGE: &str = "Commands:
  import-csv <file.csv> [tab]             Replace a workbook tab with the CSV contents
  export-csv <file.csv> [tab]             Write a tab to CSV
  add-user <email> <password> <branch> <admin|manager>
                                          Register a user in the directory
  history [query]                         Search the historical tab and print totals";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    let config = AppConfig::from_env()?;

    match args.get(1).map(String::as_str) {
        Some("import-csv") if args.len() >= 3 => {
            let tab = args.get(3).unwrap_or(&config.active_tab);
            if let Some(parent) = config.workbook.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let rows = import_csv(&config.workbook, tab, &args[2])?;
            println!("Imported {} rows into '{}'", rows, tab);

            if *tab == config.active_tab {
                // Surface layout problems now rather than on the first save
                let mut store = WorkbookStore::open(&config.workbook, tab)?;
                load_checked(&mut store, &config.columns)?;
            }
        }
        Some("export-csv") if args.len() >= 3 => {
            let tab = args.get(3).unwrap_or(&config.active_tab);
            let table = WorkbookStore::open(&config.workbook, tab)?.load()?;
            fs::write(&args[2], to_csv(&table.headers, &table.records))?;
            println!("Wrote {} records to {}", table.len(), args[2]);
        }
        Some("add-user") if args.len() >= 6 => {
            let role = match args[5].to_lowercase().as_str() {
                "admin" => Role::Admin,
                "manager" | "gerente" => Role::Manager,
                other => return Err(format!("unknown role '{}'", other).into()),
            };
            let mut directory = Directory::load(&config.users_file)?;
            directory.add_user(&args[2], &args[3], &args[4], role)?;
            directory.save()?;
            println!("Registered {}", args[2]);
        }
        Some("history") => {
            let query = args.get(2).map(String::as_str).unwrap_or("");
            let table = WorkbookStore::open(&config.workbook, &config.history_tab)?.load()?;
            let hits = search(&table.records, query);
            let summary = summarize(hits.iter().copied(), &table.headers, &config.columns);

            println!("{} matching records", summary.records);
            for total in &summary.by_status {
                println!(
                    "  {:<14} {:>5}  {}",
                    total.status,
                    total.count,
                    format_currency(total.disbursed)
                );
            }
            println!("Requested: {}", format_currency(summary.requested_total));
            println!("Disbursed: {}", format_currency(summary.disbursed_total));
        }
        _ => {
            eprintln!("Usage: {} <command> [args]", args[0]);
            eprintln!("{}", USAGE);
        }
    }

    Ok(())
}
