use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use professor_directory::collector::{self, browser::BrowserPortal, session};
use professor_directory::search::{self, SearchParams, SearchRequest};
use professor_directory::{config, db, loader, web};

#[derive(Parser)]
#[command(name = "professor_directory", about = "Faculty directory: portal collector, loader and search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the portal in a visible browser and save the session after SMS login
    Login,
    /// Walk the portal and write merged professor records as JSONL
    Collect {
        /// University to walk; repeat for several (default: from config)
        #[arg(short, long)]
        university: Vec<String>,
        /// Output file (default: from config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Run the browser without a window
        #[arg(long)]
        headless: bool,
    },
    /// Rewrite ids in a JSONL file to 1..N
    Renumber {
        /// JSONL file (default: collector output)
        path: Option<PathBuf>,
    },
    /// Replace the store's contents with a JSONL file
    Load {
        /// JSONL file (default: collector output)
        path: Option<PathBuf>,
    },
    /// Number of professors in the store
    Count,
    /// Query the store and print one page as a table
    Search {
        /// Substring matched against name, university, major and fields
        #[arg(short, long)]
        search: Option<String>,
        /// Required research fields, comma separated
        #[arg(short, long)]
        fields: Option<String>,
        /// name, university, major or h_index
        #[arg(long)]
        sort_by: Option<String>,
        /// asc or desc
        #[arg(long)]
        sort_dir: Option<String>,
        #[arg(short, long)]
        page: Option<String>,
    },
    /// Serve the search page and JSON API
    Serve {
        /// Listen address (default: from config)
        #[arg(short, long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = config::load()?;

    let result = match cli.command {
        Commands::Login => collector::browser::login(&settings).await,
        Commands::Collect { university, output, headless } => {
            let universities = if university.is_empty() { settings.universities.clone() } else { university };
            let output = output.unwrap_or_else(|| settings.output_path.clone());
            let cookies = session::load(&settings.session_path)?;

            let mut portal = BrowserPortal::connect(&settings, headless || settings.headless).await?;
            portal.restore_session(&cookies).await?;
            portal.open().await?;

            println!("Collecting {} universities...", universities.len());
            let run = collector::collect_run(&mut portal, &universities, Duration::from_secs(1)).await;
            if let Err(e) = portal.close().await {
                tracing::warn!("Browser did not close cleanly: {:#}", e);
            }

            run.summary.log();
            loader::write_jsonl(&output, &run.records)?;
            println!(
                "Saved {} professors to {} ({} merged repeats, {} problems).",
                run.records.len(),
                output.display(),
                run.summary.merged,
                run.summary.problems.len()
            );
            Ok(())
        }
        Commands::Renumber { path } => {
            let path = path.unwrap_or_else(|| settings.output_path.clone());
            let n = loader::renumber_file(&path)?;
            println!("Renumbered {} records in {}", n, path.display());
            Ok(())
        }
        Commands::Load { path } => {
            let path = path.unwrap_or_else(|| settings.output_path.clone());
            let conn = db::connect(&settings.db_path)?;
            let report = loader::load_file(&conn, &path)?;
            println!(
                "Imported {} documents ({} invalid lines skipped).",
                report.inserted, report.skipped
            );
            Ok(())
        }
        Commands::Count => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            println!("Total professors: {}", db::count_all(&conn)?);
            Ok(())
        }
        Commands::Search { search: term, fields, sort_by, sort_dir, page } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let request = SearchRequest::from_params(&SearchParams {
                search: term,
                fields,
                sort_by,
                sort_dir,
                page,
                theme: None,
            });
            let result = search::search(Some(&conn), &request).context("Search failed")?;
            print_page(&result);
            Ok(())
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.bind.clone());
            web::serve(&settings, &bind).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_page(page: &search::SearchPage) {
    if page.records.is_empty() {
        println!("No professors found ({} total matches).", page.total_count);
        return;
    }

    println!(
        "{:>4} | {:<28} | {:<20} | {:<24} | {:>4} | {:<30}",
        "id", "Name", "University", "Major", "H", "Research fields"
    );
    println!("{}", "-".repeat(124));
    for r in &page.records {
        println!(
            "{:>4} | {:<28} | {:<20} | {:<24} | {:>4} | {:<30}",
            r.id,
            truncate(&r.name, 28),
            truncate(&r.university, 20),
            truncate(&r.major, 24),
            r.h_index.as_deref().unwrap_or("-"),
            truncate(&r.research_fields.join(", "), 30),
        );
    }
    println!(
        "\nPage {} of {} | {} professors",
        page.page,
        page.total_pages.max(1),
        page.total_count
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
