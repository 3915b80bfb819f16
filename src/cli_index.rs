use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inode_index_server::config::DEFAULT_PAGE_SIZE;
use inode_index_server::{Inode, QueryRequest, ResultPage, SqliteIndex, SyncedQueryStore};
use std::num::NonZeroUsize;
use std::path::PathBuf;

fn parse_db_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s).canonicalize()?;
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite index database file.
    #[clap(value_parser = parse_db_path)]
    pub db_path: PathBuf,

    /// Index partition to read.
    #[clap(long)]
    pub scope: String,

    #[clap(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the sync progress.
    Status,
    /// Search inode names.
    Search {
        query: String,
        #[clap(long, default_value_t = 0)]
        page: usize,
    },
    /// List the most recently updated inodes.
    Latest {
        #[clap(long, default_value_t = 0)]
        page: usize,
    },
    /// Delete all indexed data of the scope.
    Clear,
}

fn print_page(page: &ResultPage<Inode>, page_index: usize) {
    if page.items.is_empty() {
        println!("No results (page {} of {}).", page_index + 1, page.page_count);
        return;
    }
    println!(
        "Page {} of {} ({} total):\n",
        page_index + 1,
        page.page_count,
        page.total_count
    );
    for inode in &page.items {
        println!(
            "{} -> {} {} bytes - {}",
            inode.name,
            inode.kind.as_str(),
            inode.size,
            inode.id
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    let page_size = NonZeroUsize::new(cli_args.page_size)
        .context("--page-size must be greater than zero")?;

    let index = SqliteIndex::open(&cli_args.db_path)?;
    let store = SyncedQueryStore::new(index.scoped(&cli_args.scope)?, page_size);

    match cli_args.command {
        Command::Status => {
            let subscription = store.initialize().await?;
            subscription.cancel();
            let progress = store.progress();
            match progress.total().known() {
                Some(total) => println!(
                    "Synced {}/{} ({:?})",
                    progress.synced(),
                    total,
                    progress.phase()
                ),
                None => println!(
                    "Synced {} of unknown total ({:?})",
                    progress.synced(),
                    progress.phase()
                ),
            }
        }
        Command::Search { query, page } => {
            let result = store.query(QueryRequest::search(query, page)).await?;
            print_page(&result, page);
        }
        Command::Latest { page } => {
            let result = store.query(QueryRequest::latest(page)).await?;
            print_page(&result, page);
        }
        Command::Clear => {
            store.clear().await?;
            println!("Cleared scope {}.", store.scope());
        }
    }

    Ok(())
}
