use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "docstash",
    about = "A personal document stash with full-text search and snapshot backups"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a file in the stash
    Add(AddArgs),
    /// List documents, newest first
    Ls(LsArgs),
    /// Show a document's metadata
    Show(ShowArgs),
    /// Write a document's original bytes back out
    Export(ExportArgs),
    /// Set or clear a document's tag
    Tag(TagArgs),
    /// Delete a document
    Rm(RmArgs),
    /// Search titles, filenames and tags
    Search(SearchArgs),
    /// Rebuild the search index from the metadata store
    Reindex,
    /// Check every document's blob against its recorded checksum
    Verify(VerifyArgs),
    /// Archive the whole stash into a tar.gz snapshot
    Backup(BackupArgs),
    /// Replace the whole stash from a snapshot archive
    Restore(RestoreArgs),
    /// Manage the advisory tag name registry
    Tags {
        #[command(subcommand)]
        action: TagsAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Add --

#[derive(Debug, Parser)]
pub struct AddArgs {
    /// File to store
    pub file: PathBuf,

    /// Tag to assign right away
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Output the new record as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Ls --

#[derive(Debug, Parser)]
pub struct LsArgs {
    /// Only documents with this exact tag ("all" lists everything)
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Show --

#[derive(Debug, Parser)]
pub struct ShowArgs {
    /// Document id
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Export --

#[derive(Debug, Parser)]
pub struct ExportArgs {
    /// Document id
    pub id: String,

    /// Destination path (defaults to the original filename)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

// -- Tag --

#[derive(Debug, Parser)]
pub struct TagArgs {
    /// Document id
    pub id: String,

    /// Tag value; "all" clears the tag
    pub tag: String,
}

// -- Rm --

#[derive(Debug, Parser)]
pub struct RmArgs {
    /// Document id
    pub id: String,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Only documents with this exact tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Verify --

#[derive(Debug, Parser)]
pub struct VerifyArgs {
    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Backup --

#[derive(Debug, Parser)]
pub struct BackupArgs {
    /// Destination archive path (defaults to ./docstash-backup.tar.gz)
    pub output: Option<PathBuf>,
}

// -- Restore --

#[derive(Debug, Parser)]
pub struct RestoreArgs {
    /// Snapshot archive to restore from
    pub archive: PathBuf,
}

// -- Tags registry --

#[derive(Debug, Subcommand)]
pub enum TagsAction {
    /// List registered tag names
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Register a tag name
    Add {
        /// Tag name
        name: String,
    },
    /// Remove a tag name from the registry
    Remove {
        /// Tag name
        name: String,
    },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docstash",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["docstash", "search", "hello"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "hello");
                assert_eq!(args.count, 10);
                assert_eq!(args.tag, None);
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_add_with_tag() {
        let cli = Cli::parse_from([
            "docstash", "add", "report.pdf", "--tag", "finance",
        ]);
        match cli.command {
            Command::Add(args) => {
                assert_eq!(args.file, PathBuf::from("report.pdf"));
                assert_eq!(args.tag.as_deref(), Some("finance"));
            }
            _ => panic!("expected add command"),
        }
    }
}
