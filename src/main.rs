use clap::Parser;
use tracing_subscriber::EnvFilter;

use docstash::{
    DataDir,
    DocStore,
    UploadPolicy,
    backup,
    cli::{
        AddArgs,
        BackupArgs,
        Cli,
        Command,
        ExportArgs,
        LsArgs,
        RestoreArgs,
        RmArgs,
        SearchArgs,
        ShowArgs,
        TagArgs,
        TagsAction,
        VerifyArgs,
    },
    error::{Error, Result},
    store::IntegrityIssue,
    tag_registry::TagRegistry,
};

fn init_tracing(verbose: u8) {
    let filter = if let Ok(env) = std::env::var("DOCSTASH_LOG") {
        EnvFilter::new(env)
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match cli.command {
        Command::Add(args) => cmd_add(&data_dir, &args)?,
        Command::Ls(args) => cmd_ls(&data_dir, &args)?,
        Command::Show(args) => cmd_show(&data_dir, &args)?,
        Command::Export(args) => cmd_export(&data_dir, &args)?,
        Command::Tag(args) => cmd_tag(&data_dir, &args)?,
        Command::Rm(args) => cmd_rm(&data_dir, &args)?,
        Command::Search(args) => cmd_search(&data_dir, &args)?,
        Command::Reindex => cmd_reindex(&data_dir)?,
        Command::Verify(args) => cmd_verify(&data_dir, &args)?,
        // Backup and restore work on the closed state directory; no
        // store handles may be open while they run.
        Command::Backup(args) => cmd_backup(&data_dir, &args)?,
        Command::Restore(args) => cmd_restore(&data_dir, &args)?,
        Command::Tags { action } => cmd_tags(&data_dir, &action)?,
        Command::Completions(args) => args.generate(),
    }

    Ok(())
}

fn open_store(data_dir: &DataDir) -> Result<DocStore> {
    DocStore::open(data_dir, UploadPolicy::from_env()?)
}

fn cmd_add(data_dir: &DataDir, args: &AddArgs) -> Result<()> {
    let filename = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            Error::Validation(format!(
                "not a usable filename: {}",
                args.file.display()
            ))
        })?
        .to_string();
    let bytes = std::fs::read(&args.file)?;

    let store = open_store(data_dir)?;
    let mut record = store.create(&filename, &bytes)?;
    if let Some(ref tag) = args.tag {
        record = store.set_tag(&record.id, tag)?;
    }

    if args.json {
        println!("{}", serde_json::to_string(&record)?);
    } else {
        println!("Stored '{}' as {} ({} bytes)", filename, record.id, record.size);
    }
    Ok(())
}

fn cmd_ls(data_dir: &DataDir, args: &LsArgs) -> Result<()> {
    let store = open_store(data_dir)?;
    let records = store.list(args.tag.as_deref())?;

    if args.json {
        println!("{}", serde_json::to_string(&records)?);
    } else if records.is_empty() {
        println!("No documents stored.");
    } else {
        for r in &records {
            let tag = if r.tag.is_empty() { "-" } else { &r.tag };
            println!("{}\t{}\t{}\t{}", r.id, tag, r.size, r.filename);
        }
    }
    Ok(())
}

fn cmd_show(data_dir: &DataDir, args: &ShowArgs) -> Result<()> {
    let store = open_store(data_dir)?;
    let record = store.get(&args.id)?;

    if args.json {
        println!("{}", serde_json::to_string(&record)?);
    } else {
        println!("id:         {}", record.id);
        println!("filename:   {}", record.filename);
        println!("title:      {}", record.title);
        println!("ext:        {}", record.ext);
        println!("size:       {}", record.size);
        println!("tag:        {}", record.tag);
        println!("sha256:     {}", record.sha256);
        println!("created_at: {}", record.created_at);
        println!("updated_at: {}", record.updated_at);
    }
    Ok(())
}

fn cmd_export(data_dir: &DataDir, args: &ExportArgs) -> Result<()> {
    let store = open_store(data_dir)?;
    let (record, bytes) = store.read_content(&args.id)?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| record.filename.clone().into());
    std::fs::write(&output, &bytes)?;
    println!("Wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

fn cmd_tag(data_dir: &DataDir, args: &TagArgs) -> Result<()> {
    let store = open_store(data_dir)?;
    let record = store.set_tag(&args.id, &args.tag)?;
    if record.tag.is_empty() {
        println!("Cleared tag on {}", record.id);
    } else {
        println!("Tagged {} as '{}'", record.id, record.tag);
    }
    Ok(())
}

fn cmd_rm(data_dir: &DataDir, args: &RmArgs) -> Result<()> {
    let store = open_store(data_dir)?;
    store.delete(&args.id)?;
    println!("Deleted {}", args.id);
    Ok(())
}

fn cmd_search(data_dir: &DataDir, args: &SearchArgs) -> Result<()> {
    let store = open_store(data_dir)?;
    let hits = store.search(&args.query, args.tag.as_deref(), args.count)?;

    if args.json {
        println!("{}", serde_json::to_string(&hits)?);
    } else if hits.is_empty() {
        println!("No matches for '{}'", args.query);
    } else {
        for hit in &hits {
            let tag = if hit.tag.is_empty() { "-" } else { &hit.tag };
            println!(
                "{:.3}\t{}\t{}\t{} ({})",
                hit.score, hit.id, tag, hit.title, hit.filename
            );
        }
    }
    Ok(())
}

fn cmd_reindex(data_dir: &DataDir) -> Result<()> {
    let store = open_store(data_dir)?;
    let count = store.reindex()?;
    println!("Reindexed {count} document(s).");
    Ok(())
}

fn cmd_verify(data_dir: &DataDir, args: &VerifyArgs) -> Result<()> {
    let store = open_store(data_dir)?;
    let report = store.verify()?;

    if args.json {
        println!("{}", serde_json::to_string(&report)?);
    } else if report.is_clean() {
        println!("{} document(s) verified, no issues.", report.checked);
    } else {
        println!(
            "{} document(s) verified, {} issue(s):",
            report.checked,
            report.issues.len()
        );
        for issue in &report.issues {
            match issue {
                IntegrityIssue::MissingBlob { id } => {
                    println!("  {id}: blob missing");
                }
                IntegrityIssue::SizeMismatch {
                    id,
                    expected,
                    actual,
                } => {
                    println!(
                        "  {id}: size mismatch (recorded {expected}, on disk {actual})"
                    );
                }
                IntegrityIssue::ChecksumMismatch { id, .. } => {
                    println!("  {id}: checksum mismatch");
                }
            }
        }
    }
    Ok(())
}

fn cmd_backup(data_dir: &DataDir, args: &BackupArgs) -> Result<()> {
    let dest = args
        .output
        .clone()
        .unwrap_or_else(|| backup::DEFAULT_ARCHIVE_NAME.into());
    backup::backup(data_dir.root(), &dest)?;
    println!("Backup written to {}", dest.display());
    Ok(())
}

fn cmd_restore(data_dir: &DataDir, args: &RestoreArgs) -> Result<()> {
    backup::restore(data_dir.root(), &args.archive)?;
    println!("Restored from {}", args.archive.display());
    Ok(())
}

fn cmd_tags(data_dir: &DataDir, action: &TagsAction) -> Result<()> {
    let registry = TagRegistry::open(data_dir.tags_file())?;

    match action {
        TagsAction::List { json } => {
            let names = registry.list()?;
            if *json {
                println!("{}", serde_json::to_string(&names)?);
            } else if names.is_empty() {
                println!("No tags registered.");
            } else {
                for name in &names {
                    println!("{name}");
                }
            }
        }
        TagsAction::Add { name } => {
            registry.add(name)?;
            println!("Registered tag '{}'", name.trim());
        }
        TagsAction::Remove { name } => {
            registry.remove(name)?;
            println!("Removed tag '{}'", name.trim());
        }
    }
    Ok(())
}
