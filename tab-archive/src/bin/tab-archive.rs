// tab-archive: CLI over the local tab archive
//
// Commands:
//   tab-archive list [--deleted] [--filter <text>] [--limit <n>] [--json]
//   tab-archive recent [--limit <n>] [--json]
//   tab-archive show <url> [--json]
//   tab-archive delete|undelete|purge <url>
//   tab-archive retitle <url> [--title <text>] [--description <text>]
//   tab-archive export|import|export-html <file>

use anyhow::{Context, Result};
use std::{env, path::PathBuf};
use tab_archive_lib::{
    archive::{ArchiveService, ArchivedTab},
    config::Config,
    logging,
};

const DEFAULT_RECENT: usize = 10;

fn print_help() {
    println!(
        r#"tab-archive - browse and maintain the local tab archive

USAGE:
    tab-archive <COMMAND> [OPTIONS]

COMMANDS:
    list                   List archived tabs, most recently updated first
    recent                 List the most recently updated tabs
    show <url>             Show one archived tab
    delete <url>           Move a tab to the trash (reversible)
    undelete <url>         Restore a tab from the trash
    purge <url>            Permanently remove a tab and its screenshots
    retitle <url>          Change a tab's title and/or description
    export <file>          Write a backup bundle of all archived tabs
    import <file>          Merge a backup bundle into the archive
    export-html <file>     Write all archived tabs as a bookmarks file
    help                   Show this help message

OPTIONS:
    --deleted              List trashed tabs instead (for list)
    --filter <text>        Only tabs whose url, title or description contain <text>
    --limit <n>            Maximum number of tabs to list
    --title <text>         New title (for retitle)
    --description <text>   New description (for retitle)
    --json                 Output in JSON format

ENVIRONMENT:
    TAB_ARCHIVE_DIR        Archive directory (default ~/.tab-archive)
    TAB_ARCHIVE_LOG        Log filter, e.g. "debug" (default warn)
    TAB_ARCHIVE_DEBUG      Verbose logging when set

EXAMPLES:
    tab-archive list --filter rust --limit 20
    tab-archive retitle https://example.com/ --title "Example"
    tab-archive export ~/tabs-backup.zip"#
    );
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    let command = &args[1];

    // First non-option argument after the command
    let target = args.get(2).filter(|a| !a.starts_with("--")).cloned();

    // Parse options
    let mut json_output = false;
    let mut include_deleted = false;
    let mut filter: Option<String> = None;
    let mut limit: Option<usize> = None;
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--json" => {
                json_output = true;
            }
            "--deleted" => {
                include_deleted = true;
            }
            "--filter" | "-f" => {
                i += 1;
                if i < args.len() {
                    filter = Some(args[i].clone());
                }
            }
            "--limit" | "-n" => {
                i += 1;
                if i < args.len() {
                    match args[i].parse::<usize>() {
                        Ok(v) => limit = Some(v),
                        Err(_) => {
                            eprintln!("--limit must be a non-negative integer");
                            std::process::exit(1);
                        }
                    }
                }
            }
            "--title" => {
                i += 1;
                if i < args.len() {
                    title = Some(args[i].clone());
                }
            }
            "--description" => {
                i += 1;
                if i < args.len() {
                    description = Some(args[i].clone());
                }
            }
            _ => {}
        }
        i += 1;
    }

    if matches!(command.as_str(), "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let config = Config::from_env();
    logging::init(&config);

    let service = ArchiveService::open(&config)
        .with_context(|| format!("Failed to open archive at {}", config.data_dir().display()))?;

    match command.as_str() {
        "list" => {
            let tabs = service.get(filter.as_deref(), include_deleted)?;
            let tabs: Vec<ArchivedTab> = tabs
                .take(limit.unwrap_or(usize::MAX))
                .collect::<Result<_, _>>()?;
            print_tabs(&tabs, include_deleted, json_output)
        }

        "recent" => {
            let tabs: Vec<ArchivedTab> = service
                .get_recent(limit.unwrap_or(DEFAULT_RECENT))?
                .collect::<Result<_, _>>()?;
            print_tabs(&tabs, false, json_output)
        }

        "show" => {
            let url = require_target(&target, "show <url>");
            let Some(tab) = service.retrieve(&url)? else {
                eprintln!("No archived tab for {}", url);
                std::process::exit(1);
            };

            if json_output {
                println!("{}", serde_json::to_string_pretty(&tab)?);
                return Ok(());
            }

            println!("{}", tab.title());
            println!("  URL:         {}", tab.url());
            if let Some(description) = &tab.record.description {
                println!("  Description: {}", description);
            }
            println!("  Saved:       {}", tab.record.created.to_rfc3339());
            println!("  Updated:     {}", tab.record.updated.to_rfc3339());
            if let Some(deleted) = tab.record.deleted {
                println!("  Deleted:     {}", deleted.to_rfc3339());
            }
            println!("  Image:       {}", tab.image_url);
            println!("  Thumbnail:   {}", tab.thumb_url);
            Ok(())
        }

        "delete" => {
            let url = require_target(&target, "delete <url>");
            service.delete(&url)?;
            println!("Deleted {}", url);
            Ok(())
        }

        "undelete" => {
            let url = require_target(&target, "undelete <url>");
            service.undelete(&url)?;
            println!("Restored {}", url);
            Ok(())
        }

        "purge" => {
            let url = require_target(&target, "purge <url>");
            service.really_delete(&url)?;
            println!("Purged {}", url);
            Ok(())
        }

        "retitle" => {
            let url = require_target(&target, "retitle <url> [--title <text>] [--description <text>]");
            if title.is_none() && description.is_none() {
                eprintln!("Nothing to change: pass --title and/or --description");
                std::process::exit(1);
            }
            service
                .update(&url, title.as_deref(), description.as_deref())
                .with_context(|| format!("Failed to update {}", url))?;
            println!("Updated {}", url);
            Ok(())
        }

        "export" => {
            let path = PathBuf::from(require_target(&target, "export <file>"));
            let count = service
                .export(&path)
                .with_context(|| format!("Failed to export to {}", path.display()))?;
            report_count(json_output, "exported", count, &path)
        }

        "import" => {
            let path = PathBuf::from(require_target(&target, "import <file>"));
            let count = service
                .import(&path)
                .with_context(|| format!("Failed to import {}", path.display()))?;
            report_count(json_output, "imported", count, &path)
        }

        "export-html" => {
            let path = PathBuf::from(require_target(&target, "export-html <file>"));
            let count = service
                .export_as_html(&path)
                .with_context(|| format!("Failed to export bookmarks to {}", path.display()))?;
            report_count(json_output, "exported", count, &path)
        }

        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Run 'tab-archive help' for usage information.");
            std::process::exit(1);
        }
    }
}

fn require_target(target: &Option<String>, usage: &str) -> String {
    match target {
        Some(target) => target.clone(),
        None => {
            eprintln!("Usage: tab-archive {}", usage);
            std::process::exit(1);
        }
    }
}

fn print_tabs(tabs: &[ArchivedTab], deleted_view: bool, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(tabs)?);
        return Ok(());
    }

    if tabs.is_empty() {
        println!("{}", if deleted_view { "Trash is empty" } else { "No archived tabs" });
        return Ok(());
    }

    for tab in tabs {
        let when = match tab.record.deleted {
            Some(deleted) if deleted_view => deleted,
            _ => tab.record.updated,
        };
        println!(
            "{}  {}\n    {}",
            when.format("%Y-%m-%d %H:%M"),
            tab.title(),
            tab.url()
        );
    }
    Ok(())
}

fn report_count(json_output: bool, verb: &str, count: usize, path: &std::path::Path) -> Result<()> {
    if json_output {
        println!(
            "{}",
            serde_json::json!({ "action": verb, "count": count, "path": path.display().to_string() })
        );
    } else {
        println!("{} {} tabs ({})", capitalize(verb), count, path.display());
    }
    Ok(())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
