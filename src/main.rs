//! quillfs CLI entry point

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quillfs::cli::{CacheAction, Cli, Commands, OutputFormat};
use quillfs::search::{SearchTerm, TermOperator};
use quillfs::{config, Descriptor, MetadataCache, Mirror, StaticConfig, WorkspaceConfig};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn run() -> quillfs::Result<String> {
    let cli = Cli::parse();
    let cache_dir = cli
        .cache_dir
        .clone()
        .unwrap_or_else(MetadataCache::default_dir);

    match &cli.command {
        Commands::Scan(args) => run_scan(&cli, &cache_dir, &args.roots),
        Commands::Search(args) => run_search(&cli, &cache_dir, &args.roots, &args.words),
        Commands::Stats(args) => run_stats(&cli, &cache_dir, &args.roots),
        Commands::Tags(args) => run_tags(&cache_dir, &args.roots),
        Commands::Watch(args) => run_watch(&cache_dir, args),
        Commands::Cache(args) => match &args.action {
            CacheAction::Info { roots } => run_cache_info(&cache_dir, roots),
            CacheAction::Clear => run_cache_clear(&cache_dir),
        },
    }
}

fn load_mirror(cache_dir: &PathBuf, roots: &[PathBuf]) -> quillfs::Result<Mirror> {
    let mut mirror = Mirror::new(config::default_provider(), cache_dir.clone());
    for root in roots {
        mirror.load_path(root)?;
    }
    Ok(mirror)
}

fn run_scan(cli: &Cli, cache_dir: &PathBuf, roots: &[PathBuf]) -> quillfs::Result<String> {
    let mut mirror = load_mirror(cache_dir, roots)?;
    mirror.persist_cache();

    if cli.format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(mirror.roots())
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        return Ok(format!("{json}\n"));
    }

    let mut out = String::new();
    for root in mirror.roots() {
        render_tree(root, 0, &mut out);
    }
    Ok(out)
}

fn render_tree(node: &Descriptor, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match node {
        Descriptor::Directory(dir) => {
            let marker = if dir.not_found {
                " (not found)"
            } else if dir.is_git_repository {
                " (git)"
            } else {
                ""
            };
            out.push_str(&format!("{indent}{}/{marker}\n", dir.stat.name));
        }
        Descriptor::Markdown(md) => {
            let tags = if md.tags.is_empty() {
                String::new()
            } else {
                format!(" #{}", md.tags.join(" #"))
            };
            out.push_str(&format!(
                "{indent}{} ({} words){tags}\n",
                md.stat.name, md.word_count
            ));
        }
        _ => out.push_str(&format!("{indent}{}\n", node.name())),
    }
    for child in node.children() {
        render_tree(child, depth + 1, out);
    }
}

/// Turn CLI words into term groups: `!word` excludes, `a|b` is an OR group
fn parse_terms(words: &[String]) -> Vec<SearchTerm> {
    words
        .iter()
        .map(|word| {
            if let Some(rest) = word.strip_prefix('!') {
                SearchTerm {
                    words: vec![rest.to_string()],
                    operator: TermOperator::Not,
                }
            } else if word.contains('|') {
                SearchTerm {
                    words: word.split('|').map(str::to_string).collect(),
                    operator: TermOperator::Or,
                }
            } else {
                SearchTerm {
                    words: vec![word.clone()],
                    operator: TermOperator::And,
                }
            }
        })
        .collect()
}

fn run_search(
    cli: &Cli,
    cache_dir: &PathBuf,
    roots: &[PathBuf],
    words: &[String],
) -> quillfs::Result<String> {
    let mut mirror = load_mirror(cache_dir, roots)?;
    let terms = parse_terms(words);
    let hits = mirror.search_workspace(&terms);
    mirror.persist_cache();

    if cli.format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(&hits)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        return Ok(format!("{json}\n"));
    }

    let mut out = String::new();
    for (path, results) in &hits {
        out.push_str(&format!("{}\n", path.display()));
        for result in results {
            if result.line < 0 {
                out.push_str("  [name match]\n");
            } else {
                out.push_str(&format!("  {}: {}\n", result.line + 1, result.text));
            }
        }
    }
    if out.is_empty() {
        out.push_str("no matches\n");
    }
    Ok(out)
}

fn run_stats(cli: &Cli, cache_dir: &PathBuf, roots: &[PathBuf]) -> quillfs::Result<String> {
    let mut mirror = load_mirror(cache_dir, roots)?;
    let stats = mirror.statistics();
    mirror.persist_cache();

    if cli.format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(&stats)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        return Ok(format!("{json}\n"));
    }

    Ok(format!(
        "directories: {}\nmarkdown files: {}\ncode files: {}\nattachments: {}\n\
         words: min {} / max {} / mean {:.1} / sd {:.1}\n\
         chars: min {} / max {} / mean {:.1} / sd {:.1}\n",
        stats.directories,
        stats.markdown_files,
        stats.code_files,
        stats.attachments,
        stats.words.min,
        stats.words.max,
        stats.words.mean,
        stats.words.std_dev,
        stats.chars.min,
        stats.chars.max,
        stats.chars.mean,
        stats.chars.std_dev,
    ))
}

fn run_tags(cache_dir: &PathBuf, roots: &[PathBuf]) -> quillfs::Result<String> {
    let mut mirror = load_mirror(cache_dir, roots)?;
    let tags = mirror.all_tags();
    mirror.persist_cache();

    let mut names: Vec<&String> = tags.keys().collect();
    names.sort();

    let mut out = String::new();
    for name in names {
        let files = &tags[name];
        out.push_str(&format!("#{name} ({})\n", files.len()));
        for file in files {
            out.push_str(&format!("  {}\n", file.display()));
        }
    }
    if out.is_empty() {
        out.push_str("no tags\n");
    }
    Ok(out)
}

fn run_watch(cache_dir: &PathBuf, args: &quillfs::cli::WatchArgs) -> quillfs::Result<String> {
    let provider = Arc::new(StaticConfig(WorkspaceConfig {
        watcher_polling: args.poll,
        watcher_stability_ms: args.interval,
        ..WorkspaceConfig::default()
    }));
    let mut mirror = Mirror::new(provider, cache_dir.clone());
    for root in &args.roots {
        mirror.load_path(root)?;
    }
    mirror.enable_watching()?;
    eprintln!("watching {} root(s), Ctrl-C to stop", args.roots.len());

    let mut cursor = mirror.last_change();
    loop {
        mirror.wait_and_process(Duration::from_millis(500));
        for event in mirror.history_since(cursor) {
            println!("{:?} {}", event.kind, event.path.display());
            cursor = event.timestamp_ms;
        }
    }
}

fn run_cache_info(cache_dir: &PathBuf, roots: &[PathBuf]) -> quillfs::Result<String> {
    let mut mirror = load_mirror(cache_dir, roots)?;
    let stats = mirror.cache_stats();
    mirror.persist_cache();
    Ok(format!(
        "cache dir: {}\nshards loaded: {}\nentries: {}\nhits: {}\nmisses: {}\n",
        cache_dir.display(),
        stats.shards_loaded,
        stats.entries,
        stats.hits,
        stats.misses,
    ))
}

fn run_cache_clear(cache_dir: &PathBuf) -> quillfs::Result<String> {
    let mut cache = MetadataCache::new(cache_dir.clone());
    cache.clear();
    Ok(format!("cleared cache at {}\n", cache_dir.display()))
}
