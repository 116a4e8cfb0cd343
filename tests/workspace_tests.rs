//! End-to-end tests for the workspace mirror
//!
//! Unit tests live next to their modules; these exercise whole flows:
//! boot with a warm cache, metadata derivation through load, settings
//! persistence, rename/move re-derivation, search, and history replay.

mod common;

use std::fs;
use std::time::{Duration, Instant};

use quillfs::descriptor::{SortDirection, SortKey, SortMode};
use quillfs::search::{SearchTerm, TermOperator};
use quillfs::ChangeKind;

use common::{cache_dir, mirror_with_cache, TestWorkspace};

fn sample_workspace() -> TestWorkspace {
    TestWorkspace::new()
        .file(
            "20240105093000 journal.md",
            "---\ntitle: Journal\nkeywords: [daily]\n---\n# Morning Pages\n\nThoughts with a #journal tag and a [[20240101120000]] link.\n",
        )
        .file("projects.md", "# Projects\n\nActive #work items.\n")
        .file("notes/idea.md", "An #idea worth keeping.\n")
        .file("notes/snippet.py", "print('hello')\n")
        .file("notes/photo.jpg", "not really a photo")
}

#[test]
fn load_derives_full_metadata() {
    let cache = cache_dir();
    let ws = sample_workspace();
    let mut mirror = mirror_with_cache(&cache);
    mirror.load_path(ws.path()).unwrap();

    let journal = mirror
        .find_file(&ws.join("20240105093000 journal.md"))
        .unwrap()
        .as_markdown()
        .unwrap();
    assert_eq!(journal.id.as_deref(), Some("20240105093000"));
    assert_eq!(journal.first_heading.as_deref(), Some("Morning Pages"));
    assert_eq!(journal.frontmatter.as_ref().unwrap().title.as_deref(), Some("Journal"));
    assert!(journal.tags.contains(&"journal".to_string()));
    assert!(journal.tags.contains(&"daily".to_string()));
    assert_eq!(journal.links, vec!["20240101120000"]);
    assert!(journal.word_count > 0);

    let stats = mirror.statistics();
    assert_eq!(stats.markdown_files, 3);
    assert_eq!(stats.code_files, 1);
    assert_eq!(stats.attachments, 1);
    assert_eq!(stats.directories, 2);
}

#[test]
fn second_boot_hits_the_cache() {
    let cache = cache_dir();
    let ws = sample_workspace();

    let mut first = mirror_with_cache(&cache);
    first.load_path(ws.path()).unwrap();
    let parsed = first
        .find_file(&ws.join("projects.md"))
        .unwrap()
        .clone();
    first.persist_cache();
    drop(first);

    let mut second = mirror_with_cache(&cache);
    second.load_path(ws.path()).unwrap();

    // Unchanged files come straight from the cache
    assert!(second.cache_stats().hits > 0);
    let reloaded = second.find_file(&ws.join("projects.md")).unwrap();
    assert_eq!(
        reloaded.as_markdown().unwrap().tags,
        parsed.as_markdown().unwrap().tags
    );
}

#[test]
fn modified_file_invalidates_cache_entry() {
    let cache = cache_dir();
    let ws = sample_workspace();

    let mut first = mirror_with_cache(&cache);
    first.load_path(ws.path()).unwrap();
    first.persist_cache();
    drop(first);

    // Touch the file with different content and a newer mtime
    std::thread::sleep(Duration::from_millis(20));
    fs::write(ws.join("projects.md"), "# Projects\n\nNow #replaced.\n").unwrap();

    let mut second = mirror_with_cache(&cache);
    second.load_path(ws.path()).unwrap();
    let md = second
        .find_file(&ws.join("projects.md"))
        .unwrap()
        .as_markdown()
        .unwrap();
    assert_eq!(md.tags, vec!["replaced"]);
}

#[test]
fn directory_settings_survive_reload() {
    let cache = cache_dir();
    let ws = sample_workspace();

    let mut mirror = mirror_with_cache(&cache);
    mirror.load_path(ws.path()).unwrap();
    mirror
        .set_directory_sorting(
            &ws.join("notes"),
            SortMode {
                key: SortKey::Time,
                direction: SortDirection::Descending,
            },
        )
        .unwrap();
    drop(mirror);

    let other_cache = cache_dir();
    let mut reloaded = mirror_with_cache(&other_cache);
    reloaded.load_path(ws.path()).unwrap();
    let notes = reloaded
        .find_directory(&ws.join("notes"))
        .unwrap()
        .as_directory()
        .unwrap();
    assert_eq!(notes.settings.sorting.key, SortKey::Time);
    assert_eq!(notes.settings.sorting.direction, SortDirection::Descending);
}

#[test]
fn rename_directory_rewrites_subtree() {
    let cache = cache_dir();
    let ws = sample_workspace();
    let mut mirror = mirror_with_cache(&cache);
    mirror.load_path(ws.path()).unwrap();

    let renamed = mirror.rename_directory(&ws.join("notes"), "archive").unwrap();
    assert!(mirror.find_directory(&ws.join("notes")).is_none());

    let moved_file = renamed.join("idea.md");
    let md = mirror.find_file(&moved_file).unwrap().as_markdown().unwrap();
    assert_eq!(md.stat.dir, renamed);
    assert!(md.tags.contains(&"idea".to_string()));
}

#[test]
fn move_file_between_directories() {
    let cache = cache_dir();
    let ws = sample_workspace();
    let mut mirror = mirror_with_cache(&cache);
    mirror.load_path(ws.path()).unwrap();

    let target = mirror
        .move_item(&ws.join("projects.md"), &ws.join("notes"))
        .unwrap();
    assert_eq!(target, ws.join("notes/projects.md"));
    assert!(mirror.find_file(&ws.join("projects.md")).is_none());
    assert!(mirror.find_file(&target).is_some());
    assert!(target.exists());
}

#[test]
fn search_applies_exclusion_law_end_to_end() {
    let cache = cache_dir();
    let ws = sample_workspace();
    let mut mirror = mirror_with_cache(&cache);
    mirror.load_path(ws.path()).unwrap();

    // Every file containing "tag" except those mentioning "work"
    let terms = vec![
        SearchTerm::new(TermOperator::Or, &["tag", "idea", "items"]),
        SearchTerm::new(TermOperator::Not, &["work"]),
    ];
    let hits = mirror.search_workspace(&terms);
    assert!(!hits.is_empty());
    for (path, _) in &hits {
        let content = fs::read_to_string(path).unwrap_or_default();
        assert!(
            !content.to_lowercase().contains("work"),
            "{} should have been excluded",
            path.display()
        );
    }
}

#[test]
fn tag_query_finds_tagged_files_only() {
    let cache = cache_dir();
    let ws = sample_workspace();
    let mut mirror = mirror_with_cache(&cache);
    mirror.load_path(ws.path()).unwrap();

    let terms = vec![SearchTerm::new(TermOperator::And, &["#idea"])];
    let hits = mirror.search_workspace(&terms);
    assert_eq!(hits.len(), 1);
    assert!(hits[0].0.ends_with("idea.md"));
}

#[test]
fn history_supports_incremental_replay() {
    let cache = cache_dir();
    let ws = sample_workspace();
    let mut mirror = mirror_with_cache(&cache);
    mirror.load_path(ws.path()).unwrap();

    let boot = mirror.last_change();
    mirror.create_file(ws.path(), "one.md", "# One\n").unwrap();
    let mid = mirror.last_change();
    mirror.create_file(ws.path(), "two.md", "# Two\n").unwrap();
    mirror.remove_file(&ws.join("one.md")).unwrap();

    let from_boot = mirror.history_since(boot);
    assert_eq!(from_boot.len(), 3);

    let tail = mirror.history_since(mid);
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].kind, ChangeKind::Add);
    assert_eq!(tail[1].kind, ChangeKind::Remove);

    // Replaying from the last timestamp yields nothing new
    assert!(mirror.history_since(mirror.last_change()).is_empty());
}

#[test]
fn all_tags_maps_owning_files() {
    let cache = cache_dir();
    let ws = sample_workspace();
    let mut mirror = mirror_with_cache(&cache);
    mirror.load_path(ws.path()).unwrap();

    let tags = mirror.all_tags();
    assert!(tags.contains_key("idea"));
    assert_eq!(tags["idea"].len(), 1);
    assert!(tags["idea"][0].ends_with("idea.md"));
}

#[test]
fn watcher_delivers_external_creation() {
    let cache = cache_dir();
    let ws = sample_workspace();
    let mut mirror = mirror_with_cache(&cache);
    mirror.load_path(ws.path()).unwrap();
    mirror.enable_watching().unwrap();

    let external = ws.join("external.md");
    fs::write(&external, "# External\n\nCreated behind the mirror's back.\n").unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while mirror.find_file(&external).is_none() && Instant::now() < deadline {
        mirror.wait_and_process(Duration::from_millis(200));
    }

    let md = mirror
        .find_file(&external)
        .expect("watcher should have mirrored the new file")
        .as_markdown()
        .unwrap();
    assert_eq!(md.first_heading.as_deref(), Some("External"));
}
