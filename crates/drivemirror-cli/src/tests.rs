use std::path::Path;

use clap::Parser;
use drivemirror_core::db::MirrorStore;
use drivemirror_core::{
    CleanupMode, ConflictStrategy, EngineConfig, MirrorRecord, RemoteNode, SessionStatus,
};
use pretty_assertions::assert_eq;

use crate::cli::{CleanupArg, Cli, Commands, StrategyArg};
use crate::commands::common::{
    format_record_lines, format_relative_time, format_sync_timestamp, normalize_root_id,
    open_store, parse_listing,
};
use crate::commands::sync::{build_sync_options, run_sync, SyncArgs};
use crate::config::read_engine_config;
use crate::error::CliError;

const LISTING: &str = r#"[
    {"id": "root", "name": "Root", "kind": "folder", "modifiedAt": 1},
    {"id": "docs", "parentId": "root", "name": "docs", "kind": "folder", "modifiedAt": 100},
    {"id": "f1", "parentId": "docs", "name": "a.txt", "kind": "file", "modifiedAt": 100, "sizeBytes": 12},
    {"id": "f2", "parentId": "root", "name": "b.txt", "kind": "file", "modifiedAt": 100}
]"#;

#[test]
fn normalize_root_id_trims_and_rejects_empty() {
    assert_eq!(normalize_root_id("  root ").unwrap(), "root");
    assert!(matches!(normalize_root_id(" \t"), Err(CliError::EmptyRootId)));
}

#[test]
fn parse_listing_reads_camel_case_nodes() {
    let nodes = parse_listing(LISTING, Path::new("listing.json")).unwrap();
    assert_eq!(nodes.len(), 4);
    assert_eq!(nodes[0].parent_id, None);
    assert_eq!(
        nodes[1],
        RemoteNode {
            mime_type: None,
            ..RemoteNode::folder("docs", Some("root"), "docs", 100)
        }
    );
    assert_eq!(nodes[2].size_bytes, Some(12));
    assert_eq!(nodes[3].size_bytes, None);
}

#[test]
fn parse_listing_reports_the_file() {
    let error = parse_listing("{not json", Path::new("broken.json")).unwrap_err();
    assert!(matches!(&error, CliError::Listing { path, .. } if path == Path::new("broken.json")));
    assert!(error.to_string().contains("broken.json"));
}

#[test]
fn sync_flags_override_engine_config() {
    let config = EngineConfig {
        batch_size: 10,
        conflict_strategy: ConflictStrategy::Merge,
        ..EngineConfig::default()
    };
    let args = SyncArgs {
        strategy: Some(ConflictStrategy::Overwrite),
        batch_size: Some(3),
        no_recursive: true,
        ..SyncArgs::default()
    };

    let options = build_sync_options(&config, &args).unwrap();
    assert_eq!(options.conflict_strategy, ConflictStrategy::Overwrite);
    assert_eq!(options.batch_size, 3);
    assert!(!options.recursive);
    assert_eq!(options.max_depth, config.max_depth);
    assert_eq!(options.cleanup_mode, config.cleanup_mode);
}

#[test]
fn hard_cleanup_flag_requires_confirmation() {
    let args = SyncArgs {
        cleanup: Some(CleanupMode::Hard),
        ..SyncArgs::default()
    };
    let error = build_sync_options(&EngineConfig::default(), &args).unwrap_err();
    assert!(matches!(
        error,
        CliError::Core(drivemirror_core::Error::HardDeleteNotConfirmed)
    ));

    let confirmed = SyncArgs {
        confirm_hard_delete: true,
        ..args
    };
    assert!(build_sync_options(&EngineConfig::default(), &confirmed).is_ok());
}

#[test]
fn zero_batch_size_flag_is_rejected() {
    let args = SyncArgs {
        batch_size: Some(0),
        ..SyncArgs::default()
    };
    assert!(build_sync_options(&EngineConfig::default(), &args).is_err());
}

#[test]
fn cli_parses_sync_flags() {
    let cli = Cli::try_parse_from([
        "drivemirror",
        "--db-path",
        "/tmp/mirror.db",
        "sync",
        "root",
        "--listing",
        "nodes.json",
        "--strategy",
        "skip",
        "--cleanup",
        "none",
        "--dry-run",
    ])
    .unwrap();

    assert_eq!(cli.db_path.as_deref(), Some(Path::new("/tmp/mirror.db")));
    match cli.command {
        Commands::Sync {
            root_id,
            strategy,
            cleanup,
            dry_run,
            ..
        } => {
            assert_eq!(root_id, "root");
            assert_eq!(strategy, Some(StrategyArg::Skip));
            assert_eq!(cleanup, Some(CleanupArg::None));
            assert!(dry_run);
        }
        _ => panic!("expected sync command"),
    }
}

#[test]
fn cli_rejects_unknown_strategy() {
    assert!(Cli::try_parse_from([
        "drivemirror",
        "sync",
        "root",
        "--listing",
        "nodes.json",
        "--strategy",
        "latest",
    ])
    .is_err());
}

#[test]
fn format_sync_timestamp_is_utc() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn format_relative_time_buckets() {
    let now = 10 * 24 * 3_600_000;
    assert_eq!(format_relative_time(now - 5_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
    assert_eq!(format_relative_time(now - 2 * 3_600_000, now), "2h ago");
    assert_eq!(format_relative_time(0, now), "10d ago");
}

#[test]
fn record_lines_mark_folders_and_deleted_rows() {
    let mut folder =
        MirrorRecord::from_remote(&RemoteNode::folder("docs", Some("root"), "docs", 1), "root", 1);
    folder.path = "/docs".to_string();
    let mut file = MirrorRecord::from_remote(
        &RemoteNode::file("f1", Some("docs"), "a.txt", 1, 3),
        "root",
        1,
    );
    file.path = "/docs/a.txt".to_string();
    file.is_deleted = true;

    let lines = format_record_lines(&[folder, file]);
    assert!(lines[0].ends_with("/docs/"));
    assert!(lines[1].ends_with("/docs/a.txt (deleted)"));
}

#[test]
fn engine_config_file_is_validated() {
    let dir = tempfile::tempdir().unwrap();
    let valid = dir.path().join("config.json");
    std::fs::write(&valid, r#"{"batch_size": 5, "conflict_strategy": "skip"}"#).unwrap();
    let config = read_engine_config(&valid).unwrap();
    assert_eq!(config.batch_size, 5);
    assert_eq!(config.conflict_strategy, ConflictStrategy::Skip);

    let invalid = dir.path().join("invalid.json");
    std::fs::write(&invalid, r#"{"batch_size": 0}"#).unwrap();
    assert!(matches!(read_engine_config(&invalid), Err(CliError::Config(_))));

    let missing = dir.path().join("missing.json");
    assert!(matches!(read_engine_config(&missing), Err(CliError::Config(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_command_populates_the_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let listing = dir.path().join("nodes.json");
    std::fs::write(&listing, LISTING).unwrap();
    let db_path = dir.path().join("nested").join("mirror.db");

    let args = SyncArgs {
        listing,
        ..SyncArgs::default()
    };
    run_sync("root", &args, &EngineConfig::default(), true, &db_path)
        .await
        .unwrap();

    let store = open_store(&db_path).unwrap();
    let paths: Vec<String> = store
        .list_records("root", false)
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.path)
        .collect();
    assert_eq!(paths, vec!["/b.txt", "/docs", "/docs/a.txt"]);

    let history = store.list_session_records(Some("root"), 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SessionStatus::Completed);
    assert_eq!(history[0].counts.added, 3);
    assert!(store.load_checkpoint("root").await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_command_dry_run_leaves_mirror_empty() {
    let dir = tempfile::tempdir().unwrap();
    let listing = dir.path().join("nodes.json");
    std::fs::write(&listing, LISTING).unwrap();
    let db_path = dir.path().join("mirror.db");

    let args = SyncArgs {
        listing,
        dry_run: true,
        ..SyncArgs::default()
    };
    run_sync("root", &args, &EngineConfig::default(), false, &db_path)
        .await
        .unwrap();

    let store = open_store(&db_path).unwrap();
    assert!(store.list_records("root", true).await.unwrap().is_empty());
    assert!(store.load_checkpoint("root").await.unwrap().is_none());
    assert!(store.list_session_records(None, 10).await.unwrap()[0].dry_run);
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_command_fails_for_unknown_root() {
    let dir = tempfile::tempdir().unwrap();
    let listing = dir.path().join("nodes.json");
    std::fs::write(&listing, LISTING).unwrap();
    let db_path = dir.path().join("mirror.db");

    let args = SyncArgs {
        listing,
        ..SyncArgs::default()
    };
    let error = run_sync("elsewhere", &args, &EngineConfig::default(), true, &db_path)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::SessionFailed { .. }));
}
