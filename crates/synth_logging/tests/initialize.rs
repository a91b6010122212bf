use std::fs;

use log::LevelFilter;
use synth_logging::{initialize, synth_debug, synth_info, LogDestination};
use tempfile::TempDir;

// The global logger can be installed once per process, so only this test does it.
#[test]
fn file_logger_writes_records_and_installs_once() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("client.log");

    assert!(initialize(LogDestination::File(path.clone()), LevelFilter::Info));
    synth_info!("batch {} accepted", "b1");
    synth_debug!("below the configured level");

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("batch b1 accepted"), "log was: {content}");
    assert!(!content.contains("below the configured level"));

    assert!(!initialize(LogDestination::Terminal, LevelFilter::Debug));
}

#[test]
fn unwritable_log_file_is_reported() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("missing").join("client.log");
    assert!(!initialize(LogDestination::File(path), LevelFilter::Info));
}
