
use durawal::{
    framed_record_len, LogAnchor, LogManager, LogScanner, WalError, LOG_FILE_HEADER_SIZE,
    UNKNOWN_LSN,
};
use std::fs::OpenOptions;
use std::io::Write;
use temp_dir::TempDir;

#[test]
fn scan_of_fresh_log_is_empty() {
    let dir = TempDir::new().unwrap();
    let manager = LogManager::open(test_utils::spec_in(&dir)).unwrap();

    let mut scanner = LogScanner::new(manager.file_manager(), &manager.min_log_anchor());
    assert!(scanner.next_record().unwrap().is_none());
    assert_eq!(scanner.last_good_file_number(), 1);
    assert_eq!(scanner.last_good_offset(), LOG_FILE_HEADER_SIZE);
}

#[test]
fn records_come_back_in_order_with_last_good_tracking() {
    let dir = TempDir::new().unwrap();
    let manager = LogManager::open(test_utils::spec_in(&dir)).unwrap();
    let mut writer = manager.switch_to_next_log_file(None).unwrap();
    test_utils::append_record(&mut writer, 10, b"aa");
    test_utils::append_record(&mut writer, 11, b"bbbb");
    writer.close().unwrap();

    let mut scanner = LogScanner::new(manager.file_manager(), &manager.min_log_anchor());

    let first = scanner.next_record().unwrap().unwrap();
    assert_eq!(first, test_utils::record(10, b"aa"));
    let after_first = LOG_FILE_HEADER_SIZE + framed_record_len(2);
    assert_eq!(scanner.last_good_offset(), after_first);

    let second = scanner.next_record().unwrap().unwrap();
    assert_eq!(second, test_utils::record(11, b"bbbb"));
    assert_eq!(
        scanner.last_good_offset(),
        after_first + framed_record_len(4)
    );

    assert!(scanner.next_record().unwrap().is_none());
    assert_eq!(scanner.last_good_file_number(), 1);
}

#[test]
fn scanner_crosses_file_boundaries() {
    let dir = TempDir::new().unwrap();
    let manager = LogManager::open(test_utils::spec_in(&dir)).unwrap();

    let mut writer = manager.switch_to_next_log_file(None).unwrap();
    test_utils::append_record(&mut writer, 1, b"one");
    writer = manager.switch_to_next_log_file(Some(writer)).unwrap();
    test_utils::append_record(&mut writer, 2, b"two");
    test_utils::append_record(&mut writer, 3, b"three");
    writer = manager.switch_to_next_log_file(Some(writer)).unwrap();
    test_utils::append_record(&mut writer, 4, b"four");
    writer.close().unwrap();

    let records = test_utils::scan_all(&manager);
    assert_eq!(
        records,
        vec![
            test_utils::record(1, b"one"),
            test_utils::record(2, b"two"),
            test_utils::record(3, b"three"),
            test_utils::record(4, b"four"),
        ]
    );

    let mut scanner = LogScanner::new(manager.file_manager(), &manager.min_log_anchor());
    while scanner.next_record().unwrap().is_some() {}
    assert_eq!(scanner.last_good_file_number(), 3);
    assert_eq!(
        scanner.last_good_offset(),
        LOG_FILE_HEADER_SIZE + framed_record_len(4)
    );
}

#[test]
fn scan_can_start_mid_log() {
    let dir = TempDir::new().unwrap();
    let manager = LogManager::open(test_utils::spec_in(&dir)).unwrap();
    let mut writer = manager.switch_to_next_log_file(None).unwrap();
    test_utils::append_record(&mut writer, 1, b"skipped");
    test_utils::append_record(&mut writer, 2, b"wanted");
    writer.close().unwrap();

    let start = LogAnchor::new(1, LOG_FILE_HEADER_SIZE + framed_record_len(7), UNKNOWN_LSN);
    let records = test_utils::scan_from(&manager, &start);
    assert_eq!(records, vec![test_utils::record(2, b"wanted")]);
}

#[test]
fn damage_surfaces_once_then_reads_as_end_of_log() {
    let dir = TempDir::new().unwrap();
    let manager = LogManager::open(test_utils::spec_in(&dir)).unwrap();
    let mut writer = manager.switch_to_next_log_file(None).unwrap();
    test_utils::append_record(&mut writer, 1, b"intact");
    test_utils::append_record(&mut writer, 2, b"doomed");
    writer.close().unwrap();

    // flip a payload byte of the second record
    let after_first = LOG_FILE_HEADER_SIZE + framed_record_len(6);
    test_utils::flip_byte(
        &test_utils::log_path(&dir, 1),
        (after_first + 17) as u64,
    );

    let mut scanner = LogScanner::new(manager.file_manager(), &manager.min_log_anchor());
    assert_eq!(
        scanner.next_record().unwrap().unwrap(),
        test_utils::record(1, b"intact")
    );
    assert!(matches!(
        scanner.next_record(),
        Err(WalError::InvalidLog(_))
    ));
    assert!(scanner.next_record().unwrap().is_none());
    assert_eq!(scanner.last_good_file_number(), 1);
    assert_eq!(scanner.last_good_offset(), after_first);
}

#[test]
fn torn_record_at_the_tail_is_damage() {
    let dir = TempDir::new().unwrap();
    let manager = LogManager::open(test_utils::spec_in(&dir)).unwrap();
    let mut writer = manager.switch_to_next_log_file(None).unwrap();
    test_utils::append_record(&mut writer, 1, b"halfway");
    writer.close().unwrap();

    let full = (LOG_FILE_HEADER_SIZE + framed_record_len(7)) as u64;
    test_utils::truncate_file(&test_utils::log_path(&dir, 1), full - 3);

    let mut scanner = LogScanner::new(manager.file_manager(), &manager.min_log_anchor());
    assert!(matches!(
        scanner.next_record(),
        Err(WalError::InvalidLog(_))
    ));
    assert_eq!(scanner.last_good_file_number(), 1);
    assert_eq!(scanner.last_good_offset(), LOG_FILE_HEADER_SIZE);
}

#[test]
fn residue_below_a_record_header_blocks_crossing() {
    let dir = TempDir::new().unwrap();
    let manager = LogManager::open(test_utils::spec_in(&dir)).unwrap();
    let mut writer = manager.switch_to_next_log_file(None).unwrap();
    test_utils::append_record(&mut writer, 1, b"first");
    writer = manager.switch_to_next_log_file(Some(writer)).unwrap();
    test_utils::append_record(&mut writer, 2, b"second");
    writer.close().unwrap();

    // residue in file 1, even though file 2 continues the log
    let mut file = OpenOptions::new()
        .append(true)
        .open(test_utils::log_path(&dir, 1))
        .unwrap();
    file.write_all(b"junk").unwrap();
    drop(file);

    let mut scanner = LogScanner::new(manager.file_manager(), &manager.min_log_anchor());
    assert_eq!(
        scanner.next_record().unwrap().unwrap(),
        test_utils::record(1, b"first")
    );
    assert!(matches!(
        scanner.next_record(),
        Err(WalError::InvalidLog(_))
    ));
    assert_eq!(scanner.last_good_file_number(), 1);
    assert_eq!(
        scanner.last_good_offset(),
        LOG_FILE_HEADER_SIZE + framed_record_len(5)
    );
}

#[test]
fn scan_from_a_missing_file_is_a_clean_end() {
    let dir = TempDir::new().unwrap();
    let manager = LogManager::open(test_utils::spec_in(&dir)).unwrap();

    let start = LogAnchor::new(5, LOG_FILE_HEADER_SIZE, UNKNOWN_LSN);
    let mut scanner = LogScanner::new(manager.file_manager(), &start);
    assert!(scanner.next_record().unwrap().is_none());
    assert_eq!(scanner.last_good_file_number(), 5);
    assert_eq!(scanner.last_good_offset(), LOG_FILE_HEADER_SIZE);
}
