//! Load and refresh tests for the instrument catalog
//!
//! Covers:
//! - Large datasets with a handful of malformed rows
//! - Symbol/token lookup agreement across exchange segments
//! - Refresh under concurrent readers
//! - Failed refresh keeping the served snapshot
//! - File sources (JSON array, JSON Lines, CSV, latest-in-directory)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use instrument_catalog::{
    CatalogError, CatalogSource, CatalogState, InstrumentCatalog, SourceFormat,
};
use serde_json::{json, Value};
use types::exchange::Exchange;

/// A scrip-master row. `tag` ends up in `name` so tests can tell datasets
/// apart.
fn equity_row(i: usize, token_base: usize, tag: &str) -> Value {
    json!({
        "token": (token_base + i).to_string(),
        "symbol": format!("SYM{:06}-EQ", i),
        "name": tag,
        "expiry": "",
        "strike": "-1.000000",
        "lotsize": "1",
        "instrumenttype": "",
        "exch_seg": "NSE",
        "tick_size": "5.000000"
    })
}

fn option_row(i: usize, expiry: &str) -> Value {
    json!({
        "token": (900_000 + i).to_string(),
        "symbol": format!("NIFTY{}{:05}CE", expiry, 20_000 + i * 50),
        "name": "NIFTY",
        "expiry": expiry,
        "strike": format!("{}.000000", 20_000 + i * 50),
        "lotsize": "75",
        "instrumenttype": "OPTIDX",
        "exch_seg": "NFO",
        "tick_size": "5.000000"
    })
}

fn array_source(rows: Vec<Value>) -> CatalogSource {
    let data = serde_json::to_vec(&Value::Array(rows)).unwrap();
    CatalogSource::bytes(data, SourceFormat::JsonArray)
}

#[test]
fn test_large_dataset_with_malformed_rows() {
    let mut rows: Vec<Value> = (0..200_000).map(|i| equity_row(i, 1, "A")).collect();
    let malformed = vec![
        json!({"symbol": "NOTOKEN-EQ", "exch_seg": "NSE"}),
        json!({"token": "x1", "exch_seg": "NSE"}),
        json!({"token": "x2", "symbol": "NOEXCH-EQ"}),
        json!({"token": "x3", "symbol": "BADLOT-EQ", "exch_seg": "NSE", "lotsize": "-5"}),
        json!({"token": "x4", "symbol": "BADLOT2-EQ", "exch_seg": "NSE", "lotsize": "ten"}),
        json!({"token": "x5", "symbol": "BADEXP-EQ", "exch_seg": "NFO", "expiry": "32JAN2026"}),
        json!({"token": "x6", "symbol": "BADSTRIKE", "exch_seg": "NFO", "strike": "1,000"}),
        json!({"token": "x7", "symbol": "BADTICK", "exch_seg": "NSE", "tick_size": "n/a"}),
        json!("just a string"),
        json!(null),
    ];
    // Spread the bad rows through the file
    for (n, bad) in malformed.into_iter().enumerate() {
        rows.insert(n * 20_000 + 7, bad);
    }

    let catalog = InstrumentCatalog::default();
    let report = catalog.load(&array_source(rows)).unwrap();

    assert_eq!(report.loaded, 200_000);
    assert_eq!(report.skipped, 10);
    assert_eq!(report.duplicates, 0);
    assert_eq!(catalog.len(), 200_000);
    assert!(catalog.resolve_by_symbol("SYM000000-EQ", None).is_some());
    assert!(catalog.resolve_by_symbol("SYM199999-EQ", None).is_some());
    assert!(catalog.resolve_by_symbol("NOTOKEN-EQ", None).is_none());
}

fn row(token: &str, symbol: &str, exchange: &str, expiry: &str) -> Value {
    json!({
        "token": token,
        "symbol": symbol,
        "name": symbol,
        "expiry": expiry,
        "strike": "-1.000000",
        "lotsize": "1",
        "instrumenttype": if expiry.is_empty() { "" } else { "FUTIDX" },
        "exch_seg": exchange,
        "tick_size": "5.000000"
    })
}

#[test]
fn test_symbol_and_token_resolve_same_instrument() {
    let mut rows: Vec<Value> = (0..1_000).map(|i| equity_row(i, 10_000, "A")).collect();
    // Same symbol on two exchanges, same token number on two segments
    rows.push(row("3045", "SBIN-EQ", "NSE", ""));
    rows.push(row("500112", "SBIN-EQ", "BSE", ""));
    rows.push(row("3045", "NIFTY26FEBFUT", "NFO", "26FEB2026"));
    rows.push(row("10500", "SYM000000-EQ", "BSE", ""));
    let catalog = InstrumentCatalog::default();
    catalog.load(&array_source(rows)).unwrap();
    assert_eq!(catalog.len(), 1_004);

    for inst in catalog.snapshot().instruments() {
        let exchange = Some(&inst.exchange);
        let by_symbol = catalog.resolve_by_symbol(&inst.symbol, exchange).unwrap();
        let by_token = catalog.resolve_by_token(inst.token.as_str(), exchange).unwrap();
        assert!(Arc::ptr_eq(&by_symbol, &by_token), "{}", inst.instrument_id);
        assert_eq!(by_symbol.instrument_id, inst.instrument_id);
    }

    // Without an exchange both lookups stay on the preferred segment
    let sbin = catalog.resolve_by_symbol("SBIN-EQ", None).unwrap();
    assert!(Arc::ptr_eq(&sbin, &catalog.resolve_by_token("3045", None).unwrap()));
    assert!(catalog.resolve_by_token("500112", None).is_none());
    let future = catalog.resolve_by_token("3045", Some(&Exchange::Nfo)).unwrap();
    assert_eq!(future.symbol, "NIFTY26FEBFUT");
}

#[test]
fn test_refresh_under_concurrent_readers() {
    let count = 5_000;
    let catalog = Arc::new(InstrumentCatalog::default());
    catalog
        .load(&array_source((0..count).map(|i| equity_row(i, 100_000, "A")).collect()))
        .unwrap();

    let refreshed = array_source((0..count).map(|i| equity_row(i, 500_000, "B")).collect());
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|r| {
            let catalog = Arc::clone(&catalog);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut checked = 0;
                while checked < 1_000 || !done.load(Ordering::Acquire) {
                    let i = (checked * 7 + r) % count;
                    let inst = catalog
                        .resolve_by_symbol(&format!("SYM{:06}-EQ", i), None)
                        .expect("symbol present in both datasets");
                    let token: usize = inst.token.as_str().parse().unwrap();
                    match inst.name.as_str() {
                        "A" => assert_eq!(token, 100_000 + i),
                        "B" => assert_eq!(token, 500_000 + i),
                        other => panic!("Unexpected dataset tag {}", other),
                    }

                    // A pinned snapshot answers both lookups from one generation
                    let snap = catalog.snapshot();
                    let s = snap.resolve_by_symbol(&inst.symbol, &Exchange::Nse);
                    let t = snap.resolve_by_token(&token.to_string(), &Exchange::Nse);
                    if let (Some(s), Some(t)) = (s, t) {
                        assert!(Arc::ptr_eq(&s, &t));
                    }
                    checked += 1;
                }
                checked
            })
        })
        .collect();

    let report = catalog.refresh(&refreshed).unwrap();
    done.store(true, Ordering::Release);

    for reader in readers {
        assert!(reader.join().unwrap() >= 1_000);
    }
    assert_eq!(report.generation, 2);
    assert_eq!(catalog.resolve_by_symbol("SYM000000-EQ", None).unwrap().name, "B");
    assert_eq!(catalog.state(), CatalogState::Ready);
}

#[test]
fn test_failed_refresh_keeps_previous_snapshot() {
    let catalog = InstrumentCatalog::default();
    catalog
        .load(&array_source((0..10).map(|i| equity_row(i, 1, "A")).collect()))
        .unwrap();
    let before = catalog.snapshot();

    let missing = CatalogSource::file("/no/such/dir/scrip_master.json");
    assert!(matches!(catalog.refresh(&missing), Err(CatalogError::Io { .. })));

    let garbled = CatalogSource::bytes("[{\"token\":", SourceFormat::JsonArray);
    assert!(matches!(catalog.refresh(&garbled), Err(CatalogError::Format(_))));

    assert!(Arc::ptr_eq(&before, &catalog.snapshot()));
    assert_eq!(catalog.state(), CatalogState::Ready);
    assert_eq!(catalog.len(), 10);
}

#[test]
fn test_duplicates_counted_not_skipped() {
    let rows = vec![equity_row(1, 1, "first"), equity_row(1, 1, "second"), equity_row(2, 1, "A")];
    let catalog = InstrumentCatalog::default();
    let report = catalog.load(&array_source(rows)).unwrap();

    assert_eq!(report.loaded, 2);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(catalog.resolve_by_symbol("SYM000001-EQ", None).unwrap().name, "first");
}

#[test]
fn test_by_expiry_and_search() {
    let mut rows: Vec<Value> = (0..5).map(|i| option_row(i, "26FEB2026")).collect();
    rows.extend((5..8).map(|i| option_row(i, "26MAR2026")));
    rows.push(equity_row(0, 1, "A"));

    let catalog = InstrumentCatalog::default();
    catalog.load(&array_source(rows)).unwrap();

    let feb = NaiveDate::from_ymd_opt(2026, 2, 26).unwrap();
    let feb_options = catalog.by_expiry(feb);
    assert_eq!(feb_options.len(), 5);
    assert!(feb_options.iter().all(|i| i.exchange == Exchange::Nfo));
    assert!(feb_options.windows(2).all(|w| w[0].symbol <= w[1].symbol));
    assert_eq!(catalog.expiries().len(), 2);
    assert!(catalog.by_expiry(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()).is_empty());

    let hits = catalog.search("nifty26mar", 10);
    assert_eq!(hits.len(), 3);
    assert_eq!(catalog.search("CE", 4).len(), 4);
}

#[test]
fn test_file_sources() {
    let dir = tempfile::tempdir().unwrap();

    let array_path = dir.path().join("scrip_master_20260101.json");
    let rows: Vec<Value> = (0..3).map(|i| equity_row(i, 1, "array")).collect();
    std::fs::write(&array_path, serde_json::to_vec(&rows).unwrap()).unwrap();

    let lines_path = dir.path().join("scrip_master_20260102.jsonl");
    let mut lines = String::new();
    for i in 0..4 {
        lines.push_str(&equity_row(i, 1, "lines").to_string());
        lines.push('\n');
    }
    lines.push_str("{ truncated\n");
    std::fs::write(&lines_path, lines).unwrap();
    std::fs::write(dir.path().join("README.txt"), "not a catalog").unwrap();

    let catalog = InstrumentCatalog::default();
    let report = catalog.load(&CatalogSource::file(&array_path)).unwrap();
    assert_eq!(report.loaded, 3);

    let report = catalog.refresh(&CatalogSource::file(&lines_path)).unwrap();
    assert_eq!(report.loaded, 4);
    assert_eq!(report.skipped, 1);

    // Newest by modification time wins, whatever the extension case
    let later = SystemTime::now() + Duration::from_secs(60);
    touch(&array_path, later);
    let latest = CatalogSource::latest_in(dir.path()).unwrap();
    assert_eq!(latest.describe(), array_path.display().to_string());

    let upper_path = dir.path().join("SCRIP_MASTER.JSONL");
    std::fs::rename(&lines_path, &upper_path).unwrap();
    touch(&upper_path, later + Duration::from_secs(60));
    let latest = CatalogSource::latest_in(dir.path()).unwrap();
    assert_eq!(latest.describe(), upper_path.display().to_string());
    assert_eq!(catalog.refresh(&latest).unwrap().loaded, 4);

    let empty = tempfile::tempdir().unwrap();
    assert!(matches!(
        CatalogSource::latest_in(empty.path()),
        Err(CatalogError::NoSource(_))
    ));
}

#[test]
fn test_csv_cache_directory() {
    let dir = tempfile::tempdir().unwrap();
    let header = "token,symbol,name,expiry,strike,lotsize,instrumenttype,exch_seg,tick_size\n";

    let older = dir.path().join("angel_scrip_master_20260101.csv");
    std::fs::write(&older, format!("{header}3045,SBIN-EQ,SBIN,,-1.000000,1,,NSE,5.000000\n"))
        .unwrap();
    touch(&older, SystemTime::now() - Duration::from_secs(86_400));

    let newer = dir.path().join("angel_scrip_master_20260102.csv");
    let mut body = String::from(header);
    body.push_str("3045,SBIN-EQ,SBIN,,-1.000000,1,,NSE,5.000000\n");
    body.push_str("1594,INFY-EQ,INFY,,-1.000000,1,,NSE,5.000000\n");
    body.push_str("43650,NIFTY26FEB2622500CE,NIFTY,26FEB2026\n");
    body.push_str("43651,NIFTY26FEB2622550CE,NIFTY,26FEB2026,");
    body.push_str("22550.000000,75,OPTIDX,NFO,5.000000\n");
    std::fs::write(&newer, body).unwrap();

    let source = CatalogSource::latest_in(dir.path()).unwrap();
    assert_eq!(source.describe(), newer.display().to_string());

    let catalog = InstrumentCatalog::default();
    let report = catalog.load(&source).unwrap();
    assert_eq!(report.loaded, 3);
    assert_eq!(report.skipped, 1);

    let option = catalog.resolve_by_token("43651", Some(&Exchange::Nfo)).unwrap();
    assert_eq!(option.lot_size, 75);
    assert_eq!(option.expiry, NaiveDate::from_ymd_opt(2026, 2, 26));
    assert!(catalog.resolve_by_symbol("INFY-EQ", None).is_some());
}

fn touch(path: &std::path::Path, when: SystemTime) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(when)
        .unwrap();
}
