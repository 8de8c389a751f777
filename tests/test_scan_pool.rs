//! Integration tests for the scan worker pool.

mod common;

use bytes::Bytes;
use common::{annotated_document, two_page_document};
use pdf_delta::document::{DocumentOptions, PdfDocument};
use pdf_delta::parser_config::ParserOptions;
use pdf_delta::pool::{PoolConfig, PooledScanner, ScanPool};
use pdf_delta::scanner::{ByteScanner, SearchOptions};
use pdf_delta::xref::XRefChain;
use std::thread;
use std::time::Duration;

fn pool(max_workers: usize) -> ScanPool {
    ScanPool::new(PoolConfig {
        max_workers,
        idle_grace: Duration::from_millis(500),
        acquire_timeout: Duration::from_secs(5),
    })
}

#[test]
fn test_pooled_chain_matches_direct_parse() {
    let data = Bytes::from(annotated_document());
    let options = ParserOptions::default();
    let direct = XRefChain::parse(&data, &options).unwrap();

    let mut scanner = PooledScanner::new(pool(1), data.clone());
    let pooled = scanner.parse_xref_chain(&options).unwrap();
    assert_eq!(pooled.sections.len(), direct.sections.len());
    for (a, b) in pooled.sections.iter().zip(&direct.sections) {
        assert_eq!(a.offset, b.offset);
        assert_eq!(a.entries, b.entries);
        assert_eq!(a.trailer, b.trailer);
    }
}

#[test]
fn test_pooled_search_matches_scanner() {
    let data = annotated_document();
    let direct = ByteScanner::new(&data).find_subarray_index(b"endobj", SearchOptions::keyword_from(40));

    let mut scanner = PooledScanner::new(pool(1), Bytes::from(data));
    let pooled = scanner.find_subarray_index(b"endobj", SearchOptions::keyword_from(40)).unwrap();
    assert_eq!(pooled.map(|b| b.start), direct.map(|b| b.start));
    assert_eq!(scanner.into_buffer().unwrap().len(), annotated_document().len());
}

#[test]
fn test_concurrent_scanners_share_workers() {
    let shared = pool(2);
    let handles: Vec<_> = (0..6)
        .map(|i| {
            let pool = shared.clone();
            thread::spawn(move || {
                let data = if i % 2 == 0 {
                    annotated_document()
                } else {
                    two_page_document()
                };
                let mut scanner = PooledScanner::new(pool, Bytes::from(data));
                let chain = scanner.parse_xref_chain(&ParserOptions::default()).unwrap();
                drop(scanner);
                chain.size()
            })
        })
        .collect();
    let sizes: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(sizes, vec![7, 6, 7, 6, 7, 6]);
    assert!(shared.worker_count() <= 2);
}

#[test]
fn test_document_opened_through_pool() {
    let options = DocumentOptions {
        pool: Some(pool(2)),
        ..Default::default()
    };
    let mut doc = PdfDocument::open_with_options(annotated_document(), options).unwrap();
    assert_eq!(doc.page_ids(), vec![3]);
    assert_eq!(doc.annotations(3).unwrap().len(), 2);
}
