//! Integration tests for cross-reference chains and the folded reference map.

mod common;

use bytes::Bytes;
use common::PdfBuilder;
use pdf_delta::error::Error;
use pdf_delta::object::ObjectId;
use pdf_delta::parser_config::ParserOptions;
use pdf_delta::xref::{find_startxref, ReferenceData, UsedLocation, XRefChain, XRefEntry, XRefKind};

fn base_document() -> Vec<u8> {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots [4 0 R] >>")
        .object(4, "<< /Type /Annot /Subtype /Square /Rect [0 0 10 10] >>");
    b.finish_table("/Root 1 0 R")
}

/// Base document plus an update that rewrites the page and frees object 4.
fn updated_document() -> (Vec<u8>, usize, usize) {
    let base = base_document();
    let prev = find_startxref(&base).unwrap();
    let mut update = PdfBuilder::append_to(base);
    update
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>")
        .free(0, 4, 65535)
        .free(4, 0, 1);
    let page_offset = update.offset_of(3).unwrap();
    (update.finish_update_table(5, prev, "/Root 1 0 R"), prev, page_offset)
}

#[test]
fn test_single_table_section() {
    let data = Bytes::from(base_document());
    let chain = XRefChain::parse(&data, &ParserOptions::strict()).unwrap();
    assert_eq!(chain.sections.len(), 1);
    assert_eq!(chain.kind(), XRefKind::Table);
    assert_eq!(chain.root(), Some(ObjectId::new(1, 0)));
    assert_eq!(chain.size(), 5);
    assert_eq!(chain.entries().count(), 5);
    assert_eq!(chain.entries().next(), Some(&XRefEntry::free(0, 65535, 0)));
}

#[test]
fn test_prev_chain_newest_entry_wins() {
    let (data, prev, page_offset) = updated_document();
    let data = Bytes::from(data);
    let chain = XRefChain::parse(&data, &ParserOptions::strict()).unwrap();
    assert_eq!(chain.sections.len(), 2);
    assert_eq!(chain.sections[1].offset, prev);
    assert_eq!(chain.trailer().and_then(|t| t.prev), Some(prev));

    let refs = ReferenceData::from_chain(&chain);
    assert_eq!(refs.get_used(3).map(|u| u.location), Some(UsedLocation::Offset(page_offset)));
    assert!(refs.get_used(4).is_none());
    assert!(refs.is_free(4));
    assert_eq!(refs.generation_of(4), Some(1));
    assert_eq!(refs.free_chain(), vec![0, 4, 0]);
    assert_eq!(refs.size(), 5);
}

#[test]
fn test_xref_stream_with_compressed_objects() {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object_stream(5, &[(2, "<< /Type /Pages /Kids [] /Count 0 >>"), (3, "(three)")]);
    let data = Bytes::from(b.finish_xref_stream(6, "/Root 1 0 R"));

    let chain = XRefChain::parse(&data, &ParserOptions::strict()).unwrap();
    assert_eq!(chain.kind(), XRefKind::Stream);
    assert_eq!(chain.newest().and_then(|s| s.stream_id), Some(6));
    assert_eq!(chain.root(), Some(ObjectId::new(1, 0)));

    let refs = ReferenceData::from_chain(&chain);
    assert_eq!(
        refs.get_used(3).map(|u| u.location),
        Some(UsedLocation::Compressed { stream_id: 5, index: 1 })
    );
    assert!(matches!(refs.get_used(6).map(|u| u.location), Some(UsedLocation::Offset(_))));
    assert_eq!(refs.size(), 7);
}

#[test]
fn test_hybrid_section_prefers_stream_entries() {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object_stream(5, &[(3, "42")]);
    let stream_offset = b.len();
    let mut data = b.finish_xref_stream(6, "/Root 1 0 R");
    // Cut the stream file's own startxref and add a table pointing at it.
    let cut = data.len() - format!("startxref\n{}\n%%EOF\n", stream_offset).len();
    data.truncate(cut);

    let table_offset = data.len();
    let catalog = data.windows(6).position(|w| w == b"1 0 ob").unwrap();
    data.extend_from_slice(
        format!(
            "xref\n0 2\n0000000000 65535 f \n{:010} 00000 n \n3 1\n0000000000 00000 f \n\
             trailer\n<< /Size 7 /Root 1 0 R /XRefStm {} >>\nstartxref\n{}\n%%EOF\n",
            catalog, stream_offset, table_offset
        )
        .as_bytes(),
    );

    let data = Bytes::from(data);
    let chain = XRefChain::parse(&data, &ParserOptions::strict()).unwrap();
    assert_eq!(chain.sections.len(), 1);
    assert_eq!(chain.kind(), XRefKind::Table);

    let refs = ReferenceData::from_chain(&chain);
    assert_eq!(
        refs.get_used(3).map(|u| u.location),
        Some(UsedLocation::Compressed { stream_id: 5, index: 0 })
    );
}

#[test]
fn test_prev_loop_stops() {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    let xref = b.len();
    let mut data = b.finish_table("/Root 1 0 R");
    let trailer = data.windows(7).rposition(|w| w == b"trailer").unwrap();
    data.truncate(trailer);
    data.extend_from_slice(
        format!("trailer\n<< /Size 2 /Root 1 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n", xref, xref).as_bytes(),
    );

    let chain = XRefChain::parse(&Bytes::from(data), &ParserOptions::strict()).unwrap();
    assert_eq!(chain.sections.len(), 1);
}

#[test]
fn test_broken_older_section() {
    let (mut data, prev, _) = updated_document();
    // Corrupt the keyword of the older table.
    data[prev..prev + 4].copy_from_slice(b"xxxx");
    let data = Bytes::from(data);

    let lenient = XRefChain::parse(&data, &ParserOptions::lenient()).unwrap();
    assert_eq!(lenient.sections.len(), 1);
    assert!(XRefChain::parse(&data, &ParserOptions::strict()).is_err());
}

#[test]
fn test_startxref_errors() {
    assert!(matches!(find_startxref(b"%PDF-1.7\nno trailer here"), Err(Error::InvalidXref { .. })));
    assert!(find_startxref(b"%PDF-1.7\nstartxref\n999999\n%%EOF").is_err());
    assert_eq!(find_startxref(b"%PDF-1.7\nstartxref\n3\n%%EOF").unwrap(), 3);
}

#[test]
fn test_malformed_row_is_skipped_when_lenient() {
    let data = base_document();
    let row = data.windows(8).position(|w| w == b" 00000 n").unwrap() - 10;
    let mut broken = data.clone();
    broken[row..row + 10].copy_from_slice(b"garbage!!!");
    let broken = Bytes::from(broken);

    let chain = XRefChain::parse(&broken, &ParserOptions::lenient()).unwrap();
    assert_eq!(chain.entries().count(), 4);
    assert!(XRefChain::parse(&broken, &ParserOptions::strict()).is_err());
}
