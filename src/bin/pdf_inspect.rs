//! Inspect a PDF's cross-reference structure and annotations
//!
//! Prints a JSON report: header version, xref sections along the `/Prev`
//! chain, the free-list, pages and their annotations.
//!
//! Usage:
//!   cargo run --release --bin pdf_inspect -- file.pdf
//!   cargo run --release --bin pdf_inspect -- file.pdf --objects --strict
//!   RUST_LOG=debug cargo run --bin pdf_inspect -- file.pdf --pool

use pdf_delta::document::{DocumentOptions, PdfDocument};
use pdf_delta::model::AnnotationDto;
use pdf_delta::parser_config::ParserOptions;
use pdf_delta::pool::{PoolConfig, ScanPool};
use pdf_delta::xref::{UsedReference, XRefKind};
use serde::Serialize;
use std::path::PathBuf;

struct InspectConfig {
    path: PathBuf,
    objects: bool,
    annotations: bool,
    strict: bool,
    pool: bool,
}

impl InspectConfig {
    fn from_args() -> Option<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut path = None;
        let mut objects = false;
        let mut annotations = true;
        let mut strict = false;
        let mut pool = false;

        for arg in args.iter().skip(1) {
            match arg.as_str() {
                "--objects" => objects = true,
                "--no-annotations" => annotations = false,
                "--strict" => strict = true,
                "--pool" => pool = true,
                other if !other.starts_with("--") => path = Some(PathBuf::from(other)),
                other => eprintln!("Ignoring unknown option {}", other),
            }
        }

        path.map(|path| Self {
            path,
            objects,
            annotations,
            strict,
            pool,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SectionReport {
    offset: usize,
    kind: XRefKind,
    entries: usize,
    size: u32,
    prev: Option<usize>,
    stream_id: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageReport {
    id: u32,
    media_box: Option<[f64; 4]>,
    annotations: Vec<AnnotationDto>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    file: String,
    version: String,
    encrypted: bool,
    size: u32,
    sections: Vec<SectionReport>,
    free_chain: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    objects: Option<Vec<UsedReference>>,
    pages: Vec<PageReport>,
}

fn inspect(config: &InspectConfig) -> pdf_delta::Result<Report> {
    let options = DocumentOptions {
        parser: if config.strict {
            ParserOptions::strict()
        } else {
            ParserOptions::lenient()
        },
        pool: config.pool.then(|| ScanPool::new(PoolConfig::default())),
        ..Default::default()
    };
    let mut doc = PdfDocument::open_file(&config.path, options)?;

    let sections = doc
        .xref_chain()
        .sections
        .iter()
        .map(|s| SectionReport {
            offset: s.offset,
            kind: s.kind,
            entries: s.entries.len(),
            size: s.trailer.size,
            prev: s.trailer.prev,
            stream_id: s.stream_id,
        })
        .collect();
    let reference_data = doc.reference_data().clone();

    let mut pages = Vec::new();
    for id in doc.page_ids() {
        let media_box = doc.page(id).and_then(|p| p.visible_box());
        let annotations = if config.annotations {
            doc.annotation_dtos(id)?
        } else {
            Vec::new()
        };
        pages.push(PageReport {
            id,
            media_box,
            annotations,
        });
    }

    Ok(Report {
        file: config.path.display().to_string(),
        version: doc.version().to_string(),
        encrypted: doc.is_encrypted(),
        size: reference_data.size(),
        sections,
        free_chain: reference_data.free_chain(),
        objects: config.objects.then(|| reference_data.used().cloned().collect()),
        pages,
    })
}

fn main() {
    env_logger::init();

    let Some(config) = InspectConfig::from_args() else {
        eprintln!("Usage: pdf_inspect <file.pdf> [--objects] [--no-annotations] [--strict] [--pool]");
        std::process::exit(2);
    };

    let report = match inspect(&config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}: {}", config.path.display(), e);
            std::process::exit(1);
        },
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: cannot serialize report: {}", e);
            std::process::exit(1);
        },
    }
}
