// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::manual_find)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]
#![cfg_attr(test, allow(unused_variables))]

//! # PDF Delta
//!
//! Byte-level PDF engine for viewers that annotate documents in place:
//! read the cross-reference chain, resolve objects lazily, edit annotations,
//! and save by appending one incremental update to the original bytes.
//!
//! ## Core Features
//!
//! - **ByteScanner**: delimiter-aware search and bounds of every PDF construct
//!   (dictionaries, arrays, strings, indirect objects, xref tables)
//! - **FlateDecode**: hand-written inflate with PNG predictors, bounded output
//! - **Object model**: catalog, page tree, pages, resources, XObjects, object
//!   streams, and a closed set of annotation dictionaries with generated
//!   appearance streams
//! - **Cross-references**: classic tables, xref streams and hybrid files along
//!   the `/Prev` chain, folded into one reference map with a free-list
//! - **Incremental updates**: new and updated objects, freed references and a
//!   new xref section in the same form as the newest one
//! - **Encryption hooks**: injected cryptors for strings and streams
//! - **Scan pool**: optional worker threads for scanning large buffers
//!
//! ## Architecture
//!
//! ```text
//! bytes ─▶ scanner ─▶ xref (chain, ReferenceData) ─▶ model (typed dicts)
//!                                                        │
//!            document (pages, annotations, events) ◀─────┘
//!                │
//!                ▼
//!            writer (ObjectSerializer, IncrementalWriter) ─▶ bytes + update
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use pdf_delta::{AnnotationDto, PdfDocument};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut doc = PdfDocument::open(std::fs::read("paper.pdf")?)?;
//! let page = doc.page_ids()[0];
//!
//! let dto = AnnotationDto {
//!     annotation_type: "Square".to_string(),
//!     page_id: page,
//!     rect: [72.0, 72.0, 144.0, 144.0],
//!     ..Default::default()
//! };
//! doc.add_annotation_from_dto(&dto)?;
//! doc.save_to("paper-annotated.pdf")?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Error handling
pub mod error;

// Core parsing
pub mod object;
pub mod parser_config;
pub mod scanner;
pub mod xref;

// Stream decoders
pub mod decoders;

// Encryption hooks
pub mod crypt;

// Typed PDF objects
pub mod model;

// Writing
pub mod writer;

// Document orchestration
pub mod document;

// Worker pool
pub mod pool;

pub use crypt::{CryptInfo, CryptorProvider, DataCryptor, EncryptionDict};
pub use document::{AnnotationMut, DocumentEvent, DocumentOptions, PdfDocument};
pub use error::{Error, ErrorCategory, Result};
pub use model::{AnnotationDict, AnnotationDto, AnnotationKind, PdfObject};
pub use object::{Object, ObjectId};
pub use parser_config::ParserOptions;
pub use pool::{PoolConfig, PooledScanner, ScanPool};
pub use scanner::{ByteScanner, ParserBounds};
pub use writer::IncrementalWriter;
pub use xref::{ReferenceData, XRefChain};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
