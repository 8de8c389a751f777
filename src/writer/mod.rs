//! PDF writing: object serialization and incremental updates.
//!
//! ## Architecture
//!
//! ```text
//! edited PageDict / AnnotationDict / Object
//!     ↓
//! [IncrementalWriter] (allocates ids through ReferenceDataChange)
//!     ↓
//! [ObjectSerializer] (`id gen obj ... endobj`, encrypting through CryptInfo)
//!     ↓
//! original bytes + appended objects + xref section + trailer + %%EOF
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use pdf_delta::writer::IncrementalWriter;
//!
//! let mut writer = IncrementalWriter::new(&source, &chain, reference_data)?;
//! let annot_ref = writer.write_annotation(&mut annotation)?;
//! page.set_annots(vec![annot_ref]);
//! writer.write_page(&mut page)?;
//! let updated = writer.finish()?;
//! ```

mod incremental;
mod object_serializer;

pub use incremental::IncrementalWriter;
pub use object_serializer::ObjectSerializer;
