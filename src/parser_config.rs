//! Parser options controlling strictness and resource limits.
//!
//! # Example
//!
//! ```
//! use pdf_delta::parser_config::ParserOptions;
//!
//! // Strict mode - a malformed xref row or annotation aborts the operation
//! let strict = ParserOptions::strict();
//!
//! // Lenient mode - malformed pieces are skipped with a warning (default)
//! let lenient = ParserOptions::lenient();
//!
//! // Custom configuration
//! let custom = ParserOptions {
//!     max_decompressed_size: 16 * 1024 * 1024,
//!     ..ParserOptions::lenient()
//! };
//! assert!(!custom.strict);
//! ```

/// Options threaded through xref walking, object resolution and decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Fail on the first recoverable error (true) or skip and warn (false)
    ///
    /// Recoverable errors are a malformed row inside an xref table, an
    /// unreadable older section of the `/Prev` chain, an annotation that
    /// fails to parse, and a stream `/Length` that stops before trailing
    /// white-space instead of at the EOL preceding `endstream`. The newest xref section and the catalog are always
    /// mandatory.
    pub strict: bool,

    /// Maximum number of sections followed through `/Prev`
    pub max_prev_chain_depth: u32,

    /// Maximum entry count accepted for one xref subsection
    pub max_xref_entries: u32,

    /// Maximum decompressed stream size in bytes (0 = unlimited)
    pub max_decompressed_size: usize,

    /// Maximum depth when walking the page tree or nested resources
    pub max_recursion_depth: u32,
}

impl Default for ParserOptions {
    /// Default configuration: lenient mode
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Strict mode: fail on any recoverable error
    pub fn strict() -> Self {
        Self {
            strict: true,
            max_prev_chain_depth: 100,
            max_xref_entries: 1_000_000,
            max_decompressed_size: 100 * 1024 * 1024, // 100 MB
            max_recursion_depth: 64,
        }
    }

    /// Lenient mode: skip malformed pieces and keep the rest usable
    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Self::strict()
        }
    }

    /// Check whether a recoverable error should be skipped.
    pub(crate) fn tolerates(&self, error: &crate::error::Error) -> bool {
        if self.strict {
            return false;
        }
        log::warn!("recovered from malformed input: {}", error);
        true
    }
}
