//! # pdftools
//!
//! A toolbox of PDF manipulations built around one document-operation
//! pipeline: selected files are validated, transformed by a document or
//! archive engine, and delivered as a downloadable artifact, with the same
//! busy, alert and failure handling for every operation.
//!
//! - **Flatten**: paint interactive form fields into their pages
//! - **Images to PDF**: one page per JPEG, PNG or BMP image
//! - **Files to ZIP**: bundle arbitrary files into a Deflate archive
//! - **Merge**: concatenate PDF documents
//! - **Bookmarks**: read, edit and write the document outline
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use pdftools::download::MemorySink;
//! use pdftools::feedback::RecordingFeedback;
//! use pdftools::input::InputFile;
//! use pdftools::pipeline::{Executor, Operation, Outcome};
//! use pdftools::session::Session;
//!
//! let feedback = Arc::new(RecordingFeedback::new());
//! let executor = Executor::with_defaults(feedback.clone());
//!
//! let mut session = Session::new();
//! session.add_file(InputFile::from_bytes("a.txt", b"first".to_vec()));
//! session.add_file(InputFile::from_bytes("b.txt", b"second".to_vec()));
//!
//! let mut sink = MemorySink::new();
//! let outcome = executor.run(&Operation::FilesToZip, &mut session, &mut sink);
//! assert!(matches!(outcome, Outcome::Delivered { .. }));
//! assert_eq!(sink.artifacts()[0].filename, "files.zip");
//! ```
//!
//! ## Modules
//!
//! - [`pipeline`]: operations, preconditions and the [`pipeline::Executor`]
//! - [`session`]: selected files and the active document
//! - [`engine`]: the [`engine::DocumentEngine`] seam and its `lopdf` implementation
//! - [`archive`]: the [`archive::ArchiveEngine`] seam and its ZIP implementation
//! - [`feedback`]: busy indicator guard and alerts
//! - [`download`]: artifact delivery
//! - [`host`]: bounded mounting of interactive tools
//! - [`bookmarks`]: outline reading, writing and the bookmark editor
//!
//! ## Examples
//!
//! ### Flattening a form
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pdftools::download::DirectorySink;
//! use pdftools::feedback::TerminalFeedback;
//! use pdftools::input::InputFile;
//! use pdftools::pipeline::{Executor, Operation};
//! use pdftools::session::Session;
//!
//! let executor = Executor::with_defaults(Arc::new(TerminalFeedback::default()));
//! let mut session = Session::new();
//! let form = InputFile::from_path("form.pdf").expect("input");
//! session.open_document(executor.engine(), &form).expect("parse");
//!
//! let mut sink = DirectorySink::new("out");
//! executor.run(&Operation::Flatten, &mut session, &mut sink);
//! ```
//!
//! ### Editing bookmarks
//!
//! ```rust,no_run
//! use pdftools::bookmarks::{Bookmark, BookmarkEditor};
//! use pdftools::host::ToolHost;
//! use pdftools::session::Session;
//!
//! # fn demo(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
//! let host = ToolHost::default();
//! let mut editor = host.mount(BookmarkEditor::new(), session)?;
//! editor.tool_mut().add(&[], Bookmark::new("Appendix", 1))?;
//! let outline = editor.tool().entries().to_vec();
//! # let _ = outline;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod bookmarks;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod flatten;
pub mod host;
pub mod input;
pub mod pipeline;
pub mod raster;
pub mod session;
pub mod text;
