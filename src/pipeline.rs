//! The document-operation pipeline.
//!
//! Every operation runs through [`Executor::run`]: check the precondition,
//! take the busy guard, transform through the engines, hand the artifact to
//! the [`DownloadSink`]. Failures become an alert and an [`Outcome`]; they
//! never escape as errors.

use crate::archive::{ArchiveEngine, ZipEngine};
use crate::bookmarks::Bookmark;
use crate::download::{Artifact, DownloadSink, MIME_PDF, MIME_ZIP};
use crate::engine::{DocumentEngine, LopdfEngine, PdfHandle};
use crate::error::{EngineError, FailureKind};
use crate::feedback::{FeedbackController, FeedbackSink};
use crate::input::InputFile;
use crate::raster::{self, RasterImage};
use crate::session::Session;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Flatten the form of the active document.
    Flatten,
    /// One page per selected image, in selection order.
    ImagesToPdf,
    /// One archive entry per selected file.
    FilesToZip,
    /// Concatenate the selected PDFs.
    Merge,
    /// Replace the outline of the active document.
    ApplyBookmarks(Vec<Bookmark>),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Flatten => "flatten",
            Operation::ImagesToPdf => "images-to-pdf",
            Operation::FilesToZip => "files-to-zip",
            Operation::Merge => "merge",
            Operation::ApplyBookmarks(_) => "apply-bookmarks",
        }
    }

    pub fn precondition(&self) -> Precondition {
        match self {
            Operation::Flatten | Operation::ApplyBookmarks(_) => Precondition::DocumentLoaded,
            Operation::ImagesToPdf | Operation::FilesToZip | Operation::Merge => {
                Precondition::FilesSelected
            }
        }
    }

    pub fn busy_message(&self) -> &'static str {
        match self {
            Operation::Flatten => "Flattening form fields…",
            Operation::ImagesToPdf => "Converting images to PDF…",
            Operation::FilesToZip => "Creating ZIP archive…",
            Operation::Merge => "Merging documents…",
            Operation::ApplyBookmarks(_) => "Writing bookmarks…",
        }
    }

    pub fn filename(&self) -> &'static str {
        match self {
            Operation::Flatten => "flattened.pdf",
            Operation::ImagesToPdf => "images.pdf",
            Operation::FilesToZip => "files.zip",
            Operation::Merge => "merged.pdf",
            Operation::ApplyBookmarks(_) => "bookmarked.pdf",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Operation::FilesToZip => MIME_ZIP,
            _ => MIME_PDF,
        }
    }
}

/// What must hold in the session before an operation may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    DocumentLoaded,
    FilesSelected,
}

impl Precondition {
    pub fn is_met(&self, session: &Session) -> bool {
        match self {
            Precondition::DocumentLoaded => session.document().is_some(),
            Precondition::FilesSelected => !session.files().is_empty(),
        }
    }

    pub fn alert_title(&self) -> &'static str {
        match self {
            Precondition::DocumentLoaded => "No document loaded",
            Precondition::FilesSelected => "No files selected",
        }
    }

    pub fn alert_message(&self) -> &'static str {
        match self {
            Precondition::DocumentLoaded => "Open a PDF document first.",
            Precondition::FilesSelected => "Select at least one file first.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Precondition not met; a guard alert was shown.
    Skipped(Precondition),
    /// Another operation held the busy guard.
    Rejected,
    Delivered { filename: String, size: usize },
    Failed(FailureKind),
}

impl Outcome {
    /// Whether the run ended without an error for the user.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Delivered { .. } | Outcome::Skipped(_))
    }
}

/// Result of a transformation before delivery.
struct Produced {
    bytes: Vec<u8>,
    /// Replaces the session's active document once delivered.
    document: Option<PdfHandle>,
}

pub struct Executor {
    feedback: FeedbackController,
    engine: Box<dyn DocumentEngine>,
    archive: Box<dyn ArchiveEngine>,
}

impl Executor {
    pub fn new(
        feedback: FeedbackController,
        engine: Box<dyn DocumentEngine>,
        archive: Box<dyn ArchiveEngine>,
    ) -> Self {
        Executor {
            feedback,
            engine,
            archive,
        }
    }

    /// An executor over `lopdf` and `zip`.
    pub fn with_defaults(sink: Arc<dyn FeedbackSink>) -> Self {
        Self::new(
            FeedbackController::new(sink),
            Box::new(LopdfEngine),
            Box::new(ZipEngine),
        )
    }

    pub fn feedback(&self) -> &FeedbackController {
        &self.feedback
    }

    pub fn engine(&self) -> &dyn DocumentEngine {
        self.engine.as_ref()
    }

    /// Parse `file` and make it the session's active document.
    ///
    /// A file the engine cannot read is logged, reported through an alert and
    /// returned as its [`FailureKind`]; the previous document is kept.
    pub fn open_document(&self, session: &mut Session, file: &InputFile) -> Result<(), FailureKind> {
        match session.open_document(self.engine.as_ref(), file) {
            Ok(()) => {
                debug!(file = file.name(), "document opened");
                Ok(())
            }
            Err(err) => {
                warn!(file = file.name(), error = %err, "cannot open document");
                let kind = err.kind();
                self.feedback.alert(kind.alert_title(), kind.alert_message());
                Err(kind)
            }
        }
    }

    /// Run `op` against `session`, delivering its artifact to `sink`.
    pub fn run(&self, op: &Operation, session: &mut Session, sink: &mut dyn DownloadSink) -> Outcome {
        let precondition = op.precondition();
        if !precondition.is_met(session) {
            info!(operation = op.name(), ?precondition, "precondition not met");
            self.feedback
                .alert(precondition.alert_title(), precondition.alert_message());
            return Outcome::Skipped(precondition);
        }

        let Ok(_busy) = self.feedback.begin(op.busy_message()) else {
            warn!(operation = op.name(), "rejected: another operation is in progress");
            return Outcome::Rejected;
        };

        let started = Instant::now();
        let result = self.execute(op, session).and_then(|produced| {
            let size = produced.bytes.len();
            sink.emit(Artifact {
                bytes: produced.bytes,
                filename: op.filename().to_string(),
                mime: op.mime(),
            })?;
            Ok((size, produced.document))
        });

        match result {
            Ok((size, document)) => {
                if let Some(document) = document {
                    session.replace_document(document);
                }
                info!(
                    operation = op.name(),
                    filename = op.filename(),
                    bytes = size,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "delivered"
                );
                Outcome::Delivered {
                    filename: op.filename().to_string(),
                    size,
                }
            }
            Err(err) => {
                warn!(operation = op.name(), error = %err, "operation failed");
                let kind = err.kind();
                // Shown while the busy indicator is still up.
                self.feedback.alert(kind.alert_title(), kind.alert_message());
                Outcome::Failed(kind)
            }
        }
    }

    fn execute(&self, op: &Operation, session: &Session) -> Result<Produced, EngineError> {
        match op {
            Operation::Flatten => {
                let mut doc = active_document(session)?;
                let widgets = self.engine.flatten_form(&mut doc)?;
                debug!(widgets, "form flattened");
                let bytes = self.engine.serialize(&doc)?;
                Ok(Produced {
                    bytes,
                    document: Some(doc),
                })
            }
            Operation::ImagesToPdf => {
                let images = prepare_images(session)?;
                let mut doc = self.engine.blank();
                for image in &images {
                    self.engine.embed_image_page(&mut doc, image)?;
                }
                let bytes = self.engine.serialize(&doc)?;
                Ok(Produced {
                    bytes,
                    document: None,
                })
            }
            Operation::FilesToZip => {
                let mut builder = self.archive.create();
                for file in session.files() {
                    let entry = builder.add_entry(file.name(), &file.read()?)?;
                    debug!(entry = %entry, size = file.size(), "archived");
                }
                Ok(Produced {
                    bytes: builder.finish()?,
                    document: None,
                })
            }
            Operation::Merge => {
                let mut merged = self.engine.blank();
                for file in session.files() {
                    let source = self.engine.parse(&file.read()?)?;
                    debug!(file = file.name(), pages = source.page_count(), "merging");
                    self.engine.append_document(&mut merged, source)?;
                }
                let bytes = self.engine.serialize(&merged)?;
                Ok(Produced {
                    bytes,
                    document: Some(merged),
                })
            }
            Operation::ApplyBookmarks(outline) => {
                let mut doc = active_document(session)?;
                self.engine.write_outline(&mut doc, outline)?;
                let bytes = self.engine.serialize(&doc)?;
                Ok(Produced {
                    bytes,
                    document: Some(doc),
                })
            }
        }
    }
}

/// A working copy of the active document; the session keeps the original
/// until the operation has been delivered.
fn active_document(session: &Session) -> Result<PdfHandle, EngineError> {
    session
        .document()
        .cloned()
        .ok_or_else(|| EngineError::Other("no document loaded".into()))
}

/// Read and decode the selected images in parallel, keeping selection order.
fn prepare_images(session: &Session) -> Result<Vec<RasterImage>, EngineError> {
    session
        .files()
        .par_iter()
        .map(|file| raster::prepare_image(file.name(), file.read()?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::MemorySink;
    use crate::feedback::{FeedbackEvent, RecordingFeedback};

    fn executor() -> (Executor, Arc<RecordingFeedback>) {
        let recorder = Arc::new(RecordingFeedback::new());
        (Executor::with_defaults(recorder.clone()), recorder)
    }

    #[test]
    fn test_operation_table() {
        assert_eq!(Operation::Flatten.filename(), "flattened.pdf");
        assert_eq!(Operation::FilesToZip.mime(), "application/zip");
        assert_eq!(Operation::ImagesToPdf.mime(), "application/pdf");
        assert_eq!(
            Operation::Merge.precondition(),
            Precondition::FilesSelected
        );
        assert_eq!(
            Operation::ApplyBookmarks(Vec::new()).precondition(),
            Precondition::DocumentLoaded
        );
    }

    #[test]
    fn test_guard_alert_without_document() {
        let (executor, recorder) = executor();
        let mut sink = MemorySink::new();
        let outcome = executor.run(&Operation::Flatten, &mut Session::new(), &mut sink);
        assert_eq!(outcome, Outcome::Skipped(Precondition::DocumentLoaded));
        assert!(outcome.is_success());
        assert_eq!(
            recorder.events(),
            vec![FeedbackEvent::Alert {
                title: "No document loaded".into(),
                message: "Open a PDF document first.".into()
            }]
        );
        assert!(sink.artifacts().is_empty());
    }

    #[test]
    fn test_open_unparsable_document_alerts() {
        let (executor, recorder) = executor();
        let mut session = Session::new();
        session.replace_document(LopdfEngine.blank());
        let junk = InputFile::from_bytes("junk.pdf", b"not a pdf".to_vec());

        assert_eq!(
            executor.open_document(&mut session, &junk),
            Err(FailureKind::Generic)
        );
        assert!(session.document().is_some());
        assert!(!executor.feedback().is_busy());
        assert_eq!(
            recorder.events(),
            vec![FeedbackEvent::Alert {
                title: FailureKind::Generic.alert_title().into(),
                message: FailureKind::Generic.alert_message().into()
            }]
        );
    }

    #[test]
    fn test_rejected_while_busy() {
        let (executor, _) = executor();
        let mut session = Session::new();
        session.add_file(InputFile::from_bytes("a.txt", b"a".to_vec()));
        let _held = executor.feedback().begin("elsewhere").unwrap();
        let outcome = executor.run(&Operation::FilesToZip, &mut session, &mut MemorySink::new());
        assert_eq!(outcome, Outcome::Rejected);
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_unreadable_image_fails_generic() {
        let (executor, recorder) = executor();
        let mut session = Session::new();
        session.add_file(InputFile::from_bytes("notes.txt", b"plain text".to_vec()));
        let mut sink = MemorySink::new();
        let outcome = executor.run(&Operation::ImagesToPdf, &mut session, &mut sink);
        assert_eq!(outcome, Outcome::Failed(FailureKind::Generic));
        assert_eq!(recorder.alerts()[0].0, "Operation failed");
        assert!(sink.artifacts().is_empty());
        assert!(!executor.feedback().is_busy());
    }

    #[test]
    fn test_apply_bookmarks_replaces_document() {
        let (executor, _) = executor();
        let mut session = Session::new();
        let mut doc = LopdfEngine.blank();
        let page = crate::raster::prepare_image("p.png", png_bytes()).unwrap();
        LopdfEngine.embed_image_page(&mut doc, &page).unwrap();
        session.replace_document(doc);

        let outline = vec![Bookmark::new("Start", 1)];
        let mut sink = MemorySink::new();
        let outcome = executor.run(&Operation::ApplyBookmarks(outline.clone()), &mut session, &mut sink);
        assert!(matches!(outcome, Outcome::Delivered { ref filename, .. } if filename == "bookmarked.pdf"));

        let active = session.document().unwrap();
        assert_eq!(LopdfEngine.read_outline(active).unwrap(), outline);
    }

    #[test]
    fn test_invalid_bookmark_keeps_document() {
        let (executor, recorder) = executor();
        let mut session = Session::new();
        session.replace_document(LopdfEngine.blank());
        let outline = vec![Bookmark::new("Nowhere", 3)];
        let outcome = executor.run(&Operation::ApplyBookmarks(outline), &mut session, &mut MemorySink::new());
        assert_eq!(outcome, Outcome::Failed(FailureKind::Generic));
        assert_eq!(recorder.alerts().len(), 1);
        assert!(LopdfEngine.read_outline(session.document().unwrap()).unwrap().is_empty());
    }

    fn png_bytes() -> Vec<u8> {
        let img = ::image::RgbImage::from_pixel(4, 3, ::image::Rgb([10, 20, 30]));
        let mut out = std::io::Cursor::new(Vec::new());
        ::image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ::image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }
}
