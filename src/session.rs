use crate::engine::{DocumentEngine, PdfHandle};
use crate::error::EngineError;
use crate::input::InputFile;

/// Working state shared by the operations of one run: the selected files and
/// the active document.
///
/// Created with [`Session::new`] and cleared with [`Session::reset`].
#[derive(Debug, Default)]
pub struct Session {
    files: Vec<InputFile>,
    document: Option<PdfHandle>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[InputFile] {
        &self.files
    }

    /// Replace the current selection.
    pub fn select_files(&mut self, files: Vec<InputFile>) {
        self.files = files;
    }

    pub fn add_file(&mut self, file: InputFile) {
        self.files.push(file);
    }

    pub fn document(&self) -> Option<&PdfHandle> {
        self.document.as_ref()
    }

    /// Install `doc` as the active document, returning the previous one.
    pub fn replace_document(&mut self, doc: PdfHandle) -> Option<PdfHandle> {
        self.document.replace(doc)
    }

    pub fn take_document(&mut self) -> Option<PdfHandle> {
        self.document.take()
    }

    /// Parse `file` and make it the active document.
    pub fn open_document(
        &mut self,
        engine: &dyn DocumentEngine,
        file: &InputFile,
    ) -> Result<(), EngineError> {
        let bytes = file.read()?;
        let doc = engine.parse(&bytes)?;
        self.document = Some(doc);
        Ok(())
    }

    /// Forget the selection and the active document.
    pub fn reset(&mut self) {
        self.files.clear();
        self.document = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LopdfEngine;

    #[test]
    fn test_selection_and_reset() {
        let mut session = Session::new();
        session.select_files(vec![InputFile::from_bytes("a", vec![1])]);
        session.add_file(InputFile::from_bytes("b", vec![2]));
        assert_eq!(session.files().len(), 2);
        session.replace_document(LopdfEngine.blank());
        assert!(session.document().is_some());

        session.reset();
        assert!(session.files().is_empty());
        assert!(session.document().is_none());
    }

    #[test]
    fn test_open_document() {
        let engine = LopdfEngine;
        let blank = engine.blank();
        let bytes = engine.serialize(&blank).unwrap();

        let mut session = Session::new();
        session
            .open_document(&engine, &InputFile::from_bytes("blank.pdf", bytes))
            .unwrap();
        assert_eq!(session.document().unwrap().page_count(), 0);
    }

    #[test]
    fn test_open_document_failure_keeps_previous() {
        let engine = LopdfEngine;
        let mut session = Session::new();
        session.replace_document(engine.blank());
        let err = session.open_document(&engine, &InputFile::from_bytes("x.pdf", b"junk".to_vec()));
        assert!(err.is_err());
        assert!(session.document().is_some());
    }
}
