//! Three-step CSV import: upload, review, complete.

use log::{debug, info};
use thiserror::Error;

use crate::batch::NewBatch;
use crate::grid::{Grid, GridOptions};
use crate::loader::ParsedCsv;

/// Page size of the review preview
pub const PREVIEW_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    UploadStep,
    ReviewStep,
    CompleteStep,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("not allowed during {0:?}")]
    WrongStep(WizardStep),

    #[error("a batch name and a CSV file with at least one row are required")]
    Incomplete,

    #[error("import failed: {0}")]
    Submit(String),
}

#[derive(Debug, Clone)]
pub struct ImportWizard {
    step: WizardStep,
    batch_name: String,
    file: Option<ParsedCsv>,
    preview: Option<Grid>,
}

impl Default for ImportWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportWizard {
    pub fn new() -> Self {
        ImportWizard {
            step: WizardStep::UploadStep,
            batch_name: String::new(),
            file: None,
            preview: None,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn batch_name(&self) -> &str {
        &self.batch_name
    }

    pub fn file(&self) -> Option<&ParsedCsv> {
        self.file.as_ref()
    }

    fn require(&self, step: WizardStep) -> Result<(), WizardError> {
        if self.step == step {
            Ok(())
        } else {
            Err(WizardError::WrongStep(self.step))
        }
    }

    pub fn set_batch_name(&mut self, name: &str) -> Result<(), WizardError> {
        self.require(WizardStep::UploadStep)?;
        self.batch_name = name.to_string();
        Ok(())
    }

    pub fn attach_file(&mut self, parsed: ParsedCsv) -> Result<(), WizardError> {
        self.require(WizardStep::UploadStep)?;
        debug!(
            "attached {} with {} rows",
            parsed.original_name,
            parsed.row_count()
        );
        self.file = Some(parsed);
        Ok(())
    }

    pub fn clear_file(&mut self) -> Result<(), WizardError> {
        self.require(WizardStep::UploadStep)?;
        self.file = None;
        Ok(())
    }

    /// Continue needs a batch name, a file name and at least one row
    pub fn can_continue(&self) -> bool {
        self.step == WizardStep::UploadStep
            && !self.batch_name.trim().is_empty()
            && self
                .file
                .as_ref()
                .is_some_and(|f| !f.original_name.trim().is_empty() && f.row_count() > 0)
    }

    /// Moves to the review step and builds the preview grid
    pub fn continue_to_review(&mut self) -> Result<(), WizardError> {
        self.require(WizardStep::UploadStep)?;
        if !self.can_continue() {
            return Err(WizardError::Incomplete);
        }
        let file = self.file.as_ref().ok_or(WizardError::Incomplete)?;
        self.preview = Some(Grid::new(
            file.column_headers.clone(),
            file.rows.clone(),
            GridOptions::default()
                .with_page_size(PREVIEW_PAGE_SIZE)
                .preview(),
        ));
        self.step = WizardStep::ReviewStep;
        Ok(())
    }

    pub fn back(&mut self) -> Result<(), WizardError> {
        self.require(WizardStep::ReviewStep)?;
        self.preview = None;
        self.step = WizardStep::UploadStep;
        Ok(())
    }

    pub fn preview_grid(&self) -> Option<&Grid> {
        self.preview.as_ref()
    }

    /// Mutable access so the host can page through the preview
    pub fn preview_grid_mut(&mut self) -> Option<&mut Grid> {
        self.preview.as_mut()
    }

    /// The batch the wizard would create
    pub fn draft(&self) -> Option<NewBatch> {
        let file = self.file.as_ref()?;
        Some(NewBatch {
            file_name: self.batch_name.trim().to_string(),
            original_name: file.original_name.clone(),
            column_headers: file.column_headers.clone(),
            rows: file.rows.clone(),
        })
    }

    /// Hands the draft to `persist`. On success the wizard completes; on
    /// failure it stays on review and returns the error.
    pub fn submit<T, E, F>(&mut self, persist: F) -> Result<T, WizardError>
    where
        E: std::fmt::Display,
        F: FnOnce(NewBatch) -> Result<T, E>,
    {
        self.require(WizardStep::ReviewStep)?;
        let draft = self.draft().ok_or(WizardError::Incomplete)?;
        let name = draft.file_name.clone();
        let out = persist(draft).map_err(|e| WizardError::Submit(e.to_string()))?;
        info!("imported batch {}", name);
        self.step = WizardStep::CompleteStep;
        Ok(out)
    }

    /// Starts over with an empty upload step
    pub fn reset(&mut self) {
        *self = ImportWizard::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_csv;

    fn people() -> ParsedCsv {
        parse_csv("people.csv", "name,age\nAlice,30\nBob,25\n").unwrap()
    }

    #[test]
    fn test_continue_requires_name_and_rows() {
        let mut wizard = ImportWizard::new();
        wizard.attach_file(people()).unwrap();
        assert!(!wizard.can_continue());
        assert_eq!(wizard.continue_to_review(), Err(WizardError::Incomplete));

        wizard.set_batch_name("  ").unwrap();
        assert!(!wizard.can_continue());

        wizard.set_batch_name("Q1").unwrap();
        wizard.attach_file(parse_csv("empty.csv", "name,age\n").unwrap()).unwrap();
        assert!(!wizard.can_continue());

        wizard.attach_file(people()).unwrap();
        assert!(wizard.can_continue());
    }

    #[test]
    fn test_review_preview_is_read_only() {
        let mut wizard = ImportWizard::new();
        wizard.set_batch_name("Q1").unwrap();
        wizard.attach_file(people()).unwrap();
        wizard.continue_to_review().unwrap();

        let grid = wizard.preview_grid_mut().unwrap();
        assert_eq!(grid.page_size(), PREVIEW_PAGE_SIZE);
        assert!(grid.toggle_row_selected(0).is_err());
        assert!(grid.activate_cell(0, "name").is_err());

        assert_eq!(wizard.set_batch_name("x"), Err(WizardError::WrongStep(WizardStep::ReviewStep)));
        wizard.back().unwrap();
        assert_eq!(wizard.step(), WizardStep::UploadStep);
        assert!(wizard.preview_grid().is_none());
    }

    #[test]
    fn test_submit_failure_stays_on_review() {
        let mut wizard = ImportWizard::new();
        wizard.set_batch_name("Q1").unwrap();
        wizard.attach_file(people()).unwrap();
        wizard.continue_to_review().unwrap();

        let err = wizard
            .submit(|_| Err::<u64, _>("disk full"))
            .unwrap_err();
        assert_eq!(err, WizardError::Submit("disk full".to_string()));
        assert_eq!(wizard.step(), WizardStep::ReviewStep);

        let id = wizard
            .submit(|draft| {
                assert_eq!(draft.file_name, "Q1");
                assert_eq!(draft.rows.len(), 2);
                Ok::<_, String>(7)
            })
            .unwrap();
        assert_eq!(id, 7);
        assert_eq!(wizard.step(), WizardStep::CompleteStep);

        wizard.reset();
        assert_eq!(wizard.step(), WizardStep::UploadStep);
        assert!(wizard.file().is_none());
        assert_eq!(wizard.batch_name(), "");
    }
}
