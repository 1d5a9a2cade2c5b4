//! Lazy mutation-point stream over the resolved source files.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::discovery::SourceFile;
use crate::mutants::MutationPoint;
use crate::parser::{self, ParseFailure};

/// One parsed file and its points.
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub file: SourceFile,
    pub source: Arc<str>,
    pub points: Vec<MutationPoint>,
}

#[derive(Debug, Clone)]
pub enum GeneratorItem {
    Point {
        source: Arc<str>,
        point: MutationPoint,
    },
    FileSkipped(ParseFailure),
}

pub struct MutationGenerator {
    files: Vec<SourceFile>,
}

impl MutationGenerator {
    pub fn new(files: Vec<SourceFile>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Parse one file. Unreadable files are reported like parse failures.
    pub fn generate_file(file: &SourceFile) -> Result<GeneratedFile, ParseFailure> {
        let source = std::fs::read_to_string(&file.path).map_err(|e| ParseFailure {
            file: file.relative.to_string(),
            message: format!("failed to read: {e}"),
        })?;
        let points = parser::discover_points(file.language, &source, &file.relative, &file.project)?;
        Ok(GeneratedFile {
            file: file.clone(),
            source: Arc::from(source),
            points,
        })
    }

    /// A fresh pass over every file. Each call restarts from the first file.
    pub fn items(&self) -> GeneratorItems {
        GeneratorItems {
            files: self.files.clone().into(),
            pending: VecDeque::new(),
        }
    }
}

/// Parses files one at a time as points are pulled.
pub struct GeneratorItems {
    files: VecDeque<SourceFile>,
    pending: VecDeque<GeneratorItem>,
}

impl Iterator for GeneratorItems {
    type Item = GeneratorItem;

    fn next(&mut self) -> Option<GeneratorItem> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            let file = self.files.pop_front()?;
            match MutationGenerator::generate_file(&file) {
                Ok(generated) => {
                    tracing::debug!(file = %file.relative, points = generated.points.len(), "parsed");
                    let source = generated.source;
                    self.pending.extend(generated.points.into_iter().map(|point| {
                        GeneratorItem::Point {
                            source: Arc::clone(&source),
                            point,
                        }
                    }));
                }
                Err(failure) => {
                    tracing::warn!("skipping {failure}");
                    return Some(GeneratorItem::FileSkipped(failure));
                }
            }
        }
    }
}
