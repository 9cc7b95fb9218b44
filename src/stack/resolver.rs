use crate::errors::{RebaseStackError, Result};
use crate::git::GitRepository;
use dialoguer::{Editor, Select};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Strategy for resolving a conflicted file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStrategy {
    /// Keep only the current side
    Ours,
    /// Keep only the incoming side
    Theirs,
    /// Content was edited in place by the user
    Manual,
    /// Leave the file conflicted for a later pass
    Skip,
}

/// A resolution decision for one conflicted file.
///
/// `resolved_content` is populated for `ours`/`theirs`; `manual` edits the
/// file in place so there is nothing to carry. `skip` never produces a
/// `Resolution` from the interactive pass.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub file_path: String,
    pub strategy: ResolutionStrategy,
    pub resolved_content: Option<String>,
}

/// A conflict-marker region (delimited triad) in a file
#[derive(Debug, Clone)]
pub struct ConflictRegion {
    /// 1-based line where the region starts
    pub start_line: usize,
    /// 1-based line where the region ends
    pub end_line: usize,
    /// Content from the current side (before the separator)
    pub our_content: String,
    /// Content from the incoming side (after the separator)
    pub their_content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Ours,
    Theirs,
}

/// Parses conflict markers and applies resolution strategies
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Parse the conflict-marker regions out of file content
    pub fn parse_conflict_regions(&self, content: &str) -> Vec<ConflictRegion> {
        let lines: Vec<&str> = content.lines().collect();
        let mut regions = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            if lines[i].starts_with("<<<<<<<") {
                let start = i;
                let mut separator = None;
                let mut end = None;

                for (j, line) in lines.iter().enumerate().skip(i + 1) {
                    if line.starts_with("=======") && separator.is_none() {
                        separator = Some(j);
                    } else if line.starts_with(">>>>>>>") {
                        end = Some(j);
                        break;
                    }
                }

                if let (Some(sep), Some(end)) = (separator, end) {
                    regions.push(ConflictRegion {
                        start_line: start + 1,
                        end_line: end + 1,
                        our_content: lines[(start + 1)..sep].join("\n"),
                        their_content: lines[(sep + 1)..end].join("\n"),
                    });
                    i = end;
                }
            }
            i += 1;
        }

        regions
    }

    /// Whether any conflict-marker tokens remain in the content
    pub fn has_conflict_markers(&self, content: &str) -> bool {
        content
            .lines()
            .any(|line| line.starts_with("<<<<<<<") || line.starts_with(">>>>>>>"))
    }

    /// Strip all marker lines, keeping only one side of every region.
    /// Handles diff3-style regions (the `|||||||` base section is dropped
    /// for either side).
    fn resolve_content(&self, content: &str, side: Side) -> String {
        #[derive(PartialEq)]
        enum Section {
            Normal,
            Ours,
            Base,
            Theirs,
        }

        let mut section = Section::Normal;
        let mut out = Vec::new();

        for line in content.lines() {
            if line.starts_with("<<<<<<<") {
                section = Section::Ours;
            } else if line.starts_with("|||||||") && section == Section::Ours {
                section = Section::Base;
            } else if line.starts_with("=======")
                && (section == Section::Ours || section == Section::Base)
            {
                section = Section::Theirs;
            } else if line.starts_with(">>>>>>>") {
                section = Section::Normal;
            } else {
                let keep = match section {
                    Section::Normal => true,
                    Section::Ours => side == Side::Ours,
                    Section::Base => false,
                    Section::Theirs => side == Side::Theirs,
                };
                if keep {
                    out.push(line);
                }
            }
        }

        let mut resolved = out.join("\n");
        if content.ends_with('\n') && !resolved.is_empty() {
            resolved.push('\n');
        }
        resolved
    }

    /// Resolve one file with a non-interactive strategy.
    ///
    /// `Skip` yields `None` (the file stays conflicted); `Manual` is only
    /// reachable from the interactive pass.
    pub fn resolve_file_with_strategy(
        &self,
        sandbox_path: &Path,
        file_path: &str,
        strategy: ResolutionStrategy,
    ) -> Result<Option<Resolution>> {
        if strategy == ResolutionStrategy::Skip {
            return Ok(None);
        }
        if strategy == ResolutionStrategy::Manual {
            return Err(RebaseStackError::conflict(format!(
                "{file_path}: manual resolution requires the interactive pass"
            )));
        }

        let content = fs::read_to_string(sandbox_path.join(file_path)).map_err(|e| {
            RebaseStackError::conflict(format!("Failed to read {file_path}: {e}"))
        })?;

        let side = match strategy {
            ResolutionStrategy::Ours => Side::Ours,
            ResolutionStrategy::Theirs => Side::Theirs,
            _ => unreachable!(),
        };

        Ok(Some(Resolution {
            file_path: file_path.to_string(),
            strategy,
            resolved_content: Some(self.resolve_content(&content, side)),
        }))
    }

    /// Walk the conflicted files in input order, prompting for a strategy
    /// per file. Skipped files and rejected manual edits produce no
    /// resolution; callers loop back for anything still conflicted.
    pub fn resolve_interactively(
        &self,
        sandbox_path: &Path,
        conflicted_files: &[String],
    ) -> Result<Vec<Resolution>> {
        let mut resolutions = Vec::new();

        for file_path in conflicted_files {
            let full_path = sandbox_path.join(file_path);
            let content = fs::read_to_string(&full_path).map_err(|e| {
                RebaseStackError::conflict(format!("Failed to read {file_path}: {e}"))
            })?;

            let regions = self.parse_conflict_regions(&content);
            println!(
                "\n{file_path}: {} conflict region(s)",
                regions.len().max(1)
            );
            for region in &regions {
                println!("  lines {}-{}", region.start_line, region.end_line);
            }

            let choice = Select::new()
                .with_prompt(format!("Resolve {file_path}"))
                .items(&[
                    "Keep ours (current branch side)",
                    "Take theirs (incoming side)",
                    "Edit manually",
                    "Skip for now",
                ])
                .default(0)
                .interact()
                .map_err(|e| RebaseStackError::config(format!("Prompt failed: {e}")))?;

            match choice {
                0 | 1 => {
                    let side = if choice == 0 { Side::Ours } else { Side::Theirs };
                    let strategy = if choice == 0 {
                        ResolutionStrategy::Ours
                    } else {
                        ResolutionStrategy::Theirs
                    };
                    resolutions.push(Resolution {
                        file_path: file_path.clone(),
                        strategy,
                        resolved_content: Some(self.resolve_content(&content, side)),
                    });
                }
                2 => {
                    let edited = Editor::new()
                        .edit(&content)
                        .map_err(|e| RebaseStackError::config(format!("Editor failed: {e}")))?;

                    match edited {
                        Some(new_content) if !self.has_conflict_markers(&new_content) => {
                            fs::write(&full_path, &new_content).map_err(RebaseStackError::Io)?;
                            resolutions.push(Resolution {
                                file_path: file_path.clone(),
                                strategy: ResolutionStrategy::Manual,
                                resolved_content: None,
                            });
                        }
                        Some(_) => {
                            warn!(
                                "Conflict markers remain in {}, resolution rejected",
                                file_path
                            );
                            println!("Conflict markers remain in {file_path}; not staged");
                        }
                        None => {
                            debug!("Editor closed without saving for {}", file_path);
                            println!("No edit saved for {file_path}; skipped");
                        }
                    }
                }
                _ => debug!("Skipped {}", file_path),
            }
        }

        Ok(resolutions)
    }

    /// Write a resolution to disk (when it carries content) and stage it.
    ///
    /// The only write path into sandbox file content. Staging is refused if
    /// any conflict markers survive, regardless of strategy.
    pub fn apply_resolution(
        &self,
        sandbox_path: &Path,
        git: &GitRepository,
        resolution: &Resolution,
    ) -> Result<()> {
        if resolution.strategy == ResolutionStrategy::Skip {
            debug!("Nothing to apply for skipped file {}", resolution.file_path);
            return Ok(());
        }

        let full_path = sandbox_path.join(&resolution.file_path);

        if let Some(content) = &resolution.resolved_content {
            fs::write(&full_path, content).map_err(RebaseStackError::Io)?;
        }

        // Completeness check is mandatory before staging
        let on_disk = fs::read_to_string(&full_path).map_err(RebaseStackError::Io)?;
        if self.has_conflict_markers(&on_disk) {
            return Err(RebaseStackError::conflict_resolution(
                resolution.file_path.clone(),
                "conflict markers remain after resolution".to_string(),
            ));
        }

        git.stage_file(Path::new(&resolution.file_path))?;
        debug!(
            "Applied {:?} resolution for {}",
            resolution.strategy, resolution.file_path
        );
        Ok(())
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}
