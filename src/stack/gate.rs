use super::metadata::METADATA_FILE;
use super::state::StackState;
use crate::errors::Result;
use crate::git::GitRepository;
use tracing::debug;

/// One pre-apply safety check with its outcome
#[derive(Debug, Clone)]
pub struct GateCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// The full outcome of a gate run. Every check is evaluated so callers can
/// report all failures at once.
#[derive(Debug, Clone)]
pub struct GateReport {
    pub checks: Vec<GateCheck>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> Vec<&GateCheck> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn failure_summary(&self) -> String {
        self.failures()
            .iter()
            .map(|c| format!("{}: {}", c.name, c.detail))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Runs the safety checks that must pass before the real branch is
/// reconciled to a sandbox's result
pub struct PreApplyGate;

impl PreApplyGate {
    /// Evaluate all checks, never short-circuiting.
    ///
    /// `target` is the real branch's working directory when known and
    /// distinct from the sandbox. `force` overrides only the prior-failure
    /// check; everything else is unconditional.
    pub fn validate_before_apply(
        sandbox: &GitRepository,
        recorded_state: StackState,
        target: Option<&GitRepository>,
        force: bool,
    ) -> Result<GateReport> {
        let mut checks = Vec::new();

        let rebasing = sandbox.is_rebase_in_progress();
        checks.push(GateCheck {
            name: "rebase-finished",
            passed: !rebasing,
            detail: if rebasing {
                "a rebase is still in progress in the sandbox; run 'rbs resolve' or 'rbs abort'"
                    .to_string()
            } else {
                "no rebase in progress".to_string()
            },
        });

        let conflicts = sandbox.conflicted_files()?;
        checks.push(GateCheck {
            name: "no-conflicts",
            passed: conflicts.is_empty(),
            detail: if conflicts.is_empty() {
                "no conflicted files".to_string()
            } else {
                format!("{} conflicted file(s): {}", conflicts.len(), conflicts.join(", "))
            },
        });

        let sandbox_clean = sandbox.is_clean_excluding(&[METADATA_FILE])?;
        checks.push(GateCheck {
            name: "sandbox-clean",
            passed: sandbox_clean,
            detail: if sandbox_clean {
                "sandbox working tree is clean".to_string()
            } else {
                "sandbox has uncommitted changes".to_string()
            },
        });

        match target {
            Some(target) if target.path() != sandbox.path() => {
                let target_clean = target.is_clean()?;
                checks.push(GateCheck {
                    name: "target-clean",
                    passed: target_clean,
                    detail: if target_clean {
                        "target working directory is clean".to_string()
                    } else {
                        "the real branch's working directory has uncommitted changes".to_string()
                    },
                });
            }
            _ => checks.push(GateCheck {
                name: "target-clean",
                passed: true,
                detail: "target working directory unknown or same as sandbox".to_string(),
            }),
        }

        let failed_earlier = recorded_state == StackState::Failed;
        checks.push(GateCheck {
            name: "validation-passed",
            passed: !failed_earlier || force,
            detail: if failed_earlier && force {
                "prior validation failed, overridden with --force".to_string()
            } else if failed_earlier {
                "a prior validation run failed; re-run 'rbs test' or apply with --force"
                    .to_string()
            } else {
                "no failed validation recorded".to_string()
            },
        });

        let report = GateReport { checks };
        debug!(
            "Gate evaluated {} checks, {} failing",
            report.checks.len(),
            report.failures().len()
        );
        Ok(report)
    }
}
