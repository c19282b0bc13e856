//! `ScopeGuard` — pattern-matched allow/forbid/ask file-change validation
//!, enforced both preventively (API provider tool calls, before a
//! write lands) and reactively (subprocess providers, after `git status`).
//!
//! Pattern matching is grounded on the teacher's
//! `safety::path_validator::PathValidator` (glob-pattern matching via the
//! `glob` crate, prefix fallback for patterns without wildcards), simplified
//! to the precedence rules the spec actually asks for — no symlink/traversal
//! hardening, since that concern belongs to the sandboxing layer the spec
//! keeps out of scope.

use crate::task::TaskScope;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    Strict,
    #[default]
    Ask,
    Permissive,
}

/// The outcome of evaluating a single file against a task's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    AskUser,
    Block,
}

impl From<crate::config::ScopeEnforcement> for EnforcementMode {
    fn from(value: crate::config::ScopeEnforcement) -> Self {
        match value {
            crate::config::ScopeEnforcement::Strict => Self::Strict,
            crate::config::ScopeEnforcement::Ask => Self::Ask,
            crate::config::ScopeEnforcement::Permissive => Self::Permissive,
        }
    }
}

impl Decision {
    /// `BLOCK` wins over `ASK_USER` wins over `ALLOW`.
    fn combine(self, other: Decision) -> Decision {
        match (self, other) {
            (Decision::Block, _) | (_, Decision::Block) => Decision::Block,
            (Decision::AskUser, _) | (_, Decision::AskUser) => Decision::AskUser,
            _ => Decision::Allow,
        }
    }
}

/// A single changed path with the decision reached for it.
#[derive(Debug, Clone)]
pub struct ChangeVerdict {
    pub path: String,
    pub decision: Decision,
    pub reason: String,
}

/// Outcome of validating a batch of changes.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub decision: Decision,
    pub verdicts: Vec<ChangeVerdict>,
}

impl ValidationResult {
    pub fn is_block(&self) -> bool {
        self.decision == Decision::Block
    }

    pub fn is_ask(&self) -> bool {
        self.decision == Decision::AskUser
    }
}

/// Evaluates a [`TaskScope`] against an [`EnforcementMode`], holding a
/// per-run approval memory.
pub struct ScopeGuard {
    scope: TaskScope,
    mode: EnforcementMode,
    approved: HashSet<String>,
}

impl ScopeGuard {
    pub fn new(scope: TaskScope, mode: EnforcementMode) -> Self {
        Self {
            scope,
            mode,
            approved: HashSet::new(),
        }
    }

    /// Record that the user approved a path this run. Bypasses `ASK_USER`
    /// and `BLOCK` for `askBefore` patterns only; `forbidden` is unconditional.
    pub fn approve(&mut self, path: &str) {
        self.approved.insert(normalize(path));
    }

    pub fn scope(&self) -> &TaskScope {
        &self.scope
    }

    fn is_approved(&self, path: &str) -> bool {
        self.approved.contains(&normalize(path))
    }

    /// Evaluate a single path in strict precedence order.
    pub fn decide(&self, path: &str) -> (Decision, String) {
        let normalized = normalize(path);

        if matches_any(&self.scope.forbidden, &normalized) {
            return (Decision::Block, "matches forbidden pattern".to_string());
        }

        if matches_any(&self.scope.ask_before, &normalized) {
            if self.is_approved(&normalized) {
                return (Decision::Allow, "previously approved".to_string());
            }
            return match self.mode {
                EnforcementMode::Permissive => {
                    (Decision::Allow, "askBefore allowed under permissive mode".to_string())
                }
                _ => (Decision::AskUser, "matches askBefore pattern".to_string()),
            };
        }

        // An empty `allowed` ordinarily means "no restriction" (rule only
        // applies when `allowed` is non-empty), except under strict mode,
        // where an empty allow-list still means "nothing is allowed" —
        // every non-forbidden, non-askBefore path blocks.
        let outside_allowed = !matches_any(&self.scope.allowed, &normalized);
        let restriction_applies = match self.mode {
            EnforcementMode::Strict => outside_allowed,
            _ => !self.scope.allowed.is_empty() && outside_allowed,
        };

        if restriction_applies {
            if self.is_approved(&normalized) {
                return (Decision::Allow, "previously approved".to_string());
            }
            return match self.mode {
                EnforcementMode::Strict => {
                    (Decision::Block, "not in allowed list (strict mode)".to_string())
                }
                EnforcementMode::Ask => {
                    (Decision::AskUser, "not in allowed list".to_string())
                }
                EnforcementMode::Permissive => {
                    (Decision::Allow, "not in allowed list but permissive mode".to_string())
                }
            };
        }

        (Decision::Allow, "no restricting pattern matched".to_string())
    }

    /// Validate a batch of changed paths, aggregating their decisions into
    /// one overall verdict (the worst individual decision wins).
    pub fn validate(&self, changes: &[String]) -> ValidationResult {
        let mut overall = Decision::Allow;
        let mut verdicts = Vec::with_capacity(changes.len());

        for path in changes {
            let (decision, reason) = self.decide(path);
            overall = overall.combine(decision);
            verdicts.push(ChangeVerdict {
                path: path.clone(),
                decision,
                reason,
            });
        }

        ValidationResult {
            decision: overall,
            verdicts,
        }
    }

    /// Subset of `changes` whose decision is `BLOCK` and which were not
    /// approved — what the executor reverts via `GitOps.checkout`.
    pub fn get_changes_to_revert(&self, changes: &[String]) -> Vec<String> {
        changes
            .iter()
            .filter(|path| {
                let (decision, _) = self.decide(path);
                decision == Decision::Block
            })
            .cloned()
            .collect()
    }

    /// Markdown violation report appended to the task file when a run ends
    /// blocked.
    pub fn generate_violation_report(&self, changes: &[String]) -> String {
        let result = self.validate(changes);
        let mut report = String::from("## Scope Violation Report\n\n");

        for verdict in result.verdicts.iter().filter(|v| v.decision != Decision::Allow) {
            report.push_str(&format!(
                "- `{}`: {:?} — {}\n",
                verdict.path, verdict.decision, verdict.reason
            ));
        }

        report.push_str("\n### Scope Configuration\n\n");
        report.push_str(&format!("- Allowed: {:?}\n", self.scope.allowed));
        report.push_str(&format!("- Forbidden: {:?}\n", self.scope.forbidden));
        report.push_str(&format!("- Ask Before: {:?}\n", self.scope.ask_before));

        report
    }
}

fn normalize(path: &str) -> String {
    path.strip_prefix("./").unwrap_or(path).to_string()
}

/// A path matches a pattern if: it matches directly; it matches with `/**`
/// appended (directory-style prefix); or the literal prefix before the
/// first wildcard is a prefix of the path.
fn matches_pattern(pattern: &str, path: &str) -> bool {
    let pattern = normalize(pattern);

    if let Ok(glob_pattern) = glob::Pattern::new(&pattern) {
        if glob_pattern.matches(path) {
            return true;
        }
        if let Ok(dir_pattern) = glob::Pattern::new(&format!("{}/**", pattern.trim_end_matches('/'))) {
            if dir_pattern.matches(path) {
                return true;
            }
        }
    }

    let literal_prefix: String = pattern.chars().take_while(|c| *c != '*' && *c != '?').collect();
    !literal_prefix.is_empty() && path.starts_with(&literal_prefix)
}

fn matches_any(patterns: &[String], path: &str) -> bool {
    patterns.iter().any(|p| matches_pattern(p, path))
}
