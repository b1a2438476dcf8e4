//! Campaign Catalog
//!
//! Immutable table of achievements and tasks, loaded once at startup and shared
//! as `Arc<Catalog>`. The built-in campaign is used unless a JSON file is
//! configured:
//!
//! ```text
//! {
//!   "token_symbol": "APRO",
//!   "achievements": [ { "id": "...", "rule": { "kind": "min_referrals", "count": 3 }, ... } ],
//!   "tasks":        [ { "id": "...", "recurrence": "daily", "reward": 10, ... } ]
//! }
//! ```

pub mod achievements;
pub mod tasks;

pub use achievements::{AchievementDefinition, UnlockRule, FIRST_CLAIM};
pub use tasks::{Recurrence, TaskCategory, TaskDefinition, TaskRequirement, DAILY_CHECKIN};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const DEFAULT_TOKEN_SYMBOL: &str = "APRO";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default = "default_token_symbol")]
    token_symbol: String,
    achievements: Vec<AchievementDefinition>,
    tasks: Vec<TaskDefinition>,
}

fn default_token_symbol() -> String {
    DEFAULT_TOKEN_SYMBOL.to_string()
}

impl Catalog {
    pub fn new(
        token_symbol: impl Into<String>,
        achievements: Vec<AchievementDefinition>,
        tasks: Vec<TaskDefinition>,
    ) -> Result<Self> {
        let catalog = Self {
            token_symbol: token_symbol.into(),
            achievements,
            tasks,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn builtin() -> Self {
        Self {
            token_symbol: default_token_symbol(),
            achievements: achievements::builtin_achievements(),
            tasks: tasks::builtin_tasks(),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        let catalog: Catalog = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid catalog JSON in {}", path.display()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for def in &self.achievements {
            if !seen.insert(def.id.as_str()) {
                bail!("Duplicate achievement id: {}", def.id);
            }
        }

        let mut seen = HashSet::new();
        for def in &self.tasks {
            if !seen.insert(def.id.as_str()) {
                bail!("Duplicate task id: {}", def.id);
            }
            if def.requires_verification && def.verification_kind.is_none() {
                bail!("Task {} requires verification but names no verification kind", def.id);
            }
            if !def.recurrence.is_recurring() && def.max_completions == 0 {
                bail!("One-time task {} must allow at least one completion", def.id);
            }
        }

        if self.token_symbol.trim().is_empty() {
            bail!("Token symbol must not be empty");
        }

        Ok(())
    }

    pub fn token_symbol(&self) -> &str {
        &self.token_symbol
    }

    pub fn achievements(&self) -> &[AchievementDefinition] {
        &self.achievements
    }

    pub fn achievement(&self, id: &str) -> Option<&AchievementDefinition> {
        self.achievements.iter().find(|a| a.id == id)
    }

    pub fn tasks(&self) -> &[TaskDefinition] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = Catalog::builtin();
        assert!(catalog.validate().is_ok());
        assert_eq!(catalog.achievements().len(), 5);
        assert_eq!(catalog.tasks().len(), 15);

        let checkin = catalog.task(DAILY_CHECKIN).unwrap();
        assert_eq!(checkin.recurrence, Recurrence::Daily);
        assert!(!checkin.requires_verification);
        assert_eq!(checkin.completion_cap(), None);

        let invite = catalog.task("invite_friends_bonus").unwrap();
        assert_eq!(
            invite.requirement,
            Some(TaskRequirement::MinReferrals { count: 3 })
        );
    }

    #[test]
    fn test_achievement_rewards() {
        let catalog = Catalog::builtin();
        let rewards: Vec<(u32, u64)> = catalog
            .achievements()
            .iter()
            .map(|a| (a.requirement(), a.reward))
            .collect();
        assert_eq!(rewards, vec![(0, 1), (1, 11), (3, 111), (5, 1111), (6, 11111)]);
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let mut tasks = tasks::builtin_tasks();
        tasks.push(tasks[0].clone());
        let result = Catalog::new("APRO", achievements::builtin_achievements(), tasks);
        assert!(result.is_err());
    }

    #[test]
    fn test_catalog_json_shape() {
        let json = serde_json::to_string(&Catalog::builtin()).unwrap();
        let parsed: Catalog = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tasks().len(), 15);
        assert_eq!(parsed.token_symbol(), "APRO");
    }
}
