//! Task definitions

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DAILY_CHECKIN: &str = "daily_checkin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    OneTime,
    Daily,
    Weekly,
}

impl Recurrence {
    /// Time until a recurring task can be completed again
    pub fn cooldown(&self) -> Option<Duration> {
        match self {
            Self::OneTime => None,
            Self::Daily => Some(Duration::days(1)),
            Self::Weekly => Some(Duration::days(7)),
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, Self::OneTime)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneTime => "one_time",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Social,
    Community,
    Platform,
    Content,
}

/// Precondition checked before a task may be completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskRequirement {
    MinReferrals { count: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: TaskCategory,
    pub recurrence: Recurrence,
    pub reward: u64,
    pub requires_verification: bool,
    #[serde(default)]
    pub verification_kind: Option<String>,
    /// 0 means unlimited
    pub max_completions: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub requirement: Option<TaskRequirement>,
}

fn default_active() -> bool {
    true
}

impl TaskDefinition {
    pub fn completion_cap(&self) -> Option<u32> {
        (self.max_completions > 0).then_some(self.max_completions)
    }
}

struct TaskSeed<'a> {
    id: &'a str,
    title: &'a str,
    description: &'a str,
    category: TaskCategory,
    recurrence: Recurrence,
    reward: u64,
    verification: Option<&'a str>,
}

impl TaskSeed<'_> {
    fn build(self) -> TaskDefinition {
        TaskDefinition {
            id: self.id.to_string(),
            title: self.title.to_string(),
            description: self.description.to_string(),
            category: self.category,
            recurrence: self.recurrence,
            reward: self.reward,
            requires_verification: self.verification.is_some(),
            verification_kind: self.verification.map(str::to_string),
            max_completions: if self.recurrence.is_recurring() { 0 } else { 1 },
            active: true,
            requirement: None,
        }
    }
}

pub fn builtin_tasks() -> Vec<TaskDefinition> {
    use Recurrence::*;
    use TaskCategory::*;

    let social = |id, title, description, reward, kind| TaskSeed {
        id,
        title,
        description,
        category: Social,
        recurrence: OneTime,
        reward,
        verification: Some(kind),
    };

    let mut invite = TaskSeed {
        id: "invite_friends_bonus",
        title: "Invite 3 Friends",
        description: "Successfully refer 3 friends to claim their airdrop",
        category: Community,
        recurrence: OneTime,
        reward: 150,
        verification: None,
    }
    .build();
    invite.requirement = Some(TaskRequirement::MinReferrals { count: 3 });

    vec![
        social(
            "follow_twitter",
            "Follow on X (Twitter)",
            "Follow the official account on X",
            50,
            "twitter_follow",
        )
        .build(),
        social(
            "retweet_pinned",
            "Retweet Pinned Post",
            "Retweet the pinned announcement",
            75,
            "tweet_retweet",
        )
        .build(),
        social(
            "join_telegram",
            "Join Telegram",
            "Join the official Telegram community",
            50,
            "telegram_join",
        )
        .build(),
        social(
            "join_discord",
            "Join Discord",
            "Join the Discord server",
            50,
            "discord_join",
        )
        .build(),
        TaskSeed {
            id: DAILY_CHECKIN,
            title: "Daily Check-in",
            description: "Check in every day to build your streak",
            category: Community,
            recurrence: Daily,
            reward: 10,
            verification: None,
        }
        .build(),
        TaskSeed {
            id: "visit_website",
            title: "Visit Website",
            description: "Visit the official website",
            category: Platform,
            recurrence: Daily,
            reward: 5,
            verification: Some("website_visit"),
        }
        .build(),
        TaskSeed {
            id: "read_whitepaper",
            title: "Read Whitepaper",
            description: "Read the project whitepaper",
            category: Platform,
            recurrence: OneTime,
            reward: 100,
            verification: Some("document_read"),
        }
        .build(),
        TaskSeed {
            id: "create_tweet",
            title: "Create a Tweet",
            description: "Post about the campaign on X",
            category: Content,
            recurrence: OneTime,
            reward: 200,
            verification: Some("tweet_create"),
        }
        .build(),
        invite,
        social(
            "youtube_subscribe",
            "Subscribe on YouTube",
            "Subscribe to the YouTube channel",
            50,
            "youtube_subscribe",
        )
        .build(),
        TaskSeed {
            id: "weekly_survey",
            title: "Weekly Survey",
            description: "Complete the weekly community survey",
            category: Community,
            recurrence: Weekly,
            reward: 50,
            verification: Some("survey_complete"),
        }
        .build(),
        social(
            "like_facebook",
            "Like on Facebook",
            "Like the Facebook page",
            50,
            "facebook_like",
        )
        .build(),
        TaskSeed {
            id: "make_youtube_video",
            title: "Make a YouTube Video",
            description: "Publish a video review of the project",
            category: Content,
            recurrence: OneTime,
            reward: 500,
            verification: Some("youtube_video"),
        }
        .build(),
        TaskSeed {
            id: "write_blog_post",
            title: "Write a Blog Post",
            description: "Write an article about the project",
            category: Content,
            recurrence: OneTime,
            reward: 300,
            verification: Some("blog_post"),
        }
        .build(),
        TaskSeed {
            id: "create_tiktok",
            title: "Create a Short Video",
            description: "Post a short video about the project",
            category: Content,
            recurrence: OneTime,
            reward: 250,
            verification: Some("short_video"),
        }
        .build(),
    ]
}
