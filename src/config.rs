//! Bot configuration loaded from the environment

use crate::db::UserId;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_NEXT_QUESTION_DELAY_MS: u64 = 1000;
const DEFAULT_NEXT_LESSON_DELAY_MS: u64 = 1500;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub db_path: PathBuf,
    /// Static allow-list of users who may author, edit and delete lessons
    pub admin_ids: Vec<UserId>,
    pub pacing: QuizPacing,
}

/// Delays between a verdict and the next prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizPacing {
    pub next_question: Duration,
    pub next_lesson: Duration,
}

impl Default for QuizPacing {
    fn default() -> Self {
        Self {
            next_question: Duration::from_millis(DEFAULT_NEXT_QUESTION_DELAY_MS),
            next_lesson: Duration::from_millis(DEFAULT_NEXT_LESSON_DELAY_MS),
        }
    }
}

impl QuizPacing {
    /// No waiting at all, for tests
    #[allow(dead_code)] // Used in tests
    pub fn immediate() -> Self {
        Self {
            next_question: Duration::ZERO,
            next_lesson: Duration::ZERO,
        }
    }
}

impl BotConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let db_path = std::env::var("LESSONBOT_DB_PATH").map_or_else(
            |_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(format!("{home}/.lessonbot/lessonbot.db"))
            },
            PathBuf::from,
        );

        let admin_ids = std::env::var("LESSONBOT_ADMIN_IDS")
            .map(|raw| parse_admin_ids(&raw))
            .unwrap_or_default();

        let pacing = QuizPacing {
            next_question: delay_from_env(
                "LESSONBOT_NEXT_QUESTION_DELAY_MS",
                DEFAULT_NEXT_QUESTION_DELAY_MS,
            ),
            next_lesson: delay_from_env(
                "LESSONBOT_NEXT_LESSON_DELAY_MS",
                DEFAULT_NEXT_LESSON_DELAY_MS,
            ),
        };

        Self {
            db_path,
            admin_ids,
            pacing,
        }
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

fn delay_from_env(key: &str, default_ms: u64) -> Duration {
    let ms = std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

/// Parse a comma-separated id list. Blank entries are skipped, garbage is
/// skipped with a warning.
fn parse_admin_ids(raw: &str) -> Vec<UserId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<UserId>() {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(entry = %s, error = %e, "Ignoring invalid admin id");
                None
            }
        })
        .collect()
}

#[cfg(test)]
impl BotConfig {
    pub fn for_tests(admin_ids: Vec<UserId>) -> Self {
        Self {
            db_path: PathBuf::from(":memory:"),
            admin_ids,
            pacing: QuizPacing::immediate(),
        }
    }
}
