//! LLM spending insights.
//!
//! Builds a prompt from the user's background notes and the converted
//! statement tables, sends it to a provider, and saves the answer as a
//! timestamped markdown file in the data dir. The whole feature is optional:
//! without an API key the pipeline simply skips it.

mod gemini;

pub use gemini::GeminiProvider;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::markdown::statement_files;

/// A text-in, text-out LLM backend.
#[async_trait]
pub trait InsightsProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Bundled answer used by demo mode.
const DEMO_INSIGHTS_FILE: &str = "demo_insights.md";

/// Optional free-text notes the user keeps about their situation.
const BACKGROUND_FILE: &str = "user_background.txt";

pub struct InsightsService {
    data_dir: PathBuf,
    provider: Box<dyn InsightsProvider>,
}

impl InsightsService {
    pub fn new(data_dir: impl Into<PathBuf>, provider: Box<dyn InsightsProvider>) -> Self {
        Self {
            data_dir: data_dir.into(),
            provider,
        }
    }

    /// Build the full prompt: instructions, background, then every statement
    /// table verbatim.
    ///
    /// Fails when no statement files exist - there is nothing to ask about.
    pub fn build_prompt(&self, demo: bool) -> Result<String> {
        let background = self.user_background();
        let expenses = self.statement_text(demo)?;
        if expenses.trim().is_empty() {
            anyhow::bail!(
                "No statement files found in {} - run a fetch or conversion first",
                self.data_dir.display()
            );
        }

        Ok(format!(
            "You are helping the user to manage and get insights about their expenses.\n\
             User background:\n\
             {background}\n\
             \n\
             User expenses are credit card transactions from markdown files provided here:\n\
             {expenses}\n\
             \n\
             Please read the user's background and understand the user's expenses.\n\
             then provide insights in markdown format. be concise:\n\
             - What are the user's main expenses?\n\
             - Short recommendations\n\
             - Summary and any other insights you can provide\n"
        ))
    }

    /// Generate insights and save them to the data dir.
    ///
    /// Demo mode returns the bundled demo file without any network call.
    pub async fn generate(&self, clock: &dyn Clock, demo: bool) -> Result<PathBuf> {
        if demo {
            let path = self.data_dir.join(DEMO_INSIGHTS_FILE);
            info!(path = %path.display(), "Demo mode: using bundled insights");
            return Ok(path);
        }

        let prompt = self.build_prompt(false)?;
        info!(provider = self.provider.name(), "Requesting insights");
        let answer = self.provider.generate(&prompt).await?;

        let stamp = clock.now().format("%d-%m-%Y_%H-%M");
        let path = self
            .data_dir
            .join(format!("insights_{}_{stamp}.md", self.provider.name()));
        std::fs::write(&path, &answer)
            .with_context(|| format!("Failed to write insights file: {}", path.display()))?;

        info!(path = %path.display(), "Insights saved");
        Ok(path)
    }

    fn user_background(&self) -> String {
        let path = self.data_dir.join(BACKGROUND_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => {
                warn!(path = %path.display(), "No user background file, proceeding without it");
                String::new()
            }
        }
    }

    fn statement_text(&self, demo: bool) -> Result<String> {
        let files = statement_files(&self.data_dir, demo)?;
        let mut parts = Vec::new();
        for file in files {
            match std::fs::read_to_string(&file) {
                Ok(content) => parts.push(content),
                Err(e) => warn!(path = %file.display(), error = %e, "Skipping unreadable statement file"),
            }
        }
        Ok(parts.join("\n\n"))
    }
}

/// Location of the bundled demo answer inside a data dir.
pub fn demo_insights_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DEMO_INSIGHTS_FILE)
}

/// Read a saved insights file back, for display after generation.
pub fn read_insights(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read insights file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct CannedProvider;

    #[async_trait]
    impl InsightsProvider for CannedProvider {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("## Insights\nSpend less on coffee.".to_string())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn write_statement(dir: &Path) {
        std::fs::write(
            dir.join("transactions_2024-12.md"),
            "| תאריך עסקה | סכום חיוב |\n| --- | --- |\n| 01-12-2024 | 10.00 |\n",
        )
        .unwrap();
    }

    #[test]
    fn prompt_includes_background_and_statements() {
        let dir = TempDir::new().unwrap();
        write_statement(dir.path());
        std::fs::write(dir.path().join(BACKGROUND_FILE), "Family of four.").unwrap();

        let service = InsightsService::new(dir.path(), Box::new(CannedProvider));
        let prompt = service.build_prompt(false).unwrap();

        assert!(prompt.contains("Family of four."));
        assert!(prompt.contains("01-12-2024"));
    }

    #[test]
    fn prompt_fails_without_statements() {
        let dir = TempDir::new().unwrap();
        let service = InsightsService::new(dir.path(), Box::new(CannedProvider));
        assert!(service.build_prompt(false).is_err());
    }

    #[test]
    fn missing_background_is_tolerated() {
        let dir = TempDir::new().unwrap();
        write_statement(dir.path());

        let service = InsightsService::new(dir.path(), Box::new(CannedProvider));
        assert!(service.build_prompt(false).is_ok());
    }

    #[tokio::test]
    async fn generate_stamps_the_output_file() {
        let dir = TempDir::new().unwrap();
        write_statement(dir.path());

        let service = InsightsService::new(dir.path(), Box::new(CannedProvider));
        let clock = FixedClock::new(chrono::Utc.with_ymd_and_hms(2025, 1, 2, 9, 30, 0).unwrap());

        let path = service.generate(&clock, false).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "insights_canned_02-01-2025_09-30.md"
        );
        assert!(read_insights(&path).unwrap().contains("coffee"));
    }

    #[tokio::test]
    async fn demo_mode_skips_the_provider() {
        let dir = TempDir::new().unwrap();
        let service = InsightsService::new(dir.path(), Box::new(CannedProvider));
        let clock = FixedClock::new(chrono::Utc.with_ymd_and_hms(2025, 1, 2, 9, 30, 0).unwrap());

        let path = service.generate(&clock, true).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            DEMO_INSIGHTS_FILE
        );
    }
}
