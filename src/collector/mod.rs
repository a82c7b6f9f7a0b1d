//! Walks the portal's results page university by university, opening every
//! major group and folding each professor card into a [`MergeTable`].
//!
//! Every step is best effort: a failed click or a card that cannot be read is
//! recorded in the [`RunSummary`] and the walk moves on to the next item.

pub mod browser;
pub mod card;
pub mod session;

use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::merge::{MergeOutcome, MergeTable};
use crate::model::ProfessorRecord;

const GROUP_TITLE_PREFIX: &str = "لیست اساتید گرایش";
const GROUP_MARKER: &str = "گرایش";
const GROUP_LIST_PREFIX: &str = "لیست اساتید";

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("click rejected on {target}: {reason}")]
    ClickRejected { target: String, reason: String },
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("webdriver command failed: {0}")]
    Driver(#[from] fantoccini::error::CmdError),
}

/// Outer HTML of one card, or why it could not be read.
pub type CardHtml = Result<String, StepError>;

/// The pieces of the portal the walk needs. Implemented over WebDriver by
/// [`browser::BrowserPortal`].
#[async_trait]
pub trait Portal: Send {
    /// Run the advanced search for one university and return the text of
    /// every element that may head a major group, in page order.
    async fn search_university(&mut self, university: &str) -> Result<Vec<String>, StepError>;

    /// Open a group and read its cards. An empty list means no card showed up
    /// before the wait expired.
    async fn expand_group(&mut self, title: &str) -> Result<Vec<CardHtml>, StepError>;

    async fn collapse_group(&mut self, title: &str) -> Result<(), StepError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Success,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Tally {
    fn record(&mut self, status: &ItemStatus) {
        match status {
            ItemStatus::Success => self.success += 1,
            ItemStatus::Skipped(_) => self.skipped += 1,
            ItemStatus::Failed(_) => self.failed += 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub universities: Tally,
    pub groups: Tally,
    pub cards: Tally,
    /// New professors.
    pub created: usize,
    /// Cards folded into an already-seen professor.
    pub merged: usize,
    /// One line per skipped or failed item.
    pub problems: Vec<String>,
}

impl RunSummary {
    fn note(&mut self, kind: Kind, context: &str, status: ItemStatus) {
        match &status {
            ItemStatus::Success => {}
            ItemStatus::Skipped(why) => self.problems.push(format!("skipped {context}: {why}")),
            ItemStatus::Failed(why) => self.problems.push(format!("failed {context}: {why}")),
        }
        match kind {
            Kind::University => self.universities.record(&status),
            Kind::Group => self.groups.record(&status),
            Kind::Card => self.cards.record(&status),
        }
    }

    pub fn log(&self) {
        info!(
            universities = ?self.universities,
            groups = ?self.groups,
            cards = ?self.cards,
            created = self.created,
            merged = self.merged,
            "Collection finished"
        );
        for problem in &self.problems {
            warn!("{}", problem);
        }
    }
}

#[derive(Clone, Copy)]
enum Kind {
    University,
    Group,
    Card,
}

pub struct CollectRun {
    pub records: Vec<ProfessorRecord>,
    pub summary: RunSummary,
}

/// Strip the portal's "list of professors of major" prefix from a group title.
pub fn clean_major(title: &str) -> String {
    title.replace(GROUP_TITLE_PREFIX, "").trim().to_string()
}

/// Keep the candidate texts that name a major group, whitespace-collapsed and
/// deduplicated in page order.
pub fn select_major_groups(candidates: Vec<String>) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    for text in candidates {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }
        if !(text.contains(GROUP_MARKER) || text.starts_with(GROUP_LIST_PREFIX)) {
            continue;
        }
        if !groups.contains(&text) {
            groups.push(text);
        }
    }
    groups
}

/// Walk every university and group, then assign ids. Never fails; problems
/// end up in the returned summary.
pub async fn collect_run<P: Portal>(
    portal: &mut P,
    universities: &[String],
    group_pause: Duration,
) -> CollectRun {
    let mut table = MergeTable::new();
    let mut summary = RunSummary::default();

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner());

    for university in universities {
        info!("=== Starting university: {} ===", university);
        pb.set_message(university.clone());

        let groups = match portal.search_university(university).await {
            Ok(candidates) => select_major_groups(candidates),
            Err(e) => {
                warn!("Search failed for {}: {}", university, e);
                summary.note(Kind::University, university, ItemStatus::Failed(e.to_string()));
                continue;
            }
        };
        if groups.is_empty() {
            summary.note(
                Kind::University,
                university,
                ItemStatus::Skipped("no major groups on results page".to_string()),
            );
            continue;
        }
        info!("Found {} major groups", groups.len());

        for title in &groups {
            let major = clean_major(title);
            let context = format!("{university} / {major}");
            pb.set_message(format!("{context} ({} professors)", table.len()));
            info!("Opening major: {}", major);

            let cards = match portal.expand_group(title).await {
                Ok(cards) => cards,
                Err(e) => {
                    warn!("Could not open {}: {}", context, e);
                    summary.note(Kind::Group, &context, ItemStatus::Failed(e.to_string()));
                    continue;
                }
            };

            if cards.is_empty() {
                info!("No professor cards for {}", major);
                summary.note(Kind::Group, &context, ItemStatus::Skipped("no cards".to_string()));
            } else {
                info!("Found {} professor cards for {}", cards.len(), major);
                for (i, card) in cards.into_iter().enumerate() {
                    let card_context = format!("{context} card {}", i + 1);
                    let status = match card {
                        Ok(html) => {
                            let obs = card::parse_card(&html).into_observation(university);
                            match table.observe(obs, &major) {
                                MergeOutcome::Created => {
                                    summary.created += 1;
                                    ItemStatus::Success
                                }
                                MergeOutcome::Merged { .. } => {
                                    summary.merged += 1;
                                    ItemStatus::Success
                                }
                                MergeOutcome::Discarded => {
                                    ItemStatus::Skipped("card has no name".to_string())
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Error reading {}: {}", card_context, e);
                            ItemStatus::Failed(e.to_string())
                        }
                    };
                    summary.note(Kind::Card, &card_context, status);
                }
                summary.note(Kind::Group, &context, ItemStatus::Success);
            }

            if let Err(e) = portal.collapse_group(title).await {
                warn!("Could not collapse {}: {}", context, e);
            }
            pb.tick();
            tokio::time::sleep(group_pause).await;
        }

        summary.note(Kind::University, university, ItemStatus::Success);
        info!("Finished {}: {} professors so far", university, table.len());
    }

    pb.finish_and_clear();
    if table.is_empty() {
        warn!("No professors collected from {} universities", universities.len());
    }
    let scraped_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let records = table.finalize(&scraped_at);
    CollectRun { records, summary }
}
