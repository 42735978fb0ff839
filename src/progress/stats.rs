//! Group progress statistics.
//!
//! Each member is compared against a linear pacing model: on `start_date` the
//! group is expected to be at 0% of the book and on `end_date` at 100%. The
//! computation is pure, `today` is always passed in.

use serde::Serialize;
use time::{Date, OffsetDateTime};
use utoipa::ToSchema;

use crate::utils::round1;

/// The pacing window of a group and the size of its book.
#[derive(Debug, Clone, Copy)]
pub struct StatsWindow {
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub total_pages: i64,
}

/// The last recorded reading progress of a member.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot {
    /// `None` or 0 means the page was never set
    pub current_page: Option<i64>,
    pub last_read: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct MemberProgress {
    pub username: String,
    /// `None` when the member has no progress record
    pub progress: Option<ProgressSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProgressCategory {
    Completed,
    OnTrack,
    Behind,
    NotStarted,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MemberStats {
    pub username: String,
    pub current_page: i64,
    pub progress_percent: f64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_read: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct CategoryStats {
    pub count: usize,
    pub members: Vec<MemberStats>,
}

impl CategoryStats {
    fn push(&mut self, member: MemberStats) {
        self.members.push(member);
        self.count = self.members.len();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct StatsReport {
    pub total_members: usize,
    /// Percent of the book the group should have read by today, one decimal
    pub expected_progress: f64,
    pub completed: CategoryStats,
    pub on_track: CategoryStats,
    pub behind: CategoryStats,
    pub not_started: CategoryStats,
}

impl StatsReport {
    pub fn category(&self, category: ProgressCategory) -> &CategoryStats {
        match category {
            ProgressCategory::Completed => &self.completed,
            ProgressCategory::OnTrack => &self.on_track,
            ProgressCategory::Behind => &self.behind,
            ProgressCategory::NotStarted => &self.not_started,
        }
    }

    fn category_mut(&mut self, category: ProgressCategory) -> &mut CategoryStats {
        match category {
            ProgressCategory::Completed => &mut self.completed,
            ProgressCategory::OnTrack => &mut self.on_track,
            ProgressCategory::Behind => &mut self.behind,
            ProgressCategory::NotStarted => &mut self.not_started,
        }
    }
}

/// Expected progress in percent, unrounded.
pub fn expected_progress(today: Date, start_date: Option<Date>, end_date: Option<Date>) -> f64 {
    let (Some(start_date), Some(end_date)) = (start_date, end_date) else {
        return 0.0;
    };
    let total_days = (end_date - start_date).whole_days();
    let elapsed_days = (today - start_date).whole_days();
    if elapsed_days < 0 {
        0.0
    } else if elapsed_days >= total_days {
        100.0
    } else if total_days == 0 {
        0.0
    } else {
        100.0 * elapsed_days as f64 / total_days as f64
    }
}

/// Percent of the book read at `page`, 0 for a book without pages.
pub fn progress_percent(page: i64, total_pages: i64) -> f64 {
    if total_pages > 0 {
        100.0 * page as f64 / total_pages as f64
    } else {
        0.0
    }
}

/// Classifies a member who has a progress record. A missing or zero page counts as page 1.
pub fn classify(current_page: Option<i64>, total_pages: i64, expected: f64) -> ProgressCategory {
    let page = current_page.filter(|&p| p != 0).unwrap_or(1);
    if page >= total_pages {
        ProgressCategory::Completed
    } else if progress_percent(page, total_pages) >= expected {
        ProgressCategory::OnTrack
    } else {
        ProgressCategory::Behind
    }
}

pub fn compute_stats(today: Date, window: StatsWindow, members: &[MemberProgress]) -> StatsReport {
    let expected = expected_progress(today, window.start_date, window.end_date);
    let mut report = StatsReport {
        total_members: members.len(),
        expected_progress: round1(expected),
        ..Default::default()
    };
    for member in members {
        let (category, stats) = match member.progress {
            None => (
                ProgressCategory::NotStarted,
                MemberStats {
                    username: member.username.clone(),
                    current_page: 0,
                    progress_percent: 0.0,
                    last_read: None,
                },
            ),
            Some(progress) => {
                let page = progress.current_page.filter(|&p| p != 0).unwrap_or(1);
                (
                    classify(progress.current_page, window.total_pages, expected),
                    MemberStats {
                        username: member.username.clone(),
                        current_page: page,
                        progress_percent: round1(progress_percent(page, window.total_pages)),
                        last_read: Some(progress.last_read),
                    },
                )
            }
        };
        report.category_mut(category).push(stats);
    }
    report
}
