//! Match scoring between provider-side events and shows.
//!
//! Confidence is a weighted sum of start-time proximity, title overlap with the
//! production title and venue overlap, clamped to `[0, 1]`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::production::Model as ProductionModel;
use crate::models::show::Model as ShowModel;

pub const DATE_WEIGHT: f64 = 0.5;
pub const TITLE_WEIGHT: f64 = 0.3;
pub const VENUE_WEIGHT: f64 = 0.2;

/// Full date score within this many minutes.
const EXACT_WINDOW_MINUTES: f64 = 15.0;
/// Date score reaches zero at this distance.
const ZERO_AFTER_MINUTES: f64 = 24.0 * 60.0;

/// The parts of a discovered event the scorer looks at.
#[derive(Debug, Clone, Copy)]
pub struct EventFacts<'a> {
    pub title: &'a str,
    pub starts_at: Option<DateTime<Utc>>,
    pub venue_name: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchScore {
    pub show_id: Uuid,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    AutoLink,
    Suggest,
    NoMatch,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchScorer {
    pub auto_link_threshold: f64,
    pub suggest_threshold: f64,
}

impl MatchScorer {
    pub fn new(auto_link_threshold: f64, suggest_threshold: f64) -> Self {
        Self {
            auto_link_threshold,
            suggest_threshold,
        }
    }

    pub fn score(&self, event: &EventFacts<'_>, show: &ShowModel, production: &ProductionModel) -> MatchScore {
        let mut reasons = Vec::new();

        let date = match event.starts_at {
            Some(starts_at) => {
                let minutes = (starts_at - show.starts_at.with_timezone(&Utc))
                    .num_seconds()
                    .abs() as f64
                    / 60.0;
                let score = date_proximity(minutes);
                if score >= 1.0 {
                    reasons.push("starts within 15 minutes of the show".to_string());
                } else if score > 0.0 {
                    reasons.push(format!("starts {:.0} minutes from the show", minutes));
                }
                score
            }
            None => 0.0,
        };

        let title = token_overlap(&production.title, event.title);
        if title > 0.0 {
            reasons.push(format!("title matches production ({:.0}%)", title * 100.0));
        }

        let venue = match (event.venue_name, show.venue_name.as_deref()) {
            (Some(event_venue), Some(show_venue)) => token_overlap(show_venue, event_venue),
            _ => 0.0,
        };
        if venue > 0.0 {
            reasons.push(format!("venue matches ({:.0}%)", venue * 100.0));
        }

        let confidence =
            (DATE_WEIGHT * date + TITLE_WEIGHT * title + VENUE_WEIGHT * venue).clamp(0.0, 1.0);

        MatchScore {
            show_id: show.id,
            confidence,
            reasons,
        }
    }

    /// Highest-scoring candidate; ties keep the earlier show.
    pub fn best_match<'a, I>(&self, event: &EventFacts<'_>, candidates: I) -> Option<MatchScore>
    where
        I: IntoIterator<Item = (&'a ShowModel, &'a ProductionModel)>,
    {
        candidates
            .into_iter()
            .map(|(show, production)| self.score(event, show, production))
            .fold(None, |best: Option<MatchScore>, score| match best {
                Some(current) if current.confidence >= score.confidence => Some(current),
                _ => Some(score),
            })
    }

    pub fn decide(&self, confidence: f64) -> MatchDecision {
        if confidence >= self.auto_link_threshold {
            MatchDecision::AutoLink
        } else if confidence >= self.suggest_threshold {
            MatchDecision::Suggest
        } else {
            MatchDecision::NoMatch
        }
    }
}

fn date_proximity(minutes_apart: f64) -> f64 {
    if minutes_apart <= EXACT_WINDOW_MINUTES {
        1.0
    } else if minutes_apart >= ZERO_AFTER_MINUTES {
        0.0
    } else {
        1.0 - (minutes_apart - EXACT_WINDOW_MINUTES) / (ZERO_AFTER_MINUTES - EXACT_WINDOW_MINUTES)
    }
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Share of `reference` tokens that also appear in `candidate`.
fn token_overlap(reference: &str, candidate: &str) -> f64 {
    let reference = tokens(reference);
    if reference.is_empty() {
        return 0.0;
    }
    let candidate = tokens(candidate);
    reference.intersection(&candidate).count() as f64 / reference.len() as f64
}
