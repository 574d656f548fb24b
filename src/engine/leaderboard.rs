// src/engine/leaderboard.rs

use chrono::{DateTime, FixedOffset, Utc};

use super::release_gate::{can_view, gate_open};
use crate::models::{
    attempt::AttemptSession,
    leaderboard::{LeaderboardEntry, LeaderboardView},
    test_definition::TestDefinition,
};

fn entry(session: &AttemptSession) -> Option<LeaderboardEntry> {
    let result = session.result.as_ref()?;
    let submitted_at = session.submitted_at?;
    if !session.is_submitted() {
        return None;
    }
    Some(LeaderboardEntry {
        user_id: session.user_id.clone(),
        display_name: session.display_name.clone(),
        score: result.percentage,
        correct_count: result.correct,
        time_taken_seconds: result.time_taken_seconds,
        submitted_at,
        rank: 0,
    })
}

/// Ranks submitted sessions: score descending, then time taken ascending,
/// then submission order. Ranks are 1-based and never shared.
pub fn rank<'a, I>(sessions: I) -> Vec<LeaderboardEntry>
where
    I: IntoIterator<Item = &'a AttemptSession>,
{
    let mut entries: Vec<LeaderboardEntry> = sessions.into_iter().filter_map(entry).collect();
    entries.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.time_taken_seconds.cmp(&b.time_taken_seconds))
            .then(a.submitted_at.cmp(&b.submitted_at))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    for (i, e) in entries.iter_mut().enumerate() {
        e.rank = i as u32 + 1;
    }
    entries
}

/// The board as `viewer_id` may see it.
///
/// Only results whose own release gate has passed are ranked. The viewer's
/// row is always returned once they have submitted; the rest of the board
/// only once the gate has passed for the viewer too. Viewers without a
/// submission see the board once a submission made at the test's end would
/// be released.
pub fn view_for(
    test: &TestDefinition,
    sessions: &[AttemptSession],
    viewer_id: &str,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> LeaderboardView {
    let own_session = sessions
        .iter()
        .find(|s| s.user_id == viewer_id && s.is_submitted());

    let released = match own_session {
        Some(s) => can_view(test, s, now, tz),
        None => gate_open(test, test.end_time, now, tz),
    };

    let eligible = rank(sessions.iter().filter(|s| can_view(test, s, now, tz)));

    let own = own_session.and_then(|s| {
        eligible
            .iter()
            .find(|e| e.user_id == s.user_id)
            .cloned()
            .or_else(|| {
                // Not yet eligible: place the row among the eligible results.
                rank(
                    sessions
                        .iter()
                        .filter(|o| o.user_id == s.user_id || can_view(test, o, now, tz)),
                )
                .into_iter()
                .find(|e| e.user_id == s.user_id)
            })
    });

    let entries = if released && test.show_leaderboard {
        eligible
    } else {
        Vec::new()
    };

    LeaderboardView {
        test_id: test.id.clone(),
        released,
        entries,
        own,
    }
}
