//! Goal index derived from the play corpus.
//!
//! A goal is the first scoring shot of a play (`event_type == "SH"` with
//! outcome `"G"`); penalty-shootout plays never count. Goals are numbered per
//! `(match, team)` group in the order those groups first appear in the
//! corpus, which keeps the index stable across runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::{Play, TrajectoryPoint, describe_play, set_piece_name};

/// One goal with its match context.
#[derive(Debug, Clone, Serialize)]
pub struct GoalRecord {
    /// Index of the scoring play in the corpus.
    pub play_index: usize,
    pub team: String,
    pub opponent: String,
    pub match_id: i64,
    /// Match minute parsed from the event clock, `"?"` when unknown.
    pub minute: String,
    /// 1-based goal number for this team within the match.
    pub goal_num: usize,
    pub total_goals_in_match: usize,
}

impl GoalRecord {
    pub fn goal_id(&self) -> String {
        format!("{}_{}_{}", self.team, self.match_id, self.goal_num)
    }
}

/// Per-team goal totals for listings.
#[derive(Debug, Serialize)]
pub struct CountryGoals {
    pub name: String,
    pub total_goals: usize,
}

/// Display-ready summary of one goal and its scoring play.
#[derive(Debug, Serialize)]
pub struct GoalDescriptor {
    pub play_index: usize,
    pub goal_id: String,
    pub team: String,
    pub opponent: String,
    pub match_id: i64,
    pub minute: String,
    pub goal_num: usize,
    pub total_goals_in_match: usize,
    pub period: i64,
    /// Seconds, rounded to one decimal.
    pub duration: f64,
    pub num_events: usize,
    pub set_piece_type: String,
    pub set_piece_name: String,
    pub description: String,
    pub trajectory: Vec<TrajectoryPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

impl GoalDescriptor {
    pub fn new(goal: &GoalRecord, play: &Play, similarity: Option<f64>) -> Self {
        Self {
            play_index: goal.play_index,
            goal_id: goal.goal_id(),
            team: goal.team.clone(),
            opponent: goal.opponent.clone(),
            match_id: goal.match_id,
            minute: goal.minute.clone(),
            goal_num: goal.goal_num,
            total_goals_in_match: goal.total_goals_in_match,
            period: play.period,
            duration: (play.duration() * 10.0).round() / 10.0,
            num_events: play.num_events(),
            set_piece_type: play.set_piece_type.clone(),
            set_piece_name: set_piece_name(&play.set_piece_type),
            description: describe_play(play),
            trajectory: play.trajectory(),
            similarity: similarity.map(|s| (s * 10_000.0).round() / 10_000.0),
        }
    }
}

/// All goals in the corpus, grouped for per-team lookups.
#[derive(Debug, Default)]
pub struct GoalIndex {
    goals: Vec<GoalRecord>,
    by_team: BTreeMap<String, Vec<usize>>,
}

impl GoalIndex {
    /// Scan the corpus once and build the index.
    pub fn build(plays: &[Play]) -> Self {
        // All teams seen per match, for opponent lookup.
        let mut match_teams: HashMap<i64, BTreeSet<String>> = HashMap::new();
        for play in plays {
            if !play.team_name.is_empty() {
                match_teams
                    .entry(play.game_id)
                    .or_default()
                    .insert(play.team_name.clone());
            }
        }

        // Scoring plays grouped by (match, team), groups in first-encounter
        // order.
        type GroupKey = (i64, String);
        let mut group_order: Vec<GroupKey> = Vec::new();
        let mut groups: HashMap<GroupKey, Vec<(usize, String)>> = HashMap::new();

        for (index, play) in plays.iter().enumerate() {
            if play.is_penalty_shootout() {
                continue;
            }
            let Some(goal_event) = play.first_goal_event() else {
                continue;
            };
            let key = (play.game_id, play.team_name.clone());
            let entry = groups.entry(key.clone()).or_default();
            if entry.is_empty() {
                group_order.push(key);
            }
            entry.push((index, minute_of(&goal_event.clock)));
        }

        let mut goals: Vec<GoalRecord> = Vec::new();
        let mut by_team: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for key in &group_order {
            let (match_id, team) = key;
            let scored = &groups[key];
            let opponent = match_teams
                .get(match_id)
                .and_then(|teams| teams.iter().find(|t| *t != team))
                .cloned()
                .unwrap_or_else(|| "?".to_string());

            for (goal_num, (play_index, minute)) in scored.iter().enumerate() {
                by_team.entry(team.clone()).or_default().push(goals.len());
                goals.push(GoalRecord {
                    play_index: *play_index,
                    team: team.clone(),
                    opponent: opponent.clone(),
                    match_id: *match_id,
                    minute: minute.clone(),
                    goal_num: goal_num + 1,
                    total_goals_in_match: scored.len(),
                });
            }
        }

        log::debug!("Goal index built: {} goals", goals.len());
        Self { goals, by_team }
    }

    pub fn all(&self) -> &[GoalRecord] {
        &self.goals
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    /// Teams with at least one goal, alphabetical.
    pub fn countries(&self) -> Vec<CountryGoals> {
        self.by_team
            .iter()
            .map(|(name, indices)| CountryGoals {
                name: name.clone(),
                total_goals: indices.len(),
            })
            .collect()
    }

    /// All goals scored by a team, empty when the team is unknown.
    pub fn goals_for_country(&self, team: &str) -> Vec<&GoalRecord> {
        self.by_team
            .get(team)
            .map(|indices| indices.iter().map(|&i| &self.goals[i]).collect())
            .unwrap_or_default()
    }

    pub fn find_by_play_index(&self, play_index: usize) -> Option<&GoalRecord> {
        self.goals.iter().find(|g| g.play_index == play_index)
    }
}

/// Match minute from an `MM:SS` clock string.
fn minute_of(clock: &str) -> String {
    match clock.split_once(':') {
        Some((minute, _)) if !minute.is_empty() => minute.to_string(),
        _ => "?".to_string(),
    }
}
