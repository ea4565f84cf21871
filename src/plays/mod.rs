//! Football play corpus: tracking-event plays, their precomputed latent
//! vectors, and similarity queries over both plays and goals.
//!
//! Plays and latents come from two JSON artifacts produced offline. They are
//! positionally aligned: latent row `i` belongs to play `i`, so a row-count
//! mismatch is a fatal load error rather than something to paper over.

pub mod goals;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::similarity::rank_top_k;
use goals::{GoalDescriptor, GoalIndex};

#[derive(Error, Debug)]
pub enum PlayDataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("latent rows ({rows}) do not match play count ({plays})")]
    ShapeMismatch { rows: usize, plays: usize },
    #[error("latent rows have inconsistent dimensions")]
    Ragged,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlayQueryError {
    #[error("play index {index} out of range (0..{total})")]
    InvalidIndex { index: usize, total: usize },
    #[error("play {0} is not a goal")]
    NoGoalAtIndex(usize),
}

/// One tracked ball event within a play.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayEvent {
    #[serde(default)]
    pub ball_x: f64,
    #[serde(default)]
    pub ball_y: f64,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub shot_outcome: Option<String>,
    #[serde(default)]
    pub clock: String,
}

/// One play as recorded in the plays artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct Play {
    #[serde(default)]
    pub game_id: i64,
    #[serde(default)]
    pub play_id: i64,
    #[serde(default)]
    pub team_id: i64,
    #[serde(default)]
    pub team_name: String,
    #[serde(default)]
    pub events: Vec<PlayEvent>,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub end_time: f64,
    #[serde(default)]
    pub period: i64,
    #[serde(default)]
    pub set_piece_type: String,
}

impl Play {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    /// Penalty-shootout plays are excluded from goal statistics.
    pub fn is_penalty_shootout(&self) -> bool {
        self.set_piece_type == "P"
    }

    /// The first shot event of the play that scored, if any.
    pub fn first_goal_event(&self) -> Option<&PlayEvent> {
        self.events
            .iter()
            .find(|e| e.event_type == "SH" && e.shot_outcome.as_deref() == Some("G"))
    }

    /// Ball positions across the play's events, for visualization.
    pub fn trajectory(&self) -> Vec<TrajectoryPoint> {
        self.events
            .iter()
            .map(|e| TrajectoryPoint {
                x: e.ball_x,
                y: e.ball_y,
                event_type: e.event_type.clone(),
            })
            .collect()
    }
}

/// Human-readable name for a set-piece code.
pub fn set_piece_name(code: &str) -> String {
    match code {
        "O" => "Open Play".to_string(),
        "K" => "Kickoff".to_string(),
        "F" => "Free Kick".to_string(),
        "C" => "Corner".to_string(),
        "T" => "Throw-in".to_string(),
        "G" => "Goal Kick".to_string(),
        "D" => "Drop Ball".to_string(),
        other => other.to_string(),
    }
}

/// A ball position sampled from a play's events, labeled with the event type.
#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryPoint {
    pub x: f64,
    pub y: f64,
    pub event_type: String,
}

/// Display-ready summary of one play.
#[derive(Debug, Serialize)]
pub struct PlayDescriptor {
    pub index: usize,
    pub game_id: i64,
    pub play_id: i64,
    pub team_name: String,
    pub period: i64,
    pub set_piece_type: String,
    pub num_events: usize,
    /// Seconds, rounded to one decimal.
    pub duration: f64,
    pub description: String,
    pub trajectory: Vec<TrajectoryPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

/// One-line play summary ending in the event-type chain, capped at 5 events.
pub fn describe_play(play: &Play) -> String {
    const MAX_SHOWN: usize = 5;
    let mut types: Vec<String> = play
        .events
        .iter()
        .take(MAX_SHOWN)
        .map(|e| e.event_type.clone())
        .collect();
    if play.events.len() > MAX_SHOWN {
        types.push(format!("...+{}", play.events.len() - MAX_SHOWN));
    }
    format!(
        "Game {} | {} | Period {} | {} | {} events | {:.1}s | [{}]",
        play.game_id,
        play.team_name,
        play.period,
        play.set_piece_type,
        play.events.len(),
        play.duration(),
        types.join(" -> ")
    )
}

#[derive(Debug, Serialize)]
pub struct PlaySimilarity {
    pub total_plays: usize,
    pub query: PlayDescriptor,
    pub similar: Vec<PlayDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct GoalSimilarity {
    pub total_goals: usize,
    pub query: GoalDescriptor,
    pub similar: Vec<GoalDescriptor>,
}

/// Loaded play corpus with latent vectors and a lazily built goal index.
#[derive(Debug)]
pub struct PlayContext {
    plays: Vec<Play>,
    latents: Vec<Vec<f64>>,
    goal_index: OnceLock<GoalIndex>,
}

impl PlayContext {
    /// Load both artifacts. A missing plays file yields an empty context (the
    /// football feature is simply absent); present-but-inconsistent data is a
    /// hard error.
    pub fn load(plays_path: &Path, latents_path: &Path) -> Result<Self, PlayDataError> {
        if !plays_path.exists() {
            log::warn!(
                "Play data not found at {}, football queries disabled",
                plays_path.display()
            );
            return Ok(Self::empty());
        }

        let plays: Vec<Play> = read_json(plays_path)?;
        let latents: Vec<Vec<f64>> = read_json(latents_path)?;

        if latents.len() != plays.len() {
            return Err(PlayDataError::ShapeMismatch {
                rows: latents.len(),
                plays: plays.len(),
            });
        }
        if let Some(first) = latents.first() {
            let dim = first.len();
            if latents.iter().any(|row| row.len() != dim) {
                return Err(PlayDataError::Ragged);
            }
        }

        log::info!("Loaded {} plays with latent vectors", plays.len());
        Ok(Self {
            plays,
            latents,
            goal_index: OnceLock::new(),
        })
    }

    pub fn empty() -> Self {
        Self {
            plays: Vec::new(),
            latents: Vec::new(),
            goal_index: OnceLock::new(),
        }
    }

    pub fn total_plays(&self) -> usize {
        self.plays.len()
    }

    pub fn plays(&self) -> &[Play] {
        &self.plays
    }

    /// Goal index, built on first use.
    pub fn goal_index(&self) -> &GoalIndex {
        self.goal_index.get_or_init(|| GoalIndex::build(&self.plays))
    }

    pub fn play_descriptor(&self, index: usize, similarity: Option<f64>) -> PlayDescriptor {
        let play = &self.plays[index];
        PlayDescriptor {
            index,
            game_id: play.game_id,
            play_id: play.play_id,
            team_name: play.team_name.clone(),
            period: play.period,
            set_piece_type: play.set_piece_type.clone(),
            num_events: play.num_events(),
            duration: (play.duration() * 10.0).round() / 10.0,
            description: describe_play(play),
            trajectory: play.trajectory(),
            similarity: similarity.map(|s| (s * 10_000.0).round() / 10_000.0),
        }
    }

    fn check_index(&self, index: usize) -> Result<(), PlayQueryError> {
        if index >= self.plays.len() {
            return Err(PlayQueryError::InvalidIndex {
                index,
                total: self.plays.len(),
            });
        }
        Ok(())
    }

    /// Top-k plays most similar to the play at `index`, excluding itself.
    pub fn rank_similar_plays(
        &self,
        index: usize,
        k: usize,
    ) -> Result<PlaySimilarity, PlayQueryError> {
        self.check_index(index)?;

        let corpus: Vec<(usize, &[f64])> = self
            .latents
            .iter()
            .enumerate()
            .map(|(i, row)| (i, row.as_slice()))
            .collect();

        let ranked = rank_top_k(&self.latents[index], &corpus, k, Some(&index));

        Ok(PlaySimilarity {
            total_plays: self.plays.len(),
            query: self.play_descriptor(index, None),
            similar: ranked
                .into_iter()
                .map(|m| self.play_descriptor(m.id, Some(m.score)))
                .collect(),
        })
    }

    /// Top-k goals most similar to the goal scored in the play at `index`.
    /// Only goal-scoring plays participate in the ranking.
    pub fn rank_similar_goals(
        &self,
        index: usize,
        k: usize,
    ) -> Result<GoalSimilarity, PlayQueryError> {
        self.check_index(index)?;

        let goal_index = self.goal_index();
        let query_goal = goal_index
            .find_by_play_index(index)
            .ok_or(PlayQueryError::NoGoalAtIndex(index))?;

        let corpus: Vec<(usize, &[f64])> = goal_index
            .all()
            .iter()
            .map(|g| (g.play_index, self.latents[g.play_index].as_slice()))
            .collect();

        let ranked = rank_top_k(&self.latents[index], &corpus, k, Some(&index));

        Ok(GoalSimilarity {
            total_goals: goal_index.len(),
            query: self.goal_descriptor(query_goal, None),
            similar: ranked
                .into_iter()
                .filter_map(|m| {
                    goal_index
                        .find_by_play_index(m.id)
                        .map(|g| self.goal_descriptor(g, Some(m.score)))
                })
                .collect(),
        })
    }

    pub fn goal_descriptor(
        &self,
        goal: &goals::GoalRecord,
        similarity: Option<f64>,
    ) -> GoalDescriptor {
        goals::GoalDescriptor::new(goal, &self.plays[goal.play_index], similarity)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PlayDataError> {
    let contents = std::fs::read_to_string(path).map_err(|source| PlayDataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| PlayDataError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str) -> PlayEvent {
        PlayEvent {
            ball_x: 0.0,
            ball_y: 0.0,
            event_type: event_type.to_string(),
            shot_outcome: None,
            clock: String::new(),
        }
    }

    fn goal_event() -> PlayEvent {
        PlayEvent {
            ball_x: 0.0,
            ball_y: 0.0,
            event_type: "SH".to_string(),
            shot_outcome: Some("G".to_string()),
            clock: "23:45".to_string(),
        }
    }

    fn play(game_id: i64, team: &str, events: Vec<PlayEvent>) -> Play {
        Play {
            game_id,
            play_id: 0,
            team_id: 0,
            team_name: team.to_string(),
            events,
            start_time: 0.0,
            end_time: 10.0,
            period: 1,
            set_piece_type: "O".to_string(),
        }
    }

    fn context(plays: Vec<Play>, latents: Vec<Vec<f64>>) -> PlayContext {
        PlayContext {
            plays,
            latents,
            goal_index: OnceLock::new(),
        }
    }

    #[test]
    fn test_describe_play_caps_events() {
        let p = play(
            1,
            "A",
            vec![
                event("PA"),
                event("PA"),
                event("CR"),
                event("PA"),
                event("PA"),
                event("PA"),
                event("SH"),
            ],
        );
        assert_eq!(
            describe_play(&p),
            "Game 1 | A | Period 1 | O | 7 events | 10.0s | [PA -> PA -> CR -> PA -> PA -> ...+2]"
        );
    }

    #[test]
    fn test_describe_play_empty() {
        let p = play(1, "A", vec![]);
        assert_eq!(
            describe_play(&p),
            "Game 1 | A | Period 1 | O | 0 events | 10.0s | []"
        );
    }

    #[test]
    fn test_set_piece_names() {
        assert_eq!(set_piece_name("O"), "Open Play");
        assert_eq!(set_piece_name("C"), "Corner");
        assert_eq!(set_piece_name("X"), "X");
    }

    #[test]
    fn test_first_goal_event_ignores_misses() {
        let mut miss = event("SH");
        miss.shot_outcome = Some("S".to_string());
        let p = play(1, "A", vec![miss, goal_event()]);
        let first = p.first_goal_event().unwrap();
        assert_eq!(first.shot_outcome.as_deref(), Some("G"));
        assert_eq!(first.clock, "23:45");
    }

    #[test]
    fn test_invalid_index() {
        let ctx = context(vec![play(1, "A", vec![])], vec![vec![1.0]]);
        let err = ctx.rank_similar_plays(5, 3).unwrap_err();
        assert_eq!(err, PlayQueryError::InvalidIndex { index: 5, total: 1 });
    }

    #[test]
    fn test_rank_similar_plays_excludes_query() {
        let ctx = context(
            vec![
                play(1, "A", vec![]),
                play(1, "B", vec![]),
                play(2, "C", vec![]),
            ],
            vec![
                vec![1.0, 0.0],
                vec![0.9, 0.1],
                vec![0.0, 1.0],
            ],
        );
        let result = ctx.rank_similar_plays(0, 5).unwrap();
        assert_eq!(result.query.index, 0);
        let indices: Vec<usize> = result.similar.iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(result.similar[0].similarity.unwrap() > result.similar[1].similarity.unwrap());
    }

    #[test]
    fn test_rank_similar_goals_requires_goal() {
        let ctx = context(
            vec![play(1, "A", vec![event("PA")])],
            vec![vec![1.0]],
        );
        let err = ctx.rank_similar_goals(0, 3).unwrap_err();
        assert_eq!(err, PlayQueryError::NoGoalAtIndex(0));
    }

    #[test]
    fn test_rank_similar_goals_only_goals_in_corpus() {
        let ctx = context(
            vec![
                play(1, "A", vec![goal_event()]),
                play(1, "B", vec![event("PA")]),
                play(2, "C", vec![goal_event()]),
            ],
            vec![
                vec![1.0, 0.0],
                vec![1.0, 0.01],
                vec![0.8, 0.2],
            ],
        );
        let result = ctx.rank_similar_goals(0, 5).unwrap();
        assert_eq!(result.total_goals, 2);
        // Play 1 is nearer in latent space but is not a goal.
        assert_eq!(result.similar.len(), 1);
        assert_eq!(result.similar[0].play_index, 2);
    }

    #[test]
    fn test_load_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let plays_path = dir.path().join("plays.json");
        let latents_path = dir.path().join("latents.json");
        std::fs::write(
            &plays_path,
            r#"[{"game_id":1,"play_id":1,"team_id":1,"team_name":"A","events":[],"start_time":0,"end_time":1,"period":1,"set_piece_type":"O"}]"#,
        )
        .unwrap();
        std::fs::write(&latents_path, "[[1.0,0.0],[0.0,1.0]]").unwrap();

        let err = PlayContext::load(&plays_path, &latents_path).unwrap_err();
        assert!(matches!(
            err,
            PlayDataError::ShapeMismatch { rows: 2, plays: 1 }
        ));
    }

    #[test]
    fn test_load_ragged_latents() {
        let dir = tempfile::tempdir().unwrap();
        let plays_path = dir.path().join("plays.json");
        let latents_path = dir.path().join("latents.json");
        std::fs::write(
            &plays_path,
            r#"[{"team_name":"A"},{"team_name":"B"}]"#,
        )
        .unwrap();
        std::fs::write(&latents_path, "[[1.0,0.0],[0.0]]").unwrap();

        let err = PlayContext::load(&plays_path, &latents_path).unwrap_err();
        assert!(matches!(err, PlayDataError::Ragged));
    }

    #[test]
    fn test_load_missing_plays_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = PlayContext::load(
            &dir.path().join("absent.json"),
            &dir.path().join("latents.json"),
        )
        .unwrap();
        assert_eq!(ctx.total_plays(), 0);
        assert!(ctx.goal_index().is_empty());
    }

    #[test]
    fn test_goal_index_built_once() {
        let ctx = context(vec![play(1, "A", vec![goal_event()])], vec![vec![1.0]]);
        let first = ctx.goal_index() as *const GoalIndex;
        let second = ctx.goal_index() as *const GoalIndex;
        assert_eq!(first, second);
    }
}
