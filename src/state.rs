use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Local;

use crate::positions::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintEntry {
    pub attribute: String,
    pub weighted_z_score: f64,
}

/// Attribute profile of the target player, in the order the analysis service listed it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fingerprint {
    entries: Vec<FingerprintEntry>,
}

impl Fingerprint {
    /// Builds a fingerprint keeping first-seen order. A repeated attribute overwrites the earlier
    /// value in place.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut entries: Vec<FingerprintEntry> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for (attribute, score) in pairs {
            let attribute = attribute.into();
            if let Some(&idx) = index.get(&attribute) {
                entries[idx].weighted_z_score = score;
                continue;
            }
            index.insert(attribute.clone(), entries.len());
            entries.push(FingerprintEntry {
                attribute,
                weighted_z_score: score,
            });
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[FingerprintEntry] {
        &self.entries
    }

    pub fn get(&self, attribute: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.attribute == attribute)
            .map(|e| e.weighted_z_score)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.attribute.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSeed {
    pub player: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSummary {
    pub name: String,
    similarity: f64,
    pub image_url: Option<String>,
}

impl CandidateSummary {
    pub fn from_seed(seed: CandidateSeed) -> Self {
        Self {
            name: seed.player,
            similarity: seed.similarity,
            image_url: None,
        }
    }

    pub fn similarity(&self) -> f64 {
        self.similarity
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Portrait {
    pub image_url: Option<String>,
    pub team: Option<String>,
}

impl Portrait {
    /// Drops blank values so callers only ever see `Some(non-empty)` or `None`.
    pub fn normalized(self) -> Self {
        Self {
            image_url: non_blank(self.image_url),
            team: non_blank(self.team),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonEntry {
    pub stat: String,
    pub target_score: f64,
    pub similar_score: f64,
    /// `target_score - similar_score`; positive means the target is stronger.
    pub difference: f64,
}

impl ComparisonEntry {
    pub fn new(stat: impl Into<String>, target_score: f64, similar_score: f64) -> Self {
        Self {
            stat: stat.into(),
            target_score,
            similar_score,
            difference: round1(target_score - similar_score),
        }
    }

    pub fn target_is_better(&self) -> bool {
        self.difference > 0.0
    }
}

pub type ComparisonTable = HashMap<String, Vec<ComparisonEntry>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailPhase {
    NoSelection,
    ComparisonLoading,
    ComparisonReady,
    ComparisonUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisQuery {
    pub position: Position,
    pub player: String,
}

#[derive(Debug, Clone)]
pub struct SimilarityState {
    /// Bumped on every new (player, position); results tagged with an older value are dropped.
    pub generation: u64,
    pub query: Option<AnalysisQuery>,
    pub phase: Phase,
    pub analysis_error: Option<String>,
    pub fingerprint: Fingerprint,
    pub candidates: Vec<CandidateSummary>,
    pub images_ready: bool,
    /// `None` while the target's own lookup is outstanding.
    pub target_portrait: Option<Portrait>,
    pub teams: HashMap<String, String>,
    pub comparisons: ComparisonTable,
    pub comparisons_pending: HashSet<String>,
    pub comparison_errors: HashMap<String, String>,
    pub selected: Option<String>,
    pub players_position: Option<Position>,
    pub players: Vec<String>,
    pub players_loading: bool,
    pub players_error: Option<String>,
    pub updated_at: Option<String>,
    pub logs: VecDeque<String>,
}

impl Default for SimilarityState {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityState {
    pub fn new() -> Self {
        Self {
            generation: 0,
            query: None,
            phase: Phase::Idle,
            analysis_error: None,
            fingerprint: Fingerprint::default(),
            candidates: Vec::new(),
            images_ready: false,
            target_portrait: None,
            teams: HashMap::with_capacity(32),
            comparisons: HashMap::with_capacity(8),
            comparisons_pending: HashSet::new(),
            comparison_errors: HashMap::new(),
            selected: None,
            players_position: None,
            players: Vec::new(),
            players_loading: false,
            players_error: None,
            updated_at: None,
            logs: VecDeque::with_capacity(200),
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        const MAX_LOGS: usize = 200;
        let stamp = Local::now().format("%H:%M:%S");
        self.logs.push_back(format!("{stamp} {}", msg.into()));
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn candidate(&self, name: &str) -> Option<&CandidateSummary> {
        self.candidates.iter().find(|c| c.name == name)
    }

    pub fn team_for(&self, name: &str) -> Option<&str> {
        self.teams.get(name).map(String::as_str)
    }

    pub fn detail_phase(&self) -> DetailPhase {
        let Some(name) = self.selected.as_deref() else {
            return DetailPhase::NoSelection;
        };
        if self.comparisons.contains_key(name) {
            DetailPhase::ComparisonReady
        } else if self.comparison_errors.contains_key(name) {
            DetailPhase::ComparisonUnavailable
        } else {
            DetailPhase::ComparisonLoading
        }
    }

    pub fn selected_comparison(&self) -> Option<&[ComparisonEntry]> {
        let name = self.selected.as_deref()?;
        self.comparisons.get(name).map(Vec::as_slice)
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    fn reset_for_query(&mut self, query: AnalysisQuery) {
        self.generation += 1;
        self.query = Some(query);
        self.phase = Phase::Loading;
        self.analysis_error = None;
        self.fingerprint = Fingerprint::default();
        self.candidates.clear();
        self.images_ready = false;
        self.target_portrait = None;
        self.comparisons.clear();
        self.comparisons_pending.clear();
        self.comparison_errors.clear();
        self.selected = None;
    }
}

#[derive(Debug, Clone)]
pub enum Delta {
    AnalysisRequested {
        position: Position,
        player: String,
    },
    AnalysisSucceeded {
        generation: u64,
        fingerprint: Fingerprint,
        similar: Vec<CandidateSeed>,
    },
    AnalysisFailed {
        generation: u64,
        error: String,
    },
    ImagesResolved {
        generation: u64,
        portraits: Vec<(String, Portrait)>,
    },
    TargetPortraitResolved {
        generation: u64,
        name: String,
        portrait: Portrait,
    },
    CandidateSelected(String),
    SelectionCleared,
    ComparisonSucceeded {
        generation: u64,
        candidate: String,
        table: ComparisonTable,
    },
    ComparisonFailed {
        generation: u64,
        candidate: String,
        error: String,
    },
    PlayersRequested(Position),
    PlayersListed {
        position: Position,
        players: Vec<String>,
    },
    PlayersFailed {
        position: Position,
        error: String,
    },
    Log(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCommand {
    FetchAnalysis {
        generation: u64,
        position: Position,
        player: String,
    },
    FetchComparison {
        generation: u64,
        position: Position,
        target: String,
        candidate: String,
    },
    FetchPlayers {
        position: Position,
    },
}

/// Applies one event and returns the fetches it calls for.
pub fn apply_delta(state: &mut SimilarityState, delta: Delta) -> Vec<ProviderCommand> {
    match delta {
        Delta::AnalysisRequested { position, player } => {
            let query = AnalysisQuery {
                position,
                player: player.trim().to_string(),
            };
            let retry_after_failure = state.phase == Phase::Ready && state.analysis_error.is_some();
            if state.query.as_ref() == Some(&query) && !retry_after_failure {
                return Vec::new();
            }
            state.reset_for_query(query.clone());
            state.push_log(format!(
                "[INFO] Analysing {} as {}",
                query.player,
                query.position.label()
            ));
            vec![ProviderCommand::FetchAnalysis {
                generation: state.generation,
                position: query.position,
                player: query.player,
            }]
        }
        Delta::AnalysisSucceeded {
            generation,
            fingerprint,
            similar,
        } => {
            if !state.is_current(generation) {
                state.push_log("[INFO] Dropped stale analysis result");
                return Vec::new();
            }
            state.fingerprint = fingerprint;
            state.candidates = similar.into_iter().map(CandidateSummary::from_seed).collect();
            state.push_log(format!(
                "[INFO] {} similar players, {} fingerprint attributes",
                state.candidates.len(),
                state.fingerprint.len()
            ));
            Vec::new()
        }
        Delta::AnalysisFailed { generation, error } => {
            if !state.is_current(generation) {
                state.push_log("[INFO] Dropped stale analysis failure");
                return Vec::new();
            }
            state.fingerprint = Fingerprint::default();
            state.candidates.clear();
            state.images_ready = false;
            state.phase = Phase::Ready;
            state.push_log(format!("[WARN] Analysis failed: {error}"));
            state.analysis_error = Some(error);
            Vec::new()
        }
        Delta::ImagesResolved {
            generation,
            portraits,
        } => {
            if !state.is_current(generation) {
                return Vec::new();
            }
            let mut resolved = 0usize;
            for (name, portrait) in portraits {
                let portrait = portrait.normalized();
                if let Some(team) = portrait.team {
                    state.teams.insert(name.clone(), team);
                }
                for candidate in state.candidates.iter_mut().filter(|c| c.name == name) {
                    if candidate.image_url.is_none() && portrait.image_url.is_some() {
                        candidate.image_url = portrait.image_url.clone();
                        resolved += 1;
                    }
                }
            }
            state.images_ready = true;
            state.phase = Phase::Ready;
            state.updated_at = Some(Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
            state.push_log(format!(
                "[INFO] Portraits resolved {resolved}/{}",
                state.candidates.len()
            ));
            Vec::new()
        }
        Delta::TargetPortraitResolved {
            generation,
            name,
            portrait,
        } => {
            if !state.is_current(generation) {
                return Vec::new();
            }
            let portrait = portrait.normalized();
            if let Some(team) = portrait.team.clone() {
                state.teams.insert(name, team);
            }
            state.target_portrait = Some(portrait);
            Vec::new()
        }
        Delta::CandidateSelected(name) => {
            if state.selected.as_deref() == Some(name.as_str()) {
                state.selected = None;
                return Vec::new();
            }
            let Some(query) = state.query.clone() else {
                return Vec::new();
            };
            if state.candidate(&name).is_none() {
                state.push_log(format!("[WARN] {name} is not a current candidate"));
                return Vec::new();
            }
            state.selected = Some(name.clone());
            if state.comparisons.contains_key(&name) || state.comparisons_pending.contains(&name)
            {
                return Vec::new();
            }
            state.comparison_errors.remove(&name);
            state.comparisons_pending.insert(name.clone());
            vec![ProviderCommand::FetchComparison {
                generation: state.generation,
                position: query.position,
                target: query.player,
                candidate: name,
            }]
        }
        Delta::SelectionCleared => {
            state.selected = None;
            Vec::new()
        }
        Delta::ComparisonSucceeded {
            generation,
            candidate,
            table,
        } => {
            if !state.is_current(generation) {
                state.push_log("[INFO] Dropped stale comparison result");
                return Vec::new();
            }
            state.comparisons_pending.remove(&candidate);
            for (name, entries) in table {
                if state.candidate(&name).is_some() {
                    state.comparison_errors.remove(&name);
                    state.comparisons.insert(name, entries);
                }
            }
            if !state.comparisons.contains_key(&candidate) {
                state.push_log(format!("[WARN] No comparison data returned for {candidate}"));
                state
                    .comparison_errors
                    .insert(candidate, "no comparison data returned".to_string());
            }
            Vec::new()
        }
        Delta::ComparisonFailed {
            generation,
            candidate,
            error,
        } => {
            if !state.is_current(generation) {
                return Vec::new();
            }
            state.comparisons_pending.remove(&candidate);
            state.push_log(format!("[WARN] Comparison with {candidate} failed: {error}"));
            state.comparison_errors.insert(candidate, error);
            Vec::new()
        }
        Delta::PlayersRequested(position) => {
            state.players_position = Some(position);
            state.players.clear();
            state.players_loading = true;
            state.players_error = None;
            vec![ProviderCommand::FetchPlayers { position }]
        }
        Delta::PlayersListed { position, players } => {
            if state.players_position != Some(position) {
                return Vec::new();
            }
            state.players = players;
            state.players_loading = false;
            Vec::new()
        }
        Delta::PlayersFailed { position, error } => {
            if state.players_position != Some(position) {
                return Vec::new();
            }
            state.players_loading = false;
            state.push_log(format!("[WARN] Player list for {} failed: {error}", position.label()));
            state.players_error = Some(error);
            Vec::new()
        }
        Delta::Log(msg) => {
            state.push_log(msg);
            Vec::new()
        }
    }
}

pub fn similarity_percent(similarity: f64) -> String {
    format!("{:.0}%", similarity * 100.0)
}

pub fn initials(name: &str) -> String {
    name.trim()
        .chars()
        .next()
        .map(|c| c.to_uppercase().to_string())
        .unwrap_or_else(|| "P".to_string())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
