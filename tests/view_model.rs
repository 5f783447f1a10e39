use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;

use player_similarity::compare_fetch::ComparisonSource;
use player_similarity::error::{AnalysisError, ComparisonError, ImageResolutionError};
use player_similarity::fingerprint_fetch::{Analysis, AnalysisSource};
use player_similarity::image_resolver::PortraitSource;
use player_similarity::positions::Position;
use player_similarity::provider::Sources;
use player_similarity::state::{
    CandidateSeed, ComparisonEntry, ComparisonTable, DetailPhase, Fingerprint, Phase, Portrait,
    SimilarityState,
};
use player_similarity::view_model::SimilarityViewModel;

const WAIT: Duration = Duration::from_secs(5);

/// In-memory stand-in for all three services.
#[derive(Default)]
struct FakeBackend {
    similar: Vec<(&'static str, f64)>,
    fail_analysis: bool,
    failing_portraits: HashSet<&'static str>,
    failing_comparisons: HashSet<&'static str>,
    teams: HashMap<&'static str, &'static str>,
    portrait_delay: Option<(&'static str, Duration)>,
    analysis_calls: AtomicUsize,
    comparison_calls: AtomicUsize,
    portrait_calls: AtomicUsize,
}

impl FakeBackend {
    fn haaland() -> Self {
        Self {
            similar: vec![
                ("Harry Kane", 0.91),
                ("Victor Osimhen", 0.85),
                ("Alexander Isak", 0.80),
            ],
            ..Self::default()
        }
    }
}

impl AnalysisSource for FakeBackend {
    fn fetch_analysis(&self, _position: &str, _player_name: &str) -> Result<Analysis, AnalysisError> {
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_analysis {
            return Err(AnalysisError::Service {
                status: 500,
                message: "boom".to_string(),
            });
        }
        Ok(Analysis {
            fingerprint: Fingerprint::from_pairs([("Pace", 1.23), ("Vision", -0.5)]),
            similar: self
                .similar
                .iter()
                .map(|(player, similarity)| CandidateSeed {
                    player: player.to_string(),
                    similarity: *similarity,
                })
                .collect(),
        })
    }

    fn fetch_players(&self, _position: &str) -> Result<Vec<String>, AnalysisError> {
        Ok(vec!["Erling Haaland".to_string(), "Harry Kane".to_string()])
    }
}

impl ComparisonSource for FakeBackend {
    fn fetch_comparison(
        &self,
        _position: &str,
        _target: &str,
        candidates: &[String],
    ) -> Result<ComparisonTable, ComparisonError> {
        self.comparison_calls.fetch_add(1, Ordering::SeqCst);
        if candidates
            .iter()
            .any(|c| self.failing_comparisons.contains(c.as_str()))
        {
            return Err(ComparisonError::Service {
                status: 500,
                message: "comparison crashed".to_string(),
            });
        }
        Ok(candidates
            .iter()
            .map(|c| {
                (
                    c.clone(),
                    vec![
                        ComparisonEntry::new("Non-Penalty Goals", 97.3, 88.1),
                        ComparisonEntry::new("Shots on Target", 91.0, 93.5),
                    ],
                )
            })
            .collect())
    }
}

impl PortraitSource for FakeBackend {
    fn try_resolve(&self, name: &str) -> Result<Portrait, ImageResolutionError> {
        self.portrait_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((slow, delay)) = self.portrait_delay {
            if slow == name {
                std::thread::sleep(delay);
            }
        }
        if self.failing_portraits.contains(name) {
            return Err(ImageResolutionError::Search(anyhow!("lookup timed out")));
        }
        Ok(Portrait {
            image_url: Some(format!(
                "https://img.example/{}.jpg",
                name.to_lowercase().replace(' ', "_")
            )),
            team: self.teams.get(name).map(|t| t.to_string()),
        })
    }
}

fn spawn(backend: FakeBackend) -> (SimilarityViewModel, Arc<FakeBackend>) {
    let backend = Arc::new(backend);
    let sources = Sources {
        analysis: backend.clone(),
        comparison: backend.clone(),
        portraits: backend.clone(),
    };
    let (vm, _handle) = SimilarityViewModel::spawn(sources, 4);
    (vm, backend)
}

fn analyse(vm: &mut SimilarityViewModel) {
    vm.request_analysis(Position::CentralForward, "Erling Haaland");
    assert!(vm.wait_until(WAIT, |s| s.phase == Phase::Ready));
}

fn comparison_settled(state: &SimilarityState) -> bool {
    matches!(
        state.detail_phase(),
        DetailPhase::ComparisonReady | DetailPhase::ComparisonUnavailable
    )
}

#[test]
fn analysis_produces_ordered_candidates_with_portraits() {
    let (mut vm, backend) = spawn(FakeBackend::haaland());
    analyse(&mut vm);

    let state = vm.state();
    assert_eq!(state.analysis_error, None);
    assert!(state.images_ready);
    let names: Vec<&str> = state.candidates.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Harry Kane", "Victor Osimhen", "Alexander Isak"]);
    assert!(state.candidates.iter().all(|c| c.image_url.is_some()));
    assert_eq!(state.fingerprint.get("Pace"), Some(1.23));
    assert_eq!(backend.analysis_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn target_portrait_arrives_without_blocking_candidates() {
    let backend = FakeBackend {
        portrait_delay: Some(("Erling Haaland", Duration::from_millis(300))),
        teams: HashMap::from([("Erling Haaland", "Manchester City")]),
        ..FakeBackend::haaland()
    };
    let (mut vm, _backend) = spawn(backend);
    analyse(&mut vm);
    assert!(vm.state().target_portrait.is_none());

    assert!(vm.wait_until(WAIT, |s| s.target_portrait.is_some()));
    let state = vm.state();
    assert_eq!(
        state
            .target_portrait
            .as_ref()
            .and_then(|p| p.image_url.as_deref()),
        Some("https://img.example/erling_haaland.jpg")
    );
    assert_eq!(state.team_for("Erling Haaland"), Some("Manchester City"));
}

#[test]
fn slow_candidate_portrait_holds_ready() {
    let backend = FakeBackend {
        portrait_delay: Some(("Harry Kane", Duration::from_millis(300))),
        ..FakeBackend::haaland()
    };
    let (mut vm, _backend) = spawn(backend);
    vm.request_analysis(Position::CentralForward, "Erling Haaland");

    assert!(vm.wait_until(WAIT, |s| s.target_portrait.is_some()));
    assert_eq!(vm.state().phase, Phase::Loading);
    assert!(!vm.state().images_ready);

    assert!(vm.wait_until(WAIT, |s| s.phase == Phase::Ready));
    assert!(
        vm.state()
            .candidate("Harry Kane")
            .is_some_and(|c| c.image_url.is_some())
    );
}

#[test]
fn failed_portrait_leaves_placeholder() {
    let backend = FakeBackend {
        failing_portraits: HashSet::from(["Victor Osimhen"]),
        ..FakeBackend::haaland()
    };
    let (mut vm, _backend) = spawn(backend);
    analyse(&mut vm);

    let state = vm.state();
    assert_eq!(state.analysis_error, None);
    assert_eq!(state.candidates.len(), 3);
    assert!(state.candidate("Harry Kane").is_some_and(|c| c.image_url.is_some()));
    assert!(state.candidate("Victor Osimhen").is_some_and(|c| c.image_url.is_none()));
}

#[test]
fn teams_from_portraits_are_recorded() {
    let backend = FakeBackend {
        teams: HashMap::from([("Harry Kane", "Bayern Munich")]),
        ..FakeBackend::haaland()
    };
    let (mut vm, _backend) = spawn(backend);
    analyse(&mut vm);
    assert_eq!(vm.state().team_for("Harry Kane"), Some("Bayern Munich"));
    assert_eq!(vm.state().team_for("Alexander Isak"), None);
}

#[test]
fn analysis_failure_is_flagged() {
    let backend = FakeBackend {
        fail_analysis: true,
        ..FakeBackend::haaland()
    };
    let (mut vm, backend) = spawn(backend);
    analyse(&mut vm);

    let state = vm.state();
    assert!(state.candidates.is_empty());
    assert!(
        state
            .analysis_error
            .as_deref()
            .is_some_and(|e| e.contains("boom"))
    );
    assert_eq!(backend.portrait_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn repeated_query_is_not_refetched() {
    let (mut vm, backend) = spawn(FakeBackend::haaland());
    analyse(&mut vm);
    vm.request_analysis(Position::CentralForward, "Erling Haaland");
    assert_eq!(vm.state().phase, Phase::Ready);
    assert!(!vm.wait_until(Duration::from_millis(200), |s| s.phase == Phase::Loading));
    assert_eq!(backend.analysis_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn comparison_is_fetched_once_per_candidate() {
    let (mut vm, backend) = spawn(FakeBackend::haaland());
    analyse(&mut vm);

    vm.select_candidate("Harry Kane");
    assert!(vm.wait_until(WAIT, comparison_settled));
    assert_eq!(vm.state().detail_phase(), DetailPhase::ComparisonReady);
    let entries = vm.state().selected_comparison().expect("comparison present");
    assert_eq!(entries[0].difference, 9.2);
    assert_eq!(entries[1].difference, -2.5);

    // Close, reopen: served from the table.
    vm.select_candidate("Harry Kane");
    assert_eq!(vm.state().detail_phase(), DetailPhase::NoSelection);
    vm.select_candidate("Harry Kane");
    assert_eq!(vm.state().detail_phase(), DetailPhase::ComparisonReady);
    assert_eq!(backend.comparison_calls.load(Ordering::SeqCst), 1);

    vm.select_candidate("Alexander Isak");
    assert!(vm.wait_until(WAIT, comparison_settled));
    assert_eq!(backend.comparison_calls.load(Ordering::SeqCst), 2);
    assert_eq!(vm.state().comparisons.len(), 2);
}

#[test]
fn comparison_failure_is_contained_and_retryable() {
    let backend = FakeBackend {
        failing_comparisons: HashSet::from(["Victor Osimhen"]),
        ..FakeBackend::haaland()
    };
    let (mut vm, backend) = spawn(backend);
    analyse(&mut vm);

    vm.select_candidate("Victor Osimhen");
    assert!(vm.wait_until(WAIT, comparison_settled));
    let state = vm.state();
    assert_eq!(state.detail_phase(), DetailPhase::ComparisonUnavailable);
    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.candidates.len(), 3);

    vm.clear_selection();
    vm.select_candidate("Victor Osimhen");
    assert!(vm.wait_until(WAIT, |s| {
        s.detail_phase() == DetailPhase::ComparisonUnavailable
            && s.comparisons_pending.is_empty()
    }));
    assert_eq!(backend.comparison_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn player_list_loads_for_position() {
    let (mut vm, _backend) = spawn(FakeBackend::haaland());
    vm.request_players(Position::CentralForward);
    assert!(vm.wait_until(WAIT, |s| !s.players_loading));
    assert_eq!(vm.state().players.len(), 2);
}
