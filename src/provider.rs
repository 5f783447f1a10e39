use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use crate::compare_fetch::{ComparisonClient, ComparisonSource};
use crate::config::Settings;
use crate::fingerprint_fetch::{AnalysisSource, FingerprintClient};
use crate::image_resolver::{ImageResolver, PortraitSource, resolve_all};
use crate::positions::Position;
use crate::state::{Delta, ProviderCommand};

/// The three remote collaborators the provider talks to.
#[derive(Clone)]
pub struct Sources {
    pub analysis: Arc<dyn AnalysisSource>,
    pub comparison: Arc<dyn ComparisonSource>,
    pub portraits: Arc<dyn PortraitSource>,
}

impl Sources {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            analysis: Arc::new(FingerprintClient::from_settings(settings)?),
            comparison: Arc::new(ComparisonClient::from_settings(settings)?),
            portraits: Arc::new(ImageResolver::from_settings(settings)?),
        })
    }
}

/// Runs until every command sender is dropped. Each command becomes a job on a bounded rayon
/// pool; results come back on `tx` tagged with the generation they were issued for.
pub fn spawn_provider(
    sources: Sources,
    parallelism: usize,
    tx: Sender<Delta>,
    cmd_rx: Receiver<ProviderCommand>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let pool = build_fetch_pool(parallelism).map(Arc::new);
        if pool.is_none() {
            let _ = tx.send(Delta::Log(
                "[WARN] Fetch pool unavailable, falling back to threads".to_string(),
            ));
        }

        for cmd in cmd_rx {
            let tx = tx.clone();
            let sources = sources.clone();
            match cmd {
                ProviderCommand::FetchAnalysis {
                    generation,
                    position,
                    player,
                } => {
                    let job_pool = pool.clone();
                    spawn_job(&pool, move || {
                        run_analysis(&sources, &job_pool, generation, position, &player, &tx);
                    });
                }
                ProviderCommand::FetchComparison {
                    generation,
                    position,
                    target,
                    candidate,
                } => {
                    spawn_job(&pool, move || {
                        let names = [candidate.clone()];
                        let delta = match sources.comparison.fetch_comparison(
                            position.code(),
                            &target,
                            &names,
                        ) {
                            Ok(table) => Delta::ComparisonSucceeded {
                                generation,
                                candidate,
                                table,
                            },
                            Err(err) => Delta::ComparisonFailed {
                                generation,
                                candidate,
                                error: err.to_string(),
                            },
                        };
                        let _ = tx.send(delta);
                    });
                }
                ProviderCommand::FetchPlayers { position } => {
                    spawn_job(&pool, move || {
                        let delta = match sources.analysis.fetch_players(position.code()) {
                            Ok(players) => Delta::PlayersListed { position, players },
                            Err(err) => Delta::PlayersFailed {
                                position,
                                error: err.to_string(),
                            },
                        };
                        let _ = tx.send(delta);
                    });
                }
            }
        }
    })
}

fn run_analysis(
    sources: &Sources,
    pool: &Option<Arc<rayon::ThreadPool>>,
    generation: u64,
    position: Position,
    player: &str,
    tx: &Sender<Delta>,
) {
    let analysis = match sources.analysis.fetch_analysis(position.code(), player) {
        Ok(analysis) => analysis,
        Err(err) => {
            let _ = tx.send(Delta::AnalysisFailed {
                generation,
                error: err.to_string(),
            });
            return;
        }
    };

    let names: Vec<String> = analysis.similar.iter().map(|s| s.player.clone()).collect();
    let _ = tx.send(Delta::AnalysisSucceeded {
        generation,
        fingerprint: analysis.fingerprint,
        similar: analysis.similar,
    });

    // The target's portrait lands on its own and does not hold up the candidate batch.
    {
        let tx = tx.clone();
        let portraits = sources.portraits.clone();
        let name = player.trim().to_string();
        spawn_job(pool, move || {
            let portrait = match portraits.try_resolve(&name) {
                Ok(portrait) => portrait,
                Err(err) => {
                    let _ = tx.send(Delta::Log(format!(
                        "[WARN] {name} portrait lookup failed: {err}"
                    )));
                    Default::default()
                }
            };
            let _ = tx.send(Delta::TargetPortraitResolved {
                generation,
                name,
                portrait,
            });
        });
    }

    let batch = with_fetch_pool(pool, || resolve_all(sources.portraits.as_ref(), &names));
    for err in batch.errors {
        let _ = tx.send(Delta::Log(format!("[WARN] {err}")));
    }
    let _ = tx.send(Delta::ImagesResolved {
        generation,
        portraits: batch.portraits,
    });
}

fn build_fetch_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|idx| format!("similarity-fetch-{idx}"))
        .build()
        .ok()
}

fn spawn_job(pool: &Option<Arc<rayon::ThreadPool>>, job: impl FnOnce() + Send + 'static) {
    if let Some(pool) = pool.as_ref() {
        pool.spawn(job);
    } else {
        thread::spawn(job);
    }
}

fn with_fetch_pool<T>(pool: &Option<Arc<rayon::ThreadPool>>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}
