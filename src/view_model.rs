use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::positions::Position;
use crate::provider::{Sources, spawn_provider};
use crate::state::{Delta, ProviderCommand, SimilarityState, apply_delta};

/// Owns the similarity state. Every change, local or remote, goes through `apply_delta` on the
/// owning thread; the presentation layer reads `state()`.
pub struct SimilarityViewModel {
    state: SimilarityState,
    cmd_tx: Sender<ProviderCommand>,
    rx: Receiver<Delta>,
}

impl SimilarityViewModel {
    pub fn new(cmd_tx: Sender<ProviderCommand>, rx: Receiver<Delta>) -> Self {
        Self {
            state: SimilarityState::new(),
            cmd_tx,
            rx,
        }
    }

    /// Wires a view model to a freshly spawned provider thread.
    pub fn spawn(sources: Sources, parallelism: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let handle = spawn_provider(sources, parallelism, tx, cmd_rx);
        (Self::new(cmd_tx, rx), handle)
    }

    pub fn state(&self) -> &SimilarityState {
        &self.state
    }

    pub fn request_analysis(&mut self, position: Position, player: impl Into<String>) {
        self.apply(Delta::AnalysisRequested {
            position,
            player: player.into(),
        });
    }

    pub fn select_candidate(&mut self, name: impl Into<String>) {
        self.apply(Delta::CandidateSelected(name.into()));
    }

    pub fn clear_selection(&mut self) {
        self.apply(Delta::SelectionCleared);
    }

    pub fn request_players(&mut self, position: Position) {
        self.apply(Delta::PlayersRequested(position));
    }

    /// Applies everything the provider has delivered so far. Returns how many events landed.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(delta) = self.rx.try_recv() {
            self.apply(delta);
            applied += 1;
        }
        applied
    }

    /// Blocks until `done` holds or `timeout` passes, applying events as they arrive.
    pub fn wait_until(
        &mut self,
        timeout: Duration,
        done: impl Fn(&SimilarityState) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done(&self.state) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(delta) => self.apply(delta),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return done(&self.state);
                }
            }
        }
    }

    fn apply(&mut self, delta: Delta) {
        for cmd in apply_delta(&mut self.state, delta) {
            if self.cmd_tx.send(cmd).is_err() {
                self.state.push_log("[WARN] Provider unavailable, request dropped");
            }
        }
    }
}
