//! Hot-swappable holder for the active tier-3 model, with a background task
//! that periodically attempts to load a freshly retrained candidate and
//! swap it in if it loads successfully.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use crate::models::decision_tree::JsonDecisionTreeModel;
use crate::models::heuristic::HeuristicModel;
use crate::models::AnomalyModel;

pub struct ModelManager {
    active: ArcSwap<Box<dyn AnomalyModel>>,
    retraining_interval: Duration,
}

impl ModelManager {
    pub fn new(retraining_interval: Duration) -> Self {
        Self {
            active: ArcSwap::from_pointee(Box::new(HeuristicModel) as Box<dyn AnomalyModel>),
            retraining_interval,
        }
    }

    pub fn get_active_model(&self) -> arc_swap::Guard<Arc<Box<dyn AnomalyModel>>> {
        self.active.load()
    }

    /// Attempts to load `candidate_path` as a [`JsonDecisionTreeModel`] and,
    /// if it loads and reports ready, swaps it in as the active model.
    /// Returns whether the swap happened.
    pub fn attempt_retrain_and_swap(&self, candidate_path: &PathBuf) -> bool {
        match JsonDecisionTreeModel::load_from_file(candidate_path) {
            Ok(candidate) => {
                let candidate: Box<dyn AnomalyModel> = Box::new(candidate);
                if candidate.is_ready() {
                    tracing::info!(model = candidate.name(), "swapping in retrained tier-3 model");
                    self.active.store(Arc::new(candidate));
                    true
                } else {
                    tracing::warn!("retrained candidate model reported not ready; keeping current model");
                    false
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, path = ?candidate_path, "failed to load retrained candidate model");
                false
            }
        }
    }

    /// Spawns the background retraining loop. Runs every
    /// `retraining_interval` until `shutdown` is cancelled.
    pub fn spawn_background_retrain(
        self: Arc<Self>,
        candidate_path: PathBuf,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.retraining_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        self.attempt_retrain_and_swap(&candidate_path);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_the_heuristic_fallback() {
        let manager = ModelManager::new(Duration::from_secs(3600));
        assert_eq!(manager.get_active_model().name(), "heuristic");
    }

    #[test]
    fn swap_fails_gracefully_when_candidate_path_is_missing() {
        let manager = ModelManager::new(Duration::from_secs(3600));
        let swapped = manager.attempt_retrain_and_swap(&PathBuf::from("/nonexistent/model.json"));
        assert!(!swapped);
        assert_eq!(manager.get_active_model().name(), "heuristic");
    }
}
