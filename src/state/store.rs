//! The avatar state store.
//!
//! Holds the single current expression + visual state and, optionally, the
//! active batch. One mutex guards the whole current-state value so fields
//! always change together; readers receive copies.

use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::errors::AvatarError;
use crate::state::types::{
    AvatarView, BatchDescriptor, BatchFrame, BatchRequest, VisualState, VisualUpdate,
};
use crate::state::validation::check_action;

#[derive(Debug, Clone)]
struct CurrentState {
    expression_name: String,
    visual: VisualState,
    batch: Option<Arc<BatchDescriptor>>,
}

/// Result of an accepted "set batch" command.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// A batch was installed and is now authoritative.
    Installed {
        batch: Arc<BatchDescriptor>,
        /// Number of requested actions that were filtered out.
        dropped: usize,
    },
    /// A single non-looping action was applied as a plain expression change.
    Collapsed {
        expression_name: String,
        visual: VisualState,
        dropped: usize,
    },
}

impl BatchOutcome {
    pub fn batch_id(&self) -> Option<&str> {
        match self {
            BatchOutcome::Installed { batch, .. } => Some(&batch.batch_id),
            BatchOutcome::Collapsed { .. } => None,
        }
    }

    /// Number of actions retained.
    pub fn action_count(&self) -> usize {
        match self {
            BatchOutcome::Installed { batch, .. } => batch.actions.len(),
            BatchOutcome::Collapsed { .. } => 1,
        }
    }

    pub fn dropped(&self) -> usize {
        match self {
            BatchOutcome::Installed { dropped, .. } | BatchOutcome::Collapsed { dropped, .. } => {
                *dropped
            }
        }
    }

    pub fn is_collapsed(&self) -> bool {
        matches!(self, BatchOutcome::Collapsed { .. })
    }
}

/// Single source of truth for what the overlay should display.
#[derive(Debug)]
pub struct AvatarStateStore {
    catalog: Arc<Catalog>,
    current: Mutex<CurrentState>,
}

impl AvatarStateStore {
    /// Start on the catalog's initial expression with default visuals.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let initial = catalog.initial().name.clone();
        Self {
            catalog,
            current: Mutex::new(CurrentState {
                expression_name: initial,
                visual: VisualState::default(),
                batch: None,
            }),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    fn unknown_expression(&self, name: &str) -> AvatarError {
        AvatarError::UnknownExpression {
            name: name.to_string(),
            available: self.catalog.names(),
        }
    }

    /// Show `name`, merging the supplied visual fields over the current ones.
    ///
    /// Clears any active batch. Unknown names leave state untouched.
    pub fn set_expression(
        &self,
        name: &str,
        update: &VisualUpdate,
    ) -> Result<VisualState, AvatarError> {
        if !self.catalog.contains(name) {
            return Err(self.unknown_expression(name));
        }

        let mut current = self.current.lock();
        let visual = update.merge_into(&current.visual);
        let cleared = current.batch.take();
        current.expression_name = name.to_string();
        current.visual = visual;
        drop(current);

        if let Some(batch) = cleared {
            tracing::debug!(batch_id = %batch.batch_id, "Batch superseded by expression change");
        }
        tracing::info!(expression = %name, ?visual, "Expression set");
        Ok(visual)
    }

    /// Install a batch, dropping invalid actions.
    ///
    /// Fails with `NoValidActions` (state untouched) when nothing survives.
    /// A single surviving action with `loop = false` collapses into a plain
    /// expression change.
    pub fn set_batch(&self, request: BatchRequest) -> Result<BatchOutcome, AvatarError> {
        let requested = request.actions.len();
        let frames: Vec<BatchFrame> = request
            .actions
            .iter()
            .enumerate()
            .filter_map(|(index, action)| match check_action(&self.catalog, action) {
                Ok(()) => Some(action.to_frame()),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Dropping invalid batch action");
                    None
                }
            })
            .collect();

        if frames.is_empty() {
            return Err(AvatarError::NoValidActions);
        }
        let dropped = requested - frames.len();

        if frames.len() == 1 && !request.looping {
            let frame = &frames[0];
            let mut current = self.current.lock();
            current.batch = None;
            current.expression_name = frame.expression_name.clone();
            current.visual = frame.visual;
            drop(current);

            tracing::info!(expression = %frame.expression_name, "Single-frame batch collapsed to expression");
            return Ok(BatchOutcome::Collapsed {
                expression_name: frame.expression_name.clone(),
                visual: frame.visual,
                dropped,
            });
        }

        let mut current = self.current.lock();
        // A reused id would read as "same batch" to every display client.
        let installed = current.batch.as_ref().map(|b| b.batch_id.as_str());
        let batch_id = match request.batch_id {
            Some(id) if !id.is_empty() && installed != Some(id.as_str()) => id,
            Some(id) if !id.is_empty() => {
                tracing::debug!(batch_id = %id, "Supplied batchId matches the active batch, issuing a fresh one");
                Uuid::new_v4().to_string()
            }
            _ => Uuid::new_v4().to_string(),
        };
        let batch = Arc::new(BatchDescriptor {
            looping: request.looping,
            random: request.random,
            actions: frames,
            batch_id,
        });

        let first = &batch.actions[0];
        current.expression_name = first.expression_name.clone();
        current.visual = first.visual;
        current.batch = Some(Arc::clone(&batch));
        drop(current);

        tracing::info!(
            batch_id = %batch.batch_id,
            actions = batch.actions.len(),
            dropped,
            looping = batch.looping,
            random = batch.random,
            "Batch installed"
        );
        Ok(BatchOutcome::Installed { batch, dropped })
    }

    /// Copy of the current state.
    pub fn current_view(&self) -> AvatarView {
        let current = self.current.lock().clone();
        AvatarView {
            catalog_entry: self.catalog.lookup(&current.expression_name).cloned(),
            expression_name: current.expression_name,
            visual: current.visual,
            batch: current.batch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::{BatchAction, Direction};

    fn store() -> AvatarStateStore {
        let catalog = Catalog::parse(
            r#"{
                "neutral": {"image": "neutral.png"},
                "joyful": {"image": "joyful.png"},
                "sad": {"image": "sad.png"},
                "surprised": {"image": "surprised.png"}
            }"#,
        )
        .unwrap();
        AvatarStateStore::new(Arc::new(catalog))
    }

    fn two_frame_batch() -> BatchRequest {
        BatchRequest::new(
            vec![BatchAction::new("joyful", 100), BatchAction::new("sad", 200)],
            true,
        )
    }

    #[test]
    fn test_initial_state_is_joyful_defaults() {
        let view = store().current_view();
        assert_eq!(view.expression_name, "joyful");
        assert_eq!(view.visual, VisualState::default());
        assert!(view.batch.is_none());
        assert_eq!(view.catalog_entry.unwrap().image_ref, "joyful.png");
    }

    #[test]
    fn test_set_expression_for_every_name() {
        let store = store();
        for name in store.catalog().names() {
            store.set_expression(&name, &VisualUpdate::default()).unwrap();
            let view = store.current_view();
            assert_eq!(view.expression_name, name);
            assert!(view.batch.is_none());
        }
    }

    #[test]
    fn test_set_expression_unknown_leaves_state() {
        let store = store();
        let before = store.current_view();
        let err = store
            .set_expression(
                "angry",
                &VisualUpdate {
                    pos_x: Some(99.0),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, AvatarError::UnknownExpression { .. }));
        assert_eq!(store.current_view(), before);
    }

    #[test]
    fn test_set_expression_partial_update() {
        let store = store();
        store
            .set_expression(
                "sad",
                &VisualUpdate {
                    direction: Some(Direction::Left),
                    pos_x: Some(15.0),
                    pos_y: Some(-4.0),
                    rotation: Some(12.0),
                    scale: Some(1.5),
                },
            )
            .unwrap();
        let visual = store
            .set_expression(
                "neutral",
                &VisualUpdate {
                    pos_y: Some(8.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(visual.direction, Direction::Left);
        assert_eq!(visual.pos_x, 15.0);
        assert_eq!(visual.pos_y, 8.0);
        assert_eq!(visual.rotation, 12.0);
        assert_eq!(visual.scale, 1.5);
        assert_eq!(store.current_view().visual, visual);
    }

    #[test]
    fn test_set_expression_clamps() {
        let store = store();
        let visual = store
            .set_expression(
                "joyful",
                &VisualUpdate {
                    rotation: Some(-400.0),
                    scale: Some(9.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(visual.rotation, -30.0);
        assert_eq!(visual.scale, 3.0);
    }

    #[test]
    fn test_set_batch_installs_and_shows_first_frame() {
        let store = store();
        let mut request = two_frame_batch();
        request.actions[0].visual.direction = Some(Direction::Left);
        let outcome = store.set_batch(request).unwrap();
        assert_eq!(outcome.action_count(), 2);
        assert_eq!(outcome.dropped(), 0);

        let view = store.current_view();
        let batch = view.batch.expect("batch should be active");
        assert_eq!(Some(batch.batch_id.as_str()), outcome.batch_id());
        assert_eq!(view.expression_name, "joyful");
        assert_eq!(view.visual.direction, Direction::Left);
    }

    #[test]
    fn test_batch_frames_are_normalized_and_clamped() {
        let store = store();
        let mut request = two_frame_batch();
        request.actions[1].visual.rotation = Some(75.0);
        request.actions[1].visual.scale = Some(0.0);
        let outcome = store.set_batch(request).unwrap();
        let BatchOutcome::Installed { batch, .. } = outcome else {
            panic!("expected installed batch");
        };
        assert_eq!(batch.actions[0].visual, VisualState::default());
        assert_eq!(batch.actions[1].visual.rotation, 30.0);
        assert_eq!(batch.actions[1].visual.scale, 0.1);
    }

    #[test]
    fn test_batch_id_stable_across_reads() {
        let store = store();
        store.set_batch(two_frame_batch()).unwrap();
        let first = store.current_view().batch.unwrap().batch_id.clone();
        for _ in 0..5 {
            assert_eq!(store.current_view().batch.unwrap().batch_id, first);
        }
    }

    #[test]
    fn test_new_batch_gets_new_id() {
        let store = store();
        let a = store.set_batch(two_frame_batch()).unwrap();
        let b = store.set_batch(two_frame_batch()).unwrap();
        assert_ne!(a.batch_id(), b.batch_id());
    }

    #[test]
    fn test_caller_supplied_batch_id_kept() {
        let store = store();
        let mut request = two_frame_batch();
        request.batch_id = Some("intro-sequence".into());
        let outcome = store.set_batch(request).unwrap();
        assert_eq!(outcome.batch_id(), Some("intro-sequence"));
    }

    #[test]
    fn test_reused_batch_id_is_replaced() {
        let store = store();
        let mut request = two_frame_batch();
        request.batch_id = Some("x".into());
        store.set_batch(request).unwrap();

        let mut request = BatchRequest::new(
            vec![BatchAction::new("neutral", 100), BatchAction::new("neutral", 100)],
            true,
        );
        request.batch_id = Some("x".into());
        let outcome = store.set_batch(request).unwrap();
        let id = outcome.batch_id().unwrap().to_string();
        assert_ne!(id, "x");

        let batch = store.current_view().batch.unwrap();
        assert_eq!(batch.batch_id, id);
        assert_eq!(batch.actions[0].expression_name, "neutral");

        // Once a different batch is active, the old id is free again.
        let mut request = two_frame_batch();
        request.batch_id = Some("x".into());
        assert_eq!(store.set_batch(request).unwrap().batch_id(), Some("x"));
    }

    #[test]
    fn test_single_non_looping_batch_collapses() {
        let store = store();
        store.set_batch(two_frame_batch()).unwrap();
        let mut action = BatchAction::new("surprised", 500);
        action.visual.pos_x = Some(30.0);
        let outcome = store
            .set_batch(BatchRequest::new(vec![action], false))
            .unwrap();
        assert!(outcome.is_collapsed());
        assert!(outcome.batch_id().is_none());

        let view = store.current_view();
        assert!(view.batch.is_none());
        assert_eq!(view.expression_name, "surprised");
        assert_eq!(view.visual.pos_x, 30.0);
    }

    #[test]
    fn test_single_looping_batch_is_kept() {
        let store = store();
        let outcome = store
            .set_batch(BatchRequest::new(vec![BatchAction::new("sad", 300)], true))
            .unwrap();
        assert!(!outcome.is_collapsed());
        assert!(store.current_view().batch.is_some());
    }

    #[test]
    fn test_partial_filter_keeps_valid_actions() {
        let store = store();
        let request = BatchRequest::new(
            vec![
                BatchAction::new("joyful", 100),
                BatchAction::new("angry", 100),
                BatchAction::new("sad", 100),
            ],
            false,
        );
        let outcome = store.set_batch(request).unwrap();
        assert_eq!(outcome.action_count(), 2);
        assert_eq!(outcome.dropped(), 1);
        let batch = store.current_view().batch.unwrap();
        let names: Vec<_> = batch.actions.iter().map(|a| a.expression_name.as_str()).collect();
        assert_eq!(names, vec!["joyful", "sad"]);
    }

    #[test]
    fn test_filter_drops_non_positive_durations() {
        let store = store();
        let request = BatchRequest::new(
            vec![
                BatchAction::new("joyful", 100),
                BatchAction::new("sad", -5),
                BatchAction::new("neutral", 100),
            ],
            true,
        );
        assert_eq!(store.set_batch(request).unwrap().action_count(), 2);
    }

    #[test]
    fn test_filter_down_to_one_collapses() {
        let store = store();
        let request = BatchRequest::new(
            vec![BatchAction::new("angry", 100), BatchAction::new("sad", 100)],
            false,
        );
        let outcome = store.set_batch(request).unwrap();
        assert!(outcome.is_collapsed());
        assert_eq!(outcome.dropped(), 1);
        assert_eq!(store.current_view().expression_name, "sad");
    }

    #[test]
    fn test_all_invalid_leaves_prior_state() {
        let store = store();
        store.set_batch(two_frame_batch()).unwrap();
        let before = store.current_view();
        let request = BatchRequest::new(
            vec![
                BatchAction::new("angry", 100),
                BatchAction::new("bored", 100),
                BatchAction::new("sleepy", 100),
            ],
            true,
        );
        assert!(matches!(
            store.set_batch(request),
            Err(AvatarError::NoValidActions)
        ));
        assert_eq!(store.current_view(), before);
    }

    #[test]
    fn test_set_expression_clears_batch() {
        let store = store();
        store.set_batch(two_frame_batch()).unwrap();
        assert!(store.current_view().batch.is_some());
        store.set_expression("neutral", &VisualUpdate::default()).unwrap();
        let view = store.current_view();
        assert!(view.batch.is_none());
        assert_eq!(view.expression_name, "neutral");
    }

    #[test]
    fn test_view_is_a_snapshot() {
        let store = store();
        let view = store.current_view();
        store.set_expression("sad", &VisualUpdate::default()).unwrap();
        assert_eq!(view.expression_name, "joyful");
    }
}
