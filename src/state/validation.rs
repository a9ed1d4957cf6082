//! Batch action validation.
//!
//! Two policies share [`check_action`]:
//!
//! - [`validate_batch`] is the construction-time check used by the tool
//!   surface. Any bad action rejects the whole request.
//! - The store's install path filters bad actions out and keeps the rest
//!   (see [`crate::state::AvatarStateStore::set_batch`]).
//!
//! The two deliberately disagree; callers pick the policy by entry point.

use crate::catalog::Catalog;
use crate::errors::AvatarError;
use crate::state::types::{BatchAction, BatchRequest};

/// Check one action against the catalog and the duration rule.
pub fn check_action(catalog: &Catalog, action: &BatchAction) -> Result<(), AvatarError> {
    if !catalog.contains(&action.expression_name) {
        return Err(AvatarError::UnknownExpression {
            name: action.expression_name.clone(),
            available: catalog.names(),
        });
    }
    if action.duration_ms <= 0 {
        return Err(AvatarError::InvalidDuration {
            expression: action.expression_name.clone(),
            duration: action.duration_ms,
        });
    }
    Ok(())
}

/// Reject the whole request if any action is invalid or there are none.
pub fn validate_batch(catalog: &Catalog, request: &BatchRequest) -> Result<(), AvatarError> {
    if request.actions.is_empty() {
        return Err(AvatarError::NoValidActions);
    }
    request
        .actions
        .iter()
        .try_for_each(|action| check_action(catalog, action))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::parse(r#"{"joyful": {"image": "j.png"}, "sad": {"image": "s.png"}}"#).unwrap()
    }

    #[test]
    fn test_valid_batch_passes() {
        let request = BatchRequest::new(
            vec![BatchAction::new("joyful", 100), BatchAction::new("sad", 200)],
            true,
        );
        assert!(validate_batch(&catalog(), &request).is_ok());
    }

    #[test]
    fn test_one_unknown_rejects_whole_batch() {
        let request = BatchRequest::new(
            vec![BatchAction::new("joyful", 100), BatchAction::new("angry", 200)],
            false,
        );
        match validate_batch(&catalog(), &request) {
            Err(AvatarError::UnknownExpression { name, available }) => {
                assert_eq!(name, "angry");
                assert_eq!(available, vec!["joyful", "sad"]);
            }
            other => panic!("expected UnknownExpression, got {:?}", other),
        }
    }

    #[test]
    fn test_non_positive_duration_rejected() {
        let request = BatchRequest::new(vec![BatchAction::new("joyful", 0)], true);
        assert!(matches!(
            validate_batch(&catalog(), &request),
            Err(AvatarError::InvalidDuration { duration: 0, .. })
        ));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let request = BatchRequest::new(vec![], true);
        assert!(matches!(
            validate_batch(&catalog(), &request),
            Err(AvatarError::NoValidActions)
        ));
    }
}
