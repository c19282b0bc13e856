//! Property-based tests for the invariants that hold for *any* input, not
//! just the hand-picked examples in the unit tests alongside each module.

use aidf::conversation::{ConversationWindow, Message};
use aidf::scope::{Decision, EnforcementMode, ScopeGuard};
use aidf::task::{LifecycleFolder, TaskScope};
use proptest::prelude::*;
use std::path::PathBuf;

fn glob_pattern() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,6}\\.rs",
        "src/[a-z]{1,6}/\\*\\*",
        "[a-z]{1,6}/[a-z]{1,6}\\.md",
    ]
}

fn path_like() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,6}\\.rs",
        "src/[a-z]{1,6}/[a-z]{1,6}\\.rs",
        "[a-z]{1,6}/[a-z]{1,6}\\.md",
    ]
}

fn enforcement_mode() -> impl Strategy<Value = EnforcementMode> {
    prop_oneof![
        Just(EnforcementMode::Strict),
        Just(EnforcementMode::Ask),
        Just(EnforcementMode::Permissive),
    ]
}

proptest! {
    /// ∀ scope, mode, path: if `path` matches a `forbidden` pattern, the
    /// decision is `BLOCK`, regardless of what `allowed`/`askBefore` say
    ///.
    #[test]
    fn forbidden_always_wins(
        path in path_like(),
        allowed in prop::collection::vec(glob_pattern(), 0..3),
        ask_before in prop::collection::vec(glob_pattern(), 0..3),
        mode in enforcement_mode(),
    ) {
        let scope = TaskScope { allowed, forbidden: vec![path.clone()], ask_before };
        let guard = ScopeGuard::new(scope, mode);
        let (decision, _) = guard.decide(&path);
        prop_assert_eq!(decision, Decision::Block);
    }

    /// ∀ path not matching any pattern: under Strict mode with a non-empty
    /// `allowed` list, anything outside it blocks; under Permissive mode
    /// nothing outside `forbidden`/`askBefore` ever blocks.
    #[test]
    fn permissive_mode_never_blocks_non_forbidden(
        path in path_like(),
        allowed in prop::collection::vec(glob_pattern(), 0..3),
    ) {
        let scope = TaskScope { allowed, forbidden: vec![], ask_before: vec![] };
        let guard = ScopeGuard::new(scope, EnforcementMode::Permissive);
        let (decision, _) = guard.decide(&path);
        prop_assert_ne!(decision, Decision::Block);
    }

    /// ∀ path: an empty `allowed` list under Strict mode blocks everything
    /// that isn't forbidden or askBefore.
    #[test]
    fn empty_allowed_under_strict_blocks_everything(path in path_like()) {
        let scope = TaskScope { allowed: vec![], forbidden: vec![], ask_before: vec![] };
        let guard = ScopeGuard::new(scope, EnforcementMode::Strict);
        let (decision, _) = guard.decide(&path);
        prop_assert_eq!(decision, Decision::Block);
    }

    /// ∀ approved path matching askBefore: approval bypasses ASK_USER, but
    /// never bypasses a `forbidden` match.
    #[test]
    fn approval_bypasses_ask_before_not_forbidden(path in path_like()) {
        let scope = TaskScope { allowed: vec![], forbidden: vec![path.clone()], ask_before: vec![path.clone()] };
        let mut guard = ScopeGuard::new(scope, EnforcementMode::Strict);
        guard.approve(&path);
        let (decision, _) = guard.decide(&path);
        prop_assert_eq!(decision, Decision::Block);
    }

    /// ∀ task file path: classification only ever depends on the immediate
    /// parent directory name, and is stable under repetition (idempotent,
    /// since it reads nothing but the path itself).
    #[test]
    fn lifecycle_classification_is_idempotent(name in "[a-z]{1,8}\\.md") {
        for (dir, expected) in [
            ("pending", LifecycleFolder::Pending),
            ("completed", LifecycleFolder::Completed),
            ("blocked", LifecycleFolder::Blocked),
            ("archive", LifecycleFolder::Unrecognized),
        ] {
            let path = PathBuf::from(".ai/tasks").join(dir).join(&name);
            prop_assert_eq!(LifecycleFolder::classify(&path), expected);
            prop_assert_eq!(LifecycleFolder::classify(&path), LifecycleFolder::classify(&path));
        }
    }

    /// ∀ TaskScope: a JSON round trip is lossless (the `askBefore` rename
    /// doesn't drop or reorder anything).
    #[test]
    fn task_scope_json_round_trips(
        allowed in prop::collection::vec(glob_pattern(), 0..4),
        forbidden in prop::collection::vec(glob_pattern(), 0..4),
        ask_before in prop::collection::vec(glob_pattern(), 0..4),
    ) {
        let scope = TaskScope { allowed, forbidden, ask_before };
        let json = serde_json::to_string(&scope).unwrap();
        let back: TaskScope = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(scope.allowed, back.allowed);
        prop_assert_eq!(scope.forbidden, back.forbidden);
        prop_assert_eq!(scope.ask_before, back.ask_before);
    }

    /// ∀ message count, max/head/tail bounds: after `trim` (with
    /// summarization disabled, so eviction is plain), the result never
    /// exceeds `preserve_head + preserve_tail`, and the preserved head is
    /// an exact prefix of the original messages.
    #[test]
    fn conversation_trim_preserves_head_prefix_and_bounds_size(
        total in 0usize..40,
        max_messages in 1usize..20,
        preserve_head in 0usize..10,
        preserve_tail in 0usize..10,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut messages: Vec<Message> = (0..total).map(|i| Message::user(format!("message {i}"))).collect();
        let original = messages.clone();
        let mut window = ConversationWindow::new(max_messages, preserve_head, preserve_tail);

        rt.block_on(window.trim(&mut messages, None));

        prop_assert!(messages.len() <= original.len());
        if original.len() > max_messages {
            prop_assert!(messages.len() <= preserve_head + preserve_tail);
            let head_end = preserve_head.min(original.len());
            let got: Vec<&str> = messages[..head_end].iter().map(|m| m.content.as_str()).collect();
            let want: Vec<&str> = original[..head_end].iter().map(|m| m.content.as_str()).collect();
            prop_assert_eq!(got, want);
        } else {
            prop_assert_eq!(messages.len(), original.len());
        }
    }
}
