//! Given-When-Then harness for reducers

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use kitroom_core::{effect::Effect, reducer::Reducer};

type StateAssertion<S> = Box<dyn FnOnce(&S)>;
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// Several actions can be queued with repeated `when_action` calls; they are
/// reduced in order and the effect assertions see the effects of the last one.
///
/// # Example
///
/// ```ignore
/// use kitroom_testing::ReducerTest;
///
/// ReducerTest::new(LedgerReducer)
///     .with_env(test_environment())
///     .given_state(seeded_state())
///     .when_action(LedgerAction::DeletePlan { request_id, plan_id })
///     .then_state(|state| assert!(state.plans.is_empty()))
///     .then_effects(assertions::assert_has_commit_effect)
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Queue an action to reduce (When)
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the effects of the last action (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");
        let env = self
            .environment
            .expect("Environment must be set with with_env()");
        assert!(
            !self.actions.is_empty(),
            "At least one action must be set with when_action()"
        );

        let mut effects = Vec::new();
        for action in self.actions {
            effects = self.reducer.reduce(&mut state, action, &env).into_vec();
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }
        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use kitroom_core::document::WriteBatch;
    use kitroom_core::effect::{DocumentStoreOperation, Effect};

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.is_empty() || matches!(effects, [Effect::None]),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Future(_))),
            "Expected at least one Future effect, but none found"
        );
    }

    /// Assert that effects contain at least one document store commit
    ///
    /// # Panics
    ///
    /// Panics if no commit is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_commit_effect<A>(effects: &[Effect<A>]) {
        assert!(
            !committed_batches(effects).is_empty(),
            "Expected at least one document store commit, but none found"
        );
    }

    /// Every write batch committed by `effects`, including nested ones
    #[must_use]
    pub fn committed_batches<A>(effects: &[Effect<A>]) -> Vec<&WriteBatch> {
        let mut batches = Vec::new();
        for effect in effects {
            match effect {
                Effect::DocumentStore(DocumentStoreOperation::Commit { batch, .. }) => {
                    batches.push(batch);
                },
                Effect::Parallel(inner) | Effect::Sequential(inner) => {
                    batches.extend(committed_batches(inner));
                },
                _ => {},
            }
        }
        batches
    }

    /// Number of document store loads in `effects`, including nested ones
    #[must_use]
    pub fn load_count<A>(effects: &[Effect<A>]) -> usize {
        effects
            .iter()
            .map(|effect| match effect {
                Effect::DocumentStore(DocumentStoreOperation::Load { .. }) => 1,
                Effect::Parallel(inner) | Effect::Sequential(inner) => load_count(inner),
                _ => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitroom_core::document::{Collection, Version, WriteBatch};
    use kitroom_core::effect::{DocumentStoreOperation, Effect};
    use kitroom_core::reducer::Reducer;
    use kitroom_core::{smallvec, SmallVec};
    use std::sync::Arc;

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Save,
    }

    struct TestReducer;

    struct TestEnv {
        documents: Arc<crate::InMemoryDocumentStore>,
    }

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    SmallVec::new()
                },
                TestAction::Save => {
                    let batch = WriteBatch::new().put(
                        Collection::Inventory,
                        "counter",
                        serde_json::json!(state.count),
                        Some(Version::INITIAL),
                    );
                    smallvec![Effect::Parallel(vec![Effect::DocumentStore(
                        DocumentStoreOperation::Commit {
                            document_store: env.documents.clone(),
                            batch,
                            on_success: Box::new(|_| None),
                            on_error: Box::new(|_| None),
                        }
                    )])]
                },
            }
        }
    }

    fn env() -> TestEnv {
        TestEnv {
            documents: Arc::new(crate::InMemoryDocumentStore::new()),
        }
    }

    #[test]
    fn actions_reduce_in_order() {
        ReducerTest::new(TestReducer)
            .with_env(env())
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .when_action(TestAction::Increment)
            .then_state(|state| assert_eq!(state.count, 2))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn nested_commits_are_found() {
        ReducerTest::new(TestReducer)
            .with_env(env())
            .given_state(TestState { count: 3 })
            .when_action(TestAction::Save)
            .then_effects(|effects| {
                assertions::assert_has_commit_effect(effects);
                let batches = assertions::committed_batches(effects);
                assert_eq!(batches.len(), 1);
                assert_eq!(batches[0].len(), 1);
                assert_eq!(assertions::load_count(effects), 0);
            })
            .run();
    }
}
