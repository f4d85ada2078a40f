use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use hostbridge_protocol::BuildOutcome;
use hostbridge_protocol::TestOutcome;

use crate::dispatch::lock_or_recover;
use crate::op_lock::OpClass;

#[derive(Debug, Clone)]
enum CachedOutcome {
    Build(BuildOutcome),
    Test(TestOutcome),
}

/// Most recent structured result per operation class.
///
/// The slot is cleared when a new operation of that class is accepted, so a
/// long-running build can never serve its predecessor's stale result.
#[derive(Default)]
pub struct ResultCache {
    slots: StdMutex<HashMap<OpClass, CachedOutcome>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self, class: OpClass) {
        lock_or_recover(&self.slots).remove(&class);
    }

    pub fn store_build(&self, outcome: BuildOutcome) {
        lock_or_recover(&self.slots).insert(OpClass::Build, CachedOutcome::Build(outcome));
    }

    pub fn store_test(&self, outcome: TestOutcome) {
        lock_or_recover(&self.slots).insert(OpClass::Test, CachedOutcome::Test(outcome));
    }

    pub fn latest_build(&self) -> Option<BuildOutcome> {
        match lock_or_recover(&self.slots).get(&OpClass::Build) {
            Some(CachedOutcome::Build(outcome)) => Some(outcome.clone()),
            _ => None,
        }
    }

    pub fn latest_test(&self) -> Option<TestOutcome> {
        match lock_or_recover(&self.slots).get(&OpClass::Test) {
            Some(CachedOutcome::Test(outcome)) => Some(outcome.clone()),
            _ => None,
        }
    }
}
