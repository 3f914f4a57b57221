//! Metrics for reservoirs.
//!
//! Events are shared by all reservoirs of all item types; they describe the overall reuse
//! behavior of the process. Use [`nm::Report::collect()`] to read them.

use std::thread::LocalKey;

use nm::{Event, Magnitude};

/// Histogram buckets for the number of live instances in a reservoir after an acquire.
///
/// Most reservoirs stay small. Large ones are usually particle or projectile pools.
const LIVE_INSTANCES_BUCKETS: &[Magnitude] = &[0, 1, 2, 4, 8, 16, 32, 64, 128, 256, 1024, 4096];

thread_local! {
    /// An instance was constructed because no idle instance was available.
    pub(crate) static CREATED: Event = Event::builder()
        .name("reuse_pool_created")
        .build();

    /// An acquire was served from an idle instance.
    pub(crate) static REUSED: Event = Event::builder()
        .name("reuse_pool_reused")
        .build();

    /// An active instance was returned and became idle.
    pub(crate) static RELEASED: Event = Event::builder()
        .name("reuse_pool_released")
        .build();

    /// An instance was finalized and forgotten.
    pub(crate) static DESTROYED: Event = Event::builder()
        .name("reuse_pool_destroyed")
        .build();

    /// An acquire was rejected because the reservoir was at its maximum size.
    pub(crate) static CAPACITY_EXCEEDED: Event = Event::builder()
        .name("reuse_pool_capacity_exceeded")
        .build();

    /// A lifecycle hook reported an error.
    pub(crate) static HOOK_FAILED: Event = Event::builder()
        .name("reuse_pool_hook_failed")
        .build();

    /// Number of live (active plus idle) instances in the reservoir after a successful acquire.
    pub(crate) static LIVE_INSTANCES: Event = Event::builder()
        .name("reuse_pool_live_instances")
        .histogram(LIVE_INSTANCES_BUCKETS)
        .build();
}

/// Records one occurrence of `event`.
///
/// Registries installed via `global` are dropped during thread-local destruction, after which
/// the events may no longer be accessible. Such late observations are discarded.
#[cfg_attr(test, mutants::skip)] // Metrics are not asserted on in tests.
pub(crate) fn observe_once(event: &'static LocalKey<Event>) {
    _ = event.try_with(|e| e.observe_once());
}

#[cfg_attr(test, mutants::skip)] // Metrics are not asserted on in tests.
pub(crate) fn observe_live_instances(live: usize) {
    let magnitude = Magnitude::try_from(live).unwrap_or(Magnitude::MAX);
    _ = LIVE_INSTANCES.try_with(|e| e.observe(magnitude));
}
