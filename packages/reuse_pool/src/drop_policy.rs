/// Determines what a reservoir does with instances that are still active when it is dropped.
///
/// Dropping a reservoir always finalizes every instance it still tracks, running the
/// finalize hook of each. The policy governs whether it is acceptable for some of those
/// instances to still be checked out by callers at that point.
///
/// # Examples
///
/// ```
/// use reuse_pool::{DropPolicy, Poolable, Reservoir};
///
/// #[derive(Default)]
/// struct Particle;
/// impl Poolable for Particle {}
///
/// // The drop policy is set at reservoir creation time.
/// let reservoir = Reservoir::<Particle>::builder()
///     .drop_policy(DropPolicy::MustNotFinalizeActive)
///     .build_in_process()
///     .unwrap();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Active instances are finalized together with the idle ones. This is the default.
    #[default]
    MayFinalizeActive,

    /// The reservoir will panic if any instance is still active when it is dropped.
    ///
    /// This is a leak detector: it catches code paths that acquire instances and never give
    /// them back. The panic is skipped if the thread is already panicking.
    MustNotFinalizeActive,
}
