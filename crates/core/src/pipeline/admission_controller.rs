use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Ceiling on concurrently running classification workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConcurrencyLimit {
    /// Every request is admitted.
    Unbounded,
    Bounded(NonZeroUsize),
}

impl ConcurrencyLimit {
    /// Zero selects [`ConcurrencyLimit::Unbounded`].
    pub fn from_max(max: usize) -> Self {
        match NonZeroUsize::new(max) {
            Some(n) => ConcurrencyLimit::Bounded(n),
            None => ConcurrencyLimit::Unbounded,
        }
    }

    pub fn max(&self) -> Option<usize> {
        match self {
            ConcurrencyLimit::Unbounded => None,
            ConcurrencyLimit::Bounded(n) => Some(n.get()),
        }
    }
}

impl fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyLimit::Unbounded => write!(f, "unbounded"),
            ConcurrencyLimit::Bounded(n) => write!(f, "{n}"),
        }
    }
}

/// First-come, non-queueing admission against a global worker budget.
///
/// A refused request has no side effect; callers retry on a later frame.
pub struct AdmissionController {
    limit: ConcurrencyLimit,
    running: AtomicUsize,
}

impl AdmissionController {
    pub fn new(limit: ConcurrencyLimit) -> Self {
        Self {
            limit,
            running: AtomicUsize::new(0),
        }
    }

    pub fn limit(&self) -> ConcurrencyLimit {
        self.limit
    }

    pub fn num_running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Takes one unit of budget if any is left.
    pub fn try_admit(&self) -> bool {
        match self.limit {
            ConcurrencyLimit::Unbounded => {
                self.running.fetch_add(1, Ordering::AcqRel);
                true
            }
            ConcurrencyLimit::Bounded(max) => self
                .running
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < max.get()).then_some(n + 1)
                })
                .is_ok(),
        }
    }

    /// Returns one unit taken by a successful [`try_admit`](Self::try_admit).
    pub fn release(&self) {
        if self
            .running
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_err()
        {
            log::error!("Admission released with nothing running");
        }
    }

    /// [`try_admit`](Self::try_admit) wrapped in a guard that releases on drop.
    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        self.try_admit().then(|| Permit {
            controller: Some(Arc::clone(self)),
        })
    }
}

/// Proof of admission. Dropping it returns the budget unit exactly once.
pub struct Permit {
    controller: Option<Arc<AdmissionController>>,
}

impl Permit {
    /// A permit for a slot that has never produced a result. It is granted
    /// outside the budget and releases nothing.
    pub fn bootstrap() -> Self {
        Self { controller: None }
    }

    pub fn is_bootstrap(&self) -> bool {
        self.controller.is_none()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(controller) = self.controller.take() {
            controller.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::thread;

    fn bounded(n: usize) -> Arc<AdmissionController> {
        Arc::new(AdmissionController::new(ConcurrencyLimit::from_max(n)))
    }

    #[rstest]
    #[case(0, ConcurrencyLimit::Unbounded, None)]
    #[case(1, ConcurrencyLimit::Bounded(NonZeroUsize::MIN), Some(1))]
    fn test_from_max(
        #[case] max: usize,
        #[case] expected: ConcurrencyLimit,
        #[case] ceiling: Option<usize>,
    ) {
        let limit = ConcurrencyLimit::from_max(max);
        assert_eq!(limit, expected);
        assert_eq!(limit.max(), ceiling);
    }

    #[test]
    fn test_bounded_refuses_at_limit_without_side_effect() {
        let controller = bounded(2);
        assert!(controller.try_admit());
        assert!(controller.try_admit());
        assert!(!controller.try_admit());
        assert_eq!(controller.num_running(), 2);

        controller.release();
        assert!(controller.try_admit());
        assert_eq!(controller.num_running(), 2);
    }

    #[test]
    fn test_unbounded_never_refuses() {
        let controller = bounded(0);
        for _ in 0..1000 {
            assert!(controller.try_admit());
        }
        assert_eq!(controller.num_running(), 1000);
    }

    #[test]
    fn test_release_without_admission_stays_at_zero() {
        let controller = bounded(1);
        controller.release();
        assert_eq!(controller.num_running(), 0);
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let controller = bounded(1);
        let permit = controller.try_acquire().unwrap();
        assert!(!permit.is_bootstrap());
        assert!(controller.try_acquire().is_none());
        drop(permit);
        assert_eq!(controller.num_running(), 0);
        assert!(controller.try_acquire().is_some());
    }

    #[test]
    fn test_bootstrap_permit_uses_no_budget() {
        let controller = bounded(1);
        let held = controller.try_acquire().unwrap();
        let bootstrap = Permit::bootstrap();
        assert!(bootstrap.is_bootstrap());
        drop(bootstrap);
        assert_eq!(controller.num_running(), 1);
        drop(held);
    }

    #[test]
    fn test_concurrent_admission_never_exceeds_limit() {
        let controller = bounded(3);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let controller = Arc::clone(&controller);
                thread::spawn(move || {
                    let mut peak = 0;
                    for _ in 0..500 {
                        if let Some(permit) = controller.try_acquire() {
                            peak = peak.max(controller.num_running());
                            drop(permit);
                        }
                    }
                    peak
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap() <= 3);
        }
        assert_eq!(controller.num_running(), 0);
    }
}
