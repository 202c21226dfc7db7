//! Budgeted FIFO of continuations.
//!
//! Runs a bounded number of continuation steps per tick so that a burst of
//! branch forks cannot blow the frame budget. Continuations queued during a
//! tick only run on a later tick.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{trace, warn};

use crate::traits::{Continuation, Step};
use crate::world::World;

/// Default per-tick budget.
pub const DEFAULT_MAX_NEW_HANDLERS_PER_TICK: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub resumed: usize,
    pub requeued: usize,
    pub completed: usize,
    pub dropped: usize,
    /// Continuations still waiting after the tick.
    pub queued: usize,
}

pub struct Scheduler {
    queue: VecDeque<Box<dyn Continuation>>,
    max_new_handlers_per_tick: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NEW_HANDLERS_PER_TICK)
    }
}

impl Scheduler {
    pub fn new(max_new_handlers_per_tick: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max_new_handlers_per_tick,
        }
    }

    pub fn max_new_handlers_per_tick(&self) -> usize {
        self.max_new_handlers_per_tick
    }

    pub fn set_max_new_handlers_per_tick(&mut self, budget: usize) {
        self.max_new_handlers_per_tick = budget;
    }

    pub fn enqueue(&mut self, continuation: Box<dyn Continuation>) {
        self.queue.push_back(continuation);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Runs one tick with the configured budget.
    pub fn tick(&mut self, world: &mut World) -> TickReport {
        self.run_tick(world, self.max_new_handlers_per_tick)
    }

    /// Resumes at most `budget` continuations, and none queued after the tick
    /// started.
    pub fn run_tick(&mut self, world: &mut World, budget: usize) -> TickReport {
        self.absorb(world);

        let mut report = TickReport::default();
        let mut remaining = self.queue.len();
        while remaining > 0 && report.resumed < budget {
            let Some(mut next) = self.queue.pop_front() else {
                break;
            };
            let step = next.resume(world);
            // Work spawned by this step goes ahead of the step's own requeue.
            self.absorb(world);
            match step {
                Step::Pending => {
                    self.queue.push_back(next);
                    report.requeued += 1;
                }
                Step::Complete => report.completed += 1,
                Step::Unsupported(reason) => {
                    warn!(
                        continuation = next.label(),
                        "unsupported yield, dropping continuation: {reason}"
                    );
                    report.dropped += 1;
                }
            }
            remaining -= 1;
            report.resumed += 1;
        }

        report.queued = self.queue.len();
        trace!(?report, "scheduler tick");
        report
    }

    fn absorb(&mut self, world: &mut World) {
        self.queue.extend(world.take_pending());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::GrowthSettings;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Countdown {
        left: usize,
        resumes: Rc<Cell<usize>>,
    }

    impl Continuation for Countdown {
        fn resume(&mut self, _world: &mut World) -> Step {
            self.resumes.set(self.resumes.get() + 1);
            if self.left == 0 {
                Step::Complete
            } else {
                self.left -= 1;
                Step::Pending
            }
        }
    }

    struct Bogus;

    impl Continuation for Bogus {
        fn resume(&mut self, _world: &mut World) -> Step {
            Step::Unsupported("wait-for-physics".to_string())
        }
    }

    struct Spawner;

    impl Continuation for Spawner {
        fn resume(&mut self, world: &mut World) -> Step {
            world.enqueue(Box::new(Bogus));
            Step::Complete
        }
    }

    fn world() -> World {
        World::new(GrowthSettings::default())
    }

    #[test]
    fn budget_caps_resumes_per_tick() {
        let mut world = world();
        let mut scheduler = Scheduler::new(100);
        let resumes = Rc::new(Cell::new(0));
        for _ in 0..150 {
            scheduler.enqueue(Box::new(Countdown {
                left: 0,
                resumes: resumes.clone(),
            }));
        }

        let report = scheduler.tick(&mut world);
        assert_eq!(report.resumed, 100);
        assert_eq!(report.completed, 100);
        assert_eq!(scheduler.len(), 50);
        assert_eq!(resumes.get(), 100);

        let report = scheduler.tick(&mut world);
        assert_eq!(report.resumed, 50);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn pending_continuations_resume_on_later_ticks() {
        let mut world = world();
        let mut scheduler = Scheduler::new(10);
        let resumes = Rc::new(Cell::new(0));
        scheduler.enqueue(Box::new(Countdown {
            left: 2,
            resumes: resumes.clone(),
        }));

        for expected in 1..=3 {
            let report = scheduler.run_tick(&mut world, 10);
            assert_eq!(report.resumed, 1, "one resume per tick");
            assert_eq!(resumes.get(), expected);
        }
        assert!(scheduler.is_empty());
    }

    #[test]
    fn unsupported_yield_is_dropped() {
        let mut world = world();
        let mut scheduler = Scheduler::default();
        scheduler.enqueue(Box::new(Bogus));
        let report = scheduler.tick(&mut world);
        assert_eq!(report.dropped, 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn work_queued_during_a_tick_waits_for_the_next() {
        let mut world = world();
        let mut scheduler = Scheduler::default();
        scheduler.enqueue(Box::new(Spawner));

        let report = scheduler.tick(&mut world);
        assert_eq!(report.resumed, 1);
        assert_eq!(report.queued, 1);

        let report = scheduler.tick(&mut world);
        assert_eq!(report.dropped, 1);
    }

    #[test]
    fn zero_budget_resumes_nothing() {
        let mut world = world();
        let mut scheduler = Scheduler::default();
        scheduler.enqueue(Box::new(Bogus));
        let report = scheduler.run_tick(&mut world, 0);
        assert_eq!(report.resumed, 0);
        assert_eq!(scheduler.len(), 1);
    }
}
