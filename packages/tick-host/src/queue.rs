use std::cell::RefCell;
use std::collections::VecDeque;

pub type Job = Box<dyn FnOnce()>;

/// A FIFO of host jobs.
/// The loop is single-threaded, so RefCell<VecDeque> is enough. The borrow is
/// never held while a job runs: jobs are free to push onto the queue they
/// were popped from.
#[derive(Default)]
pub struct TaskQueue {
    queue: RefCell<VecDeque<Job>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
        }
    }

    pub fn push(&self, job: Job) {
        self.queue.borrow_mut().push_back(job);
    }

    pub fn pop(&self) -> Option<Job> {
        self.queue.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Runs jobs until the queue is empty, including jobs pushed by jobs.
    pub fn run_until_empty(&self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.pop() {
            job();
            ran += 1;
        }
        ran
    }
}
