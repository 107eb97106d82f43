use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	future::Future,
	pin::pin,
	task::{Context, Poll, Waker},
};
use std::{
	collections::{BTreeSet, VecDeque},
	rc::Rc,
	sync::Arc,
	task::Wake,
};

use futures_lite::future::BoxedLocal;
use parking_lot::Mutex;
use scopeguard::{guard, ScopeGuard};
use thiserror::Error;
use tracing::trace;

use super::LoopRef;

/// Why a [`LocalLoop`] could not drive a future to completion.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LoopError {
	/// Nothing is runnable anymore, but the driven future is still pending.
	#[error("the loop stalled: nothing is runnable while the awaited future is still pending")]
	Stalled,
	/// The loop was asked to run from inside one of its own callbacks or tasks.
	#[error("the loop is already running")]
	AlreadyRunning,
}

/// Task id reserved for the future passed to [`LocalLoop::run_until`].
const MAIN: usize = usize::MAX;

/// A functional single-threaded [`LoopRef`].
///
/// Each iteration first runs the callbacks that were queued *before* it started, then polls every
/// task that was woken. Work queued during an iteration is handled by the next one.
///
/// Clones refer to the same loop.
#[derive(Clone, Default)]
pub struct LocalLoop(Rc<Inner>);

#[derive(Default)]
struct Inner {
	callbacks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
	tasks: RefCell<Vec<Option<BoxedLocal<()>>>>,
	vacant: RefCell<Vec<usize>>,
	woken: Arc<Mutex<VecDeque<usize>>>,
	running: Cell<bool>,
}

struct TaskWaker {
	id: usize,
	woken: Arc<Mutex<VecDeque<usize>>>,
}

impl Wake for TaskWaker {
	fn wake(self: Arc<Self>) {
		self.wake_by_ref();
	}

	fn wake_by_ref(self: &Arc<Self>) {
		self.woken.lock().push_back(self.id);
	}
}

/// What one loop iteration did.
struct Turn {
	progressed: bool,
	main_woken: bool,
}

impl Debug for LocalLoop {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("LocalLoop")
			.field("callbacks", &self.0.callbacks.borrow().len())
			.field("tasks", &self.pending_tasks())
			.field("running", &self.0.running.get())
			.finish()
	}
}

impl LocalLoop {
	/// Creates a new idle loop.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Type-erases a clone of this handle.
	#[must_use]
	pub fn to_ref(&self) -> Rc<dyn LoopRef> {
		Rc::new(self.clone())
	}

	/// **Returns** the number of spawned tasks that have not completed yet.
	#[must_use]
	pub fn pending_tasks(&self) -> usize {
		self.0.tasks.borrow().iter().filter(|task| task.is_some()).count()
	}

	/// Runs the loop until `future` completes.
	///
	/// # Errors
	///
	/// [`LoopError::Stalled`] iff nothing is runnable anymore while `future` is still pending.
	/// [`LoopError::AlreadyRunning`] iff called from within this loop.
	pub fn run_until<F: Future>(&self, future: F) -> Result<F::Output, LoopError> {
		let _running = self.enter()?;
		let mut future = pin!(future);
		let waker = self.waker(MAIN);
		let mut cx = Context::from_waker(&waker);

		let mut poll_main = true;
		loop {
			if poll_main {
				if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
					return Ok(output);
				}
			}

			let turn = self.turn();
			poll_main = turn.main_woken;
			if !turn.progressed && !poll_main {
				return Err(LoopError::Stalled);
			}
		}
	}

	/// Runs the loop until no callbacks are queued and no task was woken.
	///
	/// # Errors
	///
	/// [`LoopError::AlreadyRunning`] iff called from within this loop.
	pub fn run_until_idle(&self) -> Result<(), LoopError> {
		let _running = self.enter()?;
		while self.turn().progressed {}
		Ok(())
	}

	fn enter(&self) -> Result<ScopeGuard<&Cell<bool>, fn(&Cell<bool>)>, LoopError> {
		if self.0.running.replace(true) {
			return Err(LoopError::AlreadyRunning);
		}
		Ok(guard(
			&self.0.running,
			(|running: &Cell<bool>| running.set(false)) as fn(&Cell<bool>),
		))
	}

	fn waker(&self, id: usize) -> Waker {
		Waker::from(Arc::new(TaskWaker {
			id,
			woken: Arc::clone(&self.0.woken),
		}))
	}

	fn turn(&self) -> Turn {
		let callbacks = self.0.callbacks.take();
		let woken = self.0.woken.lock().drain(..).collect::<BTreeSet<_>>();
		trace!(
			callbacks = callbacks.len(),
			woken = woken.len(),
			"loop iteration"
		);

		let mut progressed = !callbacks.is_empty();
		for callback in callbacks {
			callback();
		}

		let mut main_woken = false;
		for id in woken {
			if id == MAIN {
				main_woken = true;
				continue;
			}

			// Taken out so that the task may spawn re-entrantly.
			let Some(mut task) = self.0.tasks.borrow_mut().get_mut(id).and_then(Option::take)
			else {
				continue;
			};
			progressed = true;

			let waker = self.waker(id);
			match task.as_mut().poll(&mut Context::from_waker(&waker)) {
				Poll::Ready(()) => self.0.vacant.borrow_mut().push(id),
				Poll::Pending => self.0.tasks.borrow_mut()[id] = Some(task),
			}
		}

		Turn {
			progressed,
			main_woken,
		}
	}
}

impl LoopRef for LocalLoop {
	fn call_soon(&self, f: Box<dyn FnOnce()>) {
		self.0.callbacks.borrow_mut().push_back(f);
	}

	fn spawn(&self, task: BoxedLocal<()>) {
		let id = if let Some(id) = self.0.vacant.borrow_mut().pop() {
			self.0.tasks.borrow_mut()[id] = Some(task);
			id
		} else {
			let mut tasks = self.0.tasks.borrow_mut();
			tasks.push(Some(task));
			tasks.len() - 1
		};
		self.0.woken.lock().push_back(id);
	}
}
