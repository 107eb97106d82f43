use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	future::Future,
	pin::Pin,
	task::{Context, Poll, Waker},
};
use std::rc::Rc;

use futures_lite::future::BoxedLocal;
use pin_project::{pin_project, pinned_drop};
use tracing::trace;

use super::{LoopRef, Transaction};

/// A [`Transaction`] that spawns enlisted tasks on a loop right away and completes
/// [`.end()`](`Batch::end`) once all of them have finished.
///
/// Clones refer to the same batch.
#[derive(Clone)]
pub struct Batch {
	state: Rc<State>,
	event_loop: Rc<dyn LoopRef>,
}

#[derive(Default)]
struct State {
	pending: Cell<usize>,
	waiters: RefCell<Vec<Waker>>,
}

impl State {
	fn settle(&self) {
		self.pending.set(self.pending.get() - 1);
		if self.pending.get() == 0 {
			for waker in self.waiters.take() {
				waker.wake();
			}
		}
	}
}

impl Debug for Batch {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Batch")
			.field("pending", &self.state.pending.get())
			.finish_non_exhaustive()
	}
}

impl Batch {
	/// Starts a new batch whose tasks run on `event_loop`.
	#[must_use]
	pub fn begin(event_loop: Rc<dyn LoopRef>) -> Self {
		Self {
			state: Rc::default(),
			event_loop,
		}
	}

	/// **Returns** the number of enlisted tasks that have neither completed nor been dropped.
	#[must_use]
	pub fn pending(&self) -> usize {
		self.state.pending.get()
	}

	/// Creates a [`Future`] that completes once [`.pending()`](`Batch::pending`) reaches zero.
	///
	/// Tasks enlisted while the [`BatchEnd`] is pending are waited for too.
	pub fn end(&self) -> BatchEnd {
		BatchEnd {
			state: Rc::clone(&self.state),
		}
	}
}

impl Transaction for Batch {
	fn enlist(&self, task: BoxedLocal<()>) {
		self.state.pending.set(self.state.pending.get() + 1);
		trace!(pending = self.state.pending.get(), "task enlisted");
		self.event_loop.spawn(Box::pin(Tracked {
			task,
			state: Some(Rc::clone(&self.state)),
		}));
	}
}

/// Keeps [`State::pending`] accurate even if the loop drops the task early.
#[pin_project(PinnedDrop)]
struct Tracked<F> {
	#[pin]
	task: F,
	state: Option<Rc<State>>,
}

impl<F: Future<Output = ()>> Future for Tracked<F> {
	type Output = ();

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.project();
		let poll = this.task.poll(cx);
		if poll.is_ready() {
			if let Some(state) = this.state.take() {
				state.settle();
			}
		}
		poll
	}
}

#[pinned_drop]
impl<F> PinnedDrop for Tracked<F> {
	fn drop(self: Pin<&mut Self>) {
		if let Some(state) = self.project().state.take() {
			state.settle();
		}
	}
}

/// Returned by [`Batch::end`].
#[must_use = "Futures do nothing unless polled."]
pub struct BatchEnd {
	state: Rc<State>,
}

impl Future for BatchEnd {
	type Output = ();

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		if self.state.pending.get() == 0 {
			Poll::Ready(())
		} else {
			self.state.waiters.borrow_mut().push(cx.waker().clone());
			Poll::Pending
		}
	}
}
