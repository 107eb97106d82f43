use std::{
	fmt::{self, Debug, Formatter},
	future::{self, Future},
	pin::Pin,
	rc::Rc,
	task::{Context, Poll},
};

use crate::{
	error::SignalError,
	handler::{Deferred, Outcome},
};

/// The aggregated results of one notification, in subscriber order.
///
/// This is a [`Future`] that completes once every deferred result has. It is [`Unpin`] and can be
/// awaited again after completion (through `&mut`), yielding the same frozen results each time.
///
/// In concurrent mode all deferred results are polled together, and the first error is reported
/// only after all of them were polled. In sequential mode each is awaited in turn and the first
/// error stops the rest.
#[must_use = "Deferred results don't make progress unless polled."]
pub struct MultipleResults<T> {
	state: State<T>,
	concurrent: bool,
	has_async: bool,
	observers: Vec<Observer<T>>,
}

type Observer<T> = Box<dyn FnOnce(Result<&[T], &SignalError>)>;

enum State<T> {
	Slots(Vec<Slot<T>>),
	Done(Rc<[T]>),
	Failed(SignalError),
}

enum Slot<T> {
	Ready(T),
	Pending(Deferred<T>),
	Group(Deferred<Rc<[T]>>),
	Spliced(Rc<[T]>),
}

// Nothing is pinned structurally: slots are boxed futures or plain values.
impl<T> Unpin for MultipleResults<T> {}

impl<T: Debug> Debug for MultipleResults<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("MultipleResults");
		match &self.state {
			State::Slots(slots) => debug.field("pending", &slots.len()),
			State::Done(results) => debug.field("results", results),
			State::Failed(error) => debug.field("error", error),
		};
		debug
			.field("concurrent", &self.concurrent)
			.field("has_async", &self.has_async)
			.finish_non_exhaustive()
	}
}

impl<T: 'static + Clone> MultipleResults<T> {
	/// Aggregates `outcomes`.
	///
	/// [`Outcome::NoResult`] is excluded and [`Outcome::Many`] is spliced in place.
	/// Iff there is nothing deferred, the results are done right away.
	pub fn new(outcomes: impl IntoIterator<Item = Outcome<T>>, concurrent: bool) -> Self {
		let mut slots = Vec::new();
		for outcome in outcomes {
			match outcome {
				Outcome::Value(value) => slots.push(Slot::Ready(value)),
				Outcome::Deferred(deferred) => slots.push(Slot::Pending(deferred)),
				Outcome::NoResult => (),
				Outcome::Many(results) => results.splice_into(&mut slots),
			}
		}

		let has_async = slots
			.iter()
			.any(|slot| matches!(slot, Slot::Pending(_) | Slot::Group(_)));
		let state = if has_async {
			State::Slots(slots)
		} else {
			State::Done(freeze(slots))
		};
		Self {
			state,
			concurrent,
			has_async,
			observers: Vec::new(),
		}
	}

	/// Immediate results.
	pub fn ready(values: impl IntoIterator<Item = T>) -> Self {
		Self::new(values.into_iter().map(Outcome::Value), false)
	}

	/// Results that become available once `future` completes.
	pub fn later(future: impl 'static + Future<Output = Result<Self, SignalError>>) -> Self {
		Self {
			state: State::Slots(vec![Slot::Group(Box::pin(async move {
				let mut results = future.await?;
				(&mut results).await
			}))]),
			concurrent: false,
			has_async: true,
			observers: Vec::new(),
		}
	}

	/// Pending results stay one group, so that they keep their own mode and observers.
	fn splice_into(mut self, slots: &mut Vec<Slot<T>>) {
		match self.state {
			State::Slots(_) => slots.push(Slot::Group(Box::pin(async move { (&mut self).await }))),
			State::Done(results) => slots.push(Slot::Spliced(results)),
			State::Failed(error) => {
				slots.push(Slot::Pending(Box::pin(future::ready(Err(error)))));
			}
		}
	}
}

impl<T> MultipleResults<T> {
	/// **Returns** whether the results are final, successfully or not.
	#[must_use]
	pub fn is_done(&self) -> bool {
		!matches!(self.state, State::Slots(_))
	}

	/// **Returns** whether any result was deferred when the aggregate was created.
	#[must_use]
	pub fn has_async(&self) -> bool {
		self.has_async
	}

	/// **Returns** whether deferred results are polled together.
	#[must_use]
	pub fn is_concurrent(&self) -> bool {
		self.concurrent
	}

	/// The frozen results, iff done successfully.
	#[must_use]
	pub fn results(&self) -> Option<Rc<[T]>> {
		match &self.state {
			State::Done(results) => Some(Rc::clone(results)),
			State::Slots(_) | State::Failed(_) => None,
		}
	}

	/// The error, iff failed.
	#[must_use]
	pub fn error(&self) -> Option<&SignalError> {
		match &self.state {
			State::Failed(error) => Some(error),
			State::Slots(_) | State::Done(_) => None,
		}
	}

	/// Registers `observer` to run once the results are final.
	///
	/// If they already are, it runs right away.
	pub fn observe(mut self, observer: impl 'static + FnOnce(Result<&[T], &SignalError>)) -> Self {
		match &self.state {
			State::Slots(_) => self.observers.push(Box::new(observer)),
			State::Done(results) => observer(Ok(&**results)),
			State::Failed(error) => observer(Err(error)),
		}
		self
	}

	fn settle(&mut self) {
		let outcome = match &self.state {
			State::Done(results) => Ok(&**results),
			State::Failed(error) => Err(error),
			State::Slots(_) => return,
		};
		for observer in self.observers.drain(..) {
			observer(outcome);
		}
	}
}

impl<T: Clone> Future for MultipleResults<T> {
	type Output = Result<Rc<[T]>, SignalError>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.get_mut();
		if let State::Slots(slots) = &mut this.state {
			let poll = if this.concurrent {
				poll_concurrent(slots, cx)
			} else {
				poll_sequential(slots, cx)
			};
			this.state = match poll {
				Poll::Pending => return Poll::Pending,
				Poll::Ready(Ok(())) => State::Done(freeze(slots.drain(..))),
				Poll::Ready(Err(error)) => State::Failed(error),
			};
			this.settle();
		}

		Poll::Ready(match &this.state {
			State::Done(results) => Ok(Rc::clone(results)),
			State::Failed(error) => Err(error.clone()),
			State::Slots(_) => unreachable!(),
		})
	}
}

fn poll_sequential<T>(slots: &mut [Slot<T>], cx: &mut Context<'_>) -> Poll<Result<(), SignalError>> {
	for slot in slots {
		match poll_slot(slot, cx) {
			Poll::Ready(Ok(())) => (),
			other => return other,
		}
	}
	Poll::Ready(Ok(()))
}

fn poll_concurrent<T>(slots: &mut [Slot<T>], cx: &mut Context<'_>) -> Poll<Result<(), SignalError>> {
	let mut pending = false;
	let mut failure = None;
	for slot in slots {
		match poll_slot(slot, cx) {
			Poll::Ready(Ok(())) => (),
			Poll::Ready(Err(error)) => {
				failure.get_or_insert(error);
			}
			Poll::Pending => pending = true,
		}
	}

	match failure {
		Some(error) => Poll::Ready(Err(error)),
		None if pending => Poll::Pending,
		None => Poll::Ready(Ok(())),
	}
}

/// Resolves `slot` in place once its future completes.
fn poll_slot<T>(slot: &mut Slot<T>, cx: &mut Context<'_>) -> Poll<Result<(), SignalError>> {
	let resolved = match slot {
		Slot::Ready(_) | Slot::Spliced(_) => return Poll::Ready(Ok(())),
		Slot::Pending(deferred) => match deferred.as_mut().poll(cx) {
			Poll::Ready(result) => result.map(Slot::Ready),
			Poll::Pending => return Poll::Pending,
		},
		Slot::Group(deferred) => match deferred.as_mut().poll(cx) {
			Poll::Ready(result) => result.map(Slot::Spliced),
			Poll::Pending => return Poll::Pending,
		},
	};
	*slot = resolved?;
	Poll::Ready(Ok(()))
}

fn freeze<T: Clone>(slots: impl IntoIterator<Item = Slot<T>>) -> Rc<[T]> {
	let mut values = Vec::new();
	for slot in slots {
		match slot {
			Slot::Ready(value) => values.push(value),
			Slot::Spliced(results) => values.extend(results.iter().cloned()),
			Slot::Pending(_) | Slot::Group(_) => unreachable!("froze unresolved slot"),
		}
	}
	values.into()
}
