use std::{
	any::Any,
	cell::RefCell,
	fmt::{self, Debug, Formatter},
	rc::Rc,
};

use crate::{
	args::Args,
	error::SignalError,
	handler::{Deferred, Subscriber},
	hooks::Change,
	options::{Context, NotifyOptions},
	results::MultipleResults,
	signal::Signal,
	value::Value,
	weak::Subscribers,
};

/// The per-instance part of a signal. Owned by the signal, keyed weakly by the instance.
pub(crate) struct ScopeState<T, A> {
	pub(crate) subscribers: RefCell<Subscribers<T, A>>,
}

impl<T, A> Default for ScopeState<T, A> {
	fn default() -> Self {
		Self {
			subscribers: RefCell::default(),
		}
	}
}

impl<T, A> ScopeState<T, A> {
	pub(crate) fn snapshot(&self) -> Vec<Subscriber<T, A>> {
		self.subscribers.borrow_mut().snapshot()
	}
}

/// A [`Signal`] as seen from one instance, created by [`Signal::scope`].
///
/// Subscribers connected here are notified only by this instance's notifications, which also reach
/// the signal-level subscribers and the instance's declared (class) handlers.
///
/// This view keeps the instance alive, but the signal doesn't: **don't** store it inside the instance.
/// Views of the same signal and instance share their subscribers.
pub struct InstanceScope<T, A = Value, O: ?Sized = dyn Any> {
	signal: Signal<T, A, O>,
	instance: Rc<O>,
	state: Rc<ScopeState<T, A>>,
}

impl<T, A, O: ?Sized> Clone for InstanceScope<T, A, O> {
	fn clone(&self) -> Self {
		Self {
			signal: self.signal.clone(),
			instance: Rc::clone(&self.instance),
			state: Rc::clone(&self.state),
		}
	}
}

impl<T, A, O: ?Sized> Debug for InstanceScope<T, A, O> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("InstanceScope")
			.field("signal", &self.signal)
			.field("instance", &Rc::as_ptr(&self.instance).cast::<()>())
			.field("subscribers", &self.state.subscribers.borrow().len())
			.finish()
	}
}

impl<T: 'static + Clone, A: 'static + Clone, O: ?Sized + 'static> InstanceScope<T, A, O> {
	pub(crate) fn new(signal: Signal<T, A, O>, instance: Rc<O>, state: Rc<ScopeState<T, A>>) -> Self {
		Self {
			signal,
			instance,
			state,
		}
	}

	/// The instance.
	#[must_use]
	pub fn instance(&self) -> &Rc<O> {
		&self.instance
	}

	/// The signal.
	#[must_use]
	pub fn signal(&self) -> &Signal<T, A, O> {
		&self.signal
	}

	/// **Returns** whether `self` and `other` view the same signal from the same instance.
	#[must_use]
	pub fn same_scope(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.state, &other.state)
	}

	/// Connects `subscriber` for this instance only.
	///
	/// # Errors
	///
	/// Iff the signal's connect hook fails.
	pub fn connect(
		&self,
		subscriber: impl Into<Subscriber<T, A>>,
	) -> Result<Option<Deferred<()>>, SignalError> {
		self.connect_with(subscriber, &Context::default())
	}

	/// Connects `subscriber` for this instance only.
	///
	/// # Errors
	///
	/// Iff the signal's connect hook fails.
	pub fn connect_with(
		&self,
		subscriber: impl Into<Subscriber<T, A>>,
		context: &Context,
	) -> Result<Option<Deferred<()>>, SignalError> {
		self.signal.change(
			Change::Connect,
			&self.state.subscribers,
			Some(&self.instance),
			&subscriber.into(),
			context,
		)
	}

	/// Disconnects `subscriber` from this instance.
	///
	/// # Errors
	///
	/// Iff the signal's disconnect hook fails.
	pub fn disconnect(
		&self,
		subscriber: impl Into<Subscriber<T, A>>,
	) -> Result<Option<Deferred<()>>, SignalError> {
		self.disconnect_with(subscriber, &Context::default())
	}

	/// Disconnects `subscriber` from this instance.
	///
	/// # Errors
	///
	/// Iff the signal's disconnect hook fails.
	pub fn disconnect_with(
		&self,
		subscriber: impl Into<Subscriber<T, A>>,
		context: &Context,
	) -> Result<Option<Deferred<()>>, SignalError> {
		self.signal.change(
			Change::Disconnect,
			&self.state.subscribers,
			Some(&self.instance),
			&subscriber.into(),
			context,
		)
	}

	/// Removes all of this instance's own subscribers. Hooks aren't invoked.
	pub fn clear(&self) {
		self.state.subscribers.borrow_mut().clear();
	}

	/// **Returns** the number of this instance's own live subscribers.
	#[must_use]
	pub fn len(&self) -> usize {
		self.state.subscribers.borrow().len()
	}

	/// **Returns** whether this instance has no own live subscribers.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// **Returns** whether `subscriber` is connected for this instance.
	#[must_use]
	pub fn contains(&self, subscriber: &Subscriber<T, A>) -> bool {
		self.state.subscribers.borrow().contains(subscriber.key())
	}

	/// Notifies, in order, the signal-level subscribers, this instance's declared handlers,
	/// its own subscribers and then the external signaller.
	///
	/// # Errors
	///
	/// As [`Signal::notify`].
	pub fn notify(&self, args: Args<A>) -> Result<MultipleResults<T>, SignalError> {
		self.notify_with(args, &NotifyOptions::default())
	}

	/// As [`.notify(…)`](`InstanceScope::notify`), with options.
	///
	/// # Errors
	///
	/// As [`Signal::notify_with`].
	pub fn notify_with(
		&self,
		args: Args<A>,
		options: &NotifyOptions,
	) -> Result<MultipleResults<T>, SignalError> {
		self.signal
			.notify_in(Some(&self.instance), Some(&self.state), args, options)
	}

	/// As [`.notify(…)`](`InstanceScope::notify`), but leaves out the external signaller.
	///
	/// # Errors
	///
	/// As [`Signal::notify`].
	pub fn notify_no_external(&self, args: Args<A>) -> Result<MultipleResults<T>, SignalError> {
		self.notify_with(args, &NotifyOptions::default().notify_external(false))
	}
}
