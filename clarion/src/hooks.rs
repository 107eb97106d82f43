//! Customization points of a [`Signal`]: connection and notification hooks, and argument validation.

use std::{
	any::Any,
	cell::RefCell,
	fmt::{self, Debug, Formatter},
	rc::Rc,
};

use crate::{
	args::{Args, Bound, Params},
	error::{BoxError, SignalError},
	handler::{Deferred, Subscriber},
	options::Context,
	results::MultipleResults,
	signal::Signal,
	value::Value,
	weak::Subscribers,
};

/// A connect or disconnect hook.
///
/// It decides whether to [`.proceed()`](`Connection::proceed`) and may return a [`Deferred`] to
/// signal asynchronous completion.
pub type ConnectHook<T, A, O> =
	Rc<dyn Fn(&Connection<'_, T, A, O>) -> Result<Option<Deferred<()>>, BoxError>>;

/// A notification hook. It wraps the delivery and **should** call [`Notification::proceed`] or
/// [`Notification::proceed_with`] to actually notify the subscribers.
pub type NotifyHook<T, A, O> =
	Rc<dyn Fn(&Notification<'_, T, A, O>) -> Result<MultipleResults<T>, SignalError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Change {
	Connect,
	Disconnect,
}

impl Change {
	pub(crate) fn apply<T, A>(self, subscribers: &mut Subscribers<T, A>, subscriber: &Subscriber<T, A>) -> bool {
		match self {
			Self::Connect => subscribers.insert(subscriber.clone()),
			Self::Disconnect => subscribers.remove(subscriber.key()),
		}
	}
}

/// What a [`ConnectHook`] sees.
pub struct Connection<'a, T, A = Value, O: ?Sized = dyn Any> {
	pub(crate) signal: &'a Signal<T, A, O>,
	pub(crate) instance: Option<&'a Rc<O>>,
	pub(crate) subscriber: &'a Subscriber<T, A>,
	pub(crate) subscribers: &'a RefCell<Subscribers<T, A>>,
	pub(crate) change: Change,
	pub(crate) context: &'a Context,
}

impl<T, A, O: ?Sized> Debug for Connection<'_, T, A, O> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("change", &self.change)
			.field("scoped", &self.instance.is_some())
			.field("subscriber", self.subscriber)
			.finish_non_exhaustive()
	}
}

impl<'a, T: 'static + Clone, A: 'static + Clone, O: ?Sized + 'static> Connection<'a, T, A, O> {
	/// The signal being connected to or disconnected from.
	#[must_use]
	pub fn signal(&self) -> &'a Signal<T, A, O> {
		self.signal
	}

	/// The instance whose scope is affected, if any.
	#[must_use]
	pub fn instance(&self) -> Option<&'a Rc<O>> {
		self.instance
	}

	/// The subscriber being connected or disconnected.
	#[must_use]
	pub fn subscriber(&self) -> &'a Subscriber<T, A> {
		self.subscriber
	}

	/// The ambient context of the connection.
	#[must_use]
	pub fn context(&self) -> &'a Context {
		self.context
	}

	/// **Returns** the number of live subscribers in the affected set.
	#[must_use]
	pub fn subscriber_count(&self) -> usize {
		self.subscribers.borrow().len()
	}

	/// **Returns** whether [`.subscriber()`](`Connection::subscriber`) is currently in the affected set.
	#[must_use]
	pub fn is_connected(&self) -> bool {
		self.subscribers.borrow().contains(self.subscriber.key())
	}

	/// Performs the default connect or disconnect.
	///
	/// **Returns** whether the set changed.
	pub fn proceed(&self) -> bool {
		self.change.apply(&mut self.subscribers.borrow_mut(), self.subscriber)
	}

	/// Notifies only [`.subscriber()`](`Connection::subscriber`), for example to bring it
	/// up to date right after connecting.
	///
	/// # Errors
	///
	/// As [`Signal::notify`], except that hooks aren't invoked.
	pub fn notify(&self, args: Args<A>) -> Result<MultipleResults<T>, SignalError> {
		self.signal
			.notify_one(self.instance, self.subscriber, args, self.context)
	}
}

/// What a [`NotifyHook`] sees.
pub struct Notification<'a, T, A = Value, O: ?Sized = dyn Any> {
	pub(crate) instance: Option<&'a Rc<O>>,
	pub(crate) subscribers: &'a [Subscriber<T, A>],
	pub(crate) args: &'a Args<A>,
	pub(crate) proceed: &'a dyn Fn(&Args<A>) -> Result<MultipleResults<T>, SignalError>,
}

impl<T, A: Debug, O: ?Sized> Debug for Notification<'_, T, A, O> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Notification")
			.field("scoped", &self.instance.is_some())
			.field("subscribers", &self.subscribers)
			.field("args", self.args)
			.finish_non_exhaustive()
	}
}

impl<'a, T, A, O: ?Sized> Notification<'a, T, A, O> {
	/// The notified instance, if any.
	#[must_use]
	pub fn instance(&self) -> Option<&'a Rc<O>> {
		self.instance
	}

	/// The endpoints about to be notified, in order.
	#[must_use]
	pub fn subscribers(&self) -> &'a [Subscriber<T, A>] {
		self.subscribers
	}

	/// The notification's arguments.
	#[must_use]
	pub fn args(&self) -> &'a Args<A> {
		self.args
	}

	/// Notifies all [`.subscribers()`](`Notification::subscribers`) with the original arguments.
	///
	/// # Errors
	///
	/// Iff a subscriber fails synchronously or can't bind the arguments.
	pub fn proceed(&self) -> Result<MultipleResults<T>, SignalError> {
		(self.proceed)(self.args)
	}

	/// Notifies all [`.subscribers()`](`Notification::subscribers`) with other arguments.
	///
	/// # Errors
	///
	/// Iff a subscriber fails synchronously or can't bind the arguments.
	pub fn proceed_with(&self, args: &Args<A>) -> Result<MultipleResults<T>, SignalError> {
		(self.proceed)(args)
	}
}

/// A predicate that notifications must satisfy before any subscriber runs.
///
/// The arguments are bound to the validator's own [`Params`] first.
pub struct Validation<A = Value, O: ?Sized = dyn Any> {
	params: Rc<Params<A>>,
	check: Rc<dyn Fn(Option<&Rc<O>>, &Bound<A>) -> bool>,
}

impl<A, O: ?Sized> Clone for Validation<A, O> {
	fn clone(&self) -> Self {
		Self {
			params: Rc::clone(&self.params),
			check: Rc::clone(&self.check),
		}
	}
}

impl<A: Debug, O: ?Sized> Debug for Validation<A, O> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Validation")
			.field("params", &self.params)
			.finish_non_exhaustive()
	}
}

impl<A, O: ?Sized> Validation<A, O> {
	/// Creates a validator from its parameters and predicate.
	///
	/// The predicate receives the notified instance, if any.
	pub fn new(params: Params<A>, check: impl 'static + Fn(Option<&Rc<O>>, &Bound<A>) -> bool) -> Self {
		Self {
			params: Rc::new(params),
			check: Rc::new(check),
		}
	}

	/// Checks `args`.
	///
	/// # Errors
	///
	/// [`SignalError::Bind`] iff `args` don't fit the validator's parameters,
	/// [`SignalError::Validation`] iff the predicate rejects them.
	pub fn validate(&self, instance: Option<&Rc<O>>, args: &Args<A>) -> Result<(), SignalError>
	where
		A: Clone,
	{
		let bound = self.params.bind(args)?;
		if (self.check)(instance, &bound) {
			Ok(())
		} else {
			Err(SignalError::Validation)
		}
	}
}
