use std::{
	any::Any,
	fmt::{self, Debug, Formatter},
	future::Future,
	rc::{Rc, Weak},
};

use futures_lite::future::BoxedLocal;

use crate::{
	args::{Bound, Params},
	error::{BoxError, SignalError},
	results::MultipleResults,
	value::Value,
};

/// A handler result that completes later.
pub type Deferred<T> = BoxedLocal<Result<T, SignalError>>;

/// What a handler body returns.
pub type HandlerResult<T> = Result<Outcome<T>, BoxError>;

/// One handler's contribution to a notification's [`MultipleResults`].
pub enum Outcome<T> {
	/// An immediate result.
	Value(T),
	/// A result that completes later.
	Deferred(Deferred<T>),
	/// Nothing. Excluded from the aggregate.
	NoResult,
	/// A nested aggregate (for example from a forwarded notification),
	/// spliced into the outer one in place.
	Many(MultipleResults<T>),
}

impl<T> From<T> for Outcome<T> {
	fn from(value: T) -> Self {
		Self::Value(value)
	}
}

impl<T: Debug> Debug for Outcome<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
			Self::Deferred(_) => f.debug_tuple("Deferred").finish_non_exhaustive(),
			Self::NoResult => f.write_str("NoResult"),
			Self::Many(results) => f.debug_tuple("Many").field(results).finish(),
		}
	}
}

impl<T: 'static> Outcome<T> {
	/// Wraps a fallible future as [`Outcome::Deferred`].
	pub fn deferred<E: Into<BoxError>>(
		future: impl 'static + Future<Output = Result<T, E>>,
	) -> Self {
		Self::Deferred(Box::pin(async move {
			future.await.map_err(|error| SignalError::handler(error.into()))
		}))
	}

	/// **Returns** whether this is [`Outcome::Deferred`].
	#[must_use]
	pub fn is_deferred(&self) -> bool {
		matches!(self, Self::Deferred(_))
	}
}

type HandlerFn<T, A> = dyn Fn(Bound<A>) -> HandlerResult<T>;
type MethodFn<T, A, O> = dyn Fn(&Rc<O>, Bound<A>) -> HandlerResult<T>;

/// A free-standing handler: a function with declared [`Params`].
///
/// Clones share their identity, see [`Subscriber::key`].
pub struct Handler<T, A = Value> {
	params: Rc<Params<A>>,
	f: Rc<HandlerFn<T, A>>,
}

impl<T, A> Clone for Handler<T, A> {
	fn clone(&self) -> Self {
		Self {
			params: Rc::clone(&self.params),
			f: Rc::clone(&self.f),
		}
	}
}

impl<T, A: Debug> Debug for Handler<T, A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Handler")
			.field("params", &self.params)
			.field("f", &Rc::as_ptr(&self.f).cast::<()>())
			.finish()
	}
}

impl<T: 'static, A: 'static> Handler<T, A> {
	/// Creates a handler that may fail or defer.
	pub fn new(params: Params<A>, f: impl 'static + Fn(Bound<A>) -> HandlerResult<T>) -> Self {
		Self {
			params: Rc::new(params),
			f: Rc::new(f),
		}
	}

	/// Creates a handler that always returns a value right away.
	pub fn immediate(params: Params<A>, f: impl 'static + Fn(Bound<A>) -> T) -> Self {
		Self::new(params, move |bound| Ok(Outcome::Value(f(bound))))
	}

	/// Creates a handler whose result completes later.
	pub fn deferred<F, E>(params: Params<A>, f: impl 'static + Fn(Bound<A>) -> F) -> Self
	where
		F: 'static + Future<Output = Result<T, E>>,
		E: Into<BoxError>,
	{
		Self::new(params, move |bound| Ok(Outcome::deferred(f(bound))))
	}

	/// Creates a [`Subscriber`] that doesn't keep this handler alive.
	///
	/// It expires once all clones of this [`Handler`] are dropped.
	#[must_use]
	pub fn downgrade(&self) -> Subscriber<T, A> {
		Subscriber(Entry::WeakFunction {
			f: Rc::downgrade(&self.f),
			params: Rc::clone(&self.params),
		})
	}
}

impl<T, A> Handler<T, A> {
	/// The declared parameters.
	#[must_use]
	pub fn params(&self) -> &Params<A> {
		&self.params
	}

	/// Calls the handler body directly.
	///
	/// # Errors
	///
	/// Iff the handler body fails.
	pub fn call(&self, bound: Bound<A>) -> HandlerResult<T> {
		(self.f)(bound)
	}

	/// **Returns** whether `self` and `other` are clones of the same handler.
	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.f, &other.f)
	}
}

/// A handler that is declared once and bound to many owners, like a method.
///
/// Binding with [`Method::bind`] holds the owner weakly: the [`Subscriber`] expires with it.
pub struct Method<T, A = Value, O: ?Sized = dyn Any> {
	params: Rc<Params<A>>,
	f: Rc<MethodFn<T, A, O>>,
}

impl<T, A, O: ?Sized> Clone for Method<T, A, O> {
	fn clone(&self) -> Self {
		Self {
			params: Rc::clone(&self.params),
			f: Rc::clone(&self.f),
		}
	}
}

impl<T, A: Debug, O: ?Sized> Debug for Method<T, A, O> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Method")
			.field("params", &self.params)
			.field("f", &Rc::as_ptr(&self.f).cast::<()>())
			.finish()
	}
}

impl<T: 'static, A: 'static, O: ?Sized + 'static> Method<T, A, O> {
	/// Creates a method that may fail or defer.
	pub fn new(
		params: Params<A>,
		f: impl 'static + Fn(&Rc<O>, Bound<A>) -> HandlerResult<T>,
	) -> Self {
		Self {
			params: Rc::new(params),
			f: Rc::new(f),
		}
	}

	/// Creates a method that always returns a value right away.
	pub fn immediate(params: Params<A>, f: impl 'static + Fn(&O, Bound<A>) -> T) -> Self {
		Self::new(params, move |owner, bound| Ok(Outcome::Value(f(owner, bound))))
	}

	/// Creates a method whose result completes later.
	pub fn deferred<F, E>(params: Params<A>, f: impl 'static + Fn(&Rc<O>, Bound<A>) -> F) -> Self
	where
		F: 'static + Future<Output = Result<T, E>>,
		E: Into<BoxError>,
	{
		Self::new(params, move |owner, bound| {
			Ok(Outcome::deferred(f(owner, bound)))
		})
	}

	/// Binds this method to `owner`, weakly.
	///
	/// Bindings of the same method to the same owner have the same [`Subscriber::key`].
	#[must_use]
	pub fn bind(&self, owner: &Rc<O>) -> Subscriber<T, A> {
		Subscriber(Entry::Method {
			key: SubscriberKey {
				owner: Some(address(owner)),
				function: address(&self.f),
			},
			target: Rc::new(WeakOwner {
				owner: Rc::downgrade(owner),
				method: self.clone(),
			}),
			params: Rc::clone(&self.params),
		})
	}
}

impl<T, A, O: ?Sized> Method<T, A, O> {
	/// The declared parameters.
	#[must_use]
	pub fn params(&self) -> &Params<A> {
		&self.params
	}
}

fn address<T: ?Sized>(rc: &Rc<T>) -> usize {
	Rc::as_ptr(rc).cast::<()>() as usize
}

/// Identity of a [`Subscriber`]: the function's address, plus the owner's for bound methods.
///
/// The referenced allocations are kept by the subscriber (if only weakly),
/// so a key can't be reused while any subscriber with it exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberKey {
	owner: Option<usize>,
	function: usize,
}

/// Type-erases the owner of a bound [`Method`].
trait BoundTarget<T, A> {
	fn is_alive(&self) -> bool;
	fn call(&self, bound: Bound<A>) -> Option<HandlerResult<T>>;
}

struct WeakOwner<T, A, O: ?Sized> {
	owner: Weak<O>,
	method: Method<T, A, O>,
}

impl<T, A, O: ?Sized> BoundTarget<T, A> for WeakOwner<T, A, O> {
	fn is_alive(&self) -> bool {
		self.owner.strong_count() > 0
	}

	fn call(&self, bound: Bound<A>) -> Option<HandlerResult<T>> {
		let owner = self.owner.upgrade()?;
		Some((self.method.f)(&owner, bound))
	}
}

/// A connectable handler: a [`Handler`] held strongly or weakly, or a [`Method`] bound to an owner.
///
/// Signals hold at most one subscriber per [`SubscriberKey`].
pub struct Subscriber<T, A = Value>(Entry<T, A>);

enum Entry<T, A> {
	Function(Handler<T, A>),
	WeakFunction {
		f: Weak<HandlerFn<T, A>>,
		params: Rc<Params<A>>,
	},
	Method {
		key: SubscriberKey,
		target: Rc<dyn BoundTarget<T, A>>,
		params: Rc<Params<A>>,
	},
}

impl<T, A> Clone for Subscriber<T, A> {
	fn clone(&self) -> Self {
		Self(match &self.0 {
			Entry::Function(handler) => Entry::Function(handler.clone()),
			Entry::WeakFunction { f, params } => Entry::WeakFunction {
				f: Weak::clone(f),
				params: Rc::clone(params),
			},
			Entry::Method {
				key,
				target,
				params,
			} => Entry::Method {
				key: *key,
				target: Rc::clone(target),
				params: Rc::clone(params),
			},
		})
	}
}

impl<T, A> Debug for Subscriber<T, A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let kind = match self.0 {
			Entry::Function(_) => "Function",
			Entry::WeakFunction { .. } => "WeakFunction",
			Entry::Method { .. } => "Method",
		};
		f.debug_struct("Subscriber")
			.field("kind", &kind)
			.field("key", &self.key())
			.field("alive", &self.is_alive())
			.finish()
	}
}

impl<T, A> From<Handler<T, A>> for Subscriber<T, A> {
	fn from(handler: Handler<T, A>) -> Self {
		Self(Entry::Function(handler))
	}
}

impl<T, A> From<&Handler<T, A>> for Subscriber<T, A> {
	fn from(handler: &Handler<T, A>) -> Self {
		Self(Entry::Function(handler.clone()))
	}
}

impl<T, A> Subscriber<T, A> {
	/// This subscriber's identity.
	#[must_use]
	pub fn key(&self) -> SubscriberKey {
		match &self.0 {
			Entry::Function(handler) => SubscriberKey {
				owner: None,
				function: address(&handler.f),
			},
			Entry::WeakFunction { f, .. } => SubscriberKey {
				owner: None,
				function: f.as_ptr().cast::<()>() as usize,
			},
			Entry::Method { key, .. } => *key,
		}
	}

	/// **Returns** whether the handler (and owner, if any) still exist.
	///
	/// Expired subscribers are skipped and pruned lazily.
	#[must_use]
	pub fn is_alive(&self) -> bool {
		match &self.0 {
			Entry::Function(_) => true,
			Entry::WeakFunction { f, .. } => f.strong_count() > 0,
			Entry::Method { target, .. } => target.is_alive(),
		}
	}

	/// The declared parameters.
	#[must_use]
	pub fn params(&self) -> &Params<A> {
		match &self.0 {
			Entry::Function(handler) => &handler.params,
			Entry::WeakFunction { params, .. } | Entry::Method { params, .. } => params,
		}
	}

	/// Calls the handler, or **returns** [`None`] iff it has expired.
	pub(crate) fn call(&self, bound: Bound<A>) -> Option<HandlerResult<T>> {
		match &self.0 {
			Entry::Function(handler) => Some(handler.call(bound)),
			Entry::WeakFunction { f, .. } => f.upgrade().map(|f| f(bound)),
			Entry::Method { target, .. } => target.call(bound),
		}
	}
}
