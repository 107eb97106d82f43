use std::{
	any::Any,
	cell::{Cell, RefCell},
	collections::BTreeSet,
	fmt::{self, Debug, Formatter},
	rc::{Rc, Weak},
};

use clarion_runtime::runtime::LoopRef;
use futures_channel::oneshot;
use tracing::{debug, error};

use crate::{
	args::{Args, Params},
	class::DeclaredHandlers,
	error::{BoxError, SignalError},
	executor::{enlist, Executor},
	external::ExternalSignaller,
	handler::{Deferred, Handler, Subscriber},
	hooks::{Change, ConnectHook, Connection, Notification, NotifyHook, Validation},
	options::{Context, NotifyOptions, SignalOptions},
	results::MultipleResults,
	scope::{InstanceScope, ScopeState},
	value::Value,
	weak::{Subscribers, WeakKeyTable},
};

/// A named event with its own subscribers, optionally scoped per instance of `O`.
///
/// Handlers of one notification may return immediately, later or not at all, and their results
/// are aggregated into one [`MultipleResults`].
///
/// This is a cheaply clonable handle. Clones refer to the same signal.
///
/// - `T` is the handler result type.
/// - `A` is the argument type.
/// - `O` is the instance type that [`InstanceScope`]s and class handlers refer to.
pub struct Signal<T, A = Value, O: ?Sized = dyn Any>(Rc<RawSignal<T, A, O>>);

pub(crate) struct RawSignal<T, A, O: ?Sized> {
	name: RefCell<Option<Rc<str>>>,
	options: Cell<SignalOptions>,
	subscribers: RefCell<Subscribers<T, A>>,
	scopes: RefCell<WeakKeyTable<O, Rc<ScopeState<T, A>>>>,
	declared: RefCell<Vec<Rc<dyn DeclaredHandlers<T, A, O>>>>,
	external: RefCell<Option<Rc<dyn ExternalSignaller<T, A, O>>>>,
	event_loop: RefCell<Option<Rc<dyn LoopRef>>>,
	on_connect: RefCell<Option<ConnectHook<T, A, O>>>,
	on_disconnect: RefCell<Option<ConnectHook<T, A, O>>>,
	on_notify: RefCell<Option<NotifyHook<T, A, O>>>,
	validation: RefCell<Option<Validation<A, O>>>,
}

impl<T, A, O: ?Sized> Clone for Signal<T, A, O> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

impl<T, A, O: ?Sized> Debug for Signal<T, A, O> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Signal")
			.field("name", &self.0.name.borrow())
			.field("options", &self.0.options.get())
			.field("subscribers", &self.0.subscribers.borrow().len())
			.field("scopes", &self.0.scopes.borrow().len())
			.finish_non_exhaustive()
	}
}

impl<T: 'static + Clone, A: 'static + Clone, O: ?Sized + 'static> Default for Signal<T, A, O> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: 'static + Clone, A: 'static + Clone, O: ?Sized + 'static> Signal<T, A, O> {
	/// Creates an unnamed sequential signal.
	#[must_use]
	pub fn new() -> Self {
		Self::with_options(SignalOptions::default())
	}

	/// Creates an unnamed signal with the given `options`.
	#[must_use]
	pub fn with_options(options: SignalOptions) -> Self {
		Self(Rc::new(RawSignal {
			name: RefCell::new(None),
			options: Cell::new(options),
			subscribers: RefCell::default(),
			scopes: RefCell::default(),
			declared: RefCell::default(),
			external: RefCell::new(None),
			event_loop: RefCell::new(None),
			on_connect: RefCell::new(None),
			on_disconnect: RefCell::new(None),
			on_notify: RefCell::new(None),
			validation: RefCell::new(None),
		}))
	}

	/// Creates a named sequential signal.
	#[must_use]
	pub fn named(name: impl Into<Rc<str>>) -> Self {
		let signal = Self::new();
		*signal.0.name.borrow_mut() = Some(name.into());
		signal
	}

	/// The signal's name, if it has one.
	#[must_use]
	pub fn name(&self) -> Option<Rc<str>> {
		self.0.name.borrow().clone()
	}

	/// Names the signal, and registers it under that name with the external signaller, if any.
	pub fn set_name(&self, name: impl Into<Rc<str>>) {
		let name = name.into();
		*self.0.name.borrow_mut() = Some(Rc::clone(&name));
		if let Some(external) = self.external() {
			external.register_signal(self, &name);
		}
	}

	/// The signal's options.
	#[must_use]
	pub fn options(&self) -> SignalOptions {
		self.0.options.get()
	}

	/// Replaces the signal's options. Affects only later notifications.
	pub fn set_options(&self, options: SignalOptions) {
		self.0.options.set(options);
	}

	/// The external signaller, if any.
	#[must_use]
	pub fn external(&self) -> Option<Rc<dyn ExternalSignaller<T, A, O>>> {
		self.0.external.borrow().clone()
	}

	/// Replaces the external signaller.
	///
	/// If the signal is named, it's registered with the new one right away.
	pub fn set_external(&self, external: Option<Rc<dyn ExternalSignaller<T, A, O>>>) {
		*self.0.external.borrow_mut() = external.clone();
		if let (Some(external), Some(name)) = (external, self.name()) {
			external.register_signal(self, &name);
		}
	}

	/// The signal's own event loop, used where a notification's [`Context`] has none.
	#[must_use]
	pub fn event_loop(&self) -> Option<Rc<dyn LoopRef>> {
		self.0.event_loop.borrow().clone()
	}

	/// Replaces the signal's own event loop.
	pub fn set_event_loop(&self, event_loop: Option<Rc<dyn LoopRef>>) {
		*self.0.event_loop.borrow_mut() = event_loop;
	}

	/// Sets the connect hook. It replaces the default behaviour, which is to
	/// [`.proceed()`](`Connection::proceed`).
	#[must_use]
	pub fn on_connect(
		self,
		hook: impl 'static + Fn(&Connection<'_, T, A, O>) -> Result<Option<Deferred<()>>, BoxError>,
	) -> Self {
		*self.0.on_connect.borrow_mut() = Some(Rc::new(hook));
		self
	}

	/// Sets the disconnect hook. It replaces the default behaviour, which is to
	/// [`.proceed()`](`Connection::proceed`).
	#[must_use]
	pub fn on_disconnect(
		self,
		hook: impl 'static + Fn(&Connection<'_, T, A, O>) -> Result<Option<Deferred<()>>, BoxError>,
	) -> Self {
		*self.0.on_disconnect.borrow_mut() = Some(Rc::new(hook));
		self
	}

	/// Sets the notification hook, which wraps delivery.
	#[must_use]
	pub fn on_notify(
		self,
		hook: impl 'static + Fn(&Notification<'_, T, A, O>) -> Result<MultipleResults<T>, SignalError>,
	) -> Self {
		*self.0.on_notify.borrow_mut() = Some(Rc::new(hook));
		self
	}

	/// Sets the argument validation that every notification **must** pass.
	#[must_use]
	pub fn with_validation(self, validation: Validation<A, O>) -> Self {
		*self.0.validation.borrow_mut() = Some(validation);
		self
	}

	/// Adds a source of declared handlers for instance notifications.
	///
	/// Sources attached later are asked first. The first one that recognizes the instance wins.
	pub fn attach_declared(&self, declared: Rc<dyn DeclaredHandlers<T, A, O>>) {
		self.0.declared.borrow_mut().push(declared);
	}

	/// Connects `subscriber` at signal level.
	///
	/// Connecting an already-connected subscriber (by [`Subscriber::key`]) has no effect.
	///
	/// # Errors
	///
	/// Iff the connect hook fails.
	pub fn connect(
		&self,
		subscriber: impl Into<Subscriber<T, A>>,
	) -> Result<Option<Deferred<()>>, SignalError> {
		self.connect_with(subscriber, &Context::default())
	}

	/// Connects `subscriber` at signal level.
	///
	/// If the connect hook completes asynchronously and `context` carries a transaction,
	/// the completion is enlisted with it.
	///
	/// # Errors
	///
	/// Iff the connect hook fails.
	pub fn connect_with(
		&self,
		subscriber: impl Into<Subscriber<T, A>>,
		context: &Context,
	) -> Result<Option<Deferred<()>>, SignalError> {
		self.change(
			Change::Connect,
			&self.0.subscribers,
			None,
			&subscriber.into(),
			context,
		)
	}

	/// Disconnects `subscriber` at signal level.
	///
	/// Disconnecting an absent subscriber has no effect.
	///
	/// # Errors
	///
	/// Iff the disconnect hook fails.
	pub fn disconnect(
		&self,
		subscriber: impl Into<Subscriber<T, A>>,
	) -> Result<Option<Deferred<()>>, SignalError> {
		self.disconnect_with(subscriber, &Context::default())
	}

	/// Disconnects `subscriber` at signal level.
	///
	/// # Errors
	///
	/// Iff the disconnect hook fails.
	pub fn disconnect_with(
		&self,
		subscriber: impl Into<Subscriber<T, A>>,
		context: &Context,
	) -> Result<Option<Deferred<()>>, SignalError> {
		self.change(
			Change::Disconnect,
			&self.0.subscribers,
			None,
			&subscriber.into(),
			context,
		)
	}

	/// Removes all signal-level subscribers. Hooks aren't invoked.
	pub fn clear(&self) {
		self.0.subscribers.borrow_mut().clear();
	}

	/// **Returns** the number of live signal-level subscribers.
	#[must_use]
	pub fn len(&self) -> usize {
		self.0.subscribers.borrow().len()
	}

	/// **Returns** whether there are no live signal-level subscribers.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// **Returns** whether `subscriber` is connected at signal level.
	#[must_use]
	pub fn contains(&self, subscriber: &Subscriber<T, A>) -> bool {
		self.0.subscribers.borrow().contains(subscriber.key())
	}

	/// Notifies the signal-level subscribers, then the external signaller.
	///
	/// # Errors
	///
	/// Iff validation fails, or a handler can't bind `args` or fails synchronously.
	pub fn notify(&self, args: Args<A>) -> Result<MultipleResults<T>, SignalError> {
		self.notify_with(args, &NotifyOptions::default())
	}

	/// Notifies the signal-level subscribers, then (unless disabled) the external signaller.
	///
	/// With [`NotifyOptions::run_async`] and an event loop, this schedules the notification on the
	/// loop and returns right away. Errors are then reported through the returned results.
	///
	/// # Errors
	///
	/// Iff validation fails, or a handler can't bind `args` or fails synchronously.
	pub fn notify_with(
		&self,
		args: Args<A>,
		options: &NotifyOptions,
	) -> Result<MultipleResults<T>, SignalError> {
		self.notify_in(None, None, args, options)
	}

	/// Views this signal as seen from `instance`.
	///
	/// The instance's subscriber set is created on first access and dropped along with the instance.
	pub fn scope(&self, instance: &Rc<O>) -> InstanceScope<T, A, O> {
		let state = Rc::clone(
			self.0
				.scopes
				.borrow_mut()
				.get_or_insert_with(instance, Rc::default),
		);
		InstanceScope::new(self.clone(), Rc::clone(instance), state)
	}

	/// **Returns** whether `self` and `other` are clones of the same signal.
	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	pub(crate) fn downgrade(&self) -> Weak<RawSignal<T, A, O>> {
		Rc::downgrade(&self.0)
	}

	pub(crate) fn upgrade(weak: &Weak<RawSignal<T, A, O>>) -> Option<Self> {
		weak.upgrade().map(Self)
	}

	pub(crate) fn change(
		&self,
		change: Change,
		subscribers: &RefCell<Subscribers<T, A>>,
		instance: Option<&Rc<O>>,
		subscriber: &Subscriber<T, A>,
		context: &Context,
	) -> Result<Option<Deferred<()>>, SignalError> {
		debug!(
			signal = self.name().as_deref(),
			?change,
			scoped = instance.is_some(),
			"changing subscribers"
		);
		let hook = match change {
			Change::Connect => self.0.on_connect.borrow().clone(),
			Change::Disconnect => self.0.on_disconnect.borrow().clone(),
		};
		let Some(hook) = hook else {
			change.apply(&mut subscribers.borrow_mut(), subscriber);
			return Ok(None);
		};

		let deferred = hook(&Connection {
			signal: self,
			instance,
			subscriber,
			subscribers,
			change,
			context,
		})
		.map_err(SignalError::handler)?;
		Ok(deferred.map(|deferred| match context.transaction() {
			Some(transaction) => enlist(&**transaction, deferred),
			None => deferred,
		}))
	}

	pub(crate) fn notify_in(
		&self,
		instance: Option<&Rc<O>>,
		scope: Option<&Rc<ScopeState<T, A>>>,
		args: Args<A>,
		options: &NotifyOptions,
	) -> Result<MultipleResults<T>, SignalError> {
		let event_loop = options
			.ambient()
			.event_loop()
			.cloned()
			.or_else(|| self.event_loop());
		match event_loop {
			Some(event_loop) if options.is_run_async() => {
				Ok(self.notify_soon(&event_loop, instance, scope, args, options))
			}
			event_loop => {
				let results = self
					.prepare(instance, scope, event_loop, options)
					.run(&args)?;
				Ok(self.observed(results, instance))
			}
		}
	}

	pub(crate) fn notify_one(
		&self,
		instance: Option<&Rc<O>>,
		subscriber: &Subscriber<T, A>,
		args: Args<A>,
		context: &Context,
	) -> Result<MultipleResults<T>, SignalError> {
		let results = Executor::new([subscriber.clone()])
			.concurrent(self.options().is_concurrent())
			.validation(self.0.validation.borrow().clone())
			.instance(instance.cloned())
			.context(context.clone())
			.label(self.name())
			.run(&args)?;
		Ok(self.observed(results, instance))
	}

	fn notify_soon(
		&self,
		event_loop: &Rc<dyn LoopRef>,
		instance: Option<&Rc<O>>,
		scope: Option<&Rc<ScopeState<T, A>>>,
		args: Args<A>,
		options: &NotifyOptions,
	) -> MultipleResults<T> {
		debug!(signal = self.name().as_deref(), "notification scheduled");
		let (sender, receiver) = oneshot::channel();
		let signal = self.clone();
		let instance = instance.cloned();
		let scope = scope.cloned();
		let options = options.clone().run_async(false);
		event_loop.call_soon(Box::new(move || {
			sender
				.send(signal.notify_in(instance.as_ref(), scope.as_ref(), args, &options))
				.ok();
		}));
		MultipleResults::later(async move { receiver.await.unwrap_or(Err(SignalError::Cancelled)) })
	}

	/// Collects the endpoints: signal-level subscribers, the instance's declared handlers,
	/// the instance's own subscribers, and the external signaller last.
	fn prepare(
		&self,
		instance: Option<&Rc<O>>,
		scope: Option<&Rc<ScopeState<T, A>>>,
		event_loop: Option<Rc<dyn LoopRef>>,
		options: &NotifyOptions,
	) -> Executor<T, A, O> {
		let name = self.name();
		let mut endpoints = self.0.subscribers.borrow_mut().snapshot();
		let mut seen = endpoints
			.iter()
			.map(Subscriber::key)
			.collect::<BTreeSet<_>>();
		let mut extend = |subscribers: Vec<Subscriber<T, A>>| {
			for subscriber in subscribers {
				if seen.insert(subscriber.key()) {
					endpoints.push(subscriber);
				}
			}
		};
		if let (Some(instance), Some(name)) = (instance, &name) {
			extend(self.declared_handlers(name, instance));
		}
		if let Some(scope) = scope {
			extend(scope.snapshot());
		}

		if options.notifies_external() {
			if let Some(external) = self.external() {
				endpoints.push(self.external_endpoint(
					external,
					instance.cloned(),
					event_loop.clone(),
				));
			}
		}
		debug!(
			signal = name.as_deref(),
			endpoints = endpoints.len(),
			scoped = instance.is_some(),
			"notifying"
		);

		let mut context = Context::new();
		if let Some(event_loop) = event_loop {
			context = context.with_event_loop(event_loop);
		}
		if let Some(transaction) = options.ambient().transaction() {
			context = context.with_transaction(Rc::clone(transaction));
		}
		Executor::new(endpoints)
			.concurrent(self.options().is_concurrent())
			.wrapper(self.0.on_notify.borrow().clone())
			.validation(self.0.validation.borrow().clone())
			.instance(instance.cloned())
			.context(context)
			.label(name)
	}

	fn declared_handlers(&self, name: &str, instance: &Rc<O>) -> Vec<Subscriber<T, A>> {
		let declared = self.0.declared.borrow().clone();
		declared
			.iter()
			.rev()
			.find_map(|declared| declared.declared_handlers(name, instance))
			.unwrap_or_default()
	}

	fn external_endpoint(
		&self,
		external: Rc<dyn ExternalSignaller<T, A, O>>,
		instance: Option<Rc<O>>,
		event_loop: Option<Rc<dyn LoopRef>>,
	) -> Subscriber<T, A> {
		let signal = self.clone();
		Handler::new(Params::any(), move |bound| {
			external
				.publish(
					&signal,
					instance.as_ref(),
					event_loop.as_ref(),
					bound.into_args(),
				)
				.map_err(|error| SignalError::external(error).into())
		})
		.into()
	}

	/// Logs errors of deferred results once they surface.
	fn observed(&self, results: MultipleResults<T>, instance: Option<&Rc<O>>) -> MultipleResults<T> {
		if results.is_done() {
			return results;
		}
		let signal = self.name();
		let instance = instance.map(|instance| Rc::as_ptr(instance).cast::<()>());
		results.observe(move |outcome| {
			if let Err(error) = outcome {
				error!(
					signal = signal.as_deref(),
					?instance,
					%error,
					"error occurred while running event callbacks"
				);
			}
		})
	}
}
