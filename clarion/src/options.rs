use std::{
	fmt::{self, Debug, Formatter},
	rc::Rc,
};

use clarion_runtime::runtime::{LoopRef, Transaction};

/// In which order class handlers of an inheritance chain run, within one [`Placement`](`crate::Placement`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortMode {
	/// Handlers first declared by base classes run first.
	#[default]
	BottomUp,
	/// Handlers first declared by derived classes run first.
	TopDown,
}

/// Per-signal behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalOptions {
	concurrent: bool,
	sort: SortMode,
}

impl SignalOptions {
	/// Sequential and [`SortMode::BottomUp`].
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Whether deferred handler results are polled together, and enlisted with the ambient
	/// [`Transaction`], if any.
	#[must_use]
	pub fn concurrent(mut self, concurrent: bool) -> Self {
		self.concurrent = concurrent;
		self
	}

	/// The class handler order.
	#[must_use]
	pub fn sort(mut self, sort: SortMode) -> Self {
		self.sort = sort;
		self
	}

	/// See [`.concurrent(…)`](`SignalOptions::concurrent`).
	#[must_use]
	pub fn is_concurrent(&self) -> bool {
		self.concurrent
	}

	/// See [`.sort(…)`](`SignalOptions::sort`).
	#[must_use]
	pub fn sort_mode(&self) -> SortMode {
		self.sort
	}
}

/// The ambient collaborators of a notification or connection.
///
/// Passed explicitly instead of being looked up from global state.
#[derive(Clone, Default)]
pub struct Context {
	event_loop: Option<Rc<dyn LoopRef>>,
	transaction: Option<Rc<dyn Transaction>>,
}

impl Debug for Context {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Context")
			.field("event_loop", &self.event_loop.is_some())
			.field("transaction", &self.transaction.is_some())
			.finish()
	}
}

impl Context {
	/// An empty context.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the event loop.
	#[must_use]
	pub fn with_event_loop(mut self, event_loop: Rc<dyn LoopRef>) -> Self {
		self.event_loop = Some(event_loop);
		self
	}

	/// Sets the transaction deferred work is enlisted with.
	#[must_use]
	pub fn with_transaction(mut self, transaction: Rc<dyn Transaction>) -> Self {
		self.transaction = Some(transaction);
		self
	}

	/// The event loop, if any.
	#[must_use]
	pub fn event_loop(&self) -> Option<&Rc<dyn LoopRef>> {
		self.event_loop.as_ref()
	}

	/// The transaction, if any.
	#[must_use]
	pub fn transaction(&self) -> Option<&Rc<dyn Transaction>> {
		self.transaction.as_ref()
	}
}

/// How to run one notification.
#[derive(Debug, Clone)]
pub struct NotifyOptions {
	context: Context,
	run_async: bool,
	notify_external: bool,
}

impl Default for NotifyOptions {
	fn default() -> Self {
		Self {
			context: Context::default(),
			run_async: false,
			notify_external: true,
		}
	}
}

impl NotifyOptions {
	/// Synchronous, with an empty [`Context`], including the external signaller.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the [`Context`].
	#[must_use]
	pub fn context(mut self, context: Context) -> Self {
		self.context = context;
		self
	}

	/// Sets the event loop of the [`Context`].
	#[must_use]
	pub fn event_loop(mut self, event_loop: Rc<dyn LoopRef>) -> Self {
		self.context = self.context.with_event_loop(event_loop);
		self
	}

	/// Sets the transaction of the [`Context`].
	#[must_use]
	pub fn transaction(mut self, transaction: Rc<dyn Transaction>) -> Self {
		self.context = self.context.with_transaction(transaction);
		self
	}

	/// Whether to schedule the notification on the event loop instead of running it right away.
	///
	/// Without an event loop (neither here nor on the signal), this has no effect.
	#[must_use]
	pub fn run_async(mut self, run_async: bool) -> Self {
		self.run_async = run_async;
		self
	}

	/// Whether to include the signal's external signaller, if any.
	#[must_use]
	pub fn notify_external(mut self, notify_external: bool) -> Self {
		self.notify_external = notify_external;
		self
	}

	/// The [`Context`].
	#[must_use]
	pub fn ambient(&self) -> &Context {
		&self.context
	}

	/// See [`.run_async(…)`](`NotifyOptions::run_async`).
	#[must_use]
	pub fn is_run_async(&self) -> bool {
		self.run_async
	}

	/// See [`.notify_external(…)`](`NotifyOptions::notify_external`).
	#[must_use]
	pub fn notifies_external(&self) -> bool {
		self.notify_external
	}
}
