use std::{
	any::Any,
	fmt::{self, Debug, Formatter},
	rc::Rc,
};

use clarion_runtime::runtime::Transaction;
use futures_channel::oneshot;
use tap::{Pipe, TapFallible};
use tracing::{error, trace};

use crate::{
	args::{Args, Bound},
	error::SignalError,
	handler::{Deferred, Outcome, Subscriber},
	hooks::{Notification, NotifyHook, Validation},
	options::Context,
	results::MultipleResults,
	value::Value,
};

/// Runs one set of endpoints with one set of arguments and aggregates their results.
///
/// This is what [`Signal`](`crate::Signal`) uses internally, but it's also usable on its own.
pub struct Executor<T, A = Value, O: ?Sized = dyn Any> {
	endpoints: Vec<Subscriber<T, A>>,
	concurrent: bool,
	adapt_params: bool,
	wrapper: Option<NotifyHook<T, A, O>>,
	validation: Option<Validation<A, O>>,
	instance: Option<Rc<O>>,
	context: Context,
	label: Option<Rc<str>>,
}

impl<T, A, O: ?Sized> Debug for Executor<T, A, O> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Executor")
			.field("label", &self.label)
			.field("endpoints", &self.endpoints)
			.field("concurrent", &self.concurrent)
			.field("adapt_params", &self.adapt_params)
			.field("context", &self.context)
			.finish_non_exhaustive()
	}
}

impl<T: 'static + Clone, A: 'static + Clone, O: ?Sized + 'static> Executor<T, A, O> {
	/// Creates a sequential executor that adapts the arguments to each endpoint.
	pub fn new(endpoints: impl IntoIterator<Item = Subscriber<T, A>>) -> Self {
		Self {
			endpoints: endpoints.into_iter().collect(),
			concurrent: false,
			adapt_params: true,
			wrapper: None,
			validation: None,
			instance: None,
			context: Context::default(),
			label: None,
		}
	}

	/// Whether deferred results are polled together and enlisted with the context's transaction.
	#[must_use]
	pub fn concurrent(mut self, concurrent: bool) -> Self {
		self.concurrent = concurrent;
		self
	}

	/// Whether to bind the arguments to each endpoint's [`Params`](`crate::Params`).
	///
	/// If not, every endpoint receives them via [`Bound::passthrough`].
	#[must_use]
	pub fn adapt_params(mut self, adapt_params: bool) -> Self {
		self.adapt_params = adapt_params;
		self
	}

	/// Wraps the delivery in `wrapper`.
	#[must_use]
	pub fn wrapper(mut self, wrapper: Option<NotifyHook<T, A, O>>) -> Self {
		self.wrapper = wrapper;
		self
	}

	/// Checks the arguments before anything runs.
	#[must_use]
	pub fn validation(mut self, validation: Option<Validation<A, O>>) -> Self {
		self.validation = validation;
		self
	}

	/// The instance handed to the wrapper and validation.
	#[must_use]
	pub fn instance(mut self, instance: Option<Rc<O>>) -> Self {
		self.instance = instance;
		self
	}

	/// The ambient context.
	#[must_use]
	pub fn context(mut self, context: Context) -> Self {
		self.context = context;
		self
	}

	/// A name used in diagnostics.
	#[must_use]
	pub fn label(mut self, label: Option<Rc<str>>) -> Self {
		self.label = label;
		self
	}

	/// The endpoints, in order.
	#[must_use]
	pub fn endpoints(&self) -> &[Subscriber<T, A>] {
		&self.endpoints
	}

	/// Validates `args`, then calls every live endpoint in order, through the wrapper if any.
	///
	/// Expired endpoints are skipped, [`Outcome::NoResult`] is excluded and nested aggregates are spliced.
	///
	/// # Errors
	///
	/// Iff validation fails, or an endpoint can't bind `args` or fails synchronously.
	/// Later endpoints don't run in that case. The error is also logged.
	pub fn run(&self, args: &Args<A>) -> Result<MultipleResults<T>, SignalError> {
		if let Some(validation) = &self.validation {
			validation.validate(self.instance.as_ref(), args)?;
		}

		let results = match &self.wrapper {
			None => self.exec_all(args),
			Some(wrapper) => wrapper(&Notification {
				instance: self.instance.as_ref(),
				subscribers: &self.endpoints,
				args,
				proceed: &|args: &Args<A>| self.exec_all(args),
			}),
		};
		results.tap_err(|error| {
			error!(
				signal = self.label.as_deref(),
				instance = ?self.instance.as_ref().map(|instance| Rc::as_ptr(instance).cast::<()>()),
				%error,
				"error while executing handlers"
			);
		})
	}

	fn exec_all(&self, args: &Args<A>) -> Result<MultipleResults<T>, SignalError> {
		let mut outcomes = Vec::with_capacity(self.endpoints.len());
		for endpoint in self.endpoints.iter().filter(|endpoint| endpoint.is_alive()) {
			let bound = if self.adapt_params {
				endpoint.params().bind(args)?
			} else {
				Bound::passthrough(args.clone())
			};
			let Some(outcome) = endpoint.call(bound) else {
				continue;
			};
			outcomes.push(outcome.map_err(SignalError::handler)?);
		}
		trace!(
			signal = self.label.as_deref(),
			outcomes = outcomes.len(),
			concurrent = self.concurrent,
			"handlers executed"
		);

		let results = match (self.concurrent, self.context.transaction()) {
			(true, Some(transaction)) => outcomes
				.into_iter()
				.map(|outcome| match outcome {
					Outcome::Deferred(deferred) => Outcome::Deferred(enlist(&**transaction, deferred)),
					outcome => outcome,
				})
				.pipe(|outcomes| MultipleResults::new(outcomes, true)),
			(concurrent, _) => MultipleResults::new(outcomes, concurrent),
		};
		Ok(results)
	}
}

/// Hands `deferred` to `transaction` and **returns** a stand-in for its result.
///
/// The stand-in fails with [`SignalError::Cancelled`] if the transaction drops the task.
pub(crate) fn enlist<T: 'static>(transaction: &dyn Transaction, deferred: Deferred<T>) -> Deferred<T> {
	let (sender, receiver) = oneshot::channel();
	transaction.enlist(Box::pin(async move {
		sender.send(deferred.await).ok();
	}));
	Box::pin(async move { receiver.await.unwrap_or(Err(SignalError::Cancelled)) })
}
