use std::{borrow::Cow, error::Error, sync::Arc};

use thiserror::Error;

/// Boxed error type that handler bodies, hooks and external signallers fail with.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// A handler's declared parameters could not be satisfied by a notification's arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
	/// More positional arguments than positional parameters, and no catch-all.
	#[error("too many positional arguments: expected at most {expected}, given {given}")]
	TooManyPositional {
		/// Number of positional parameters.
		expected: usize,
		/// Number of positional arguments.
		given: usize,
	},
	/// A keyword argument names a parameter that was already filled positionally.
	#[error("multiple values for argument `{0}`")]
	MultipleValues(Cow<'static, str>),
	/// A parameter without default was not supplied.
	#[error("missing required argument `{0}`")]
	Missing(Cow<'static, str>),
}

/// Errors surfaced by notifications, connections, aggregate results and class registration.
///
/// [`Clone`] so that a failed [`MultipleResults`](`crate::MultipleResults`) reports the same error on every await.
#[derive(Debug, Error, Clone)]
pub enum SignalError {
	/// A handler's parameters could not be bound.
	#[error(transparent)]
	Bind(#[from] BindError),
	/// A handler (or hook) body failed.
	#[error("handler failed: {0}")]
	Handler(#[source] Arc<dyn Error + Send + Sync>),
	/// The notification's arguments were rejected by the signal's validator.
	#[error("validation of the notification arguments failed")]
	Validation,
	/// The external signaller failed to publish.
	#[error("external signaller failed: {0}")]
	External(#[source] Arc<dyn Error + Send + Sync>),
	/// A deferred result's producer went away before completing it.
	#[error("deferred result was cancelled")]
	Cancelled,
	/// A class declared a checked handler for a signal it doesn't know.
	#[error("class `{class}` has no signal named `{signal}`")]
	UnknownSignal {
		/// Name of the class.
		class: Cow<'static, str>,
		/// Name of the missing signal.
		signal: Cow<'static, str>,
	},
	/// A class extends another but doesn't limit the instances it describes.
	#[error("class `{class}` extends another class but doesn't limit its instances")]
	MissingInstances {
		/// Name of the class.
		class: Cow<'static, str>,
	},
	/// A class handler's method type doesn't match the signal it's declared for.
	#[error("handler `{member}` of class `{class}` does not match the types of signal `{signal}`")]
	HandlerType {
		/// Name of the class.
		class: Cow<'static, str>,
		/// Name of the handler.
		member: Cow<'static, str>,
		/// Name of the signal.
		signal: Cow<'static, str>,
	},
	/// A class's external signaller doesn't match the types of a signal the class declares.
	#[error("external signaller of class `{class}` does not match the types of signal `{signal}`")]
	ExternalType {
		/// Name of the class.
		class: Cow<'static, str>,
		/// Name of the signal.
		signal: Cow<'static, str>,
	},
	/// A class's external signaller failed to register it.
	#[error("error while registering class `{class}`: {source}")]
	ClassRegistration {
		/// Name of the class.
		class: Cow<'static, str>,
		/// Why registration failed.
		#[source]
		source: Arc<dyn Error + Send + Sync>,
	},
}

impl SignalError {
	/// Classifies a handler's error. [`SignalError`]s pass through unchanged, so that a handler
	/// forwarding a nested notification's failure with `?` doesn't wrap it twice.
	pub(crate) fn handler(error: BoxError) -> Self {
		match error.downcast::<Self>() {
			Ok(error) => *error,
			Err(error) => Self::Handler(Arc::from(error)),
		}
	}

	pub(crate) fn external(error: BoxError) -> Self {
		match error.downcast::<Self>() {
			Ok(error) => *error,
			Err(error) => Self::External(Arc::from(error)),
		}
	}
}
