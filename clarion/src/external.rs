use std::{any::Any, rc::Rc};

use clarion_runtime::runtime::LoopRef;

use crate::{
	args::Args,
	error::BoxError,
	handler::Outcome,
	class::Class,
	signal::Signal,
	value::Value,
};

/// Trait for bridges that forward notifications to an outside system (a message bus, a remote peer).
///
/// A signal with an external signaller invokes it after all of its own subscribers, as the last
/// endpoint of each notification, unless [`NotifyOptions::notify_external`](`crate::NotifyOptions::notify_external`)
/// is off. Its [`Outcome`] is aggregated like any handler's.
///
/// # Logic
///
/// [`.register_signal(…)`](`ExternalSignaller::register_signal`) is called whenever a signal with
/// this signaller is named, or a named signal gets this signaller. It **may** be called repeatedly
/// for the same signal.
pub trait ExternalSignaller<T, A = Value, O: ?Sized = dyn Any> {
	/// Forwards one notification of `signal`.
	///
	/// `instance` is set iff the notification was made through an [`InstanceScope`](`crate::InstanceScope`).
	/// `args` are the notification's arguments, unchanged.
	///
	/// # Errors
	///
	/// Iff forwarding fails. This is reported as [`SignalError::External`](`crate::SignalError::External`).
	fn publish(
		&self,
		signal: &Signal<T, A, O>,
		instance: Option<&Rc<O>>,
		event_loop: Option<&Rc<dyn LoopRef>>,
		args: Args<A>,
	) -> Result<Outcome<T>, BoxError>;

	/// Makes `signal` known under `name`.
	fn register_signal(&self, signal: &Signal<T, A, O>, name: &str);
}

/// An [`ExternalSignaller`] that also learns about [`Class`]es.
///
/// Set with [`ClassBuilder::external`](`crate::ClassBuilder::external`), it becomes the signaller
/// of every signal the class declares itself, and of the classes extending it.
pub trait ClassSignaller<T, A = Value, O: ?Sized = dyn Any>: ExternalSignaller<T, A, O> {
	/// Makes the freshly built `class` known, with its signals and handlers.
	///
	/// # Errors
	///
	/// Iff registration fails. The class is then not attached to its signals, and
	/// [`ClassBuilder::build`](`crate::ClassBuilder::build`) fails with
	/// [`SignalError::ClassRegistration`](`crate::SignalError::ClassRegistration`).
	fn register_class(&self, class: &Class<O>) -> Result<(), BoxError>;
}
