//! Event loop and transaction interfaces, as well as the functional [`LocalLoop`] and [`Batch`].

use futures_lite::future::BoxedLocal;

mod batch;
mod local_loop;

pub use batch::{Batch, BatchEnd};
pub use local_loop::{LocalLoop, LoopError};

/// Trait for handles that let signals refer to a specific single-threaded event loop.
///
/// [`LocalLoop`] provides a usable default.
///
/// # Logic
///
/// Callbacks passed to [`.call_soon`](`LoopRef::call_soon`) **must not** run before the call returns.
/// They **should** run on the next iteration of the loop, in submission order.
///
/// Tasks passed to [`.spawn`](`LoopRef::spawn`) **should** be polled for the first time on the
/// next iteration and **must** be polled again after each wake-up until they complete.
pub trait LoopRef {
	/// Schedules `f` to run on the next loop iteration.
	fn call_soon(&self, f: Box<dyn FnOnce()>);

	/// Starts driving `task` on this loop.
	fn spawn(&self, task: BoxedLocal<()>);
}

/// An ambient unit of work that deferred computations can be enlisted with for coordinated completion.
///
/// Passed explicitly wherever it applies. Where there is none, deferred computations are handled
/// individually by whoever awaits them.
///
/// # Logic
///
/// An enlisted `task` **should** start running without anyone awaiting it and **must** eventually be
/// either completed or dropped.
pub trait Transaction {
	/// Hands `task` to this transaction.
	fn enlist(&self, task: BoxedLocal<()>);
}
