use std::{cell::Cell, rc::Rc};

use clarion::{
	args,
	runtime::{Batch, LocalLoop},
	Args, Bound, Context, Deferred, Handler, MultipleResults, Params, Signal, SignalError,
};
use futures_lite::future::yield_now;

mod _block_on;
use _block_on::assert_ready;

use _validator::Validator;

fn recorder(v: &Validator<i32>) -> Handler<i32, i32> {
	Handler::immediate(Params::new().arg("n"), {
		let v = v.clone();
		move |bound: Bound<i32>| {
			v.push(bound[0]);
			bound[0]
		}
	})
}

#[test]
fn connect_hook_can_bring_subscribers_up_to_date() {
	let v = Validator::new();
	let signal = Signal::<i32, i32>::new().on_connect(|connection| {
		if connection.proceed() {
			assert!(connection.is_connected());
			let results = connection.notify(args![0])?;
			assert!(results.is_done());
		}
		Ok(None)
	});
	let existing = recorder(&v);
	signal.connect(&existing).unwrap();
	v.expect([0]);

	let late = recorder(&v);
	assert!(signal.connect(&late).unwrap().is_none());
	// Only the new subscriber hears the catch-up notification.
	v.expect([0]);
	assert_eq!(signal.len(), 2);

	// Connecting again changes nothing, so there's no catch-up either.
	signal.connect(&late).unwrap();
	v.expect([]);
}

#[test]
fn connect_hook_may_refuse() {
	let signal = Signal::<i32, i32>::new().on_connect(|connection| {
		assert_eq!(connection.subscriber_count(), 0);
		Ok(None)
	});
	signal.connect(Handler::immediate(Params::new(), |_| 1)).unwrap();
	assert!(signal.is_empty());
}

#[test]
fn connect_hook_errors_surface() {
	let signal = Signal::<i32, i32>::new().on_connect(|_| Err("refused".into()));
	let Err(error) = signal.connect(Handler::immediate(Params::new(), |_| 1)) else {
		panic!("connect hook should have failed");
	};
	assert!(matches!(error, SignalError::Handler(_)));
	assert_eq!(error.to_string(), "handler failed: refused");
}

#[test]
fn disconnect_hook_sees_the_subscriber() {
	let seen = Rc::new(Cell::new(None));
	let signal = Signal::<i32, i32>::new().on_disconnect({
		let seen = Rc::clone(&seen);
		move |connection| {
			seen.set(Some(connection.is_connected()));
			connection.proceed();
			Ok(None)
		}
	});
	let handler = Handler::immediate(Params::new(), |_| 1);
	signal.connect(&handler).unwrap();

	signal.disconnect(&handler).unwrap();
	assert_eq!(seen.get(), Some(true));
	assert!(signal.is_empty());

	signal.disconnect(&handler).unwrap();
	assert_eq!(seen.get(), Some(false));
}

#[test]
fn scoped_connections_carry_the_instance() {
	struct Owner;

	let scoped = Rc::new(Cell::new(false));
	let signal = Signal::<i32, i32, Owner>::new().on_connect({
		let scoped = Rc::clone(&scoped);
		move |connection| {
			scoped.set(connection.instance().is_some());
			connection.proceed();
			Ok(None)
		}
	});
	let owner = Rc::new(Owner);
	signal
		.scope(&owner)
		.connect(Handler::immediate(Params::new(), |_| 1))
		.unwrap();
	assert!(scoped.get());
	assert!(signal.is_empty());
	assert_eq!(signal.scope(&owner).len(), 1);
}

#[test]
fn deferred_connect_is_enlisted() {
	let local = LocalLoop::new();
	let batch = Batch::begin(local.to_ref());
	let finished = Rc::new(Cell::new(false));

	let signal = Signal::<i32, i32>::new().on_connect({
		let finished = Rc::clone(&finished);
		move |connection| {
			connection.proceed();
			let finished = Rc::clone(&finished);
			let deferred: Deferred<()> = Box::pin(async move {
				yield_now().await;
				finished.set(true);
				Ok(())
			});
			Ok(Some(deferred))
		}
	});

	let context = Context::new().with_transaction(Rc::new(batch.clone()));
	let completion = signal
		.connect_with(Handler::immediate(Params::new(), |_| 1), &context)
		.unwrap()
		.unwrap();
	assert_eq!(signal.len(), 1);
	assert_eq!(batch.pending(), 1);
	assert!(!finished.get());

	local.run_until(batch.end()).unwrap();
	assert!(finished.get());
	assert_eq!(batch.pending(), 0);
	assert!(assert_ready(completion).is_ok());
}

#[test]
fn notify_hook_wraps_delivery() {
	let v = Validator::new();
	let signal = Signal::<i32, i32>::new().on_notify(|notification| {
		let n = notification.args().positional()[0];
		notification.proceed_with(&args![n + 1])
	});
	signal.connect(recorder(&v)).unwrap();

	let results = signal.notify(args![1]).unwrap();
	v.expect([2]);
	assert_eq!(&*assert_ready(results).unwrap(), [2]);
}

#[test]
fn notify_hook_may_swallow() {
	let v = Validator::new();
	let signal = Signal::<i32, i32>::new().on_notify(|notification| {
		assert_eq!(notification.subscribers().len(), 1);
		Ok(MultipleResults::ready([]))
	});
	signal.connect(recorder(&v)).unwrap();

	assert!(assert_ready(signal.notify(args![1]).unwrap()).unwrap().is_empty());
	v.expect([]);
	assert!(signal.notify(Args::new()).is_ok());
}
