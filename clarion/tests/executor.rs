use std::{cell::Cell, rc::Rc};

use clarion::{
	args, Args, Bound, Executor, Handler, MultipleResults, Notification, Outcome, Params, Signal,
	SignalError, Subscriber, Value,
};
use futures_channel::oneshot;
use futures_lite::future::{block_on, yield_now};

mod _block_on;
use _block_on::{assert_pending, assert_ready};

use _validator::Validator;

#[test]
fn concurrent_mixed_results() {
	let f1 = Handler::immediate(Params::new(), |_| Value::new(42));
	let f2 = Handler::deferred(Params::new(), |_| async {
		yield_now().await;
		Ok::<_, SignalError>(Value::new("done"))
	});

	let executor = Executor::<Value, i32>::new([Subscriber::from(&f1), f2.into()]).concurrent(true);
	assert_eq!(executor.endpoints().len(), 2);

	let results = executor.run(&Args::new()).unwrap();
	assert!(results.is_concurrent());
	assert!(results.has_async());
	assert!(!results.is_done());

	let values = block_on(results).unwrap();
	assert_eq!(values[0].get::<i32>(), Some(42));
	assert_eq!(values[1].get::<&str>(), Some("done"));
}

#[test]
fn concurrent_deferred_results_complete_in_any_order() {
	let (first_sender, first) = oneshot::channel::<i32>();
	let (second_sender, second) = oneshot::channel::<i32>();
	let receivers = Rc::new([first, second].map(|receiver| Cell::new(Some(receiver))));

	let endpoints = (0..2).map(|i| {
		let receivers = Rc::clone(&receivers);
		Subscriber::from(Handler::new(Params::<()>::new(), move |_| {
			let receiver = receivers[i].take().unwrap();
			Ok(Outcome::deferred(async move {
				receiver.await.map_err(|_| "cancelled")
			}))
		}))
	});
	let mut results = Executor::<i32, ()>::new(endpoints)
		.concurrent(true)
		.run(&Args::new())
		.unwrap();

	second_sender.send(2).unwrap();
	assert_pending(&mut results);
	first_sender.send(1).unwrap();
	assert_eq!(&*assert_ready(&mut results).unwrap(), [1, 2]);
}

#[test]
fn passthrough_skips_binding() {
	let handler = Handler::immediate(Params::new(), |bound: Bound<i32>| {
		bound.values().len() + bound.rest().len() + bound.extra().len()
	});

	let adapting = Executor::<usize, i32>::new([(&handler).into()]);
	assert!(adapting.run(&args![1, 2; x = 3]).is_err());

	let passthrough = Executor::<usize, i32>::new([(&handler).into()]).adapt_params(false);
	let results = passthrough.run(&args![1, 2; x = 3]).unwrap();
	assert_eq!(&*assert_ready(results).unwrap(), [3]);
}

#[test]
fn wrapper_controls_delivery() {
	let v = Validator::new();
	let handler = Handler::immediate(Params::new().arg("n"), {
		let v = v.clone();
		move |bound: Bound<i32>| {
			v.push(bound[0]);
			bound[0]
		}
	});

	let executor = Executor::<i32, i32>::new([(&handler).into()]).wrapper(Some(Rc::new({
		let v = v.clone();
		move |notification: &Notification<'_, i32, i32>| {
			v.push(-1);
			assert_eq!(notification.subscribers().len(), 1);
			let doubled = notification.args().positional()[0] * 2;
			notification.proceed_with(&args![doubled])
		}
	})));

	let results = executor.run(&args![4]).unwrap();
	v.expect([-1, 8]);
	assert_eq!(&*assert_ready(results).unwrap(), [8]);
}

#[test]
fn expired_endpoints_are_skipped() {
	let kept = Handler::immediate(Params::<i32>::new(), |_| "kept");
	let expired = Handler::immediate(Params::<i32>::new(), |_| "expired");
	let executor = Executor::<&str, i32>::new([kept.downgrade(), expired.downgrade()]);

	drop(expired);
	assert_eq!(&*assert_ready(executor.run(&Args::new()).unwrap()).unwrap(), ["kept"]);
}

#[test]
fn nested_results_keep_their_place() {
	let inner = Handler::new(Params::<i32>::new(), |_| {
		Ok(Outcome::Many(MultipleResults::ready([1, 2])))
	});
	let outer = Handler::immediate(Params::<i32>::new(), |_| 3);

	let results = Executor::<i32, i32>::new([Subscriber::from(&inner), (&outer).into()])
		.run(&Args::new())
		.unwrap();
	assert_eq!(&*assert_ready(results).unwrap(), [1, 2, 3]);
}

#[test]
fn nested_sequential_results_keep_their_order() {
	let v = Validator::new();
	let inner = Signal::<&str, ()>::new();
	inner
		.connect(Handler::deferred(Params::new(), {
			let v = v.clone();
			move |_| {
				let v = v.clone();
				async move {
					yield_now().await;
					v.push("a");
					Ok::<_, SignalError>("a")
				}
			}
		}))
		.unwrap();
	inner
		.connect(Handler::deferred(Params::new(), {
			let v = v.clone();
			move |_| {
				let v = v.clone();
				async move {
					v.push("b");
					Ok::<_, SignalError>("b")
				}
			}
		}))
		.unwrap();

	let settled = Rc::new(Cell::new(false));
	let forward = Handler::new(Params::<()>::new(), {
		let settled = Rc::clone(&settled);
		move |_| {
			let settled = Rc::clone(&settled);
			let results = inner
				.notify(Args::new())?
				.observe(move |outcome| settled.set(outcome.is_ok()));
			Ok(Outcome::Many(results))
		}
	});

	let results = Executor::<&str, ()>::new([Subscriber::from(&forward)])
		.concurrent(true)
		.run(&Args::new())
		.unwrap();
	assert!(results.has_async());
	v.expect([]);

	assert_eq!(&*block_on(results).unwrap(), ["a", "b"]);
	v.expect(["a", "b"]);
	assert!(settled.get());
}
