use clarion_runtime::runtime::{Batch, LocalLoop, LoopError, Transaction};
use futures_lite::future::{pending, yield_now};

use _block_on::{assert_pending, assert_ready};

mod _validator;
use _validator::Validator;

#[test]
fn empty_batches_end_right_away() {
	let local = LocalLoop::new();
	let batch = Batch::begin(local.to_ref());
	assert_eq!(batch.pending(), 0);
	assert_ready(batch.end());
}

#[test]
fn enlisted_tasks_run_unawaited() {
	let v = Validator::new();
	let local = LocalLoop::new();
	let batch = Batch::begin(local.to_ref());

	for i in 0..3 {
		let v = v.clone();
		batch.enlist(Box::pin(async move {
			yield_now().await;
			v.push(i);
		}));
	}
	assert_eq!(batch.pending(), 3);
	assert_pending(batch.end());
	v.expect([]);

	local.run_until(batch.end()).unwrap();
	v.expect([0, 1, 2]);
	assert_eq!(batch.pending(), 0);
	assert_eq!(local.pending_tasks(), 0);
}

#[test]
fn end_waits_for_late_enlistment() {
	let v = Validator::new();
	let local = LocalLoop::new();
	let batch = Batch::begin(local.to_ref());

	batch.enlist(Box::pin({
		let (v, batch) = (v.clone(), batch.clone());
		async move {
			v.push("first");
			batch.enlist(Box::pin({
				let v = v.clone();
				async move {
					yield_now().await;
					v.push("second");
				}
			}));
		}
	}));

	local.run_until(batch.end()).unwrap();
	v.expect(["first", "second"]);
}

#[test]
fn stuck_tasks_stall_the_loop() {
	let local = LocalLoop::new();
	let batch = Batch::begin(local.to_ref());
	batch.enlist(Box::pin(pending()));

	assert_eq!(local.run_until(batch.end()), Err(LoopError::Stalled));
	assert_eq!(batch.pending(), 1);
}

#[test]
fn dropped_tasks_are_settled() {
	let local = LocalLoop::new();
	let batch = Batch::begin(local.to_ref());
	batch.enlist(Box::pin(pending()));
	local.run_until_idle().unwrap();

	let end = batch.end();
	drop(batch);
	drop(local);
	assert_ready(end);
}
