use std::{
	future::{Future, IntoFuture},
	pin::pin,
	sync::Arc,
	task::{Context, Poll, Wake, Waker},
};

struct Noop;

impl Wake for Noop {
	fn wake(self: Arc<Self>) {}
}

/// Polls `f` once and **returns** its output.
#[track_caller]
#[allow(dead_code)]
pub fn assert_ready<T>(f: impl IntoFuture<Output = T>) -> T {
	match pin!(f.into_future()).poll(&mut Context::from_waker(&Waker::from(Arc::new(Noop)))) {
		Poll::Ready(value) => value,
		Poll::Pending => panic!("Unexpectedly not ready!"),
	}
}

/// Polls `f` once and asserts that it's pending.
#[track_caller]
#[allow(dead_code)]
pub fn assert_pending<T>(f: impl IntoFuture<Output = T>) {
	if pin!(f.into_future())
		.poll(&mut Context::from_waker(&Waker::from(Arc::new(Noop))))
		.is_ready()
	{
		panic!("Unexpectedly ready!");
	}
}
