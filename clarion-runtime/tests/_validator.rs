use std::{cell::RefCell, collections::VecDeque, fmt::Debug, rc::Rc};

/// Records events from inside handlers. Clones share the same log.
pub struct Validator<T>(Rc<RefCell<VecDeque<T>>>);

impl<T> Clone for Validator<T> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

impl<T> Validator<T> {
	pub fn new() -> Self {
		Self(Rc::new(RefCell::new(VecDeque::new())))
	}

	pub fn push(&self, value: T) {
		self.0.borrow_mut().push_back(value);
	}

	/// Drains the log and asserts that it matches `expected` exactly.
	#[track_caller]
	pub fn expect(&self, expected: impl IntoIterator<Item = T>)
	where
		T: Debug + PartialEq,
	{
		let actual = self.0.borrow_mut().drain(..).collect::<Vec<_>>();
		assert_eq!(actual, expected.into_iter().collect::<Vec<_>>());
	}
}
