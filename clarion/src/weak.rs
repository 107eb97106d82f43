//! Weakly-held bookkeeping: subscriber sets and per-instance tables.
//!
//! Both prune expired entries lazily, whenever they are accessed mutably.

use std::{
	fmt::{self, Debug, Formatter},
	rc::{Rc, Weak},
};

use crate::{
	handler::{Subscriber, SubscriberKey},
	value::Value,
};

/// An insertion-ordered set of [`Subscriber`]s, unique by [`SubscriberKey`].
pub struct Subscribers<T, A = Value> {
	entries: Vec<Subscriber<T, A>>,
}

impl<T, A> Default for Subscribers<T, A> {
	fn default() -> Self {
		Self {
			entries: Vec::new(),
		}
	}
}

impl<T, A> Debug for Subscribers<T, A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(&self.entries).finish()
	}
}

impl<T, A> Subscribers<T, A> {
	/// Creates an empty set.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Drops expired entries.
	pub fn prune(&mut self) {
		self.entries.retain(Subscriber::is_alive);
	}

	/// **Returns** whether a live entry with `key` is present.
	#[must_use]
	pub fn contains(&self, key: SubscriberKey) -> bool {
		self.entries
			.iter()
			.any(|entry| entry.is_alive() && entry.key() == key)
	}

	/// Appends `subscriber` unless an entry with the same key is already present.
	///
	/// **Returns** whether it was added.
	pub fn insert(&mut self, subscriber: Subscriber<T, A>) -> bool {
		self.prune();
		if self.contains(subscriber.key()) {
			return false;
		}
		self.entries.push(subscriber);
		true
	}

	/// Removes the entry with `key`.
	///
	/// **Returns** whether one was present.
	pub fn remove(&mut self, key: SubscriberKey) -> bool {
		self.prune();
		let len = self.entries.len();
		self.entries.retain(|entry| entry.key() != key);
		self.entries.len() != len
	}

	/// Removes all entries.
	pub fn clear(&mut self) {
		self.entries.clear();
	}

	/// **Returns** the number of live entries.
	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.iter().filter(|entry| entry.is_alive()).count()
	}

	/// **Returns** whether there are no live entries.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Prunes, then clones the live entries in insertion order.
	///
	/// Notifications iterate over such a snapshot, so that handlers may connect or disconnect freely.
	pub fn snapshot(&mut self) -> Vec<Subscriber<T, A>> {
		self.prune();
		self.entries.clone()
	}
}

/// A map from [`Rc`] identity to `V` that doesn't keep its keys alive.
///
/// Entries are dropped once their key has been.
pub struct WeakKeyTable<K: ?Sized, V> {
	entries: Vec<(Weak<K>, V)>,
}

impl<K: ?Sized, V> Default for WeakKeyTable<K, V> {
	fn default() -> Self {
		Self {
			entries: Vec::new(),
		}
	}
}

impl<K: ?Sized, V: Debug> Debug for WeakKeyTable<K, V> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_list()
			.entries(
				self.entries
					.iter()
					.filter(|(key, _)| key.strong_count() > 0)
					.map(|(_, value)| value),
			)
			.finish()
	}
}

impl<K: ?Sized, V> WeakKeyTable<K, V> {
	/// Creates an empty table.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Drops entries whose key is gone.
	pub fn prune(&mut self) {
		self.entries.retain(|(key, _)| key.strong_count() > 0);
	}

	/// Looks up the entry for `key`.
	#[must_use]
	pub fn get(&self, key: &Rc<K>) -> Option<&V> {
		self.entries
			.iter()
			.find(|(candidate, _)| same(candidate, key))
			.map(|(_, value)| value)
	}

	/// Looks up the entry for `key`, creating it with `init` if missing.
	pub fn get_or_insert_with(&mut self, key: &Rc<K>, init: impl FnOnce() -> V) -> &V {
		self.prune();
		let i = match self
			.entries
			.iter()
			.position(|(candidate, _)| same(candidate, key))
		{
			Some(i) => i,
			None => {
				self.entries.push((Rc::downgrade(key), init()));
				self.entries.len() - 1
			}
		};
		&self.entries[i].1
	}

	/// Removes and **returns** the entry for `key`.
	pub fn remove(&mut self, key: &Rc<K>) -> Option<V> {
		self.prune();
		let i = self
			.entries
			.iter()
			.position(|(candidate, _)| same(candidate, key))?;
		Some(self.entries.swap_remove(i).1)
	}

	/// **Returns** the number of entries whose key is still alive.
	#[must_use]
	pub fn len(&self) -> usize {
		self.entries
			.iter()
			.filter(|(key, _)| key.strong_count() > 0)
			.count()
	}

	/// **Returns** whether no entry's key is alive.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

fn same<K: ?Sized>(weak: &Weak<K>, rc: &Rc<K>) -> bool {
	weak.strong_count() > 0 && weak.as_ptr().cast::<()>() == Rc::as_ptr(rc).cast::<()>()
}

#[cfg(test)]
mod tests {
	use std::rc::Rc;

	use super::{Subscribers, WeakKeyTable};
	use crate::{args::Params, handler::Handler};

	fn handler(value: i32) -> Handler<i32, i32> {
		Handler::immediate(Params::new(), move |_| value)
	}

	#[test]
	fn set_semantics() {
		let (a, b) = (handler(1), handler(2));
		let mut subscribers = Subscribers::new();
		assert!(subscribers.insert(a.clone().into()));
		assert!(subscribers.insert(b.clone().into()));
		assert!(!subscribers.insert(a.clone().into()));
		assert!(!subscribers.insert(a.downgrade()));
		assert_eq!(subscribers.len(), 2);

		assert!(subscribers.remove(a.downgrade().key()));
		assert!(!subscribers.remove(a.downgrade().key()));
		assert_eq!(subscribers.len(), 1);
	}

	#[test]
	fn weak_entries_expire() {
		let a = handler(1);
		let mut subscribers = Subscribers::new();
		subscribers.insert(a.downgrade());
		assert_eq!(subscribers.len(), 1);

		drop(a);
		assert!(subscribers.is_empty());
		assert!(subscribers.snapshot().is_empty());
	}

	#[test]
	fn bound_methods_share_identity_per_owner() {
		use crate::handler::Method;

		let method = Method::<i32, i32, i32>::immediate(Params::new(), |owner, _| *owner);
		let (one, two) = (Rc::new(1), Rc::new(2));
		let mut subscribers = Subscribers::new();
		assert!(subscribers.insert(method.bind(&one)));
		assert!(!subscribers.insert(method.bind(&one)));
		assert!(subscribers.insert(method.bind(&two)));

		drop(one);
		assert_eq!(subscribers.snapshot().len(), 1);
	}

	#[test]
	fn table_forgets_dropped_keys() {
		let (one, two) = (Rc::new(1), Rc::new(2));
		let mut table = WeakKeyTable::new();
		assert_eq!(*table.get_or_insert_with(&one, || "one"), "one");
		assert_eq!(*table.get_or_insert_with(&one, || "other"), "one");
		table.get_or_insert_with(&two, || "two");
		assert_eq!(table.len(), 2);

		drop(one);
		assert_eq!(table.len(), 1);
		assert_eq!(table.get(&two), Some(&"two"));
		assert_eq!(table.remove(&two), Some("two"));
		assert!(table.is_empty());
	}
}
