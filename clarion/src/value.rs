use std::{
	any::{type_name, Any},
	fmt::{self, Debug, Formatter},
	rc::Rc,
};

/// A cheaply clonable type-erased argument.
///
/// This is the default argument type of [`Signal`](`crate::Signal`), for events whose handlers
/// don't agree on one concrete argument type.
#[derive(Clone)]
pub struct Value {
	value: Rc<dyn Any>,
	type_name: &'static str,
}

impl Debug for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Value").field(&self.type_name).finish()
	}
}

impl Value {
	/// Erases `value`.
	pub fn new<T: 'static>(value: T) -> Self {
		Self {
			value: Rc::new(value),
			type_name: type_name::<T>(),
		}
	}

	/// **Returns** whether this is a `T`.
	#[must_use]
	pub fn is<T: 'static>(&self) -> bool {
		self.value.is::<T>()
	}

	/// Borrows the contained value as `T`, if it is one.
	#[must_use]
	pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
		self.value.downcast_ref()
	}

	/// Clones the contained value out as `T`, if it is one.
	#[must_use]
	pub fn get<T: 'static + Clone>(&self) -> Option<T> {
		self.downcast_ref::<T>().cloned()
	}

	/// The name of the erased type, for diagnostics only.
	#[must_use]
	pub fn type_name(&self) -> &'static str {
		self.type_name
	}
}
