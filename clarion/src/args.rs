//! Call adaptation: [`Args`] as passed to a notification, [`Params`] as declared by a handler,
//! and [`Bound`] as the handler receives them.

use std::{borrow::Cow, ops::Index, slice, vec};

use crate::error::BindError;

/// Keyword arguments, in the order they were first given.
#[derive(Debug, Clone)]
pub struct Keywords<A> {
	entries: Vec<(Cow<'static, str>, A)>,
}

impl<A> Default for Keywords<A> {
	fn default() -> Self {
		Self {
			entries: Vec::new(),
		}
	}
}

impl<A> Keywords<A> {
	/// Creates an empty keyword list.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets `name` to `value`.
	///
	/// An existing entry keeps its position.
	///
	/// **Returns** the replaced value, if any.
	pub fn insert(&mut self, name: impl Into<Cow<'static, str>>, value: A) -> Option<A> {
		let name = name.into();
		match self.entries.iter_mut().find(|(key, _)| *key == name) {
			Some((_, slot)) => Some(std::mem::replace(slot, value)),
			None => {
				self.entries.push((name, value));
				None
			}
		}
	}

	/// Looks up the value named `name`.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&A> {
		self.entries
			.iter()
			.find(|(key, _)| key == name)
			.map(|(_, value)| value)
	}

	/// The number of entries.
	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// **Returns** whether there are no entries.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// The names, in order.
	pub fn names(&self) -> impl '_ + Iterator<Item = &str> {
		self.entries.iter().map(|(name, _)| &**name)
	}

	/// The entries, in order.
	pub fn iter(&self) -> impl '_ + Iterator<Item = (&str, &A)> {
		self.entries.iter().map(|(name, value)| (&**name, value))
	}
}

impl<A> Extend<(Cow<'static, str>, A)> for Keywords<A> {
	fn extend<I: IntoIterator<Item = (Cow<'static, str>, A)>>(&mut self, iter: I) {
		for (name, value) in iter {
			self.insert(name, value);
		}
	}
}

impl<A> FromIterator<(Cow<'static, str>, A)> for Keywords<A> {
	fn from_iter<I: IntoIterator<Item = (Cow<'static, str>, A)>>(iter: I) -> Self {
		let mut keywords = Self::new();
		keywords.extend(iter);
		keywords
	}
}

impl<A> IntoIterator for Keywords<A> {
	type Item = (Cow<'static, str>, A);
	type IntoIter = vec::IntoIter<Self::Item>;

	fn into_iter(self) -> Self::IntoIter {
		self.entries.into_iter()
	}
}

impl<'a, A> IntoIterator for &'a Keywords<A> {
	type Item = &'a (Cow<'static, str>, A);
	type IntoIter = slice::Iter<'a, (Cow<'static, str>, A)>;

	fn into_iter(self) -> Self::IntoIter {
		self.entries.iter()
	}
}

/// The arguments of one notification: positional values and named keyword values.
///
/// See also the [`args!`](`crate::args!`) macro.
#[derive(Debug, Clone)]
pub struct Args<A> {
	positional: Vec<A>,
	keywords: Keywords<A>,
}

impl<A> Default for Args<A> {
	fn default() -> Self {
		Self {
			positional: Vec::new(),
			keywords: Keywords::new(),
		}
	}
}

impl<A> FromIterator<A> for Args<A> {
	fn from_iter<I: IntoIterator<Item = A>>(iter: I) -> Self {
		Self {
			positional: iter.into_iter().collect(),
			keywords: Keywords::new(),
		}
	}
}

impl<A> Args<A> {
	/// Creates an empty argument list.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a positional argument.
	#[must_use]
	pub fn arg(mut self, value: A) -> Self {
		self.positional.push(value);
		self
	}

	/// Sets a keyword argument, replacing an earlier one with the same name.
	#[must_use]
	pub fn kw(mut self, name: impl Into<Cow<'static, str>>, value: A) -> Self {
		self.keywords.insert(name, value);
		self
	}

	/// The positional arguments, in order.
	#[must_use]
	pub fn positional(&self) -> &[A] {
		&self.positional
	}

	/// The keyword arguments.
	#[must_use]
	pub fn keywords(&self) -> &Keywords<A> {
		&self.keywords
	}

	/// Looks up a keyword argument.
	#[must_use]
	pub fn keyword(&self, name: &str) -> Option<&A> {
		self.keywords.get(name)
	}

	/// **Returns** whether there are neither positional nor keyword arguments.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.positional.is_empty() && self.keywords.is_empty()
	}
}

/// Creates [`Args`]: positional values first, then `name = value` keyword pairs after a `;`.
///
/// ```
/// use clarion::{args, Args};
///
/// let args: Args<i32> = args![5, 6; b = 9];
/// assert_eq!(args.positional(), [5, 6]);
/// assert_eq!(args.keyword("b"), Some(&9));
/// ```
#[macro_export]
macro_rules! args {
	($($value:expr),* ; $($name:ident = $keyword:expr),* $(,)?) => {
		$crate::Args::new()
			$(.arg($value))*
			$(.kw(::core::stringify!($name), $keyword))*
	};
	($($value:expr),* $(,)?) => {
		$crate::Args::new()$(.arg($value))*
	};
}

/// How a declared parameter can be supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
	/// Filled by the next positional argument, or by a keyword argument of the same name.
	Positional,
	/// Filled only by a keyword argument of the same name.
	KeywordOnly,
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct Param<A> {
	name: Cow<'static, str>,
	kind: ParamKind,
	default: Option<A>,
}

impl<A> Param<A> {
	/// The parameter's name.
	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	/// How the parameter can be supplied.
	#[must_use]
	pub fn kind(&self) -> ParamKind {
		self.kind
	}

	/// The value used when the parameter isn't supplied.
	#[must_use]
	pub fn default(&self) -> Option<&A> {
		self.default.as_ref()
	}
}

/// The parameters a handler declares.
///
/// Handlers with different [`Params`] can share one signal: each of them receives only what it
/// declares, see [`Params::bind`].
#[derive(Debug, Clone)]
pub struct Params<A> {
	named: Vec<Param<A>>,
	rest: bool,
	extra: bool,
}

impl<A> Default for Params<A> {
	fn default() -> Self {
		Self {
			named: Vec::new(),
			rest: false,
			extra: false,
		}
	}
}

impl<A> Params<A> {
	/// Declares no parameters. Such a handler accepts only argument-less notifications, or
	/// notifications carrying just keyword arguments (which are dropped).
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Accepts any arguments and passes them through unchanged, as [`Bound::rest`] and [`Bound::extra`].
	#[must_use]
	pub fn any() -> Self {
		Self::new().rest().extra()
	}

	/// Declares a required positional-or-keyword parameter.
	#[must_use]
	pub fn arg(self, name: impl Into<Cow<'static, str>>) -> Self {
		self.param(name, ParamKind::Positional, None)
	}

	/// Declares a positional-or-keyword parameter with a default.
	#[must_use]
	pub fn arg_or(self, name: impl Into<Cow<'static, str>>, default: A) -> Self {
		self.param(name, ParamKind::Positional, Some(default))
	}

	/// Declares a required keyword-only parameter.
	#[must_use]
	pub fn kw(self, name: impl Into<Cow<'static, str>>) -> Self {
		self.param(name, ParamKind::KeywordOnly, None)
	}

	/// Declares a keyword-only parameter with a default.
	#[must_use]
	pub fn kw_or(self, name: impl Into<Cow<'static, str>>, default: A) -> Self {
		self.param(name, ParamKind::KeywordOnly, Some(default))
	}

	/// Accepts surplus positional arguments as [`Bound::rest`].
	#[must_use]
	pub fn rest(mut self) -> Self {
		self.rest = true;
		self
	}

	/// Accepts undeclared keyword arguments as [`Bound::extra`].
	///
	/// Without this, undeclared keyword arguments are silently dropped.
	#[must_use]
	pub fn extra(mut self) -> Self {
		self.extra = true;
		self
	}

	fn param(mut self, name: impl Into<Cow<'static, str>>, kind: ParamKind, default: Option<A>) -> Self {
		self.named.push(Param {
			name: name.into(),
			kind,
			default,
		});
		self
	}

	/// The named parameters, in declaration order.
	#[must_use]
	pub fn named(&self) -> &[Param<A>] {
		&self.named
	}

	/// **Returns** whether surplus positional arguments are accepted.
	#[must_use]
	pub fn accepts_rest(&self) -> bool {
		self.rest
	}

	/// **Returns** whether undeclared keyword arguments are accepted.
	#[must_use]
	pub fn accepts_extra(&self) -> bool {
		self.extra
	}

	/// Adapts `args` to these parameters.
	///
	/// 1. Positional arguments fill [`ParamKind::Positional`] parameters in order.
	///    Surplus ones go to [`Bound::rest`] if accepted.
	/// 2. Keyword arguments fill the parameter of the same name.
	///    Undeclared ones go to [`Bound::extra`] if accepted, and are dropped otherwise.
	/// 3. Parameters that are still unfilled take their default.
	///
	/// # Errors
	///
	/// - [`BindError::TooManyPositional`] iff there are surplus positional arguments that aren't accepted.
	/// - [`BindError::MultipleValues`] iff a keyword argument names an already-filled parameter.
	/// - [`BindError::Missing`] iff a parameter without default remains unfilled.
	pub fn bind(&self, args: &Args<A>) -> Result<Bound<A>, BindError>
	where
		A: Clone,
	{
		let mut slots: Vec<Option<A>> = self.named.iter().map(|_| None).collect();

		let positional_slots = self
			.named
			.iter()
			.enumerate()
			.filter(|(_, param)| param.kind == ParamKind::Positional)
			.map(|(slot, _)| slot)
			.collect::<Vec<_>>();
		let mut rest = Vec::new();
		for (i, value) in args.positional.iter().enumerate() {
			if let Some(&slot) = positional_slots.get(i) {
				slots[slot] = Some(value.clone());
			} else if self.rest {
				rest.push(value.clone());
			} else {
				return Err(BindError::TooManyPositional {
					expected: positional_slots.len(),
					given: args.positional.len(),
				});
			}
		}

		let mut extra = Keywords::new();
		for (name, value) in &args.keywords {
			match self.named.iter().position(|param| param.name == *name) {
				Some(slot) if slots[slot].is_some() => {
					return Err(BindError::MultipleValues(name.clone()));
				}
				Some(slot) => slots[slot] = Some(value.clone()),
				None if self.extra => {
					extra.insert(name.clone(), value.clone());
				}
				None => (),
			}
		}

		let values = slots
			.into_iter()
			.zip(&self.named)
			.map(|(slot, param)| {
				slot.or_else(|| param.default.clone())
					.ok_or_else(|| BindError::Missing(param.name.clone()))
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Bound {
			params: self
				.named
				.iter()
				.map(|param| (param.name.clone(), param.kind))
				.collect(),
			values,
			rest,
			extra,
		})
	}
}

/// The arguments as adapted to one handler's [`Params`].
///
/// Every named parameter has a value, in declaration order.
#[derive(Debug, Clone)]
pub struct Bound<A> {
	params: Vec<(Cow<'static, str>, ParamKind)>,
	values: Vec<A>,
	rest: Vec<A>,
	extra: Keywords<A>,
}

impl<A> Bound<A> {
	/// Passes `args` through without adaptation.
	#[must_use]
	pub fn passthrough(args: Args<A>) -> Self {
		Self {
			params: Vec::new(),
			values: Vec::new(),
			rest: args.positional,
			extra: args.keywords,
		}
	}

	/// Looks up a named parameter's value.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&A> {
		self.params
			.iter()
			.position(|(param, _)| param == name)
			.map(|i| &self.values[i])
	}

	/// The named parameters' values, in declaration order.
	#[must_use]
	pub fn values(&self) -> &[A] {
		&self.values
	}

	/// Surplus positional arguments.
	#[must_use]
	pub fn rest(&self) -> &[A] {
		&self.rest
	}

	/// Undeclared keyword arguments.
	#[must_use]
	pub fn extra(&self) -> &Keywords<A> {
		&self.extra
	}

	/// Converts back into [`Args`] that bind to the same values.
	#[must_use]
	pub fn into_args(self) -> Args<A> {
		let mut args = Args::new();
		for ((name, kind), value) in self.params.into_iter().zip(self.values) {
			match kind {
				ParamKind::Positional => args.positional.push(value),
				ParamKind::KeywordOnly => {
					args.keywords.insert(name, value);
				}
			}
		}
		args.positional.extend(self.rest);
		args.keywords.extend(self.extra);
		args
	}
}

impl<A> Index<usize> for Bound<A> {
	type Output = A;

	fn index(&self, index: usize) -> &Self::Output {
		&self.values[index]
	}
}

impl<A> Index<&str> for Bound<A> {
	type Output = A;

	fn index(&self, name: &str) -> &Self::Output {
		self.get(name)
			.unwrap_or_else(|| panic!("no parameter named `{name}`"))
	}
}
