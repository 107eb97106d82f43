//! Handlers declared once per type (and inherited), bound to each instance on notification.
//!
//! A [`Class`] is built once, usually lazily at first use of the type it describes:
//!
//! ```
//! use std::rc::Rc;
//! use clarion::{args, Bound, Class, Method, Params, Signal};
//!
//! struct Button {
//!     label: &'static str,
//! }
//!
//! let clicked = Signal::<String, i32, Button>::new();
//! let _class = Class::builder("Button")
//!     .signal("clicked", &clicked)
//!     .handler(
//!         "clicked",
//!         "on_clicked",
//!         Method::immediate(Params::new().arg("times"), |button: &Button, bound: Bound<i32>| {
//!             format!("{} x{}", button.label, bound["times"])
//!         }),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let button = Rc::new(Button { label: "ok" });
//! let results = clicked.scope(&button).notify(args![2]).unwrap();
//! assert_eq!(&*results.results().unwrap(), ["ok x2".to_string()]);
//! ```

use std::{
	any::{Any, TypeId},
	borrow::Cow,
	collections::BTreeMap,
	fmt::{self, Debug, Formatter},
	rc::Rc,
};

use tracing::{debug, warn};

use crate::{
	error::{BoxError, SignalError},
	external::{ClassSignaller, ExternalSignaller},
	handler::{Method, Subscriber},
	options::SortMode,
	signal::Signal,
	value::Value,
};

/// Trait for sources of per-instance handlers that a [`Signal`] asks on each instance notification.
///
/// [`Class`] is the provided implementation.
pub trait DeclaredHandlers<T, A = Value, O: ?Sized = dyn Any> {
	/// **Returns** the handlers for `signal`, bound to `instance`, in dispatch order,
	/// or [`None`] iff this source doesn't describe `instance`.
	fn declared_handlers(&self, signal: &str, instance: &Rc<O>) -> Option<Vec<Subscriber<T, A>>>;
}

/// Coarse position of a declared handler, before the inheritance level is considered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placement {
	/// Before all [`Placement::Default`] handlers.
	Begin,
	/// In the middle.
	#[default]
	Default,
	/// After all [`Placement::Default`] handlers.
	End,
}

/// How a handler is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerConfig {
	placement: Placement,
	check: bool,
}

impl Default for HandlerConfig {
	fn default() -> Self {
		Self {
			placement: Placement::Default,
			check: true,
		}
	}
}

impl HandlerConfig {
	/// [`Placement::Default`] and checked.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the placement.
	#[must_use]
	pub fn with_placement(mut self, placement: Placement) -> Self {
		self.placement = placement;
		self
	}

	/// Allows the handler's signal to be unknown to the class. Such handlers are never invoked.
	#[must_use]
	pub fn unchecked(mut self) -> Self {
		self.check = false;
		self
	}

	/// See [`.with_placement(…)`](`HandlerConfig::with_placement`).
	#[must_use]
	pub fn placement(&self) -> Placement {
		self.placement
	}

	/// **Returns** whether the handler's signal must be known to the class.
	#[must_use]
	pub fn is_checked(&self) -> bool {
		self.check
	}
}

#[derive(Clone)]
struct Declaration {
	member: Cow<'static, str>,
	signal: Cow<'static, str>,
	method: Rc<dyn Any>,
	method_type: TypeId,
	config: HandlerConfig,
}

struct SignalDecl<O: ?Sized + 'static> {
	method_type: TypeId,
	sort: SortMode,
	/// Declared by this class rather than inherited.
	local: bool,
	attach: Rc<dyn Fn(&Rc<Class<O>>)>,
	/// Sets the signaller iff it is an `Rc<dyn ExternalSignaller<T, A, O>>` of the signal's types.
	set_external: Rc<dyn Fn(&dyn Any) -> bool>,
}

impl<O: ?Sized + 'static> Clone for SignalDecl<O> {
	fn clone(&self) -> Self {
		Self {
			method_type: self.method_type,
			sort: self.sort,
			local: self.local,
			attach: Rc::clone(&self.attach),
			set_external: Rc::clone(&self.set_external),
		}
	}
}

/// A class's [`ClassSignaller`], with its signal types erased.
struct ClassExternal<O: ?Sized + 'static> {
	signaller: Rc<dyn Any>,
	register: Rc<dyn Fn(&Class<O>) -> Result<(), BoxError>>,
}

impl<O: ?Sized + 'static> Clone for ClassExternal<O> {
	fn clone(&self) -> Self {
		Self {
			signaller: Rc::clone(&self.signaller),
			register: Rc::clone(&self.register),
		}
	}
}

/// The signals and handlers declared for a type, including inherited ones.
///
/// Built with [`Class::builder`]. Building attaches the class to each of its signals, which then
/// bind the class's handlers to every instance the class [describes](`ClassBuilder::instances`).
pub struct Class<O: ?Sized + 'static> {
	name: Cow<'static, str>,
	signals: BTreeMap<Cow<'static, str>, SignalDecl<O>>,
	levels: Vec<Rc<[Declaration]>>,
	sorted: BTreeMap<Cow<'static, str>, Vec<Declaration>>,
	instances: Option<Rc<dyn Fn(&O) -> bool>>,
	external: Option<ClassExternal<O>>,
}

impl<O: ?Sized + 'static> Debug for Class<O> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Class")
			.field("name", &self.name)
			.field("signals", &self.signals.keys().collect::<Vec<_>>())
			.field("levels", &self.levels.len())
			.field(
				"handlers",
				&self
					.sorted
					.iter()
					.map(|(signal, declarations)| {
						(
							signal,
							declarations
								.iter()
								.map(|declaration| &declaration.member)
								.collect::<Vec<_>>(),
						)
					})
					.collect::<Vec<_>>(),
			)
			.field("external", &self.external.is_some())
			.finish_non_exhaustive()
	}
}

impl<O: ?Sized + 'static> Class<O> {
	/// Starts declaring a class.
	pub fn builder(name: impl Into<Cow<'static, str>>) -> ClassBuilder<O> {
		ClassBuilder {
			name: name.into(),
			signals: BTreeMap::new(),
			inherited: Vec::new(),
			own: Vec::new(),
			instances: None,
			external: None,
		}
	}

	/// The class's name.
	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	/// The names of the declared and inherited signals.
	pub fn signal_names(&self) -> impl '_ + Iterator<Item = &str> {
		self.signals.keys().map(|name| &**name)
	}

	/// The handler names for `signal`, in dispatch order.
	#[must_use]
	pub fn handler_names(&self, signal: &str) -> Vec<&str> {
		self.sorted
			.get(signal)
			.map(|declarations| {
				declarations
					.iter()
					.map(|declaration| &*declaration.member)
					.collect()
			})
			.unwrap_or_default()
	}

	/// **Returns** whether this class describes `instance`.
	#[must_use]
	pub fn describes(&self, instance: &O) -> bool {
		self.instances
			.as_ref()
			.map_or(true, |instances| instances(instance))
	}
}

impl<T: 'static + Clone, A: 'static + Clone, O: ?Sized + 'static> DeclaredHandlers<T, A, O> for Class<O> {
	fn declared_handlers(&self, signal: &str, instance: &Rc<O>) -> Option<Vec<Subscriber<T, A>>> {
		if !self.describes(instance) {
			return None;
		}
		Some(
			self.sorted
				.get(signal)
				.map(|declarations| {
					declarations
						.iter()
						.filter_map(|declaration| declaration.method.downcast_ref::<Method<T, A, O>>())
						.map(|method| method.bind(instance))
						.collect()
				})
				.unwrap_or_default(),
		)
	}
}

/// Declares a [`Class`].
#[must_use = "A class does nothing until built."]
pub struct ClassBuilder<O: ?Sized + 'static> {
	name: Cow<'static, str>,
	signals: BTreeMap<Cow<'static, str>, SignalDecl<O>>,
	inherited: Vec<Rc<[Declaration]>>,
	own: Vec<Declaration>,
	instances: Option<Rc<dyn Fn(&O) -> bool>>,
	external: Option<ClassExternal<O>>,
}

impl<O: ?Sized + 'static> Debug for ClassBuilder<O> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClassBuilder")
			.field("name", &self.name)
			.field("signals", &self.signals.keys().collect::<Vec<_>>())
			.field("inherited_levels", &self.inherited.len())
			.field(
				"own",
				&self
					.own
					.iter()
					.map(|declaration| &declaration.member)
					.collect::<Vec<_>>(),
			)
			.field("external", &self.external.is_some())
			.finish_non_exhaustive()
	}
}

impl<O: ?Sized + 'static> ClassBuilder<O> {
	/// Inherits `parent`'s signals, handlers and [external signaller](`ClassBuilder::external`).
	///
	/// Handlers declared on this builder override inherited ones with the same member name,
	/// but keep their position.
	pub fn extends(mut self, parent: &Class<O>) -> Self {
		self.inherited.clone_from(&parent.levels);
		for (name, signal) in &parent.signals {
			self.signals.entry(name.clone()).or_insert_with(|| SignalDecl {
				local: false,
				..signal.clone()
			});
		}
		if self.external.is_none() {
			self.external.clone_from(&parent.external);
		}
		self
	}

	/// Sets the class's external signaller.
	///
	/// On [build](`ClassBuilder::build`), it becomes the signaller of each signal this builder
	/// declares (but not of inherited ones), then registers the class.
	/// Every signal the class declares **must** have the types `T` and `A`.
	pub fn external<T: 'static, A: 'static>(
		mut self,
		external: Rc<impl 'static + ClassSignaller<T, A, O>>,
	) -> Self {
		let signaller = Rc::clone(&external) as Rc<dyn ExternalSignaller<T, A, O>>;
		self.external = Some(ClassExternal {
			signaller: Rc::new(signaller),
			register: Rc::new(move |class: &Class<O>| external.register_class(class)),
		});
		self
	}

	/// Declares `signal`.
	///
	/// An unnamed signal is named `name`. A named one is declared under its own name instead.
	pub fn signal<T: 'static + Clone, A: 'static + Clone>(
		mut self,
		name: impl Into<Cow<'static, str>>,
		signal: &Signal<T, A, O>,
	) -> Self {
		let name = match signal.name() {
			Some(name) => Cow::Owned(name.to_string()),
			None => {
				let name = name.into();
				signal.set_name(&*name);
				name
			}
		};

		let weak = signal.downgrade();
		self.signals.insert(
			name,
			SignalDecl {
				method_type: TypeId::of::<Method<T, A, O>>(),
				sort: signal.options().sort_mode(),
				local: true,
				attach: Rc::new({
					let weak = weak.clone();
					move |class: &Rc<Class<O>>| {
						if let Some(signal) = Signal::upgrade(&weak) {
							signal.attach_declared(Rc::clone(class) as Rc<dyn DeclaredHandlers<T, A, O>>);
						}
					}
				}),
				set_external: Rc::new(move |signaller: &dyn Any| {
					let Some(signaller) = signaller.downcast_ref::<Rc<dyn ExternalSignaller<T, A, O>>>()
					else {
						return false;
					};
					if let Some(signal) = Signal::upgrade(&weak) {
						signal.set_external(Some(Rc::clone(signaller)));
					}
					true
				}),
			},
		);
		self
	}

	/// Declares `method` as handler `member` of `signal`.
	pub fn handler<T: 'static, A: 'static>(
		self,
		signal: impl Into<Cow<'static, str>>,
		member: impl Into<Cow<'static, str>>,
		method: Method<T, A, O>,
	) -> Self {
		self.handler_with(signal, member, method, HandlerConfig::default())
	}

	/// Declares `method` as handler `member` of `signal`, configured.
	///
	/// Declaring the same `member` again replaces the earlier declaration.
	pub fn handler_with<T: 'static, A: 'static>(
		mut self,
		signal: impl Into<Cow<'static, str>>,
		member: impl Into<Cow<'static, str>>,
		method: Method<T, A, O>,
		config: HandlerConfig,
	) -> Self {
		let member = member.into();
		self.own.retain(|declaration| declaration.member != member);
		self.own.push(Declaration {
			member,
			signal: signal.into(),
			method: Rc::new(method),
			method_type: TypeId::of::<Method<T, A, O>>(),
			config,
		});
		self
	}

	/// Limits the instances this class describes.
	///
	/// Without a predicate, the class describes every instance. Classes that share a signal with
	/// a sibling class **should** set one, since the signal uses the latest built class that
	/// describes the instance. A class that [extends](`ClassBuilder::extends`) another **must**.
	pub fn instances(mut self, predicate: impl 'static + Fn(&O) -> bool) -> Self {
		self.instances = Some(Rc::new(predicate));
		self
	}

	/// Validates the declarations, hands the class to its external signaller if any,
	/// and attaches it to its signals.
	///
	/// # Errors
	///
	/// - [`SignalError::MissingInstances`] iff the class extends another without an [`instances`](`ClassBuilder::instances`) predicate.
	/// - [`SignalError::UnknownSignal`] iff a checked handler names an undeclared signal.
	/// - [`SignalError::HandlerType`] iff a handler's types don't match its signal.
	/// - [`SignalError::ExternalType`] iff the external signaller's types don't match a declared signal.
	/// - [`SignalError::ClassRegistration`] iff the external signaller fails to register the class.
	pub fn build(self) -> Result<Rc<Class<O>>, SignalError> {
		if !self.inherited.is_empty() && self.instances.is_none() {
			return Err(SignalError::MissingInstances { class: self.name });
		}
		for declaration in &self.own {
			match self.signals.get(&declaration.signal) {
				Some(signal) if signal.method_type != declaration.method_type => {
					return Err(SignalError::HandlerType {
						class: self.name.clone(),
						member: declaration.member.clone(),
						signal: declaration.signal.clone(),
					});
				}
				Some(_) => (),
				None if declaration.config.check => {
					return Err(SignalError::UnknownSignal {
						class: self.name.clone(),
						signal: declaration.signal.clone(),
					});
				}
				None => warn!(
					class = %self.name,
					member = %declaration.member,
					signal = %declaration.signal,
					"handler declared for a signal the class doesn't know"
				),
			}
		}

		let mut levels = self.inherited;
		levels.push(self.own.into());
		let sorted = sort_declarations(&levels, &self.signals);

		let class = Rc::new(Class {
			name: self.name,
			signals: self.signals,
			levels,
			sorted,
			instances: self.instances,
			external: self.external,
		});

		if let Some(external) = &class.external {
			for (name, signal) in class.signals.iter().filter(|(_, signal)| signal.local) {
				if !(signal.set_external)(&*external.signaller) {
					return Err(SignalError::ExternalType {
						class: class.name.clone(),
						signal: name.clone(),
					});
				}
			}
			(external.register)(&*class).map_err(|error| SignalError::ClassRegistration {
				class: class.name.clone(),
				source: error.into(),
			})?;
		}

		for signal in class.signals.values() {
			(signal.attach)(&class);
		}
		debug!(
			class = %class.name,
			signals = class.signals.len(),
			levels = class.levels.len(),
			"class built"
		);
		Ok(class)
	}
}

impl ClassBuilder<dyn Any> {
	/// Limits the instances this class describes to those of type `C`.
	pub fn of_type<C: Any>(self) -> Self {
		self.instances(|instance| instance.is::<C>())
	}
}

/// Orders each signal's effective handlers by `(placement, level, member)`.
///
/// A member's level is where it was first declared for that signal,
/// while its effective declaration is the most derived one.
fn sort_declarations<O: ?Sized + 'static>(
	levels: &[Rc<[Declaration]>],
	signals: &BTreeMap<Cow<'static, str>, SignalDecl<O>>,
) -> BTreeMap<Cow<'static, str>, Vec<Declaration>> {
	let mut effective = BTreeMap::<&str, &Declaration>::new();
	let mut first_level = BTreeMap::<(&str, &str), usize>::new();
	for (level, declarations) in levels.iter().enumerate() {
		for declaration in declarations.iter() {
			first_level
				.entry((&*declaration.signal, &*declaration.member))
				.or_insert(level);
			effective.insert(&*declaration.member, declaration);
		}
	}

	let mut keyed = BTreeMap::<&str, Vec<((Placement, usize, &str), &Declaration)>>::new();
	for declaration in effective.into_values() {
		let level = first_level[&(&*declaration.signal, &*declaration.member)];
		let level = match signals
			.get(&declaration.signal)
			.map_or(SortMode::default(), |signal| signal.sort)
		{
			SortMode::BottomUp => level,
			SortMode::TopDown => levels.len() - level,
		};
		keyed.entry(&*declaration.signal).or_default().push((
			(declaration.config.placement, level, &*declaration.member),
			declaration,
		));
	}

	keyed
		.into_iter()
		.map(|(signal, mut declarations)| {
			declarations.sort_by(|(a, _), (b, _)| a.cmp(b));
			(
				Cow::Owned(signal.to_owned()),
				declarations
					.into_iter()
					.map(|(_, declaration)| declaration.clone())
					.collect(),
			)
		})
		.collect()
}
